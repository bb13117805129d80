//! Flow registration and cycle-gated polling.

use std::sync::atomic::Ordering;

use log::debug;

use crate::state::RuntimeState;
use crate::tables::{FLOW_CAPACITY, FLOW_KIND_PERMANENT, FLOW_KIND_RATE_LIMITED};
use crate::RT_ERR;

impl RuntimeState {
    /// Allocate a flow slot for `timeline_id`. `rate_hz > 0` makes the
    /// flow rate-limited at that frequency; zero makes it permanent
    /// (every poll fires). Returns the flow id or [`RT_ERR`].
    pub fn register_flow(&self, timeline_id: u64, rate_hz: u64) -> u64 {
        for id in 0..FLOW_CAPACITY {
            let fl = self.flow(id).unwrap();
            if fl
                .active
                .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }
            fl.timeline_id.store(timeline_id, Ordering::Relaxed);
            fl.paused.store(0, Ordering::Relaxed);
            fl.last_cycle.store(0, Ordering::Relaxed);
            if rate_hz > 0 {
                let tick = self.clock().hz() / rate_hz;
                fl.kind.store(FLOW_KIND_RATE_LIMITED, Ordering::Relaxed);
                fl.rate_hz.store(rate_hz, Ordering::Relaxed);
                fl.next_cycle
                    .store(self.clock().now() + tick, Ordering::Relaxed);
            } else {
                fl.kind.store(FLOW_KIND_PERMANENT, Ordering::Relaxed);
                fl.rate_hz.store(0, Ordering::Relaxed);
                fl.next_cycle.store(0, Ordering::Relaxed);
            }
            debug!("flow {id} registered for timeline {timeline_id} at {rate_hz} Hz");
            return id as u64;
        }
        RT_ERR
    }

    /// Poll a flow. Permanent flows fire on every poll; rate-limited
    /// flows fire at most once per tick, advancing `next_cycle` by one
    /// tick on success. Missed ticks are not made up; the next window
    /// starts from the current reading.
    ///
    /// Cycle fields are single-writer: only the polling thread stores
    /// them, so relaxed atomics stand in for the original's plain stores.
    pub fn should_execute_flow(&self, flow_id: u64) -> bool {
        let fl = match self.flow(flow_id as usize) {
            Some(fl) => fl,
            None => return false,
        };
        if fl.active.load(Ordering::Acquire) == 0
            || fl.paused.load(Ordering::Acquire) != 0
        {
            return false;
        }
        if fl.kind.load(Ordering::Relaxed) == FLOW_KIND_PERMANENT {
            return true;
        }

        let now = self.clock().now();
        if now < fl.next_cycle.load(Ordering::Relaxed) {
            return false;
        }
        let rate = fl.rate_hz.load(Ordering::Relaxed).max(1);
        let tick = self.clock().hz() / rate;
        fl.last_cycle.store(now, Ordering::Relaxed);
        fl.next_cycle.store(now + tick, Ordering::Relaxed);
        true
    }

    pub fn pause_flow(&self, flow_id: u64) -> u64 {
        match self.flow(flow_id as usize) {
            Some(fl) if fl.active.load(Ordering::Acquire) != 0 => {
                fl.paused.store(1, Ordering::Release);
                0
            }
            _ => RT_ERR,
        }
    }

    /// Unpause and, when `new_rate > 0`, retune the tick. The next window
    /// starts one full tick after the resume.
    pub fn resume_flow(&self, flow_id: u64, new_rate: u64) -> u64 {
        match self.flow(flow_id as usize) {
            Some(fl) if fl.active.load(Ordering::Acquire) != 0 => {
                if new_rate > 0 {
                    let tick = self.clock().hz() / new_rate;
                    fl.kind.store(FLOW_KIND_RATE_LIMITED, Ordering::Relaxed);
                    fl.rate_hz.store(new_rate, Ordering::Relaxed);
                    fl.next_cycle
                        .store(self.clock().now() + tick, Ordering::Relaxed);
                }
                fl.paused.store(0, Ordering::Release);
                0
            }
            _ => RT_ERR,
        }
    }

    /// Sticky deactivation; takes effect on the next poll. Idempotent.
    pub fn terminate_flow(&self, flow_id: u64) -> u64 {
        match self.flow(flow_id as usize) {
            Some(fl) => {
                fl.active.store(0, Ordering::Release);
                0
            }
            None => RT_ERR,
        }
    }
}
