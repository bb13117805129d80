//! Fixed-point rendezvous: registration, arrival, release.

use std::sync::atomic::Ordering;

use log::debug;

use crate::state::RuntimeState;
use crate::tables::FIXED_POINT_CAPACITY;
use crate::RT_ERR;

impl RuntimeState {
    /// Allocate a fixed-point slot and copy at most 31 bytes of `name`
    /// into it. Returns the slot id, or [`RT_ERR`] on exhaustion.
    pub fn register_fixedpoint(&self, name: &[u8]) -> u64 {
        for id in 0..FIXED_POINT_CAPACITY {
            let fp = self.fixed_point(id).unwrap();
            if fp
                .active
                .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }
            // Slot reserved; initialize before anyone can look it up by id.
            let n = name.len().min(31);
            // SAFETY: the CAS above made this thread the slot owner.
            unsafe {
                let buf = &mut *fp.name.get();
                buf.fill(0);
                buf[..n].copy_from_slice(&name[..n]);
            }
            fp.arrived_mask.store(0, Ordering::Relaxed);
            fp.required_mask.store(0, Ordering::Relaxed);
            fp.data.store(0, Ordering::Relaxed);
            fp.id.store(id as u64, Ordering::Release);
            debug!(
                "fixed point {} registered as {:?}",
                id,
                String::from_utf8_lossy(&name[..n])
            );
            return id as u64;
        }
        RT_ERR
    }

    /// Set the participation mask checked by the release condition.
    /// Zero (the reset state) releases on every first arrival.
    pub fn fixedpoint_require(&self, fp_id: u64, mask: u64) -> u64 {
        match self.fixed_point(fp_id as usize) {
            Some(fp) if fp.active.load(Ordering::Acquire) != 0 => {
                fp.required_mask.store(mask, Ordering::Release);
                0
            }
            _ => RT_ERR,
        }
    }

    /// Arrive at a fixed point. If this arrival completes the required
    /// mask, every arrived timeline is released and the mask clears;
    /// otherwise the caller blocks until a later arrival releases it.
    pub fn arrive_fixedpoint(
        &self,
        fp_id: u64,
        timeline_id: u64,
        data_ptr: u64,
    ) -> u64 {
        let fp = match self.fixed_point(fp_id as usize) {
            Some(fp) if fp.active.load(Ordering::Acquire) != 0 => fp,
            _ => return RT_ERR,
        };
        if timeline_id >= 64 {
            return RT_ERR;
        }

        let seq = fp.seq.load(Ordering::Acquire);
        if data_ptr != 0 {
            fp.data.store(data_ptr, Ordering::Relaxed);
        }
        let arrived = fp
            .arrived_mask
            .fetch_or(1 << timeline_id, Ordering::AcqRel)
            | (1 << timeline_id);
        let required = fp.required_mask.load(Ordering::Acquire);

        if arrived & required == required {
            // Release path: clear the mask once, bump the generation,
            // wake every parked arrival.
            fp.arrived_mask.store(0, Ordering::Release);
            fp.seq.fetch_add(1, Ordering::Release);
            self.parker().unpark_all(&fp.seq);
            debug!("fixed point {fp_id}: released mask {arrived:#x}");
        } else {
            self.parker().park(&fp.seq, seq);
        }
        0
    }
}
