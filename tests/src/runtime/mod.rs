//! Runtime behavior through the same `extern "sysv64"` entry points
//! emitted code calls: fixed-point rendezvous across threads and
//! rate-limited flow gating.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use blaze_runtime::entry::{
    blaze_rt_arrive_fixedpoint, blaze_rt_fixedpoint_require,
    blaze_rt_register_fixedpoint, blaze_rt_register_flow,
    blaze_rt_should_execute,
};
use blaze_runtime::RT_ERR;

use crate::harness::rt;

#[test]
fn rendezvous_releases_all_required_timelines_exactly_once() {
    let st = rt();
    let id = blaze_rt_register_fixedpoint(b"rendezvous\0".as_ptr());
    assert_ne!(id, RT_ERR);
    assert_eq!(blaze_rt_fixedpoint_require(id, 0b111), 0);

    let released = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for timeline in 0..3u64 {
        let released = Arc::clone(&released);
        handles.push(thread::spawn(move || {
            assert_eq!(blaze_rt_arrive_fixedpoint(id, timeline, 0), 0);
            released.fetch_add(1, Ordering::SeqCst);
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(released.load(Ordering::SeqCst), 3);
    let fp = st.fixed_point(id as usize).unwrap();
    assert_eq!(fp.arrived_mask.load(Ordering::SeqCst), 0, "mask cleared");
}

#[test]
fn arrival_outside_required_mask_sets_bit_without_releasing() {
    let st = rt();
    let id = blaze_rt_register_fixedpoint(b"partial\0".as_ptr());
    assert_eq!(blaze_rt_fixedpoint_require(id, 0b11), 0);

    let outsider_done = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&outsider_done);
    let outsider = thread::spawn(move || {
        // Timeline 2 is not in the required mask; its arrival must park.
        blaze_rt_arrive_fixedpoint(id, 2, 0);
        flag.store(true, Ordering::SeqCst);
    });

    thread::sleep(Duration::from_millis(50));
    let fp = st.fixed_point(id as usize).unwrap();
    assert_ne!(
        fp.arrived_mask.load(Ordering::SeqCst) & 0b100,
        0,
        "outsider bit recorded"
    );
    assert!(!outsider_done.load(Ordering::SeqCst), "outsider still parked");

    let first = thread::spawn(move || {
        blaze_rt_arrive_fixedpoint(id, 0, 0);
    });
    thread::sleep(Duration::from_millis(50));
    assert!(!outsider_done.load(Ordering::SeqCst), "mask still incomplete");

    // Completing the mask releases every parked arrival together.
    assert_eq!(blaze_rt_arrive_fixedpoint(id, 1, 0), 0);
    outsider.join().unwrap();
    first.join().unwrap();
    assert!(outsider_done.load(Ordering::SeqCst));
}

#[test]
fn rate_limited_flow_has_a_tick_floor() {
    let st = rt();
    let rate = 50;
    let flow = blaze_rt_register_flow(7, rate);
    assert_ne!(flow, RT_ERR);

    let clock = st.clock();
    let tick = clock.hz() / rate;

    let mut stamps = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(2);
    while stamps.len() < 3 && Instant::now() < deadline {
        if blaze_rt_should_execute(flow) != 0 {
            stamps.push(clock.now());
        }
    }
    assert_eq!(stamps.len(), 3, "flow never fired");
    for pair in stamps.windows(2) {
        assert!(
            pair[1] - pair[0] >= tick,
            "fired {} cycles apart, floor is {}",
            pair[1] - pair[0],
            tick
        );
    }
}

#[test]
fn ten_hz_flow_fires_four_to_six_times_in_500ms() {
    let _ = rt();
    let flow = blaze_rt_register_flow(8, 10);
    assert_ne!(flow, RT_ERR);

    let mut count = 0;
    let deadline = Instant::now() + Duration::from_millis(500);
    while Instant::now() < deadline {
        if blaze_rt_should_execute(flow) != 0 {
            count += 1;
        }
        thread::sleep(Duration::from_millis(1));
    }
    assert!(
        (4..=6).contains(&count),
        "10 Hz flow fired {count} times in 500 ms"
    );
}
