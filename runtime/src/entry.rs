//! `extern "sysv64"` entry points — the surface emitted code calls.
//!
//! Every entry resolves the installed [`RuntimeState`]; with nothing
//! installed the registering entries return the [`RT_ERR`] sentinel and
//! the rest are no-ops. Name pointers are NUL-terminated (emitted inline
//! strings carry the terminator).

use std::sync::atomic::Ordering;

use crate::state::RuntimeState;
use crate::RT_ERR;

/// Reference-counted allocation: RDI = byte count, pointer in RAX
/// (null on failure).
pub extern "sysv64" fn blaze_rt_alloc(bytes: u64) -> u64 {
    crate::alloc::rc_alloc(bytes) as u64
}

/// Register a fixed point. RDI = NUL-terminated name pointer. Returns
/// the id, or `~0` on table exhaustion.
///
/// # Safety contract
/// `name` must point to a readable NUL-terminated string; emitted code
/// guarantees this for its inline literals.
pub extern "sysv64" fn blaze_rt_register_fixedpoint(name: *const u8) -> u64 {
    let Some(st) = RuntimeState::get() else {
        return RT_ERR;
    };
    if name.is_null() {
        return RT_ERR;
    }
    // SAFETY: per the entry contract, name is NUL-terminated; cap the
    // scan at the 31 bytes the table keeps anyway.
    let bytes = unsafe {
        let mut len = 0;
        while len < 31 && *name.add(len) != 0 {
            len += 1;
        }
        std::slice::from_raw_parts(name, len)
    };
    st.register_fixedpoint(bytes)
}

pub extern "sysv64" fn blaze_rt_fixedpoint_require(fp_id: u64, mask: u64) -> u64 {
    match RuntimeState::get() {
        Some(st) => st.fixedpoint_require(fp_id, mask),
        None => RT_ERR,
    }
}

pub extern "sysv64" fn blaze_rt_arrive_fixedpoint(
    fp_id: u64,
    timeline_id: u64,
    data_ptr: u64,
) -> u64 {
    match RuntimeState::get() {
        Some(st) => st.arrive_fixedpoint(fp_id, timeline_id, data_ptr),
        None => RT_ERR,
    }
}

pub extern "sysv64" fn blaze_rt_register_flow(timeline_id: u64, rate_hz: u64) -> u64 {
    match RuntimeState::get() {
        Some(st) => st.register_flow(timeline_id, rate_hz),
        None => RT_ERR,
    }
}

/// Poll a flow: 1 when the body should run, else 0.
pub extern "sysv64" fn blaze_rt_should_execute(flow_id: u64) -> u64 {
    match RuntimeState::get() {
        Some(st) => st.should_execute_flow(flow_id) as u64,
        None => 0,
    }
}

pub extern "sysv64" fn blaze_rt_pause_flow(flow_id: u64) -> u64 {
    match RuntimeState::get() {
        Some(st) => st.pause_flow(flow_id),
        None => RT_ERR,
    }
}

pub extern "sysv64" fn blaze_rt_resume_flow(flow_id: u64, new_rate: u64) -> u64 {
    match RuntimeState::get() {
        Some(st) => st.resume_flow(flow_id, new_rate),
        None => RT_ERR,
    }
}

pub extern "sysv64" fn blaze_rt_terminate_flow(flow_id: u64) -> u64 {
    match RuntimeState::get() {
        Some(st) => st.terminate_flow(flow_id),
        None => RT_ERR,
    }
}

pub extern "sysv64" fn blaze_rt_print_i64(value: i64) {
    if let Some(st) = RuntimeState::get() {
        st.print_i64(value);
    }
}

pub extern "sysv64" fn blaze_rt_print_f64(value: f64) {
    if let Some(st) = RuntimeState::get() {
        st.print_f64(value);
    }
}

/// Advance the current-time cell used by temporal array indexing.
pub extern "sysv64" fn blaze_rt_advance_time(delta: u64) -> u64 {
    match RuntimeState::get() {
        Some(st) => st.current_time.fetch_add(delta, Ordering::Relaxed) + delta,
        None => 0,
    }
}
