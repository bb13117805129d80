use std::sync::atomic::{AtomicU32, Ordering};

/// Blocking primitive behind `block_timeline`/`unblock_timeline`.
///
/// A fixed point parks arrivals on its generation word; the releasing
/// arrival bumps the generation and wakes everyone. The trait exists so
/// hosts without futexes (or tests that must not block) can substitute
/// their own realization.
pub trait TimelineParker: Send + Sync {
    /// Block until `cell` no longer holds `observed`.
    fn park(&self, cell: &AtomicU32, observed: u32);
    /// Wake every timeline parked on `cell`.
    fn unpark_all(&self, cell: &AtomicU32);
}

/// Futex-backed parker (Linux).
#[derive(Debug, Default)]
pub struct FutexParker;

impl FutexParker {
    fn futex(cell: &AtomicU32, op: libc::c_int, val: u32) -> libc::c_long {
        // SAFETY: cell points to a valid, aligned u32 for the duration of
        // the call; FUTEX_WAIT/WAKE do not write through it.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                cell.as_ptr(),
                op,
                val,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null_mut::<u32>(),
                0u32,
            )
        }
    }
}

impl TimelineParker for FutexParker {
    fn park(&self, cell: &AtomicU32, observed: u32) {
        while cell.load(Ordering::Acquire) == observed {
            // EAGAIN (value changed) and EINTR both mean "recheck".
            Self::futex(cell, libc::FUTEX_WAIT, observed);
        }
    }

    fn unpark_all(&self, cell: &AtomicU32) {
        Self::futex(cell, libc::FUTEX_WAKE, u32::MAX);
    }
}

/// Spin parker for single-threaded tests and hosts without futexes.
#[derive(Debug, Default)]
pub struct SpinParker;

impl TimelineParker for SpinParker {
    fn park(&self, cell: &AtomicU32, observed: u32) {
        while cell.load(Ordering::Acquire) == observed {
            std::hint::spin_loop();
        }
    }

    fn unpark_all(&self, _cell: &AtomicU32) {}
}
