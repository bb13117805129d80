use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::OnceLock;

use log::debug;

use crate::abi::{RuntimeHooks, RuntimeLayout};
use crate::clock::{Clock, TscClock};
use crate::park::{FutexParker, TimelineParker};
use crate::tables::{
    FixedPoint, FlowControl, TimelineRecord, COLLISION_CAPACITY,
    COLLISION_TABLE_ADDR, DEFAULT_BOUNCE_ADDR, DEFAULT_TARGET_ADDR,
    FIXED_POINT_CAPACITY, FIXED_POINT_TABLE_ADDR, FLOW_CAPACITY,
    FLOW_TABLE_ADDR,
};

/// One mmap'd table. Owns the mapping exclusively; optionally placed at
/// a caller-chosen fixed address. Shared mappings, so timelines running
/// in forked children operate on the same tables.
struct TableRegion {
    ptr: *mut u8,
    size: usize,
}

// SAFETY: TableRegion owns its mapping; concurrent access goes through
// the atomics inside the entry structs.
unsafe impl Send for TableRegion {}
unsafe impl Sync for TableRegion {}

impl TableRegion {
    fn new(size: usize, fixed_addr: Option<u64>) -> io::Result<Self> {
        let (hint, flags) = match fixed_addr {
            Some(addr) => (
                addr as *mut libc::c_void,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS | libc::MAP_FIXED_NOREPLACE,
            ),
            None => (
                ptr::null_mut(),
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
            ),
        };
        // SAFETY: anonymous private mapping, no file backing.
        let p = unsafe {
            libc::mmap(
                hint,
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            )
        };
        if p == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            ptr: p as *mut u8,
            size,
        })
    }

    fn addr(&self) -> u64 {
        self.ptr as u64
    }
}

impl Drop for TableRegion {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.size);
            }
        }
    }
}

/// Runtime construction parameters.
pub struct RuntimeConfig {
    /// Map the tables at the conventional fixed addresses
    /// (`0x500000`/`0x600000`/`0x610000`) instead of wherever the kernel
    /// puts them. Fails if the address space is already occupied.
    pub reserve_fixed_addresses: bool,
    pub clock: Box<dyn Clock>,
    pub parker: Box<dyn TimelineParker>,
    /// Descriptor the print entries write to.
    pub out_fd: i32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            reserve_fixed_addresses: false,
            clock: Box::new(TscClock),
            parker: Box::new(FutexParker),
            out_fd: 1,
        }
    }
}

/// Process-wide runtime state.
///
/// Owns the three tables for the lifetime of the emitted program. There
/// is one per process (emitted code reaches it through addresses baked
/// into the instruction stream), installed with [`RuntimeState::install`].
pub struct RuntimeState {
    fixed_points: TableRegion,
    flows: TableRegion,
    collisions: TableRegion,
    /// Current-time cell read by temporal array indexing.
    pub current_time: AtomicU64,
    out_fd: AtomicI32,
    clock: Box<dyn Clock>,
    parker: Box<dyn TimelineParker>,
}

static STATE: OnceLock<RuntimeState> = OnceLock::new();

impl RuntimeState {
    /// Install the process-wide runtime. Subsequent calls return the
    /// already-installed state and ignore the new config.
    pub fn install(config: RuntimeConfig) -> io::Result<&'static RuntimeState> {
        if let Some(state) = STATE.get() {
            return Ok(state);
        }
        let state = Self::build(config)?;
        Ok(STATE.get_or_init(|| state))
    }

    /// The installed runtime, if any. Entry points return the error
    /// sentinel when nothing is installed.
    pub fn get() -> Option<&'static RuntimeState> {
        STATE.get()
    }

    fn build(config: RuntimeConfig) -> io::Result<RuntimeState> {
        let fixed = config.reserve_fixed_addresses;
        let fp_size =
            std::mem::size_of::<FixedPoint>() * FIXED_POINT_CAPACITY;
        let flow_size =
            std::mem::size_of::<FlowControl>() * FLOW_CAPACITY;
        let col_size =
            std::mem::size_of::<TimelineRecord>() * COLLISION_CAPACITY;

        let fixed_points = TableRegion::new(
            fp_size,
            fixed.then_some(FIXED_POINT_TABLE_ADDR),
        )?;
        let flows =
            TableRegion::new(flow_size, fixed.then_some(FLOW_TABLE_ADDR))?;
        let collisions = TableRegion::new(
            col_size,
            fixed.then_some(COLLISION_TABLE_ADDR),
        )?;

        debug!(
            "runtime tables: fixed-points @ {:#x}, flows @ {:#x}, collisions @ {:#x}",
            fixed_points.addr(),
            flows.addr(),
            collisions.addr()
        );

        Ok(RuntimeState {
            fixed_points,
            flows,
            collisions,
            current_time: AtomicU64::new(0),
            out_fd: AtomicI32::new(config.out_fd),
            clock: config.clock,
            parker: config.parker,
        })
    }

    pub fn clock(&self) -> &dyn Clock {
        &*self.clock
    }

    pub fn parker(&self) -> &dyn TimelineParker {
        &*self.parker
    }

    pub fn out_fd(&self) -> i32 {
        self.out_fd.load(Ordering::Relaxed)
    }

    /// Redirect the print entries (tests point this at a pipe).
    pub fn set_out_fd(&self, fd: i32) {
        self.out_fd.store(fd, Ordering::Relaxed);
    }

    pub fn fixed_point(&self, id: usize) -> Option<&FixedPoint> {
        if id >= FIXED_POINT_CAPACITY {
            return None;
        }
        // SAFETY: the region is FIXED_POINT_CAPACITY entries of
        // zero-initialized FixedPoint (all-zero is a valid state).
        unsafe {
            Some(&*(self.fixed_points.ptr as *const FixedPoint).add(id))
        }
    }

    pub fn flow(&self, id: usize) -> Option<&FlowControl> {
        if id >= FLOW_CAPACITY {
            return None;
        }
        // SAFETY: as above; all-zero FlowControl is valid (inactive).
        unsafe { Some(&*(self.flows.ptr as *const FlowControl).add(id)) }
    }

    /// Base pointer of the collision table. Emitted code scans this
    /// directly; Rust-side access is test-only.
    pub fn collision_base(&self) -> *mut TimelineRecord {
        self.collisions.ptr as *mut TimelineRecord
    }

    /// The layout handed to the emitter: table addresses plus entry-point
    /// addresses of this runtime.
    pub fn layout(&self) -> RuntimeLayout {
        RuntimeLayout {
            collision_table: self.collisions.addr(),
            fixedpoint_table: self.fixed_points.addr(),
            flow_table: self.flows.addr(),
            default_target: DEFAULT_TARGET_ADDR,
            default_bounce: DEFAULT_BOUNCE_ADDR,
            current_time: &self.current_time as *const AtomicU64 as u64,
            hooks: RuntimeHooks::linked(),
        }
    }
}
