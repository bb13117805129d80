//! Table entry layouts shared with emitted code.
//!
//! All structs are `#[repr(C)]`; emitted code addresses fields by byte
//! offset, so the layouts here are ABI. Sizes are pinned by compile-time
//! assertions.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU64};

pub const FIXED_POINT_CAPACITY: usize = 256;
pub const FLOW_CAPACITY: usize = 128;
pub const COLLISION_CAPACITY: usize = 1024;

/// Conventional fixed process addresses (§6 of the ABI).
pub const COLLISION_TABLE_ADDR: u64 = 0x50_0000;
pub const FIXED_POINT_TABLE_ADDR: u64 = 0x60_0000;
pub const FLOW_TABLE_ADDR: u64 = 0x61_0000;
pub const DEFAULT_TARGET_ADDR: u64 = 0x40_0000;
pub const DEFAULT_BOUNCE_ADDR: u64 = 0x40_1000;

/// Rendezvous barrier entry.
///
/// `arrived_mask` is the only multi-writer field and is updated with
/// atomic RMW. `name` is written once before the `active` CAS publishes
/// the slot. `seq` is the park/unpark generation word (futex cell).
#[repr(C)]
pub struct FixedPoint {
    pub id: AtomicU64,
    pub name: UnsafeCell<[u8; 32]>,
    pub arrived_mask: AtomicU64,
    pub required_mask: AtomicU64,
    pub data: AtomicU64,
    pub active: AtomicU64,
    pub seq: AtomicU32,
    pub _pad: u32,
}

// SAFETY: name is written only by the slot owner between the reserving
// CAS on `active` and publication; all other fields are atomics.
unsafe impl Sync for FixedPoint {}

/// Flow kind discriminants stored in the table.
pub const FLOW_KIND_PERMANENT: u64 = 0;
pub const FLOW_KIND_RATE_LIMITED: u64 = 1;

/// Rate-gated flow entry. Cycle fields are single-writer (the owning
/// scheduler thread); plain atomic stores with relaxed ordering model
/// the original's ordinary stores.
#[repr(C)]
pub struct FlowControl {
    pub timeline_id: AtomicU64,
    pub kind: AtomicU64,
    pub rate_hz: AtomicU64,
    pub last_cycle: AtomicU64,
    pub next_cycle: AtomicU64,
    pub active: AtomicU64,
    pub paused: AtomicU64,
}

/// Collision record scanned by emitted code.
///
/// 280 bytes: 24 bytes of control fields + 256 bytes of payload.
/// `next` is a byte offset into the collision table (chain link for the
/// queue strategy); [`COLLISION_NEXT_NONE`] terminates a chain.
#[repr(C)]
pub struct TimelineRecord {
    pub id: u64,
    pub target: u64,
    pub strategy: u32,
    pub next: u32,
    pub data: [u8; COLLISION_DATA_SIZE],
}

pub const COLLISION_DATA_SIZE: usize = 256;
pub const COLLISION_RECORD_SIZE: usize = 280;
pub const COLLISION_NEXT_NONE: u32 = u32::MAX;

// Field byte offsets used by the emitter when generating table walks.
pub const TLR_OFF_ID: i32 = 0;
pub const TLR_OFF_TARGET: i32 = 8;
pub const TLR_OFF_STRATEGY: i32 = 16;
pub const TLR_OFF_NEXT: i32 = 20;
pub const TLR_OFF_DATA: i32 = 24;

const _: () = {
    assert!(std::mem::size_of::<TimelineRecord>() == COLLISION_RECORD_SIZE);
    // The fixed-point table must fit between 0x600000 and 0x610000.
    assert!(
        std::mem::size_of::<FixedPoint>() * FIXED_POINT_CAPACITY <= 0x1_0000
    );
};
