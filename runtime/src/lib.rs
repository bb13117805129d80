//! Blaze timeline runtime — the ABI emitted code calls into.
//!
//! Owns the three tables (fixed points, flows, collision records), the
//! clock and parking primitives behind them, the reference-counted
//! allocator used by 4-D array creation, and the print helpers. Entry
//! points are `extern "sysv64"` functions; the emitter materializes their
//! addresses with `mov reg, imm64` + `call reg`.
//!
//! The fixed-address table layout (`0x500000`/`0x600000`/`0x610000`) is a
//! serialization convention: by default the tables live wherever the
//! allocator puts them and their addresses travel to the emitter through
//! [`abi::RuntimeLayout`]; [`state::RuntimeConfig::reserve_fixed_addresses`]
//! maps them at the conventional addresses instead.

pub mod abi;
pub mod alloc;
pub mod clock;
pub mod entry;
pub mod fixedpoint;
pub mod flow;
pub mod io;
pub mod park;
pub mod state;
pub mod tables;

pub use abi::RuntimeLayout;
pub use clock::{CalibratedClock, Clock, TscClock};
pub use park::{FutexParker, TimelineParker};
pub use state::{RuntimeConfig, RuntimeState};

/// Sentinel returned by `register_*` entries on table exhaustion.
pub const RT_ERR: u64 = u64::MAX;
