//! The contract between the emitter and the runtime: where the tables
//! live and where the entry points are.
//!
//! Emitted code never resolves symbols; every address it needs is baked
//! into the instruction stream at emission time from a [`RuntimeLayout`].

use crate::entry;
use crate::tables::{
    COLLISION_TABLE_ADDR, DEFAULT_BOUNCE_ADDR, DEFAULT_TARGET_ADDR,
    FIXED_POINT_TABLE_ADDR, FLOW_TABLE_ADDR,
};

/// Addresses of the runtime entry points called from generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeHooks {
    pub alloc: u64,
    pub register_fixedpoint: u64,
    pub fixedpoint_require: u64,
    pub arrive_fixedpoint: u64,
    pub register_flow: u64,
    pub should_execute: u64,
    pub pause_flow: u64,
    pub resume_flow: u64,
    pub terminate_flow: u64,
    pub print_i64: u64,
    pub print_f64: u64,
}

impl RuntimeHooks {
    /// Hook addresses of the entry points linked into this process.
    pub fn linked() -> Self {
        Self {
            alloc: entry::blaze_rt_alloc as usize as u64,
            register_fixedpoint: entry::blaze_rt_register_fixedpoint as usize
                as u64,
            fixedpoint_require: entry::blaze_rt_fixedpoint_require as usize
                as u64,
            arrive_fixedpoint: entry::blaze_rt_arrive_fixedpoint as usize
                as u64,
            register_flow: entry::blaze_rt_register_flow as usize as u64,
            should_execute: entry::blaze_rt_should_execute as usize as u64,
            pause_flow: entry::blaze_rt_pause_flow as usize as u64,
            resume_flow: entry::blaze_rt_resume_flow as usize as u64,
            terminate_flow: entry::blaze_rt_terminate_flow as usize as u64,
            print_i64: entry::blaze_rt_print_i64 as usize as u64,
            print_f64: entry::blaze_rt_print_f64 as usize as u64,
        }
    }

    /// Synthetic, deterministic addresses for byte-level emitter tests
    /// (the resulting code is inspected, never executed).
    pub fn synthetic() -> Self {
        Self {
            alloc: 0x70_0000,
            register_fixedpoint: 0x70_0100,
            fixedpoint_require: 0x70_0200,
            arrive_fixedpoint: 0x70_0300,
            register_flow: 0x70_0400,
            should_execute: 0x70_0500,
            pause_flow: 0x70_0600,
            resume_flow: 0x70_0700,
            terminate_flow: 0x70_0800,
            print_i64: 0x70_0900,
            print_f64: 0x70_0A00,
        }
    }
}

/// Everything position-dependent the emitter needs to know about the
/// runtime: table addresses, default collision targets, the current-time
/// cell, and the entry-point hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeLayout {
    pub collision_table: u64,
    pub fixedpoint_table: u64,
    pub flow_table: u64,
    pub default_target: u64,
    pub default_bounce: u64,
    pub current_time: u64,
    pub hooks: RuntimeHooks,
}

impl RuntimeLayout {
    /// The conventional fixed-address layout with synthetic hooks.
    /// Deterministic, so golden-byte tests can assert exact encodings.
    pub fn fixed_convention() -> Self {
        Self {
            collision_table: COLLISION_TABLE_ADDR,
            fixedpoint_table: FIXED_POINT_TABLE_ADDR,
            flow_table: FLOW_TABLE_ADDR,
            default_target: DEFAULT_TARGET_ADDR,
            default_bounce: DEFAULT_BOUNCE_ADDR,
            current_time: 0x61_8000,
            hooks: RuntimeHooks::synthetic(),
        }
    }
}
