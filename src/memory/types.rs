//! Memory manager types
//!
//! Block records, pressure levels, and GC strategy tags shared between the
//! free list and the manager.

use serde::{Deserialize, Serialize};

use crate::process::Pid;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockState {
    Free,
    Allocated,
}

/// A contiguous range of the address space. Address space invariant:
/// allocated blocks never overlap, adjacent free blocks are coalesced
/// eagerly on deallocation, and `sum(Allocated) + sum(Free) == pool_size`
/// always.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub address: u64,
    pub size: u64,
    pub owner: Option<Pid>,
    pub state: BlockState,
}

/// Read-only view of one of a process's allocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationView {
    pub address: u64,
    pub size: u64,
}

/// Memory pressure tier, computed from `used_bytes / pool_size`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl PressureLevel {
    pub fn from_ratio(ratio: f64, warning_pct: u8, critical_pct: u8) -> Self {
        let warning = warning_pct as f64 / 100.0;
        let critical = critical_pct as f64 / 100.0;
        if ratio >= critical {
            PressureLevel::Critical
        } else if ratio >= warning {
            PressureLevel::High
        } else if ratio >= 0.60 {
            PressureLevel::Medium
        } else {
            PressureLevel::Low
        }
    }
}

/// Global GC strategy: which processes' memory is eligible for reclaim.
/// `Global` and `Unreferenced` both operate over whatever candidate set
/// (terminated/zombie pids) the caller supplies — the memory manager has
/// no visibility into process state or cross-component references, so it
/// trusts the caller to have already filtered to reclaimable pids; see
/// DESIGN.md for the reasoning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcStrategy {
    Global,
    Threshold(u64),
    Targeted(Pid),
    Unreferenced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcSummary {
    pub reclaimed_bytes: u64,
    pub blocks_reclaimed: usize,
}
