//! Scheduler types
//!
//! Small, Copy-able records shared between the policy-dispatch logic in
//! `mod.rs` and external callers inspecting scheduler state.

use serde::{Deserialize, Serialize};

use crate::process::Pid;

/// Scheduling policy tag. Pattern-matched over rather than dispatched
/// through a trait object — there is no inheritance here, just three small
/// variants of the same `add`/`remove`/`next`/`on_tick` interface.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPolicyKind {
    RoundRobin,
    Priority,
    Fair,
}

impl Default for SchedulerPolicyKind {
    fn default() -> Self {
        SchedulerPolicyKind::RoundRobin
    }
}

/// Per-process scheduling bookkeeping.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerRecord {
    pub pid: Pid,
    pub priority: u8,
    /// Only meaningful under the `Fair` policy.
    pub vruntime: u64,
    pub quantum_remaining_micros: u64,
}

/// Snapshot of scheduler-wide counters and configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub total_scheduled: u64,
    pub context_switches: u64,
    pub preemptions: u64,
    pub active_processes: usize,
    pub policy: SchedulerPolicyKind,
    pub quantum_micros: u64,
}

/// `vruntime` weight for a given static priority: `1 << priority`, per the
/// fair policy's definition. Priority is clamped to `[0, 10]` upstream so
/// this never overflows a `u32`.
pub fn fair_weight(priority: u8) -> u64 {
    1u64 << priority.min(20)
}
