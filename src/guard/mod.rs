//! Guard framework (C6)
//!
//! Every resource C3/C4 hands out is also obtainable as a guard: an owned
//! handle whose release path runs on every exit, including error returns
//! and unwinding. A guard is always in exactly one of three states —
//! active (owns the resource), released (ownership given up voluntarily),
//! or poisoned (an operation on it failed mid-way) — tracked by
//! [`GuardMeta`]. Every guard reports `created`/`used(op)`/`dropped`/
//! `error(e)` through the collector.

mod composite;
mod ipc;
mod lock;
mod memory;
mod transaction;
mod typed;

pub use composite::{CompositeGuard, Releasable};
pub use ipc::IpcGuard;
pub use lock::{Locked, LockGuard, StatefulLock, Unlocked};
pub use memory::{MemoryGuard, SharedMemoryGuard};
pub use transaction::{Operation, TransactionGuard};
pub use typed::TypedGuard;

use std::time::Instant;

use crate::process::Pid;

/// Shared bookkeeping every guard variant carries: what kind of resource it
/// wraps, who owns it, when it was created, whether it is still active, and
/// whether a failed operation has poisoned it.
#[derive(Debug, Clone)]
pub struct GuardMeta {
    pub resource_type: &'static str,
    pub owner_pid: Pid,
    pub created_at: Instant,
    pub active: bool,
    pub poisoned: Option<String>,
}

impl GuardMeta {
    pub fn new(resource_type: &'static str, owner_pid: Pid) -> Self {
        Self {
            resource_type,
            owner_pid,
            created_at: Instant::now(),
            active: true,
            poisoned: None,
        }
    }

    pub fn mark_released(&mut self) {
        self.active = false;
    }

    pub fn mark_poisoned(&mut self, reason: impl Into<String>) {
        self.active = false;
        self.poisoned = Some(reason.into());
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }
}
