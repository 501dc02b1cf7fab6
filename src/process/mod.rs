//! Process manager (C1)
//!
//! Authoritative registry of processes: lifecycle states, sandbox levels,
//! and the parent/child tree. See `manager.rs` for the table implementation
//! and `types.rs` for the value types.

mod manager;
mod types;

pub use manager::{ProcessManager, ProcessManagerBuilder};
pub use types::{
    CommandSpec, OwnedResource, Pid, Process, ProcessSnapshot, ProcessState, ResourceKind, SandboxLevel,
};
