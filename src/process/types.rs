//! Process types
//!
//! Core value types for process management: identifiers, sandbox levels,
//! lifecycle states, and the process record itself.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Kernel-assigned process identifier. Unique for the lifetime of the
/// kernel process; 32-bit, allocated monotonically with wraparound.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pid(pub u32);

impl Pid {
    pub const INIT: Pid = Pid(1);

    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A capability tier determining which syscall families a process may
/// invoke. Bit-exact with the spec's sandbox table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxLevel {
    Minimal,
    Standard,
    Privileged,
}

/// Process lifecycle state.
///
/// State machine: `Creating -> Ready -> Running <-> Blocked -> Zombie ->
/// Terminated`. Only `Ready<->Running`, `Running->Blocked`, and
/// `Blocked->Ready` are driven by the scheduler; every other transition is
/// initiated by the process manager.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Creating,
    Ready,
    Running,
    Blocked,
    Zombie,
    Terminated,
}

impl ProcessState {
    /// Whether a process in this state belongs in the scheduler's runqueue.
    ///
    /// Invariant I-1: a non-terminated process appears in exactly one
    /// scheduler structure iff its state is `Ready` or `Running`.
    pub fn schedulable(self) -> bool {
        matches!(self, ProcessState::Ready | ProcessState::Running)
    }

    /// Validate a transition against the state machine. `true` if `next`
    /// may legally follow `self`.
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Creating, Ready)
                | (Ready, Running)
                | (Running, Ready)
                | (Running, Blocked)
                | (Blocked, Ready)
                | (Running, Zombie)
                | (Ready, Zombie)
                | (Blocked, Zombie)
                | (Zombie, Terminated)
                // Idempotent terminate: terminating a terminated process is a no-op,
                // not a state change, but callers may still probe this predicate.
                | (Terminated, Terminated)
        )
    }
}

/// The kinds of resource a process may own; used to tag entries in a
/// process's owned-resource set so termination can release each by kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Memory,
    Pipe,
    SharedMemory,
    Queue,
    FileDescriptor,
}

/// A single entry in a process's owned-resource set. Order of insertion is
/// preserved by the owning `Vec` in [`Process`] so termination can release
/// resources in LIFO order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedResource {
    pub kind: ResourceKind,
    pub id: u64,
}

/// Optional command spec used when the process manager is asked to launch
/// a real child process alongside the simulated record (best-effort; the
/// simulated process is authoritative regardless of host-OS child status).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandSpec {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// The process record. One per pid, owned by the process manager's table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub pid: Pid,
    pub name: String,
    pub priority: u8,
    pub sandbox_level: SandboxLevel,
    pub state: ProcessState,
    pub os_pid: Option<u32>,
    pub parent: Option<Pid>,
    pub children: HashSet<Pid>,
    pub owned_resources: Vec<OwnedResource>,
    pub created_at_micros: u64,
    pub focused: bool,
}

impl Process {
    pub fn new(pid: Pid, name: String, priority: u8, sandbox_level: SandboxLevel, parent: Option<Pid>) -> Self {
        Self {
            pid,
            name,
            priority: priority.min(10),
            sandbox_level,
            state: ProcessState::Creating,
            os_pid: None,
            parent,
            children: HashSet::new(),
            owned_resources: Vec::new(),
            created_at_micros: now_micros(),
            focused: false,
        }
    }

    pub fn snapshot(&self) -> ProcessSnapshot {
        ProcessSnapshot {
            pid: self.pid,
            name: self.name.clone(),
            state: self.state,
            priority: self.priority,
            sandbox_level: self.sandbox_level,
            resource_count: self.owned_resources.len(),
            focused: self.focused,
        }
    }
}

/// Cheap, clonable read view of a [`Process`]; what `get`/`list` return so
/// callers never observe a lock held across a syscall boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: Pid,
    pub name: String,
    pub state: ProcessState,
    pub priority: u8,
    pub sandbox_level: SandboxLevel,
    pub resource_count: usize,
    pub focused: bool,
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_rejects_illegal_transitions() {
        assert!(ProcessState::Creating.can_transition_to(ProcessState::Ready));
        assert!(!ProcessState::Creating.can_transition_to(ProcessState::Running));
        assert!(!ProcessState::Terminated.can_transition_to(ProcessState::Ready));
    }

    #[test]
    fn only_ready_and_running_are_schedulable() {
        assert!(ProcessState::Ready.schedulable());
        assert!(ProcessState::Running.schedulable());
        assert!(!ProcessState::Blocked.schedulable());
        assert!(!ProcessState::Zombie.schedulable());
    }
}
