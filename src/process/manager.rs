//! Process manager (C1)
//!
//! Authoritative registry of processes and their owned resources; the only
//! component allowed to transition a process's state. The table is a
//! `DashMap` sharded by pid, matching the "lock-free sharded map" the
//! concurrency model calls for; each entry is additionally guarded by its
//! own `RwLock` so readers (`get`/`list`) never block each other.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::collector::{KernelEvent, SharedCollector};
use crate::error::{KernelError, KernelResult};
use crate::ipc::IpcManager;
use crate::memory::MemoryManager;
use crate::scheduler::Scheduler;

use super::types::{CommandSpec, OwnedResource, Process, ProcessSnapshot, ProcessState, ResourceKind, SandboxLevel};
pub use super::types::Pid;

/// Number of shards targeted for the process table, per the concurrency
/// model's sharded-map requirement.
const PROCESS_TABLE_SHARDS: usize = 128;

/// Builder for [`ProcessManager`], mirroring the dependency-injection style
/// used to wire the memory manager, IPC manager, scheduler, and collector
/// together before any process exists.
pub struct ProcessManagerBuilder {
    scheduler: Option<Arc<Scheduler>>,
    memory: Option<Arc<MemoryManager>>,
    ipc: Option<Arc<IpcManager>>,
    collector: Option<SharedCollector>,
}

impl ProcessManagerBuilder {
    pub fn new() -> Self {
        Self {
            scheduler: None,
            memory: None,
            ipc: None,
            collector: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_memory_manager(mut self, memory: Arc<MemoryManager>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_ipc_manager(mut self, ipc: Arc<IpcManager>) -> Self {
        self.ipc = Some(ipc);
        self
    }

    pub fn with_collector(mut self, collector: SharedCollector) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn build(self) -> ProcessManager {
        ProcessManager {
            table: DashMap::with_shard_amount(PROCESS_TABLE_SHARDS),
            next_pid: AtomicU32::new(Pid::INIT.as_u32()),
            scheduler: self.scheduler.expect("scheduler required"),
            memory: self.memory.expect("memory manager required"),
            ipc: self.ipc.expect("ipc manager required"),
            collector: self.collector.unwrap_or_else(crate::collector::null_collector),
            foreground: RwLock::new(None),
        }
    }
}

impl Default for ProcessManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ProcessManager {
    table: DashMap<Pid, RwLock<Process>>,
    next_pid: AtomicU32,
    scheduler: Arc<Scheduler>,
    memory: Arc<MemoryManager>,
    ipc: Arc<IpcManager>,
    collector: SharedCollector,
    foreground: RwLock<Option<Pid>>,
}

impl ProcessManager {
    pub fn builder() -> ProcessManagerBuilder {
        ProcessManagerBuilder::new()
    }

    /// Allocate the next pid, skipping ids still present in the table.
    /// Wraps around `u32::MAX`; fails if the entire pid space is occupied.
    fn allocate_pid(&self) -> KernelResult<Pid> {
        let start = self.next_pid.load(Ordering::Relaxed);
        let mut candidate = start;
        loop {
            let pid = Pid(candidate.max(1));
            if !self.table.contains_key(&pid) {
                let next = candidate.wrapping_add(1).max(1);
                self.next_pid.store(next, Ordering::Relaxed);
                return Ok(pid);
            }
            candidate = candidate.wrapping_add(1).max(1);
            if candidate == start {
                return Err(KernelError::ProcessLimitExceeded);
            }
        }
    }

    /// Create a process. Allocates a pid, registers a `Creating` record,
    /// runs the lifecycle initializer, transitions to `Ready`, and
    /// registers with the scheduler.
    pub fn create(
        &self,
        name: impl Into<String>,
        priority: u8,
        sandbox_level: SandboxLevel,
        parent: Option<Pid>,
        _command: Option<CommandSpec>,
    ) -> KernelResult<Pid> {
        let pid = self.allocate_pid()?;
        let process = Process::new(pid, name.into(), priority, sandbox_level, parent);
        self.table.insert(pid, RwLock::new(process));

        if let Some(parent_pid) = parent {
            if let Some(entry) = self.table.get(&parent_pid) {
                entry.write().children.insert(pid);
            }
        }

        // Lifecycle initializer: nothing mandatory beyond bookkeeping today;
        // starter resources (if any) are allocated by the caller through the
        // syscall dispatcher so ownership is recorded uniformly.
        self.transition(pid, ProcessState::Ready)?;
        self.scheduler.add(pid, priority);

        self.collector.emit(KernelEvent::ProcessCreated { pid });
        Ok(pid)
    }

    /// Transition `pid` to `next`, enforcing the state machine.
    pub fn transition(&self, pid: Pid, next: ProcessState) -> KernelResult<()> {
        let entry = self.table.get(&pid).ok_or(KernelError::NoSuchProcess(pid))?;
        let mut process = entry.write();
        if process.state == next {
            return Ok(());
        }
        if !process.state.can_transition_to(next) {
            return Err(KernelError::Internal(format!(
                "illegal transition {:?} -> {:?} for pid {}",
                process.state, next, pid
            )));
        }
        process.state = next;
        Ok(())
    }

    /// Terminate a process: idempotent, releases every owned resource in
    /// LIFO order, and never aborts cleanup partway through a bad release.
    pub fn terminate(&self, pid: Pid) -> KernelResult<()> {
        let Some(entry) = self.table.get(&pid) else {
            return Err(KernelError::NoSuchProcess(pid));
        };

        {
            let mut process = entry.write();
            if process.state == ProcessState::Terminated {
                return Ok(());
            }
            process.state = ProcessState::Zombie;
        }

        self.scheduler.remove(pid);

        let resources: Vec<OwnedResource> = {
            let process = entry.read();
            process.owned_resources.clone()
        };

        for resource in resources.into_iter().rev() {
            let result = match resource.kind {
                ResourceKind::Memory => self.memory.deallocate(pid, resource.id).map(|_| ()),
                ResourceKind::Pipe | ResourceKind::SharedMemory | ResourceKind::Queue | ResourceKind::FileDescriptor => {
                    self.ipc.release_owned(pid, resource.kind, resource.id)
                }
            };
            if let Err(err) = result {
                self.collector.emit(KernelEvent::ResourceReleaseFailed {
                    pid,
                    reason: err.to_string(),
                });
            }
        }

        {
            let mut process = entry.write();
            process.owned_resources.clear();
        }

        self.collector.emit(KernelEvent::ProcessTerminated { pid });

        let mut process = entry.write();
        process.state = ProcessState::Terminated;
        Ok(())
    }

    pub fn get(&self, pid: Pid) -> Option<ProcessSnapshot> {
        self.table.get(&pid).map(|entry| entry.read().snapshot())
    }

    pub fn list(&self) -> Vec<ProcessSnapshot> {
        self.table.iter().map(|entry| entry.value().read().snapshot()).collect()
    }

    /// Set the foreground process, clearing the previous one's flag. A
    /// metadata-only concept; the scheduler is not consulted.
    pub fn focus(&self, pid: Pid) -> KernelResult<()> {
        let entry = self.table.get(&pid).ok_or(KernelError::NoSuchProcess(pid))?;
        let mut previous = self.foreground.write();
        if let Some(prev_pid) = *previous {
            if let Some(prev_entry) = self.table.get(&prev_pid) {
                prev_entry.write().focused = false;
            }
        }
        entry.write().focused = true;
        *previous = Some(pid);
        Ok(())
    }

    pub fn foreground(&self) -> Option<Pid> {
        *self.foreground.read()
    }

    /// Record that `pid` now owns `resource`. Called by the syscall
    /// dispatcher after a successful acquisition in C3/C4.
    pub fn record_resource(&self, pid: Pid, kind: ResourceKind, id: u64) -> KernelResult<()> {
        let entry = self.table.get(&pid).ok_or(KernelError::NoSuchProcess(pid))?;
        entry.write().owned_resources.push(OwnedResource { kind, id });
        Ok(())
    }

    /// Forget a resource a process released voluntarily (not via
    /// termination). No-op if the resource was never recorded.
    pub fn forget_resource(&self, pid: Pid, kind: ResourceKind, id: u64) -> KernelResult<()> {
        let entry = self.table.get(&pid).ok_or(KernelError::NoSuchProcess(pid))?;
        entry
            .write()
            .owned_resources
            .retain(|r| !(r.kind == kind && r.id == id));
        Ok(())
    }

    pub fn sandbox_level(&self, pid: Pid) -> KernelResult<SandboxLevel> {
        self.table
            .get(&pid)
            .map(|e| e.read().sandbox_level)
            .ok_or(KernelError::NoSuchProcess(pid))
    }

    pub fn exists(&self, pid: Pid) -> bool {
        self.table.contains_key(&pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::null_collector;
    use crate::ipc::IpcManager;
    use crate::memory::MemoryManager;
    use crate::scheduler::{Scheduler, SchedulerPolicyKind};

    fn manager() -> ProcessManager {
        let scheduler = Arc::new(Scheduler::new(SchedulerPolicyKind::RoundRobin, 10_000));
        let memory = Arc::new(MemoryManager::new(1 << 20, null_collector()));
        let ipc = Arc::new(IpcManager::new(64 * 1024, null_collector()));
        ProcessManager::builder()
            .with_scheduler(scheduler)
            .with_memory_manager(memory)
            .with_ipc_manager(ipc)
            .with_collector(null_collector())
            .build()
    }

    #[test]
    fn create_transitions_to_ready_and_registers_with_scheduler() {
        let pm = manager();
        let pid = pm.create("demo", 5, SandboxLevel::Standard, None, None).unwrap();
        let snap = pm.get(pid).unwrap();
        assert_eq!(snap.state, ProcessState::Ready);
    }

    #[test]
    fn terminate_is_idempotent() {
        let pm = manager();
        let pid = pm.create("demo", 5, SandboxLevel::Standard, None, None).unwrap();
        pm.terminate(pid).unwrap();
        assert_eq!(pm.get(pid).unwrap().state, ProcessState::Terminated);
        pm.terminate(pid).unwrap();
        assert_eq!(pm.get(pid).unwrap().state, ProcessState::Terminated);
    }

    #[test]
    fn terminate_unknown_process_errors() {
        let pm = manager();
        assert!(matches!(pm.terminate(Pid(999)), Err(KernelError::NoSuchProcess(_))));
    }

    #[test]
    fn focus_moves_flag_between_processes() {
        let pm = manager();
        let a = pm.create("a", 1, SandboxLevel::Standard, None, None).unwrap();
        let b = pm.create("b", 1, SandboxLevel::Standard, None, None).unwrap();
        pm.focus(a).unwrap();
        assert!(pm.get(a).unwrap().focused);
        pm.focus(b).unwrap();
        assert!(!pm.get(a).unwrap().focused);
        assert!(pm.get(b).unwrap().focused);
    }

    #[test]
    fn pid_allocation_skips_live_ids() {
        let pm = manager();
        let a = pm.create("a", 1, SandboxLevel::Standard, None, None).unwrap();
        let b = pm.create("b", 1, SandboxLevel::Standard, None, None).unwrap();
        assert_ne!(a, b);
    }
}
