//! Top-level kernel
//!
//! The explicit root that wires the six components together and owns the
//! shared `Arc` handles each of them is built from. Nothing reaches another
//! component except through this struct or the references it hands out at
//! construction time — there is no global state anywhere in the crate.

use std::sync::Arc;

use crate::collector::{null_collector, SharedCollector};
use crate::config::KernelConfig;
use crate::error::KernelResult;
use crate::ipc::IpcManager;
use crate::memory::{GcStrategy, GcSummary, MemoryManager};
use crate::process::{CommandSpec, Pid, ProcessManager, ProcessSnapshot, ProcessState, SandboxLevel};
use crate::scheduler::{Scheduler, SchedulerPolicyKind, SchedulerStats};
use crate::syscall::{Dispatcher, SyscallRequest, SyscallResponse};

/// Owns every component and is the only path a caller has into the kernel.
pub struct Kernel {
    process: Arc<ProcessManager>,
    memory: Arc<MemoryManager>,
    ipc: Arc<IpcManager>,
    scheduler: Arc<Scheduler>,
    collector: SharedCollector,
    config: KernelConfig,
    dispatcher: Dispatcher,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        Self::with_collector(config, null_collector())
    }

    pub fn with_collector(config: KernelConfig, collector: SharedCollector) -> Self {
        let scheduler = Arc::new(Scheduler::new(SchedulerPolicyKind::default(), config.default_quantum_micros));
        let memory = Arc::new(MemoryManager::with_config(config.memory_pool_size, collector.clone(), &config));
        let ipc = Arc::new(IpcManager::with_config(config.default_ipc_capacity, collector.clone(), &config));
        let process = Arc::new(
            ProcessManager::builder()
                .with_scheduler(scheduler.clone())
                .with_memory_manager(memory.clone())
                .with_ipc_manager(ipc.clone())
                .with_collector(collector.clone())
                .build(),
        );
        let dispatcher = Dispatcher::new(
            process.clone(),
            memory.clone(),
            ipc.clone(),
            scheduler.clone(),
            collector.clone(),
            config.clone(),
        );

        Self {
            process,
            memory,
            ipc,
            scheduler,
            collector,
            config,
            dispatcher,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Spawn the init process (`Pid(1)`) at `Privileged` sandbox, the one
    /// process every other process in the tree descends from.
    pub fn boot(&self) -> KernelResult<Pid> {
        self.process.create("init", 0, SandboxLevel::Privileged, None, None::<CommandSpec>)
    }

    pub fn create_process(
        &self,
        name: impl Into<String>,
        priority: u8,
        sandbox_level: SandboxLevel,
        parent: Option<Pid>,
        command: Option<CommandSpec>,
    ) -> KernelResult<Pid> {
        self.process.create(name, priority, sandbox_level, parent, command)
    }

    pub fn terminate_process(&self, pid: Pid) -> KernelResult<()> {
        self.process.terminate(pid)
    }

    pub fn process_snapshot(&self, pid: Pid) -> Option<ProcessSnapshot> {
        self.process.get(pid)
    }

    pub fn list_processes(&self) -> Vec<ProcessSnapshot> {
        self.process.list()
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Dispatch one syscall through the full permission-checked path.
    pub async fn dispatch(&self, request: SyscallRequest) -> SyscallResponse {
        self.dispatcher.dispatch(request).await
    }

    /// Run a GC pass over every process the spec's lifecycle marks as
    /// reclaimable (`Zombie`/`Terminated`), matching the memory manager's
    /// `collect` contract of taking an explicit candidate list rather than
    /// walking the process table itself.
    pub fn collect_garbage(&self, strategy: GcStrategy) -> GcSummary {
        let candidates: Vec<Pid> = self
            .process
            .list()
            .into_iter()
            .filter(|snapshot| matches!(snapshot.state, ProcessState::Zombie | ProcessState::Terminated))
            .map(|snapshot| snapshot.pid)
            .collect();
        self.memory.collect(strategy, &candidates)
    }

    pub fn should_auto_collect(&self) -> bool {
        self.memory.should_auto_collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::SyscallVariant;

    fn test_kernel() -> Kernel {
        Kernel::new(KernelConfig::default())
    }

    #[test]
    fn boot_creates_privileged_init_process() {
        let kernel = test_kernel();
        let pid = kernel.boot().unwrap();
        let snapshot = kernel.process_snapshot(pid).unwrap();
        assert_eq!(snapshot.sandbox_level, SandboxLevel::Privileged);
    }

    #[tokio::test]
    async fn dispatch_allocates_memory_for_a_booted_process() {
        let kernel = test_kernel();
        let pid = kernel.boot().unwrap();
        let response = kernel
            .dispatch(SyscallRequest::new(pid, SyscallVariant::Allocate { size: 4096 }))
            .await;
        assert!(matches!(response, SyscallResponse::Success { .. }));
    }

    #[tokio::test]
    async fn dispatch_denies_privileged_syscall_at_minimal_sandbox() {
        let kernel = test_kernel();
        let pid = kernel.create_process("child", 1, SandboxLevel::Minimal, None, None).unwrap();
        let response = kernel
            .dispatch(SyscallRequest::new(
                pid,
                SyscallVariant::TerminateProcess { target: pid },
            ))
            .await;
        assert!(matches!(response, SyscallResponse::PermissionDenied { .. }));
    }

    #[test]
    fn collect_garbage_only_considers_terminated_processes() {
        let kernel = test_kernel();
        let pid = kernel.create_process("worker", 1, SandboxLevel::Standard, None, None).unwrap();
        kernel.terminate_process(pid).unwrap();
        let summary = kernel.collect_garbage(GcStrategy::Global);
        assert_eq!(summary.reclaimed_bytes, 0);
    }
}
