//! Event collector
//!
//! The spec treats the observability sink as an opaque external collaborator
//! the core relies on as a contract, not an implementation. [`Collector`] is
//! that contract: every subsystem that "emits an event" calls through it.

use std::fmt;
use std::sync::Arc;

use crate::process::Pid;

/// A single kernel lifecycle/pressure/guard event.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelEvent {
    ProcessCreated { pid: Pid },
    ProcessTerminated { pid: Pid },
    MemoryAllocated { pid: Pid, address: u64, size: u64 },
    MemoryDeallocated { pid: Pid, address: u64, size: u64 },
    MemoryPressureHigh { used_ratio: f64 },
    MemoryPressureCritical { used_ratio: f64 },
    GcCompleted { reclaimed_bytes: u64, blocks: usize },
    GuardCreated { resource_type: &'static str, owner: Pid },
    GuardUsed { resource_type: &'static str, owner: Pid, op: &'static str },
    GuardDropped { resource_type: &'static str, owner: Pid },
    GuardError { resource_type: &'static str, owner: Pid, reason: String },
    ResourceReleaseFailed { pid: Pid, reason: String },
    IpcResourceCreated { owner: Pid, kind: &'static str, id: u64 },
    IpcResourceDestroyed { kind: &'static str, id: u64 },
}

impl fmt::Display for KernelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Sink for kernel events. Implementations must be cheap to call from hot
/// paths (allocation, IPC send) — no blocking I/O.
pub trait Collector: Send + Sync {
    fn emit(&self, event: KernelEvent);
}

/// Forwards every event through the `log` facade at a level appropriate to
/// its severity. The default collector for a running kernel.
#[derive(Debug, Default)]
pub struct LoggingCollector;

impl Collector for LoggingCollector {
    fn emit(&self, event: KernelEvent) {
        match &event {
            KernelEvent::MemoryPressureCritical { .. } | KernelEvent::GuardError { .. } => {
                log::error!("{}", event);
            }
            KernelEvent::MemoryPressureHigh { .. } | KernelEvent::ResourceReleaseFailed { .. } => {
                log::warn!("{}", event);
            }
            _ => log::info!("{}", event),
        }
    }
}

/// Discards every event. Useful in tests that don't want log noise.
#[derive(Debug, Default)]
pub struct NullCollector;

impl Collector for NullCollector {
    fn emit(&self, _event: KernelEvent) {}
}

pub type SharedCollector = Arc<dyn Collector>;

/// Convenience constructor for the default collector, boxed behind `Arc`.
pub fn logging_collector() -> SharedCollector {
    Arc::new(LoggingCollector)
}

pub fn null_collector() -> SharedCollector {
    Arc::new(NullCollector)
}
