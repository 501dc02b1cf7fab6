//! IPC guard
//!
//! Owns a pipe, shared-memory segment, or queue; invokes the matching
//! destroy call on the IPC manager when dropped.

use std::sync::Arc;

use crate::collector::{KernelEvent, SharedCollector};
use crate::ipc::IpcManager;
use crate::process::{Pid, ResourceKind};

use super::composite::Releasable;
use super::GuardMeta;

pub struct IpcGuard {
    meta: GuardMeta,
    ipc: Arc<IpcManager>,
    kind: ResourceKind,
    id: u64,
    collector: SharedCollector,
}

impl IpcGuard {
    pub fn new(ipc: Arc<IpcManager>, owner: Pid, kind: ResourceKind, id: u64, collector: SharedCollector) -> Self {
        let resource_type = resource_type_label(kind);
        collector.emit(KernelEvent::GuardCreated { resource_type, owner });
        Self {
            meta: GuardMeta::new(resource_type, owner),
            ipc,
            kind,
            id,
            collector,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Give up ownership without destroying the resource.
    pub fn release(mut self) -> u64 {
        self.meta.mark_released();
        self.id
    }

    fn teardown(&mut self) {
        if !self.meta.active {
            return;
        }
        self.meta.active = false;
        match self.ipc.release_owned(self.meta.owner_pid, self.kind, self.id) {
            Ok(()) => self.collector.emit(KernelEvent::GuardDropped {
                resource_type: self.meta.resource_type,
                owner: self.meta.owner_pid,
            }),
            Err(err) => {
                self.meta.mark_poisoned(err.to_string());
                self.collector.emit(KernelEvent::GuardError {
                    resource_type: self.meta.resource_type,
                    owner: self.meta.owner_pid,
                    reason: err.to_string(),
                });
            }
        }
    }
}

impl Drop for IpcGuard {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Releasable for IpcGuard {
    fn release_boxed(self: Box<Self>) {
        drop(self);
    }
}

fn resource_type_label(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Pipe => "pipe",
        ResourceKind::SharedMemory => "shared_memory",
        ResourceKind::Queue => "queue",
        ResourceKind::Memory => "memory",
        ResourceKind::FileDescriptor => "file_descriptor",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::null_collector;

    #[test]
    fn drop_destroys_the_underlying_pipe() {
        let ipc = Arc::new(IpcManager::new(1024, null_collector()));
        let id = ipc.create_pipe(Pid(1), Pid(1), Pid(1), None);
        {
            let _guard = IpcGuard::new(ipc.clone(), Pid(1), ResourceKind::Pipe, id, null_collector());
        }
        assert!(ipc.write_pipe(Pid(1), id, b"x").is_err());
    }

    #[test]
    fn release_keeps_the_resource_alive() {
        let ipc = Arc::new(IpcManager::new(1024, null_collector()));
        let id = ipc.create_pipe(Pid(1), Pid(1), Pid(1), None);
        let guard = IpcGuard::new(ipc.clone(), Pid(1), ResourceKind::Pipe, id, null_collector());
        guard.release();
        assert!(ipc.write_pipe(Pid(1), id, b"x").is_ok());
    }
}
