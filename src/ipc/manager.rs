//! IPC manager (C4)
//!
//! Aggregates the three IPC primitives behind one surface so the syscall
//! dispatcher and the process manager each have a single handle. Resource
//! ownership invariant: every pipe, segment, and queue has exactly one
//! owner pid; `release_owned` is what the process manager calls during
//! termination to tear one down.

use crate::collector::{KernelEvent, SharedCollector};
use crate::config::KernelConfig;
use crate::error::KernelResult;
use crate::process::{OwnedResource, Pid, ResourceKind};

use super::pipe::{PipeId, PipeManager};
use super::queue::{Message, QueueId, QueueKind, QueueManager};
use super::shm::{ShmId, ShmManager};

pub struct IpcManager {
    pipes: PipeManager,
    shm: ShmManager,
    queues: QueueManager,
    collector: SharedCollector,
}

impl IpcManager {
    pub fn new(default_capacity: usize, collector: SharedCollector) -> Self {
        Self::with_config(default_capacity, collector, &KernelConfig::default())
    }

    pub fn with_config(default_capacity: usize, collector: SharedCollector, _config: &KernelConfig) -> Self {
        Self {
            pipes: PipeManager::new(default_capacity),
            shm: ShmManager::new(),
            queues: QueueManager::new(default_capacity),
            collector,
        }
    }

    // -- pipes ---------------------------------------------------------

    pub fn create_pipe(&self, owner: Pid, reader: Pid, writer: Pid, capacity: Option<usize>) -> PipeId {
        let id = self.pipes.create(owner, reader, writer, capacity);
        self.collector.emit(KernelEvent::IpcResourceCreated {
            owner,
            kind: "pipe",
            id,
        });
        id
    }

    pub fn write_pipe(&self, pid: Pid, id: PipeId, data: &[u8]) -> KernelResult<usize> {
        self.pipes.write(pid, id, data)
    }

    pub fn read_pipe(&self, pid: Pid, id: PipeId, max: usize) -> KernelResult<Vec<u8>> {
        self.pipes.read(pid, id, max)
    }

    pub fn close_pipe(&self, pid: Pid, id: PipeId) -> KernelResult<()> {
        self.pipes.close(pid, id)
    }

    // -- shared memory ---------------------------------------------------

    pub fn create_shm(&self, owner: Pid, size: usize) -> ShmId {
        let id = self.shm.create(owner, size);
        self.collector.emit(KernelEvent::IpcResourceCreated {
            owner,
            kind: "shared_memory",
            id,
        });
        id
    }

    pub fn attach_shm(&self, pid: Pid, id: ShmId, read_only: bool) -> KernelResult<()> {
        self.shm.attach(pid, id, read_only)
    }

    pub fn detach_shm(&self, pid: Pid, id: ShmId) -> KernelResult<()> {
        self.shm.detach(pid, id)
    }

    pub fn write_shm(&self, pid: Pid, id: ShmId, offset: usize, data: &[u8]) -> KernelResult<()> {
        self.shm.write(pid, id, offset, data)
    }

    pub fn read_shm(&self, pid: Pid, id: ShmId, offset: usize, len: usize) -> KernelResult<Vec<u8>> {
        self.shm.read(pid, id, offset, len)
    }

    // -- queues ----------------------------------------------------------

    pub fn create_queue(&self, owner: Pid, kind: QueueKind, capacity: Option<usize>) -> QueueId {
        let id = self.queues.create(owner, kind, capacity);
        self.collector.emit(KernelEvent::IpcResourceCreated {
            owner,
            kind: "queue",
            id,
        });
        id
    }

    pub fn subscribe_queue(&self, pid: Pid, id: QueueId) -> KernelResult<()> {
        self.queues.subscribe(pid, id)
    }

    pub fn unsubscribe_queue(&self, pid: Pid, id: QueueId) -> KernelResult<()> {
        self.queues.unsubscribe(pid, id)
    }

    pub fn send_queue(&self, pid: Pid, id: QueueId, data: Vec<u8>, priority: u8) -> KernelResult<u64> {
        self.queues.send(pid, id, data, priority)
    }

    pub fn receive_queue(&self, pid: Pid, id: QueueId) -> KernelResult<Option<Message>> {
        self.queues.receive(pid, id)
    }

    pub fn queue_kind(&self, id: QueueId) -> Option<QueueKind> {
        self.queues.kind(id)
    }

    // -- termination hook --------------------------------------------------

    /// Tear down one owned resource. Called by the process manager during
    /// termination, in the LIFO order its owned-resource list records.
    /// Unknown ids are tolerated (best-effort cleanup, matching
    /// `ProcessManager::terminate`'s partial-failure tolerance).
    pub fn release_owned(&self, _pid: Pid, kind: ResourceKind, id: u64) -> KernelResult<()> {
        let label = match kind {
            ResourceKind::Pipe => {
                self.pipes.destroy(id);
                "pipe"
            }
            ResourceKind::SharedMemory => {
                self.shm.destroy(id);
                "shared_memory"
            }
            ResourceKind::Queue => {
                self.queues.destroy(id);
                "queue"
            }
            ResourceKind::Memory | ResourceKind::FileDescriptor => return Ok(()),
        };
        self.collector.emit(KernelEvent::IpcResourceDestroyed { kind: label, id });
        Ok(())
    }

    pub fn resource_record(kind: ResourceKind, id: u64) -> OwnedResource {
        OwnedResource { kind, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::null_collector;

    fn manager() -> IpcManager {
        IpcManager::new(64 * 1024, null_collector())
    }

    #[test]
    fn release_owned_pipe_makes_it_resource_gone() {
        let ipc = manager();
        let id = ipc.create_pipe(Pid(1), Pid(1), Pid(1), None);
        ipc.write_pipe(Pid(1), id, b"x").unwrap();
        ipc.release_owned(Pid(1), ResourceKind::Pipe, id).unwrap();
        assert!(ipc.write_pipe(Pid(1), id, b"x").is_err());
    }

    #[test]
    fn release_owned_queue_makes_it_resource_gone() {
        let ipc = manager();
        let id = ipc.create_queue(Pid(1), QueueKind::Fifo, None);
        ipc.release_owned(Pid(1), ResourceKind::Queue, id).unwrap();
        assert!(ipc.send_queue(Pid(1), id, b"x".to_vec(), 0).is_err());
    }

    #[test]
    fn release_owned_unknown_resource_is_tolerated() {
        let ipc = manager();
        assert!(ipc.release_owned(Pid(1), ResourceKind::Pipe, 999).is_ok());
    }
}
