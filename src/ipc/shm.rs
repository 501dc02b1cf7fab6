//! Shared memory segments
//!
//! A segment is a flat byte buffer owned by one process and attached by any
//! number of others, each with its own read-only/read-write attachment mode.
//! Unlike pipes and queues there is no flow control here: reads and writes
//! are plain offset/length slices into the segment.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::{KernelError, KernelResult};
use crate::process::Pid;

pub type ShmId = u64;

struct Segment {
    owner: Pid,
    data: RwLock<Vec<u8>>,
    attachments: RwLock<HashMap<Pid, bool>>,
}

pub struct ShmManager {
    segments: RwLock<HashMap<ShmId, Segment>>,
    next_id: AtomicU64,
}

impl ShmManager {
    pub fn new() -> Self {
        Self {
            segments: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn create(&self, owner: Pid, size: usize) -> ShmId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut attachments = HashMap::new();
        attachments.insert(owner, false);
        self.segments.write().insert(
            id,
            Segment {
                owner,
                data: RwLock::new(vec![0u8; size]),
                attachments: RwLock::new(attachments),
            },
        );
        id
    }

    pub fn attach(&self, pid: Pid, id: ShmId, read_only: bool) -> KernelResult<()> {
        let segments = self.segments.read();
        let segment = segments.get(&id).ok_or(KernelError::ResourceGone)?;
        segment.attachments.write().insert(pid, read_only);
        Ok(())
    }

    pub fn detach(&self, pid: Pid, id: ShmId) -> KernelResult<()> {
        let segments = self.segments.read();
        let segment = segments.get(&id).ok_or(KernelError::ResourceGone)?;
        segment.attachments.write().remove(&pid);
        Ok(())
    }

    pub fn write(&self, pid: Pid, id: ShmId, offset: usize, data: &[u8]) -> KernelResult<()> {
        let segments = self.segments.read();
        let segment = segments.get(&id).ok_or(KernelError::ResourceGone)?;
        let read_only = *segment
            .attachments
            .read()
            .get(&pid)
            .ok_or(KernelError::NotAttached)?;
        if read_only {
            return Err(KernelError::PermissionDenied {
                reason: "segment attached read-only".into(),
            });
        }
        let mut buf = segment.data.write();
        let end = offset
            .checked_add(data.len())
            .ok_or_else(|| KernelError::InvalidArgument("offset overflow".into()))?;
        if end > buf.len() {
            return Err(KernelError::InvalidArgument("write exceeds segment bounds".into()));
        }
        buf[offset..end].copy_from_slice(data);
        Ok(())
    }

    pub fn read(&self, pid: Pid, id: ShmId, offset: usize, len: usize) -> KernelResult<Vec<u8>> {
        let segments = self.segments.read();
        let segment = segments.get(&id).ok_or(KernelError::ResourceGone)?;
        if !segment.attachments.read().contains_key(&pid) {
            return Err(KernelError::NotAttached);
        }
        let buf = segment.data.read();
        let end = offset
            .checked_add(len)
            .ok_or_else(|| KernelError::InvalidArgument("offset overflow".into()))?;
        if end > buf.len() {
            return Err(KernelError::InvalidArgument("read exceeds segment bounds".into()));
        }
        Ok(buf[offset..end].to_vec())
    }

    pub fn owner(&self, id: ShmId) -> Option<Pid> {
        self.segments.read().get(&id).map(|s| s.owner)
    }

    /// Destroy the segment outright; every attached pid will observe
    /// `ResourceGone` on its next operation.
    pub fn destroy(&self, id: ShmId) {
        self.segments.write().remove(&id);
    }
}

impl Default for ShmManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let shm = ShmManager::new();
        let id = shm.create(Pid(1), 16);
        shm.write(Pid(1), id, 0, b"hello").unwrap();
        assert_eq!(shm.read(Pid(1), id, 0, 5).unwrap(), b"hello");
    }

    #[test]
    fn read_only_attachment_rejects_write() {
        let shm = ShmManager::new();
        let id = shm.create(Pid(1), 16);
        shm.attach(Pid(2), id, true).unwrap();
        assert!(shm.write(Pid(2), id, 0, b"x").is_err());
        shm.write(Pid(1), id, 0, b"x").unwrap();
        assert_eq!(shm.read(Pid(2), id, 0, 1).unwrap(), b"x");
    }

    #[test]
    fn unattached_pid_cannot_read_or_write() {
        let shm = ShmManager::new();
        let id = shm.create(Pid(1), 16);
        assert!(matches!(shm.read(Pid(9), id, 0, 1), Err(KernelError::NotAttached)));
    }

    #[test]
    fn out_of_bounds_access_is_invalid_argument() {
        let shm = ShmManager::new();
        let id = shm.create(Pid(1), 4);
        assert!(shm.write(Pid(1), id, 2, b"abc").is_err());
    }

    #[test]
    fn destroyed_segment_is_resource_gone() {
        let shm = ShmManager::new();
        let id = shm.create(Pid(1), 4);
        shm.destroy(id);
        assert!(matches!(shm.read(Pid(1), id, 0, 1), Err(KernelError::ResourceGone)));
    }
}
