//! Pipes
//!
//! Bounded, single-reader/single-writer byte FIFO. Every operation is
//! non-blocking: writes to a full pipe return a short count rather than
//! waiting, and reads from an empty pipe return zero bytes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{KernelError, KernelResult};
use crate::process::Pid;

pub type PipeId = u64;

struct Pipe {
    owner: Pid,
    reader_pid: Pid,
    writer_pid: Pid,
    capacity: usize,
    buffer: VecDeque<u8>,
    closed: bool,
}

pub struct PipeManager {
    pipes: Mutex<HashMap<PipeId, Pipe>>,
    next_id: AtomicU64,
    default_capacity: usize,
}

impl PipeManager {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            pipes: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            default_capacity,
        }
    }

    pub fn create(&self, owner: Pid, reader_pid: Pid, writer_pid: Pid, capacity: Option<usize>) -> PipeId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pipes.lock().insert(
            id,
            Pipe {
                owner,
                reader_pid,
                writer_pid,
                capacity: capacity.unwrap_or(self.default_capacity),
                buffer: VecDeque::new(),
                closed: false,
            },
        );
        id
    }

    /// Write as much of `data` as fits; never blocks, never errors on a
    /// full pipe — it just writes a short count.
    pub fn write(&self, pid: Pid, id: PipeId, data: &[u8]) -> KernelResult<usize> {
        let mut pipes = self.pipes.lock();
        let pipe = pipes.get_mut(&id).ok_or(KernelError::ResourceGone)?;
        if pipe.writer_pid != pid {
            return Err(KernelError::PermissionDenied {
                reason: "only the pipe's writer may write".into(),
            });
        }
        if pipe.closed {
            return Err(KernelError::PipeClosed);
        }
        let room = pipe.capacity.saturating_sub(pipe.buffer.len());
        let to_write = room.min(data.len());
        pipe.buffer.extend(&data[..to_write]);
        Ok(to_write)
    }

    /// Read up to `max` bytes; empty pipe (or fully-drained closed pipe)
    /// returns an empty vec rather than an error.
    pub fn read(&self, pid: Pid, id: PipeId, max: usize) -> KernelResult<Vec<u8>> {
        let mut pipes = self.pipes.lock();
        let pipe = pipes.get_mut(&id).ok_or(KernelError::ResourceGone)?;
        if pipe.reader_pid != pid {
            return Err(KernelError::PermissionDenied {
                reason: "only the pipe's reader may read".into(),
            });
        }
        let take = max.min(pipe.buffer.len());
        Ok(pipe.buffer.drain(..take).collect())
    }

    pub fn close(&self, pid: Pid, id: PipeId) -> KernelResult<()> {
        let mut pipes = self.pipes.lock();
        let pipe = pipes.get_mut(&id).ok_or(KernelError::ResourceGone)?;
        if pipe.reader_pid != pid && pipe.writer_pid != pid {
            return Err(KernelError::PermissionDenied {
                reason: "only reader or writer may close a pipe".into(),
            });
        }
        pipe.closed = true;
        Ok(())
    }

    pub fn owner(&self, id: PipeId) -> Option<Pid> {
        self.pipes.lock().get(&id).map(|p| p.owner)
    }

    pub fn destroy(&self, id: PipeId) {
        self.pipes.lock().remove(&id);
    }
}
