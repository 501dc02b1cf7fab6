//! Memory guard
//!
//! Owns one allocation; releases it back to the memory manager on drop
//! unless the guard was explicitly released or the address handed to
//! another owner first.

use std::sync::Arc;

use crate::collector::{KernelEvent, SharedCollector};
use crate::memory::MemoryManager;
use crate::process::Pid;

use super::composite::Releasable;
use super::GuardMeta;

pub struct MemoryGuard {
    meta: GuardMeta,
    memory: Arc<MemoryManager>,
    address: u64,
    size: u64,
    collector: SharedCollector,
}

impl MemoryGuard {
    pub fn new(memory: Arc<MemoryManager>, owner: Pid, address: u64, size: u64, collector: SharedCollector) -> Self {
        collector.emit(KernelEvent::GuardCreated {
            resource_type: "memory",
            owner,
        });
        Self {
            meta: GuardMeta::new("memory", owner),
            memory,
            address,
            size,
            collector,
        }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_active(&self) -> bool {
        self.meta.active
    }

    /// Give up ownership without deallocating — the caller is handing the
    /// allocation off to someone else (e.g. wrapping it in a
    /// [`super::CompositeGuard`] or transferring it to another process).
    pub fn release(mut self) -> u64 {
        self.meta.mark_released();
        self.address
    }

    fn teardown(&mut self) {
        if !self.meta.active {
            return;
        }
        self.meta.active = false;
        if let Err(err) = self.memory.deallocate(self.meta.owner_pid, self.address) {
            self.meta.mark_poisoned(err.to_string());
            self.collector.emit(KernelEvent::GuardError {
                resource_type: "memory",
                owner: self.meta.owner_pid,
                reason: err.to_string(),
            });
        } else {
            self.collector.emit(KernelEvent::GuardDropped {
                resource_type: "memory",
                owner: self.meta.owner_pid,
            });
        }
    }
}

impl Drop for MemoryGuard {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Releasable for MemoryGuard {
    fn release_boxed(self: Box<Self>) {
        drop(self);
    }
}

/// Reference-counted variant permitting shared ownership of one allocation;
/// the last clone dropped triggers the underlying deallocation.
#[derive(Clone)]
pub struct SharedMemoryGuard {
    inner: Arc<MemoryGuard>,
}

impl SharedMemoryGuard {
    pub fn new(memory: Arc<MemoryManager>, owner: Pid, address: u64, size: u64, collector: SharedCollector) -> Self {
        Self {
            inner: Arc::new(MemoryGuard::new(memory, owner, address, size, collector)),
        }
    }

    pub fn address(&self) -> u64 {
        self.inner.address
    }

    pub fn size(&self) -> u64 {
        self.inner.size
    }

    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}
