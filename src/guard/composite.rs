//! Composite guard
//!
//! Aggregates named sub-guards and releases them in LIFO order when the
//! whole group goes out of scope, so a multi-resource acquisition (e.g. "an
//! allocation plus the pipe that streams into it") tears down atomically
//! from the caller's point of view.

use crate::collector::{KernelEvent, SharedCollector};
use crate::process::Pid;

use super::GuardMeta;

/// A guard that can be released through type-erased storage. Every concrete
/// guard's own `Drop` impl already does the real work; `release_boxed`
/// simply drops the box, which runs that `Drop` impl.
pub trait Releasable: Send {
    fn release_boxed(self: Box<Self>);
}

struct Entry {
    name: &'static str,
    guard: Box<dyn Releasable>,
}

pub struct CompositeGuard {
    meta: GuardMeta,
    entries: Vec<Entry>,
    collector: SharedCollector,
}

impl CompositeGuard {
    pub fn new(owner: Pid, collector: SharedCollector) -> Self {
        collector.emit(KernelEvent::GuardCreated {
            resource_type: "composite",
            owner,
        });
        Self {
            meta: GuardMeta::new("composite", owner),
            entries: Vec::new(),
            collector,
        }
    }

    pub fn add(&mut self, name: &'static str, guard: Box<dyn Releasable>) {
        self.entries.push(Entry { name, guard });
        self.collector.emit(KernelEvent::GuardUsed {
            resource_type: "composite",
            owner: self.meta.owner_pid,
            op: name,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for CompositeGuard {
    fn drop(&mut self) {
        while let Some(entry) = self.entries.pop() {
            entry.guard.release_boxed();
        }
        self.meta.mark_released();
        self.collector.emit(KernelEvent::GuardDropped {
            resource_type: "composite",
            owner: self.meta.owner_pid,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::null_collector;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct RecordingGuard {
        order: Arc<AtomicU32>,
        slot: Arc<std::sync::Mutex<Vec<u32>>>,
        id: u32,
    }

    impl Releasable for RecordingGuard {
        fn release_boxed(self: Box<Self>) {
            self.order.fetch_add(1, Ordering::SeqCst);
            self.slot.lock().unwrap().push(self.id);
        }
    }

    #[test]
    fn sub_guards_release_in_lifo_order() {
        let order = Arc::new(AtomicU32::new(0));
        let released = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut composite = CompositeGuard::new(Pid(1), null_collector());
        composite.add(
            "first",
            Box::new(RecordingGuard {
                order: order.clone(),
                slot: released.clone(),
                id: 1,
            }),
        );
        composite.add(
            "second",
            Box::new(RecordingGuard {
                order: order.clone(),
                slot: released.clone(),
                id: 2,
            }),
        );
        drop(composite);
        assert_eq!(*released.lock().unwrap(), vec![2, 1]);
    }
}
