//! Transaction guard
//!
//! Accumulates an ordered list of [`Operation`]s as a multi-step syscall
//! progresses. `commit()` discards the rollback list; dropping without
//! committing runs every recorded rollback closure in LIFO order, which
//! also happens during unwinding (Rust's `Drop` runs on panic too), so a
//! partially-applied operation never leaks.

use crate::collector::{KernelEvent, SharedCollector};
use crate::process::Pid;

use super::GuardMeta;

pub struct Operation {
    pub label: &'static str,
    rollback: Box<dyn FnOnce() + Send>,
}

impl Operation {
    pub fn new(label: &'static str, rollback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label,
            rollback: Box::new(rollback),
        }
    }
}

pub struct TransactionGuard {
    meta: GuardMeta,
    operations: Vec<Operation>,
    committed: bool,
    collector: SharedCollector,
}

impl TransactionGuard {
    pub fn new(owner: Pid, collector: SharedCollector) -> Self {
        collector.emit(KernelEvent::GuardCreated {
            resource_type: "transaction",
            owner,
        });
        Self {
            meta: GuardMeta::new("transaction", owner),
            operations: Vec::new(),
            committed: false,
            collector,
        }
    }

    /// Record a completed step and the closure that undoes it.
    pub fn record(&mut self, operation: Operation) {
        self.collector.emit(KernelEvent::GuardUsed {
            resource_type: "transaction",
            owner: self.meta.owner_pid,
            op: operation.label,
        });
        self.operations.push(operation);
    }

    pub fn step_count(&self) -> usize {
        self.operations.len()
    }

    /// Discard the rollback list; every step stands.
    pub fn commit(mut self) {
        self.committed = true;
        self.operations.clear();
        self.meta.mark_released();
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for operation in self.operations.drain(..).rev() {
            (operation.rollback)();
        }
        self.collector.emit(KernelEvent::GuardDropped {
            resource_type: "transaction",
            owner: self.meta.owner_pid,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::null_collector;
    use std::sync::{Arc, Mutex};

    #[test]
    fn uncommitted_transaction_rolls_back_in_lifo_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let mut txn = TransactionGuard::new(Pid(1), null_collector());
            let log_a = log.clone();
            txn.record(Operation::new("a", move || log_a.lock().unwrap().push("a")));
            let log_b = log.clone();
            txn.record(Operation::new("b", move || log_b.lock().unwrap().push("b")));
        }
        assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn committed_transaction_does_not_roll_back() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut txn = TransactionGuard::new(Pid(1), null_collector());
        let log_a = log.clone();
        txn.record(Operation::new("a", move || log_a.lock().unwrap().push("a")));
        txn.commit();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn rollback_runs_even_when_the_owning_frame_panics() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut txn = TransactionGuard::new(Pid(1), null_collector());
            txn.record(Operation::new("a", move || log_clone.lock().unwrap().push("a")));
            panic!("boundary failure");
        }));
        assert!(result.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }
}
