//! Typed guard
//!
//! Carries a phantom state tag alongside an owned value. State transitions
//! consume the old guard and produce the new one, so a value can never be
//! observed in two states at once. `transition` is infallible; when the
//! transition itself can fail (e.g. a handshake step), use
//! `with_transition`.

use std::marker::PhantomData;

use crate::collector::{KernelEvent, SharedCollector};
use crate::error::KernelResult;
use crate::process::Pid;

use super::GuardMeta;

pub struct TypedGuard<T, State> {
    meta: GuardMeta,
    // `Option` so a transition can `take()` the value out without moving a
    // field out of a type that implements `Drop` (E0509).
    value: Option<T>,
    collector: SharedCollector,
    _state: PhantomData<State>,
}

impl<T, State> TypedGuard<T, State> {
    pub fn new(value: T, owner: Pid, resource_type: &'static str, collector: SharedCollector) -> Self {
        collector.emit(KernelEvent::GuardCreated { resource_type, owner });
        Self {
            meta: GuardMeta::new(resource_type, owner),
            value: Some(value),
            collector,
            _state: PhantomData,
        }
    }

    pub fn get(&self) -> &T {
        self.value.as_ref().expect("value present while guard is active")
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("value present while guard is active")
    }

    /// Move to a new phantom state without touching the wrapped value.
    pub fn transition<Next>(mut self) -> TypedGuard<T, Next> {
        let value = self.value.take().expect("value present while guard is active");
        self.collector.emit(KernelEvent::GuardUsed {
            resource_type: self.meta.resource_type,
            owner: self.meta.owner_pid,
            op: "transition",
        });
        self.meta.mark_released();
        TypedGuard {
            meta: GuardMeta::new(self.meta.resource_type, self.meta.owner_pid),
            value: Some(value),
            collector: self.collector.clone(),
            _state: PhantomData,
        }
    }

    /// Move to a new phantom state, running a fallible transformation of
    /// the wrapped value. On error the original guard is gone — the caller
    /// gets `Err` back, matching the "consumes the old guard" contract.
    pub fn with_transition<Next>(mut self, f: impl FnOnce(T) -> KernelResult<T>) -> KernelResult<TypedGuard<T, Next>> {
        let value = self.value.take().expect("value present while guard is active");
        match f(value) {
            Ok(value) => {
                self.collector.emit(KernelEvent::GuardUsed {
                    resource_type: self.meta.resource_type,
                    owner: self.meta.owner_pid,
                    op: "with_transition",
                });
                self.meta.mark_released();
                Ok(TypedGuard {
                    meta: GuardMeta::new(self.meta.resource_type, self.meta.owner_pid),
                    value: Some(value),
                    collector: self.collector.clone(),
                    _state: PhantomData,
                })
            }
            Err(err) => {
                self.collector.emit(KernelEvent::GuardError {
                    resource_type: self.meta.resource_type,
                    owner: self.meta.owner_pid,
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

impl<T, State> Drop for TypedGuard<T, State> {
    fn drop(&mut self) {
        if self.meta.active {
            self.collector.emit(KernelEvent::GuardDropped {
                resource_type: self.meta.resource_type,
                owner: self.meta.owner_pid,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::null_collector;

    struct Draft;
    struct Published;

    #[test]
    fn transition_preserves_the_value_and_changes_only_the_tag() {
        let guard: TypedGuard<String, Draft> =
            TypedGuard::new("hello".to_string(), Pid(1), "document", null_collector());
        let published: TypedGuard<String, Published> = guard.transition();
        assert_eq!(published.get(), "hello");
    }

    #[test]
    fn with_transition_propagates_the_closures_error() {
        let guard: TypedGuard<i32, Draft> = TypedGuard::new(1, Pid(1), "counter", null_collector());
        let result: KernelResult<TypedGuard<i32, Published>> = guard.with_transition(|_| {
            Err(crate::error::KernelError::InvalidArgument("nope".into()))
        });
        assert!(result.is_err());
    }
}
