//! Scheduler (C2)
//!
//! Selects the next runnable process and accumulates quantum accounting.
//! Policies are modelled as a tagged enum rather than a trait object — no
//! inheritance is needed, pattern matching on the tag suffices (see the
//! dynamic-dispatch design note). The whole runqueue lives behind a single
//! mutex; `next()` holds that lock only long enough to pick a pid, never
//! across the caller's actual run of that process.

mod types;

pub use types::{SchedulerPolicyKind, SchedulerRecord, SchedulerStats};

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::process::Pid;
use types::fair_weight;

/// Ordering key for the priority policy: higher priority sorts first,
/// ties broken by ascending insertion sequence. Stored inverted
/// (`u8::MAX - priority`) so the natural `BTreeSet` ascending order does
/// the right thing without a custom `Ord` impl.
type PriorityKey = (u8, u64, Pid);

/// Ordering key for the fair policy: smallest `vruntime` runs next, ties
/// broken by ascending pid.
type FairKey = (u64, Pid);

enum RunQueue {
    RoundRobin(VecDeque<Pid>),
    Priority(BTreeSet<PriorityKey>),
    Fair(BTreeSet<FairKey>),
}

struct Inner {
    queue: RunQueue,
    records: HashMap<Pid, SchedulerRecord>,
    current: Option<Pid>,
    insertion_seq: u64,
    pending_yield: HashSet<Pid>,
    total_scheduled: u64,
    context_switches: u64,
    preemptions: u64,
}

impl Inner {
    fn new(policy: SchedulerPolicyKind) -> Self {
        Self {
            queue: Self::empty_queue(policy),
            records: HashMap::new(),
            current: None,
            insertion_seq: 0,
            pending_yield: HashSet::new(),
            total_scheduled: 0,
            context_switches: 0,
            preemptions: 0,
        }
    }

    fn empty_queue(policy: SchedulerPolicyKind) -> RunQueue {
        match policy {
            SchedulerPolicyKind::RoundRobin => RunQueue::RoundRobin(VecDeque::new()),
            SchedulerPolicyKind::Priority => RunQueue::Priority(BTreeSet::new()),
            SchedulerPolicyKind::Fair => RunQueue::Fair(BTreeSet::new()),
        }
    }

    fn policy(&self) -> SchedulerPolicyKind {
        match self.queue {
            RunQueue::RoundRobin(_) => SchedulerPolicyKind::RoundRobin,
            RunQueue::Priority(_) => SchedulerPolicyKind::Priority,
            RunQueue::Fair(_) => SchedulerPolicyKind::Fair,
        }
    }

    fn add(&mut self, pid: Pid, priority: u8) {
        if self.records.contains_key(&pid) {
            return;
        }
        self.insertion_seq += 1;
        let seq = self.insertion_seq;
        self.records.insert(
            pid,
            SchedulerRecord {
                pid,
                priority,
                vruntime: 0,
                quantum_remaining_micros: 0,
            },
        );

        match &mut self.queue {
            RunQueue::RoundRobin(q) => q.push_back(pid),
            RunQueue::Priority(set) => {
                set.insert((u8::MAX - priority, seq, pid));
                if let Some(current) = self.current {
                    if let Some(current_rec) = self.records.get(&current) {
                        if priority > current_rec.priority {
                            self.pending_yield.insert(current);
                            self.preemptions += 1;
                        }
                    }
                }
            }
            RunQueue::Fair(set) => {
                set.insert((0, pid));
            }
        }
    }

    fn remove(&mut self, pid: Pid) {
        let Some(record) = self.records.remove(&pid) else {
            return;
        };
        match &mut self.queue {
            RunQueue::RoundRobin(q) => q.retain(|p| *p != pid),
            RunQueue::Priority(set) => {
                set.retain(|(_, _, p)| *p != pid);
                let _ = record;
            }
            RunQueue::Fair(set) => {
                set.retain(|(_, p)| *p != pid);
            }
        }
        if self.current == Some(pid) {
            self.current = None;
        }
        self.pending_yield.remove(&pid);
    }

    fn next(&mut self) -> Option<Pid> {
        let picked = match &mut self.queue {
            RunQueue::RoundRobin(q) => {
                if let Some(prev) = self.current.take() {
                    q.push_back(prev);
                    self.context_switches += 1;
                }
                q.pop_front()
            }
            RunQueue::Priority(set) => {
                if self.current.is_some() {
                    self.context_switches += 1;
                }
                set.iter().next().map(|(_, _, pid)| *pid)
            }
            RunQueue::Fair(set) => {
                if self.current.is_some() {
                    self.context_switches += 1;
                }
                set.iter().next().map(|(_, pid)| *pid)
            }
        };
        self.current = picked;
        if let Some(pid) = picked {
            self.total_scheduled += 1;
            self.pending_yield.remove(&pid);
        }
        picked
    }

    /// Record actual run time for `pid` under the fair policy, advancing
    /// its `vruntime` by `actual_run_micros / weight(priority)`.
    fn on_tick(&mut self, pid: Pid, actual_run_micros: u64) {
        if let RunQueue::Fair(set) = &mut self.queue {
            if let Some(record) = self.records.get_mut(&pid) {
                set.retain(|(_, p)| *p != pid);
                let weight = fair_weight(record.priority);
                record.vruntime += actual_run_micros / weight.max(1);
                set.insert((record.vruntime, pid));
            }
        } else if let Some(record) = self.records.get_mut(&pid) {
            record.quantum_remaining_micros = record.quantum_remaining_micros.saturating_sub(actual_run_micros);
        }
    }

    /// Swap the runqueue to a new policy, reinserting every tracked pid
    /// under it. Open question, decided explicitly: switching into `Fair`
    /// resets `vruntime` to 0 for every reinserted process rather than
    /// attempting to rebalance in-flight vruntimes.
    fn set_policy(&mut self, policy: SchedulerPolicyKind) {
        let mut entries: Vec<(Pid, u8)> = self.records.values().map(|r| (r.pid, r.priority)).collect();
        entries.sort_by_key(|(pid, _)| *pid);
        let current = self.current;
        self.queue = Self::empty_queue(policy);
        self.records.clear();
        self.insertion_seq = 0;
        self.pending_yield.clear();
        for (pid, priority) in entries {
            self.add(pid, priority);
        }
        self.current = current;
    }
}

/// The scheduler: a single mutex-protected runqueue plus global counters.
pub struct Scheduler {
    inner: Mutex<Inner>,
    quantum_micros: AtomicU64,
}

impl Scheduler {
    pub fn new(policy: SchedulerPolicyKind, quantum_micros: u64) -> Self {
        Self {
            inner: Mutex::new(Inner::new(policy)),
            quantum_micros: AtomicU64::new(quantum_micros),
        }
    }

    pub fn add(&self, pid: Pid, priority: u8) {
        self.inner.lock().add(pid, priority);
    }

    pub fn remove(&self, pid: Pid) {
        self.inner.lock().remove(pid);
    }

    pub fn next(&self) -> Option<Pid> {
        self.inner.lock().next()
    }

    pub fn on_tick(&self, pid: Pid, actual_run_micros: u64) {
        self.inner.lock().on_tick(pid, actual_run_micros);
    }

    pub fn set_policy(&self, policy: SchedulerPolicyKind) {
        self.inner.lock().set_policy(policy);
    }

    pub fn quantum_micros(&self) -> u64 {
        self.quantum_micros.load(Ordering::Relaxed)
    }

    pub fn set_quantum_micros(&self, quantum: u64) {
        self.quantum_micros.store(quantum, Ordering::Relaxed);
    }

    /// Whether `pid` has been asked to yield at its next syscall boundary
    /// (cooperative preemption signal raised by a higher-priority arrival).
    /// Clears the signal once observed.
    pub fn take_yield_signal(&self, pid: Pid) -> bool {
        self.inner.lock().pending_yield.remove(&pid)
    }

    pub fn record(&self, pid: Pid) -> Option<SchedulerRecord> {
        self.inner.lock().records.get(&pid).copied()
    }

    pub fn stats(&self) -> SchedulerStats {
        let inner = self.inner.lock();
        SchedulerStats {
            total_scheduled: inner.total_scheduled,
            context_switches: inner.context_switches,
            preemptions: inner.preemptions,
            active_processes: inner.records.len(),
            policy: inner.policy(),
            quantum_micros: self.quantum_micros(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_rotates_through_all_entries() {
        let s = Scheduler::new(SchedulerPolicyKind::RoundRobin, 10_000);
        s.add(Pid(1), 0);
        s.add(Pid(2), 0);
        s.add(Pid(3), 0);
        assert_eq!(s.next(), Some(Pid(1)));
        assert_eq!(s.next(), Some(Pid(2)));
        assert_eq!(s.next(), Some(Pid(3)));
        assert_eq!(s.next(), Some(Pid(1)));
    }

    #[test]
    fn priority_picks_highest_then_insertion_order_ties() {
        let s = Scheduler::new(SchedulerPolicyKind::Priority, 10_000);
        s.add(Pid(1), 5);
        s.add(Pid(2), 7);
        s.add(Pid(3), 5);
        assert_eq!(s.next(), Some(Pid(2)));
        s.remove(Pid(2));
        assert_eq!(s.next(), Some(Pid(1)));
    }

    #[test]
    fn priority_arrival_signals_preemption() {
        let s = Scheduler::new(SchedulerPolicyKind::Priority, 10_000);
        s.add(Pid(1), 1);
        assert_eq!(s.next(), Some(Pid(1)));
        s.add(Pid(2), 9);
        assert!(s.take_yield_signal(Pid(1)));
        assert_eq!(s.stats().preemptions, 1);
    }

    #[test]
    fn fair_policy_advances_vruntime_and_reorders() {
        let s = Scheduler::new(SchedulerPolicyKind::Fair, 10_000);
        s.add(Pid(1), 0); // weight 1
        s.add(Pid(2), 1); // weight 2
        assert_eq!(s.next(), Some(Pid(1)));
        s.on_tick(Pid(1), 10_000);
        assert_eq!(s.next(), Some(Pid(2)));
    }

    #[test]
    fn set_policy_preserves_priorities() {
        let s = Scheduler::new(SchedulerPolicyKind::RoundRobin, 10_000);
        s.add(Pid(1), 3);
        s.add(Pid(2), 9);
        s.set_policy(SchedulerPolicyKind::Priority);
        assert_eq!(s.next(), Some(Pid(2)));
    }

    #[test]
    fn stats_reports_policy_and_quantum() {
        let s = Scheduler::new(SchedulerPolicyKind::Fair, 20_000);
        let stats = s.stats();
        assert_eq!(stats.policy, SchedulerPolicyKind::Fair);
        assert_eq!(stats.quantum_micros, 20_000);
    }
}
