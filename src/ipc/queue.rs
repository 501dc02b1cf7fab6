//! Message queues
//!
//! One type, three delivery disciplines, selected at creation time:
//!
//! - `Fifo`: strict arrival order, rejects with `QueueFull` past capacity.
//! - `Priority`: higher priority first, insertion order breaks ties.
//! - `PubSub`: fan-out — every subscriber registered at send time gets its
//!   own copy, delivered independently of the others' consumption rate.

use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};
use crate::process::Pid;

pub type QueueId = u64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Fifo,
    Priority,
    PubSub,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Pid,
    pub priority: u8,
    pub sequence: u64,
    pub data: Vec<u8>,
}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Message {
    // `BinaryHeap` is a max-heap: higher priority pops first, and among
    // equal priorities the earlier sequence number (smaller) pops first,
    // so we invert sequence to make "earlier" compare greater.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

enum Backing {
    Fifo(VecDeque<Message>),
    Priority(BinaryHeap<Message>),
    PubSub {
        subscribers: HashSet<Pid>,
        inboxes: HashMap<Pid, VecDeque<Message>>,
    },
}

struct Queue {
    owner: Pid,
    kind: QueueKind,
    capacity: usize,
    backing: Backing,
}

impl Queue {
    fn len(&self) -> usize {
        match &self.backing {
            Backing::Fifo(q) => q.len(),
            Backing::Priority(q) => q.len(),
            Backing::PubSub { inboxes, .. } => inboxes.values().map(VecDeque::len).max().unwrap_or(0),
        }
    }
}

pub struct QueueManager {
    queues: Mutex<HashMap<QueueId, Queue>>,
    next_id: AtomicU64,
    next_sequence: AtomicU64,
    default_capacity: usize,
}

impl QueueManager {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            next_sequence: AtomicU64::new(0),
            default_capacity,
        }
    }

    pub fn create(&self, owner: Pid, kind: QueueKind, capacity: Option<usize>) -> QueueId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let backing = match kind {
            QueueKind::Fifo => Backing::Fifo(VecDeque::new()),
            QueueKind::Priority => Backing::Priority(BinaryHeap::new()),
            QueueKind::PubSub => Backing::PubSub {
                subscribers: HashSet::new(),
                inboxes: HashMap::new(),
            },
        };
        self.queues.lock().insert(
            id,
            Queue {
                owner,
                kind,
                capacity: capacity.unwrap_or(self.default_capacity),
                backing,
            },
        );
        id
    }

    pub fn subscribe(&self, pid: Pid, id: QueueId) -> KernelResult<()> {
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(&id).ok_or(KernelError::ResourceGone)?;
        match &mut queue.backing {
            Backing::PubSub { subscribers, inboxes } => {
                subscribers.insert(pid);
                inboxes.entry(pid).or_default();
                Ok(())
            }
            _ => Err(KernelError::InvalidArgument("subscribe is only valid on a pub/sub queue".into())),
        }
    }

    pub fn unsubscribe(&self, pid: Pid, id: QueueId) -> KernelResult<()> {
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(&id).ok_or(KernelError::ResourceGone)?;
        match &mut queue.backing {
            Backing::PubSub { subscribers, inboxes } => {
                subscribers.remove(&pid);
                inboxes.remove(&pid);
                Ok(())
            }
            _ => Err(KernelError::InvalidArgument("unsubscribe is only valid on a pub/sub queue".into())),
        }
    }

    pub fn send(&self, sender: Pid, id: QueueId, data: Vec<u8>, priority: u8) -> KernelResult<u64> {
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(&id).ok_or(KernelError::ResourceGone)?;
        if queue.len() >= queue.capacity {
            return Err(KernelError::QueueFull);
        }
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let message = Message {
            sender,
            priority,
            sequence,
            data,
        };
        match &mut queue.backing {
            Backing::Fifo(q) => q.push_back(message),
            Backing::Priority(q) => q.push(message),
            Backing::PubSub { subscribers, inboxes } => {
                for subscriber in subscribers.iter() {
                    inboxes.entry(*subscriber).or_default().push_back(message.clone());
                }
            }
        }
        Ok(sequence)
    }

    /// Non-blocking receive: `None` means the queue is currently empty for
    /// this pid, not an error.
    pub fn receive(&self, pid: Pid, id: QueueId) -> KernelResult<Option<Message>> {
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(&id).ok_or(KernelError::ResourceGone)?;
        match &mut queue.backing {
            Backing::Fifo(q) => Ok(q.pop_front()),
            Backing::Priority(q) => Ok(q.pop()),
            Backing::PubSub { inboxes, .. } => {
                let inbox = inboxes.get_mut(&pid).ok_or(KernelError::NotAttached)?;
                Ok(inbox.pop_front())
            }
        }
    }

    pub fn owner(&self, id: QueueId) -> Option<Pid> {
        self.queues.lock().get(&id).map(|q| q.owner)
    }

    pub fn kind(&self, id: QueueId) -> Option<QueueKind> {
        self.queues.lock().get(&id).map(|q| q.kind)
    }

    pub fn destroy(&self, id: QueueId) {
        self.queues.lock().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_preserves_arrival_order() {
        let qm = QueueManager::new(8);
        let id = qm.create(Pid(1), QueueKind::Fifo, None);
        qm.send(Pid(1), id, b"a".to_vec(), 0).unwrap();
        qm.send(Pid(1), id, b"b".to_vec(), 0).unwrap();
        assert_eq!(qm.receive(Pid(1), id).unwrap().unwrap().data, b"a");
        assert_eq!(qm.receive(Pid(1), id).unwrap().unwrap().data, b"b");
    }

    #[test]
    fn fifo_rejects_past_capacity() {
        let qm = QueueManager::new(1);
        let id = qm.create(Pid(1), QueueKind::Fifo, None);
        qm.send(Pid(1), id, b"a".to_vec(), 0).unwrap();
        assert!(matches!(qm.send(Pid(1), id, b"b".to_vec(), 0), Err(KernelError::QueueFull)));
    }

    #[test]
    fn priority_orders_high_first_ties_break_by_arrival() {
        let qm = QueueManager::new(8);
        let id = qm.create(Pid(1), QueueKind::Priority, None);
        qm.send(Pid(1), id, b"low".to_vec(), 1).unwrap();
        qm.send(Pid(1), id, b"high".to_vec(), 5).unwrap();
        qm.send(Pid(1), id, b"high2".to_vec(), 5).unwrap();
        assert_eq!(qm.receive(Pid(1), id).unwrap().unwrap().data, b"high");
        assert_eq!(qm.receive(Pid(1), id).unwrap().unwrap().data, b"high2");
        assert_eq!(qm.receive(Pid(1), id).unwrap().unwrap().data, b"low");
    }

    #[test]
    fn pubsub_fans_out_to_every_subscriber_independently() {
        let qm = QueueManager::new(8);
        let id = qm.create(Pid(1), QueueKind::PubSub, None);
        qm.subscribe(Pid(2), id).unwrap();
        qm.subscribe(Pid(3), id).unwrap();
        qm.send(Pid(1), id, b"hi".to_vec(), 0).unwrap();
        assert_eq!(qm.receive(Pid(2), id).unwrap().unwrap().data, b"hi");
        assert_eq!(qm.receive(Pid(3), id).unwrap().unwrap().data, b"hi");
        assert!(qm.receive(Pid(2), id).unwrap().is_none());
    }

    #[test]
    fn receive_on_empty_queue_is_none_not_error() {
        let qm = QueueManager::new(8);
        let id = qm.create(Pid(1), QueueKind::Fifo, None);
        assert!(qm.receive(Pid(1), id).unwrap().is_none());
    }
}
