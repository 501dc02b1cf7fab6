//! IPC layer (C4)
//!
//! Three primitives sharing one manager surface: byte pipes, shared-memory
//! segments, and message queues (FIFO, priority, pub/sub). Every operation
//! is non-blocking — only the internal mutex acquisition bounds a wait, per
//! the concurrency model's requirement that IPC never parks a worker thread.

mod manager;
mod pipe;
mod queue;
mod shm;

pub use manager::IpcManager;
pub use pipe::PipeId;
pub use queue::{Message, QueueId, QueueKind};
pub use shm::ShmId;
