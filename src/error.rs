//! Kernel error taxonomy
//!
//! Every failure a subsystem can produce funnels into [`KernelError`] so the
//! syscall dispatcher has exactly one type to map onto the wire-level
//! `Error{code, message}` / `PermissionDenied{reason}` split.

use thiserror::Error;

use crate::process::Pid;

/// Crate-wide result alias.
pub type KernelResult<T> = Result<T, KernelError>;

/// The kernel's error taxonomy (kinds, not wire codes).
///
/// Variants map 1:1 onto the kinds enumerated in the error handling design:
/// process lookup, memory pressure, IPC resource state, permissions, and a
/// catch-all for dispatch-time panics.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    #[error("no such process: {0}")]
    NoSuchProcess(Pid),

    #[error("invalid pid: {0}")]
    InvalidPid(Pid),

    #[error("out of memory: requested {requested}, available {available}, used {used}, total {total}")]
    OutOfMemory {
        requested: u64,
        available: u64,
        used: u64,
        total: u64,
    },

    #[error("process limit exceeded")]
    ProcessLimitExceeded,

    #[error("invalid address: {0:#x}")]
    InvalidAddress(u64),

    #[error("alignment error")]
    AlignmentError,

    #[error("protection violation")]
    ProtectionViolation,

    #[error("pipe closed")]
    PipeClosed,

    #[error("queue full")]
    QueueFull,

    #[error("not attached")]
    NotAttached,

    #[error("resource gone")]
    ResourceGone,

    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl KernelError {
    /// Stable short code used in the wire-level `Error{code, message}` payload.
    pub fn code(&self) -> &'static str {
        match self {
            KernelError::NoSuchProcess(_) => "NO_SUCH_PROCESS",
            KernelError::InvalidPid(_) => "INVALID_PID",
            KernelError::OutOfMemory { .. } => "OUT_OF_MEMORY",
            KernelError::ProcessLimitExceeded => "PROCESS_LIMIT_EXCEEDED",
            KernelError::InvalidAddress(_) => "INVALID_ADDRESS",
            KernelError::AlignmentError => "ALIGNMENT_ERROR",
            KernelError::ProtectionViolation => "PROTECTION_VIOLATION",
            KernelError::PipeClosed => "PIPE_CLOSED",
            KernelError::QueueFull => "QUEUE_FULL",
            KernelError::NotAttached => "NOT_ATTACHED",
            KernelError::ResourceGone => "RESOURCE_GONE",
            KernelError::PermissionDenied { .. } => "PERMISSION_DENIED",
            KernelError::InvalidArgument(_) => "INVALID_ARGUMENT",
            KernelError::Serialization(_) => "SERIALIZATION",
            KernelError::Internal(_) => "INTERNAL",
        }
    }
}
