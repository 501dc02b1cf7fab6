//! Syscall request/response shapes and the sandbox-family mapping.

use serde::{Deserialize, Serialize};

use crate::ipc::QueueKind;
use crate::process::{CommandSpec, Pid, SandboxLevel};
use crate::scheduler::SchedulerPolicyKind;

#[derive(Debug, Clone)]
pub struct SyscallRequest {
    pub pid: Pid,
    pub variant: SyscallVariant,
}

impl SyscallRequest {
    pub fn new(pid: Pid, variant: SyscallVariant) -> Self {
        Self { pid, variant }
    }
}

/// Every syscall the dispatcher can route. Each variant's payload is typed
/// rather than a generic bag of bytes.
#[derive(Debug, Clone)]
pub enum SyscallVariant {
    // -- file I/O --------------------------------------------------------
    ReadFile { path: String },
    WriteFile { path: String, data: Vec<u8> },
    CreateFile { path: String },
    DeleteFile { path: String },
    ListDirectory { path: String },
    FileExists { path: String },

    // -- system info ------------------------------------------------------
    GetSystemInfo,
    GetCurrentTime,
    GetEnvVar { name: String },

    // -- process -----------------------------------------------------------
    CreateProcess {
        name: String,
        priority: u8,
        sandbox_level: SandboxLevel,
        command: Option<CommandSpec>,
    },
    TerminateProcess { target: Pid },
    ScheduleSetPolicy { policy: SchedulerPolicyKind },
    ScheduleNext,
    ScheduleStats,

    // -- IPC -----------------------------------------------------------------
    CreatePipe { reader: Pid, writer: Pid, capacity: Option<usize> },
    WritePipe { id: u64, data: Vec<u8> },
    ReadPipe { id: u64, max: usize },
    ClosePipe { id: u64 },
    CreateShm { size: usize },
    AttachShm { id: u64, read_only: bool },
    WriteShm { id: u64, offset: usize, data: Vec<u8> },
    ReadShm { id: u64, offset: usize, len: usize },
    CreateQueue { kind: QueueKind, capacity: Option<usize> },
    SendQueue { id: u64, data: Vec<u8>, priority: u8 },
    ReceiveQueue { id: u64 },
    SubscribeQueue { id: u64 },
    UnsubscribeQueue { id: u64 },
    CloseQueue { id: u64 },
    DestroyQueue { id: u64 },

    // -- memory --------------------------------------------------------------
    Allocate { size: u64 },
    Deallocate { address: u64 },
}

/// The sandbox-permission family a variant belongs to; see the sandbox
/// table in the configuration surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SyscallFamily {
    SystemInfo,
    MemoryOwnQuota,
    FileIo,
    Ipc,
    SchedulerControl,
    ProcessControl,
    EnvRead,
}

impl SyscallVariant {
    pub fn family(&self) -> SyscallFamily {
        use SyscallFamily::*;
        use SyscallVariant::*;
        match self {
            ReadFile { .. } | WriteFile { .. } | CreateFile { .. } | DeleteFile { .. } | ListDirectory { .. } | FileExists { .. } => FileIo,
            GetSystemInfo | GetCurrentTime => SystemInfo,
            GetEnvVar { .. } => EnvRead,
            CreateProcess { .. } | TerminateProcess { .. } => ProcessControl,
            ScheduleSetPolicy { .. } | ScheduleNext | ScheduleStats => SchedulerControl,
            CreatePipe { .. }
            | WritePipe { .. }
            | ReadPipe { .. }
            | ClosePipe { .. }
            | CreateShm { .. }
            | AttachShm { .. }
            | WriteShm { .. }
            | ReadShm { .. }
            | CreateQueue { .. }
            | SendQueue { .. }
            | ReceiveQueue { .. }
            | SubscribeQueue { .. }
            | UnsubscribeQueue { .. }
            | CloseQueue { .. }
            | DestroyQueue { .. } => Ipc,
            Allocate { .. } | Deallocate { .. } => MemoryOwnQuota,
        }
    }

}

/// The families a sandbox level may invoke, bit-exact with the spec's table.
pub fn permitted_families(level: SandboxLevel) -> &'static [SyscallFamily] {
    use SyscallFamily::*;
    match level {
        SandboxLevel::Minimal => &[SystemInfo, MemoryOwnQuota],
        SandboxLevel::Standard => &[SystemInfo, MemoryOwnQuota, FileIo, Ipc],
        SandboxLevel::Privileged => &[SystemInfo, MemoryOwnQuota, FileIo, Ipc, SchedulerControl, ProcessControl, EnvRead],
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyscallResponse {
    Success { data: Vec<u8> },
    Error { code: String, message: String },
    PermissionDenied { reason: String },
}
