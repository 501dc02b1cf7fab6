//! Syscall dispatcher (C5)
//!
//! The single entry point for external requests: look up the caller,
//! enforce its sandbox level, route to the owning component, and serialize
//! the result. Runs on a `tokio` multi-threaded runtime — each call is
//! spawned as its own task so a slow caller never delays another; tokio's
//! own panic reporting on `JoinHandle` doubles as the "catch at the
//! boundary" the error design calls for.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::collector::{KernelEvent, SharedCollector};
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::guard::{Operation, TransactionGuard};
use crate::ipc::IpcManager;
use crate::memory::MemoryManager;
use crate::process::{Pid, ProcessManager, ResourceKind, SandboxLevel};
use crate::scheduler::Scheduler;

use super::serializer;
use super::types::{permitted_families, SyscallFamily, SyscallRequest, SyscallResponse, SyscallVariant};

#[derive(Clone)]
pub struct Dispatcher {
    process: Arc<ProcessManager>,
    memory: Arc<MemoryManager>,
    ipc: Arc<IpcManager>,
    scheduler: Arc<Scheduler>,
    collector: SharedCollector,
    config: KernelConfig,
}

impl Dispatcher {
    pub fn new(
        process: Arc<ProcessManager>,
        memory: Arc<MemoryManager>,
        ipc: Arc<IpcManager>,
        scheduler: Arc<Scheduler>,
        collector: SharedCollector,
        config: KernelConfig,
    ) -> Self {
        Self {
            process,
            memory,
            ipc,
            scheduler,
            collector,
            config,
        }
    }

    /// Dispatch one request. Spawned on its own task so a long-running
    /// caller never blocks another; a panic inside `dispatch_sync` surfaces
    /// as a `JoinError` here rather than unwinding into the caller.
    pub async fn dispatch(&self, request: SyscallRequest) -> SyscallResponse {
        let this = self.clone();
        match tokio::spawn(async move { this.dispatch_sync(request) }).await {
            Ok(response) => response,
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    "syscall handler panicked".to_string()
                } else {
                    "syscall handler was cancelled".to_string()
                };
                self.collector.emit(KernelEvent::GuardError {
                    resource_type: "dispatcher",
                    owner: Pid(0),
                    reason: message.clone(),
                });
                SyscallResponse::Error {
                    code: KernelError::Internal(String::new()).code().to_string(),
                    message,
                }
            }
        }
    }

    fn dispatch_sync(&self, request: SyscallRequest) -> SyscallResponse {
        let SyscallRequest { pid, variant } = request;

        if !self.process.exists(pid) {
            return to_response(Err(KernelError::NoSuchProcess(pid)));
        }

        let sandbox_level = match self.process.sandbox_level(pid) {
            Ok(level) => level,
            Err(err) => return to_response(Err(err)),
        };

        if let Err(reason) = self.check_permission(sandbox_level, &variant) {
            return SyscallResponse::PermissionDenied { reason };
        }

        to_response(self.route(pid, variant))
    }

    fn check_permission(&self, level: SandboxLevel, variant: &SyscallVariant) -> Result<(), String> {
        let family = variant.family();
        if !permitted_families(level).contains(&family) {
            return Err(match family {
                SyscallFamily::FileIo => format!("file I/O not allowed at {:?} sandbox", level),
                other => format!("{:?} is not permitted at {:?} sandbox", other, level),
            });
        }
        if family == SyscallFamily::FileIo && level == SandboxLevel::Standard {
            let path = file_io_path(variant).expect("FileIo family always carries a path");
            if !path.starts_with(&self.config.scoped_path_prefix) {
                return Err(format!(
                    "file I/O not allowed outside {} at Standard sandbox",
                    self.config.scoped_path_prefix
                ));
            }
        }
        Ok(())
    }

    fn route(&self, pid: Pid, variant: SyscallVariant) -> KernelResult<SyscallResponse> {
        use SyscallVariant::*;
        match variant {
            ReadFile { path } => {
                let data = std::fs::read(&path).map_err(|e| KernelError::InvalidArgument(e.to_string()))?;
                Ok(SyscallResponse::Success { data })
            }
            WriteFile { path, data } => {
                std::fs::write(&path, &data).map_err(|e| KernelError::InvalidArgument(e.to_string()))?;
                ok_value(&(data.len() as u64))
            }
            CreateFile { path } => {
                std::fs::File::create(&path).map_err(|e| KernelError::InvalidArgument(e.to_string()))?;
                Ok(SyscallResponse::Success { data: Vec::new() })
            }
            DeleteFile { path } => {
                std::fs::remove_file(&path).map_err(|e| KernelError::InvalidArgument(e.to_string()))?;
                Ok(SyscallResponse::Success { data: Vec::new() })
            }
            ListDirectory { path } => {
                let entries: Vec<String> = std::fs::read_dir(&path)
                    .map_err(|e| KernelError::InvalidArgument(e.to_string()))?
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect();
                Ok(SyscallResponse::Success {
                    data: serializer::serialize_simd_preferred(&entries)?,
                })
            }
            FileExists { path } => ok_value(&std::path::Path::new(&path).exists()),

            GetSystemInfo => ok_value(&SystemInfoPayload {
                pool_size: self.memory.pool_size(),
                used_bytes: self.memory.used_bytes(),
                process_count: self.process.list().len(),
                scheduler_policy: format!("{:?}", self.scheduler.stats().policy),
            }),
            GetCurrentTime => ok_value(&now_micros()),
            GetEnvVar { name } => {
                let value = std::env::var(&name).map_err(|_| KernelError::InvalidArgument(format!("no such env var: {name}")))?;
                Ok(SyscallResponse::Success { data: value.into_bytes() })
            }

            CreateProcess {
                name,
                priority,
                sandbox_level,
                command,
            } => {
                let new_pid = self.process.create(name, priority, sandbox_level, Some(pid), command)?;
                ok_value(&new_pid.as_u32())
            }
            TerminateProcess { target } => {
                self.process.terminate(target)?;
                Ok(SyscallResponse::Success { data: Vec::new() })
            }
            ScheduleSetPolicy { policy } => {
                self.scheduler.set_policy(policy);
                Ok(SyscallResponse::Success { data: Vec::new() })
            }
            ScheduleNext => ok_value(&self.scheduler.next().map(Pid::as_u32)),
            ScheduleStats => ok_value(&self.scheduler.stats()),

            CreatePipe { reader, writer, capacity } => {
                let id = self.ipc.create_pipe(pid, reader, writer, capacity);
                self.record_or_rollback(pid, ResourceKind::Pipe, id)?;
                ok_value(&id)
            }
            WritePipe { id, data } => {
                let written = self.ipc.write_pipe(pid, id, &data)?;
                ok_value(&(written as u64))
            }
            ReadPipe { id, max } => Ok(SyscallResponse::Success { data: self.ipc.read_pipe(pid, id, max)? }),
            ClosePipe { id } => {
                self.ipc.close_pipe(pid, id)?;
                self.process.forget_resource(pid, ResourceKind::Pipe, id).ok();
                Ok(SyscallResponse::Success { data: Vec::new() })
            }
            CreateShm { size } => {
                let id = self.ipc.create_shm(pid, size);
                self.record_or_rollback(pid, ResourceKind::SharedMemory, id)?;
                ok_value(&id)
            }
            AttachShm { id, read_only } => {
                self.ipc.attach_shm(pid, id, read_only)?;
                Ok(SyscallResponse::Success { data: Vec::new() })
            }
            WriteShm { id, offset, data } => {
                self.ipc.write_shm(pid, id, offset, &data)?;
                Ok(SyscallResponse::Success { data: Vec::new() })
            }
            ReadShm { id, offset, len } => Ok(SyscallResponse::Success {
                data: self.ipc.read_shm(pid, id, offset, len)?,
            }),
            CreateQueue { kind, capacity } => {
                let id = self.ipc.create_queue(pid, kind, capacity);
                self.record_or_rollback(pid, ResourceKind::Queue, id)?;
                ok_value(&id)
            }
            SendQueue { id, data, priority } => ok_value(&self.ipc.send_queue(pid, id, data, priority)?),
            ReceiveQueue { id } => match self.ipc.receive_queue(pid, id)? {
                Some(message) => ok_value(&message),
                None => Ok(SyscallResponse::Success { data: Vec::new() }),
            },
            SubscribeQueue { id } => {
                self.ipc.subscribe_queue(pid, id)?;
                Ok(SyscallResponse::Success { data: Vec::new() })
            }
            UnsubscribeQueue { id } => {
                self.ipc.unsubscribe_queue(pid, id)?;
                Ok(SyscallResponse::Success { data: Vec::new() })
            }
            CloseQueue { id } | DestroyQueue { id } => {
                self.ipc.release_owned(pid, ResourceKind::Queue, id)?;
                self.process.forget_resource(pid, ResourceKind::Queue, id).ok();
                Ok(SyscallResponse::Success { data: Vec::new() })
            }

            Allocate { size } => {
                let address = self.memory.allocate(pid, size)?;
                self.record_or_rollback(pid, ResourceKind::Memory, address)?;
                ok_value(&address)
            }
            Deallocate { address } => {
                self.memory.deallocate(pid, address)?;
                self.process.forget_resource(pid, ResourceKind::Memory, address).ok();
                Ok(SyscallResponse::Success { data: Vec::new() })
            }
        }
    }

    /// Record a just-acquired resource against `pid`'s owned-resource list,
    /// rolling the acquisition back if the bookkeeping step fails (a
    /// transaction guard covering the two-step "acquire, then record"
    /// sequence so a failure never leaves an orphaned resource).
    fn record_or_rollback(&self, pid: Pid, kind: ResourceKind, id: u64) -> KernelResult<()> {
        let mut txn = TransactionGuard::new(pid, self.collector.clone());
        let (memory, ipc) = (self.memory.clone(), self.ipc.clone());
        txn.record(Operation::new("record_resource", move || match kind {
            ResourceKind::Memory => {
                let _ = memory.deallocate(pid, id);
            }
            other => {
                let _ = ipc.release_owned(pid, other, id);
            }
        }));
        self.process.record_resource(pid, kind, id)?;
        txn.commit();
        Ok(())
    }
}

#[derive(Serialize)]
struct SystemInfoPayload {
    pool_size: u64,
    used_bytes: u64,
    process_count: usize,
    scheduler_policy: String,
}

fn ok_value<T: Serialize>(value: &T) -> KernelResult<SyscallResponse> {
    Ok(SyscallResponse::Success {
        data: serializer::serialize(value)?,
    })
}

fn to_response(result: KernelResult<SyscallResponse>) -> SyscallResponse {
    match result {
        Ok(response) => response,
        Err(err) => SyscallResponse::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        },
    }
}

fn file_io_path(variant: &SyscallVariant) -> Option<&str> {
    use SyscallVariant::*;
    match variant {
        ReadFile { path } | WriteFile { path, .. } | CreateFile { path } | DeleteFile { path } | ListDirectory { path } | FileExists { path } => Some(path),
        _ => None,
    }
}

fn now_micros() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_micros() as u64).unwrap_or(0)
}
