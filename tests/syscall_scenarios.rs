//! End-to-end syscall dispatcher scenarios: sandbox enforcement and the
//! scoped file I/O path.

use corekernel::config::KernelConfig;
use corekernel::process::SandboxLevel;
use corekernel::syscall::{SyscallRequest, SyscallResponse, SyscallVariant};
use corekernel::Kernel;

fn kernel_with_scope(prefix: &str) -> Kernel {
    let mut config = KernelConfig::default();
    config.scoped_path_prefix = prefix.to_string();
    Kernel::new(config)
}

#[tokio::test]
async fn minimal_sandbox_cannot_read_files() {
    let kernel = kernel_with_scope("/tmp/corekernel-test");
    let pid = kernel
        .create_process("reader", 1, SandboxLevel::Minimal, None, None)
        .unwrap();

    let response = kernel
        .dispatch(SyscallRequest::new(
            pid,
            SyscallVariant::ReadFile { path: "/etc/passwd".to_string() },
        ))
        .await;

    assert!(matches!(response, SyscallResponse::PermissionDenied { .. }));
}

#[tokio::test]
async fn standard_sandbox_may_read_files_under_its_scoped_prefix() {
    let dir = std::env::temp_dir().join("corekernel-scoped-test");
    std::fs::create_dir_all(&dir).unwrap();
    let file_path = dir.join("greeting.txt");
    std::fs::write(&file_path, b"hi").unwrap();

    let kernel = kernel_with_scope(dir.to_str().unwrap());
    let pid = kernel
        .create_process("reader", 1, SandboxLevel::Standard, None, None)
        .unwrap();

    let response = kernel
        .dispatch(SyscallRequest::new(
            pid,
            SyscallVariant::ReadFile { path: file_path.to_str().unwrap().to_string() },
        ))
        .await;

    assert!(matches!(response, SyscallResponse::Success { .. }));
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn standard_sandbox_cannot_read_files_outside_its_scoped_prefix() {
    let kernel = kernel_with_scope("/tmp/corekernel-scoped-only");
    let pid = kernel
        .create_process("reader", 1, SandboxLevel::Standard, None, None)
        .unwrap();

    let response = kernel
        .dispatch(SyscallRequest::new(
            pid,
            SyscallVariant::ReadFile { path: "/etc/passwd".to_string() },
        ))
        .await;

    assert!(matches!(response, SyscallResponse::PermissionDenied { .. }));
}

#[tokio::test]
async fn unknown_pid_is_reported_as_a_wire_level_error_not_a_panic() {
    let kernel = kernel_with_scope("/tmp/corekernel-scoped");
    let response = kernel
        .dispatch(SyscallRequest::new(corekernel::Pid(9999), SyscallVariant::GetSystemInfo))
        .await;

    assert!(matches!(response, SyscallResponse::Error { .. }));
}
