//! Syscall dispatcher (C5)

mod dispatcher;
mod serializer;
mod types;

pub use dispatcher::Dispatcher;
pub use serializer::{deserialize, serialize, serialize_simd_preferred, SIMD_THRESHOLD_BYTES};
pub use types::{permitted_families, SyscallFamily, SyscallRequest, SyscallResponse, SyscallVariant};
