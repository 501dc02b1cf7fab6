//! Kernel configuration surface
//!
//! One struct for every tunable named in the spec's external-interfaces
//! section. Populating it from a file or environment is the front door's
//! job (out of scope here); this crate only needs `Default` plus a place
//! for the front door to write into.

use serde::{Deserialize, Serialize};

/// Default pool size: 1 GiB, per the spec's address-space default.
pub const DEFAULT_POOL_SIZE: u64 = 1 << 30;

/// Default scheduling quantum: 10ms.
pub const DEFAULT_QUANTUM_MICROS: u64 = 10_000;

/// Default pipe/queue capacity: 64 KiB.
pub const DEFAULT_IPC_CAPACITY: usize = 64 * 1024;

/// Default GC block-count threshold before an internal pass runs.
pub const DEFAULT_GC_BLOCK_THRESHOLD: usize = 1000;

/// Default pressure percentage that triggers auto-collect.
pub const DEFAULT_GC_AUTO_COLLECT_PRESSURE_PCT: u8 = 80;

/// Minimum seconds between automatic GC runs.
pub const DEFAULT_GC_MIN_INTERVAL_SECS: u64 = 5;

/// Pressure-level thresholds, percent of pool used.
pub const DEFAULT_PRESSURE_HIGH_PCT: u8 = 80;
pub const DEFAULT_PRESSURE_CRITICAL_PCT: u8 = 95;

/// Default path prefix a `Standard`-sandbox process's file I/O is scoped
/// under.
pub const DEFAULT_SCOPED_PATH_PREFIX: &str = "/tmp/kernel";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KernelConfig {
    /// Address the (external) gRPC front door binds to. Opaque to this
    /// crate; carried here only because it's part of the configuration
    /// contract the spec names.
    pub bind_address: String,

    pub memory_pool_size: u64,
    pub default_quantum_micros: u64,
    pub default_ipc_capacity: usize,

    pub gc_block_threshold: usize,
    pub gc_auto_collect_pressure_pct: u8,
    pub gc_min_interval_secs: u64,

    pub pressure_warning_pct: u8,
    pub pressure_critical_pct: u8,

    /// Path prefix `Standard`-sandbox file I/O is scoped under. `Privileged`
    /// processes bypass this check entirely.
    pub scoped_path_prefix: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:50051".to_string(),
            memory_pool_size: DEFAULT_POOL_SIZE,
            default_quantum_micros: DEFAULT_QUANTUM_MICROS,
            default_ipc_capacity: DEFAULT_IPC_CAPACITY,
            gc_block_threshold: DEFAULT_GC_BLOCK_THRESHOLD,
            gc_auto_collect_pressure_pct: DEFAULT_GC_AUTO_COLLECT_PRESSURE_PCT,
            gc_min_interval_secs: DEFAULT_GC_MIN_INTERVAL_SECS,
            pressure_warning_pct: DEFAULT_PRESSURE_HIGH_PCT,
            pressure_critical_pct: DEFAULT_PRESSURE_CRITICAL_PCT,
            scoped_path_prefix: DEFAULT_SCOPED_PATH_PREFIX.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.memory_pool_size, 1 << 30);
        assert_eq!(cfg.default_quantum_micros, 10_000);
        assert_eq!(cfg.default_ipc_capacity, 64 * 1024);
        assert!(cfg.pressure_critical_pct > cfg.pressure_warning_pct);
    }
}
