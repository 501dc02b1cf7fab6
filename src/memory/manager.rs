//! Memory manager (C3)
//!
//! A fixed-pool byte allocator: the whole address space starts as one free
//! block, allocation carves pieces out of the segregated free list (§
//! freelist.rs), and deallocation coalesces adjacent free neighbours back
//! together. Per-process ownership, pressure tracking, and two-tier GC live
//! here too.

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::collector::{KernelEvent, SharedCollector};
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::process::Pid;

use super::freelist::{SegregatedFreeList, MIN_BLOCK_SIZE};
use super::types::{AllocationView, BlockState, GcStrategy, GcSummary, MemoryBlock, PressureLevel};

struct GcState {
    deallocations_since_pass: usize,
    last_auto_collect: Option<Instant>,
}

pub struct MemoryManager {
    pool_size: u64,
    /// Address-ordered master record of every block, free or allocated.
    /// Single lock: coalescing needs an atomic view of a block's
    /// neighbours, which a sharded structure can't give us cheaply.
    blocks: Mutex<BTreeMap<u64, MemoryBlock>>,
    free_list: SegregatedFreeList,
    used_bytes: std::sync::atomic::AtomicU64,
    per_process: DashMap<Pid, HashSet<u64>>,
    /// Byte contents of currently-allocated blocks, keyed by block address.
    /// Sized per-allocation rather than per-pool so a 1 GiB pool with a
    /// handful of small allocations doesn't cost a 1 GiB buffer.
    contents: DashMap<u64, Vec<u8>>,
    gc: Mutex<GcState>,
    gc_block_threshold: usize,
    gc_auto_collect_pressure_pct: u8,
    gc_min_interval: Duration,
    pressure_warning_pct: u8,
    pressure_critical_pct: u8,
    collector: SharedCollector,
}

impl MemoryManager {
    pub fn new(pool_size: u64, collector: SharedCollector) -> Self {
        Self::with_config(pool_size, collector, &KernelConfig::default())
    }

    pub fn with_config(pool_size: u64, collector: SharedCollector, config: &KernelConfig) -> Self {
        let mut blocks = BTreeMap::new();
        blocks.insert(
            0,
            MemoryBlock {
                address: 0,
                size: pool_size,
                owner: None,
                state: BlockState::Free,
            },
        );
        let free_list = SegregatedFreeList::new();
        free_list.insert(0, pool_size);

        Self {
            pool_size,
            blocks: Mutex::new(blocks),
            free_list,
            used_bytes: std::sync::atomic::AtomicU64::new(0),
            per_process: DashMap::new(),
            contents: DashMap::new(),
            gc: Mutex::new(GcState {
                deallocations_since_pass: 0,
                last_auto_collect: None,
            }),
            gc_block_threshold: config.gc_block_threshold,
            gc_auto_collect_pressure_pct: config.gc_auto_collect_pressure_pct,
            gc_min_interval: Duration::from_secs(config.gc_min_interval_secs),
            pressure_warning_pct: config.pressure_warning_pct,
            pressure_critical_pct: config.pressure_critical_pct,
            collector,
        }
    }

    pub fn pool_size(&self) -> u64 {
        self.pool_size
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn available_bytes(&self) -> u64 {
        self.pool_size - self.used_bytes()
    }

    pub fn pressure_ratio(&self) -> f64 {
        self.used_bytes() as f64 / self.pool_size as f64
    }

    pub fn pressure_level(&self) -> PressureLevel {
        PressureLevel::from_ratio(self.pressure_ratio(), self.pressure_warning_pct, self.pressure_critical_pct)
    }

    /// Allocate `size` bytes on behalf of `pid`. Rounds up to the bucket
    /// minimum, splits the chosen block if the remainder is worth keeping,
    /// and checks/raises pressure events.
    pub fn allocate(&self, pid: Pid, size: u64) -> KernelResult<u64> {
        if size == 0 {
            return Err(KernelError::InvalidArgument("allocation size must be > 0".into()));
        }

        let (address, block_size) = self.free_list.take(size).ok_or_else(|| KernelError::OutOfMemory {
            requested: size,
            available: self.available_bytes(),
            used: self.used_bytes(),
            total: self.pool_size,
        })?;

        let mut blocks = self.blocks.lock();
        let existing = *blocks.get(&address).expect("free list address must exist in blocks map");
        debug_assert_eq!(existing.state, BlockState::Free);

        // Carve out the requested size (never less than the allocator's
        // floor) and keep whatever is left over as a free block — unless
        // the leftover is too small to ever be handed out again, in which
        // case it's folded into this allocation instead of silently
        // vanishing from the pool's byte accounting.
        let target_alloc = size.max(MIN_BLOCK_SIZE).min(block_size);
        let spare = block_size - target_alloc;
        let (alloc_size, remainder) = if spare >= MIN_BLOCK_SIZE { (target_alloc, spare) } else { (block_size, 0) };

        if remainder > 0 {
            let remainder_addr = address + alloc_size;
            blocks.insert(
                remainder_addr,
                MemoryBlock {
                    address: remainder_addr,
                    size: remainder,
                    owner: None,
                    state: BlockState::Free,
                },
            );
            self.free_list.insert(remainder_addr, remainder);
        }

        blocks.insert(
            address,
            MemoryBlock {
                address,
                size: alloc_size,
                owner: Some(pid),
                state: BlockState::Allocated,
            },
        );
        drop(blocks);

        self.used_bytes.fetch_add(alloc_size, std::sync::atomic::Ordering::Relaxed);
        self.per_process.entry(pid).or_default().insert(address);
        self.contents.insert(address, vec![0u8; alloc_size as usize]);

        self.collector.emit(KernelEvent::MemoryAllocated {
            pid,
            address,
            size: alloc_size,
        });
        self.check_pressure();

        Ok(address)
    }

    /// Deallocate the block at `address`, owned by `pid`. Coalesces with
    /// either adjacent neighbour that is also free.
    pub fn deallocate(&self, pid: Pid, address: u64) -> KernelResult<u64> {
        let freed = self.deallocate_checked(Some(pid), address)?;
        self.maybe_run_internal_gc();
        Ok(freed)
    }

    fn deallocate_checked(&self, expected_owner: Option<Pid>, address: u64) -> KernelResult<u64> {
        let mut blocks = self.blocks.lock();
        let block = *blocks.get(&address).ok_or(KernelError::InvalidAddress(address))?;
        if block.state != BlockState::Allocated {
            return Err(KernelError::InvalidAddress(address));
        }
        if let Some(owner) = expected_owner {
            if block.owner != Some(owner) {
                return Err(KernelError::ProtectionViolation);
            }
        }

        let freed_size = block.size;
        let mut merged_address = address;
        let mut merged_size = freed_size;

        // Right neighbour.
        if let Some((&next_addr, &next_block)) = blocks.range(address + 1..).next() {
            if next_addr == address + freed_size && next_block.state == BlockState::Free {
                self.free_list.remove(next_addr, next_block.size);
                blocks.remove(&next_addr);
                merged_size += next_block.size;
            }
        }

        // Left neighbour: find the block whose range ends exactly at `address`.
        if let Some((&prev_addr, &prev_block)) = blocks.range(..address).next_back() {
            if prev_block.state == BlockState::Free && prev_addr + prev_block.size == address {
                self.free_list.remove(prev_addr, prev_block.size);
                blocks.remove(&prev_addr);
                merged_address = prev_addr;
                merged_size += prev_block.size;
            }
        }

        blocks.insert(
            merged_address,
            MemoryBlock {
                address: merged_address,
                size: merged_size,
                owner: None,
                state: BlockState::Free,
            },
        );
        drop(blocks);

        self.contents.remove(&address);
        self.free_list.insert(merged_address, merged_size);
        self.used_bytes.fetch_sub(freed_size, std::sync::atomic::Ordering::Relaxed);
        let owner = expected_owner.or(block.owner);
        if let Some(owner) = owner {
            if let Some(mut set) = self.per_process.get_mut(&owner) {
                set.remove(&address);
            }
        }

        self.gc.lock().deallocations_since_pass += 1;
        self.collector.emit(KernelEvent::MemoryDeallocated {
            pid: expected_owner.unwrap_or(Pid(0)),
            address,
            size: freed_size,
        });

        Ok(freed_size)
    }

    /// Write `data` into the block at `address`, bounds-checked against the
    /// block's allocated size. No partial writes: either the whole slice
    /// fits or nothing is written.
    pub fn write(&self, pid: Pid, address: u64, data: &[u8]) -> KernelResult<()> {
        let blocks = self.blocks.lock();
        let block = *blocks.get(&address).ok_or(KernelError::InvalidAddress(address))?;
        if block.state != BlockState::Allocated {
            return Err(KernelError::InvalidAddress(address));
        }
        if block.owner != Some(pid) {
            return Err(KernelError::ProtectionViolation);
        }
        if data.len() as u64 > block.size {
            return Err(KernelError::InvalidArgument(format!(
                "write of {} bytes exceeds block size {}",
                data.len(),
                block.size
            )));
        }
        drop(blocks);

        let mut contents = self.contents.get_mut(&address).ok_or(KernelError::InvalidAddress(address))?;
        contents[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read back up to `len` bytes from the block at `address`.
    pub fn read(&self, pid: Pid, address: u64, len: u64) -> KernelResult<Vec<u8>> {
        let blocks = self.blocks.lock();
        let block = *blocks.get(&address).ok_or(KernelError::InvalidAddress(address))?;
        if block.state != BlockState::Allocated {
            return Err(KernelError::InvalidAddress(address));
        }
        if block.owner != Some(pid) {
            return Err(KernelError::ProtectionViolation);
        }
        if len > block.size {
            return Err(KernelError::InvalidArgument(format!(
                "read of {} bytes exceeds block size {}",
                len, block.size
            )));
        }
        drop(blocks);

        let contents = self.contents.get(&address).ok_or(KernelError::InvalidAddress(address))?;
        Ok(contents[..len as usize].to_vec())
    }

    fn check_pressure(&self) {
        let ratio = self.pressure_ratio();
        match self.pressure_level() {
            PressureLevel::High => self.collector.emit(KernelEvent::MemoryPressureHigh { used_ratio: ratio }),
            PressureLevel::Critical => {
                self.collector.emit(KernelEvent::MemoryPressureCritical { used_ratio: ratio });
            }
            _ => {}
        }
    }

    /// Internal GC: runs once more than `gc_block_threshold` deallocations
    /// have happened since the last pass. Coalescing is already eager, so
    /// this pass is non-mutating; it just emits a summary.
    fn maybe_run_internal_gc(&self) {
        let mut state = self.gc.lock();
        if state.deallocations_since_pass > self.gc_block_threshold {
            state.deallocations_since_pass = 0;
            drop(state);
            self.collector.emit(KernelEvent::GcCompleted {
                reclaimed_bytes: 0,
                blocks: 0,
            });
        }
    }

    pub fn process_memory(&self, pid: Pid) -> u64 {
        self.per_process
            .get(&pid)
            .map(|set| {
                let blocks = self.blocks.lock();
                set.iter().filter_map(|addr| blocks.get(addr)).map(|b| b.size).sum()
            })
            .unwrap_or(0)
    }

    pub fn process_allocations(&self, pid: Pid) -> Vec<AllocationView> {
        self.per_process
            .get(&pid)
            .map(|set| {
                let blocks = self.blocks.lock();
                set.iter()
                    .filter_map(|addr| blocks.get(addr))
                    .map(|b| AllocationView { address: b.address, size: b.size })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Release every block `pid` owns, e.g. as part of process termination.
    /// Returns the total bytes freed.
    pub fn free_process_memory(&self, pid: Pid) -> u64 {
        let addresses: Vec<u64> = self
            .per_process
            .get(&pid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        let mut freed = 0u64;
        for address in addresses {
            if let Ok(size) = self.deallocate_checked(Some(pid), address) {
                freed += size;
            }
        }
        self.per_process.remove(&pid);
        freed
    }

    /// Global GC: reclaim memory owned by pids in `candidates`, filtered by
    /// `strategy`. The caller is responsible for restricting `candidates`
    /// to processes in `Terminated`/`Zombie` state — the memory manager has
    /// no notion of process lifecycle.
    pub fn collect(&self, strategy: GcStrategy, candidates: &[Pid]) -> GcSummary {
        let targets: Vec<Pid> = match strategy {
            GcStrategy::Global | GcStrategy::Unreferenced => candidates.to_vec(),
            GcStrategy::Threshold(min_bytes) => candidates
                .iter()
                .copied()
                .filter(|&pid| self.process_memory(pid) > min_bytes)
                .collect(),
            GcStrategy::Targeted(pid) => candidates.iter().copied().filter(|&p| p == pid).collect(),
        };

        let mut reclaimed_bytes = 0u64;
        let mut blocks_reclaimed = 0usize;
        for pid in targets {
            let allocations = self.process_allocations(pid);
            blocks_reclaimed += allocations.len();
            reclaimed_bytes += self.free_process_memory(pid);
        }

        self.gc.lock().last_auto_collect = Some(Instant::now());
        self.collector.emit(KernelEvent::GcCompleted {
            reclaimed_bytes,
            blocks: blocks_reclaimed,
        });
        GcSummary { reclaimed_bytes, blocks_reclaimed }
    }

    /// Whether an automatic global GC pass should run: pressure at or above
    /// the configured threshold, and at least `gc_min_interval` since the
    /// last auto-collect.
    pub fn should_auto_collect(&self) -> bool {
        let pressure_pct = (self.pressure_ratio() * 100.0) as u8;
        if pressure_pct < self.gc_auto_collect_pressure_pct {
            return false;
        }
        let state = self.gc.lock();
        match state.last_auto_collect {
            None => true,
            Some(last) => last.elapsed() >= self.gc_min_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::null_collector;

    fn mgr(pool: u64) -> MemoryManager {
        MemoryManager::new(pool, null_collector())
    }

    #[test]
    fn allocate_zero_is_invalid_argument() {
        let m = mgr(1 << 20);
        assert!(matches!(m.allocate(Pid(1), 0), Err(KernelError::InvalidArgument(_))));
    }

    #[test]
    fn allocate_exactly_pool_size_then_any_more_is_oom() {
        let m = mgr(4096);
        let addr = m.allocate(Pid(1), 4096).unwrap();
        assert_eq!(addr, 0);
        assert!(matches!(m.allocate(Pid(1), 1), Err(KernelError::OutOfMemory { .. })));
    }

    #[test]
    fn allocate_then_dealloc_returns_used_bytes_to_baseline() {
        let m = mgr(1 << 20);
        let baseline = m.used_bytes();
        let addr = m.allocate(Pid(1), 1024).unwrap();
        assert!(m.used_bytes() > baseline);
        m.deallocate(Pid(1), addr).unwrap();
        assert_eq!(m.used_bytes(), baseline);
    }

    #[test]
    fn write_then_read_round_trips_and_dealloc_invalidates() {
        let m = mgr(1 << 20);
        let addr = m.allocate(Pid(1), 1024).unwrap();
        m.write(Pid(1), addr, &[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(m.read(Pid(1), addr, 3).unwrap(), vec![0x01, 0x02, 0x03]);
        m.deallocate(Pid(1), addr).unwrap();
        assert!(matches!(m.read(Pid(1), addr, 3), Err(KernelError::InvalidAddress(_))));
    }

    #[test]
    fn write_beyond_block_size_is_invalid_argument_no_partial_write() {
        let m = mgr(1 << 20);
        let addr = m.allocate(Pid(1), 64).unwrap();
        let oversized = vec![0xAAu8; 1000];
        assert!(matches!(m.write(Pid(1), addr, &oversized), Err(KernelError::InvalidArgument(_))));
        assert_eq!(m.read(Pid(1), addr, 64).unwrap(), vec![0u8; 64]);
    }

    #[test]
    fn dealloc_unknown_address_is_invalid_address() {
        let m = mgr(1 << 20);
        assert!(matches!(m.deallocate(Pid(1), 999_999), Err(KernelError::InvalidAddress(_))));
    }

    #[test]
    fn dealloc_by_non_owner_is_protection_violation() {
        let m = mgr(1 << 20);
        let addr = m.allocate(Pid(1), 1024).unwrap();
        assert!(matches!(m.deallocate(Pid(2), addr), Err(KernelError::ProtectionViolation)));
    }

    #[test]
    fn three_allocations_freed_out_of_order_fully_coalesce() {
        let m = mgr(1 << 20);
        let a = m.allocate(Pid(1), 1024).unwrap();
        let b = m.allocate(Pid(1), 1024).unwrap();
        let c = m.allocate(Pid(1), 1024).unwrap();
        m.deallocate(Pid(1), b).unwrap();
        m.deallocate(Pid(1), a).unwrap();
        m.deallocate(Pid(1), c).unwrap();

        let blocks = m.blocks.lock();
        assert_eq!(blocks.len(), 1);
        let only = blocks.values().next().unwrap();
        assert_eq!(only.state, BlockState::Free);
        assert!(only.size >= 3 * 1024);
    }

    #[test]
    fn process_memory_sums_owned_blocks() {
        let m = mgr(1 << 20);
        m.allocate(Pid(1), 1024).unwrap();
        m.allocate(Pid(1), 2048).unwrap();
        m.allocate(Pid(2), 512).unwrap();
        assert!(m.process_memory(Pid(1)) >= 1024 + 2048);
        assert!(m.process_memory(Pid(2)) >= 512);
    }

    #[test]
    fn free_process_memory_releases_everything() {
        let m = mgr(1 << 20);
        m.allocate(Pid(1), 1024).unwrap();
        m.allocate(Pid(1), 2048).unwrap();
        let freed = m.free_process_memory(Pid(1));
        assert!(freed >= 1024 + 2048);
        assert_eq!(m.process_memory(Pid(1)), 0);
    }

    #[test]
    fn pressure_escalates_with_usage() {
        let m = mgr(1000);
        assert_eq!(m.pressure_level(), PressureLevel::Low);
        m.allocate(Pid(1), 960).unwrap();
        assert_eq!(m.pressure_level(), PressureLevel::Critical);
    }

    #[test]
    fn collect_targeted_only_reclaims_named_pid() {
        let m = mgr(1 << 20);
        m.allocate(Pid(1), 1024).unwrap();
        m.allocate(Pid(2), 1024).unwrap();
        let summary = m.collect(GcStrategy::Targeted(Pid(1)), &[Pid(1), Pid(2)]);
        assert!(summary.reclaimed_bytes >= 1024);
        assert_eq!(m.process_memory(Pid(1)), 0);
        assert!(m.process_memory(Pid(2)) > 0);
    }
}
