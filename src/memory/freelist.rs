//! Segregated free list
//!
//! Free blocks are partitioned by size class so the common case — small and
//! medium allocations — is an O(1) bucket pop. Large blocks fall back to a
//! best-fit search over an ordered map. Each tier has its own lock so a
//! large-object search never blocks a small allocation (concurrency model
//! §5: "fine-grained locks per tier").

use std::collections::BTreeMap;

use parking_lot::Mutex;

/// Minimum block size the allocator ever hands out.
pub const MIN_BLOCK_SIZE: u64 = 64;

/// Boundary between the small and medium tiers.
pub const SMALL_MEDIUM_BOUNDARY: u64 = 4 * 1024;

/// Boundary between the medium and large tiers.
pub const MEDIUM_LARGE_BOUNDARY: u64 = 64 * 1024;

/// Small-tier size classes: 12 buckets spanning 64B..4KiB, doubling with an
/// extra midpoint step per octave (a conventional jemalloc-style spread).
const SMALL_SIZE_CLASSES: [u64; 12] = [
    64, 96, 128, 192, 256, 384, 512, 768, 1024, 1536, 2048, 4096,
];

/// Number of medium buckets implied by the manager's own bucket formula,
/// `(size - 1) / 4096`, over the medium range (4KiB, 64KiB].
pub const MEDIUM_BUCKET_COUNT: usize = 16;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SizeClass {
    Small(usize),
    Medium(usize),
    Large,
}

/// Classify a block's real size into the bucket it should live in. The
/// returned `u64` is the bucket's size-class ceiling, used only to pick a
/// bucket on `insert`/`remove` — the free list always tracks and returns
/// the block's *actual* size, never this ceiling, so it never disagrees
/// with the master block map.
pub fn classify(size: u64) -> (u64, SizeClass) {
    let size = size.max(MIN_BLOCK_SIZE);
    if size <= SMALL_MEDIUM_BOUNDARY {
        let idx = SMALL_SIZE_CLASSES
            .iter()
            .position(|&class_size| class_size >= size)
            .unwrap_or(SMALL_SIZE_CLASSES.len() - 1);
        (SMALL_SIZE_CLASSES[idx], SizeClass::Small(idx))
    } else if size <= MEDIUM_LARGE_BOUNDARY {
        let idx = (((size - 1) / 4096) as usize).min(MEDIUM_BUCKET_COUNT - 1);
        let bucket_ceiling = (idx as u64 + 1) * 4096;
        (bucket_ceiling, SizeClass::Medium(idx))
    } else {
        (size, SizeClass::Large)
    }
}

pub struct SegregatedFreeList {
    small: Vec<Mutex<Vec<(u64, u64)>>>,
    medium: Vec<Mutex<Vec<(u64, u64)>>>,
    large: Mutex<BTreeMap<u64, Vec<u64>>>,
}

impl SegregatedFreeList {
    pub fn new() -> Self {
        Self {
            small: (0..SMALL_SIZE_CLASSES.len()).map(|_| Mutex::new(Vec::new())).collect(),
            medium: (0..MEDIUM_BUCKET_COUNT).map(|_| Mutex::new(Vec::new())).collect(),
            large: Mutex::new(BTreeMap::new()),
        }
    }

    /// Insert a free block of `size` at `address` into its bucket. The
    /// bucket is chosen by `size`'s class, but the real `size` travels
    /// with the address so a later `take` never has to guess it back.
    pub fn insert(&self, address: u64, size: u64) {
        let (_, class) = classify(size);
        match class {
            SizeClass::Small(idx) => self.small[idx].lock().push((address, size)),
            SizeClass::Medium(idx) => self.medium[idx].lock().push((address, size)),
            SizeClass::Large => self.large.lock().entry(size).or_default().push(address),
        }
    }

    /// Remove a specific address from the bucket matching `size`. Used
    /// during coalescing, where the exact neighbour must be pulled out of
    /// whatever bucket it occupies.
    pub fn remove(&self, address: u64, size: u64) -> bool {
        let (_, class) = classify(size);
        match class {
            SizeClass::Small(idx) => remove_addr_from(&self.small[idx], address),
            SizeClass::Medium(idx) => remove_addr_from(&self.medium[idx], address),
            SizeClass::Large => {
                let mut large = self.large.lock();
                if let Some(bucket) = large.get_mut(&size) {
                    let found = remove_value(bucket, address);
                    if bucket.is_empty() {
                        large.remove(&size);
                    }
                    found
                } else {
                    false
                }
            }
        }
    }

    /// Find and remove a free block at least `size` bytes, returning its
    /// real `(address, size)`. Starts in the bucket `size` classifies
    /// into and, if nothing there fits, widens the search to larger
    /// buckets and then the next tier up — a bucket only ever holds
    /// blocks whose size rounds up to that bucket's ceiling, not blocks
    /// of exactly that size, so same-tier buckets above the starting one
    /// can still hold a fit. A freshly seeded pool is one single block
    /// that lands wherever its total size classifies (the large tier for
    /// any pool bigger than 64 KiB), so small/medium requests must be
    /// able to fall through to it.
    pub fn take(&self, size: u64) -> Option<(u64, u64)> {
        let (_, class) = classify(size);
        match class {
            SizeClass::Small(idx) => take_from_tier(&self.small[idx..], size)
                .or_else(|| take_from_tier(&self.medium, size))
                .or_else(|| self.take_from_large(size)),
            SizeClass::Medium(idx) => take_from_tier(&self.medium[idx..], size).or_else(|| self.take_from_large(size)),
            SizeClass::Large => self.take_from_large(size),
        }
    }

    fn take_from_large(&self, size: u64) -> Option<(u64, u64)> {
        let mut large = self.large.lock();
        let key = *large.range(size..).next().map(|(k, _)| k)?;
        let bucket = large.get_mut(&key).unwrap();
        let addr = bucket.pop().unwrap();
        if bucket.is_empty() {
            large.remove(&key);
        }
        Some((addr, key))
    }
}

impl Default for SegregatedFreeList {
    fn default() -> Self {
        Self::new()
    }
}

/// Search a run of same-tier buckets (in ceiling order) for the first
/// entry whose real size fits `min_size`, popping and returning it.
fn take_from_tier(buckets: &[Mutex<Vec<(u64, u64)>>], min_size: u64) -> Option<(u64, u64)> {
    for bucket in buckets {
        let mut guard = bucket.lock();
        if let Some(pos) = guard.iter().position(|&(_, size)| size >= min_size) {
            return Some(guard.swap_remove(pos));
        }
    }
    None
}

fn remove_addr_from(bucket: &Mutex<Vec<(u64, u64)>>, address: u64) -> bool {
    let mut guard = bucket.lock();
    if let Some(pos) = guard.iter().position(|&(addr, _)| addr == address) {
        guard.swap_remove(pos);
        true
    } else {
        false
    }
}

fn remove_value(bucket: &mut Vec<u64>, address: u64) -> bool {
    if let Some(pos) = bucket.iter().position(|&a| a == address) {
        bucket.swap_remove(pos);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_allocation_round_trips_through_its_bucket() {
        let fl = SegregatedFreeList::new();
        fl.insert(1000, 100);
        let (addr, size) = fl.take(100).unwrap();
        assert_eq!(addr, 1000);
        assert!(size >= 100);
    }

    #[test]
    fn large_take_is_best_fit() {
        let fl = SegregatedFreeList::new();
        fl.insert(10, 200_000);
        fl.insert(20, 100_000);
        let (addr, size) = fl.take(90_000).unwrap();
        assert_eq!(addr, 20);
        assert_eq!(size, 100_000);
    }

    #[test]
    fn remove_pulls_exact_neighbour_out() {
        let fl = SegregatedFreeList::new();
        fl.insert(500, 64);
        assert!(fl.remove(500, 64));
        assert!(fl.take(64).is_none());
    }
}
