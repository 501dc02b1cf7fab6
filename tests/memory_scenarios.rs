//! End-to-end memory manager scenarios.

use corekernel::collector::null_collector;
use corekernel::error::KernelError;
use corekernel::memory::MemoryManager;
use corekernel::process::Pid;

const POOL_SIZE: u64 = 1 << 20;

#[test]
fn allocation_then_deallocation_round_trip() {
    let memory = MemoryManager::new(POOL_SIZE, null_collector());
    let pid = Pid(1);
    let start_used = memory.used_bytes();

    let addr = memory.allocate(pid, 1024).unwrap();
    memory.write(pid, addr, &[0x01, 0x02, 0x03]).unwrap();
    assert_eq!(memory.read(pid, addr, 3).unwrap(), vec![0x01, 0x02, 0x03]);

    memory.deallocate(pid, addr).unwrap();
    assert!(matches!(memory.read(pid, addr, 3), Err(KernelError::InvalidAddress(_))));
    assert_eq!(memory.used_bytes(), start_used);
}

#[test]
fn adjacent_blocks_coalesce_on_deallocation() {
    let memory = MemoryManager::new(POOL_SIZE, null_collector());
    let pid = Pid(1);

    let a = memory.allocate(pid, 1024).unwrap();
    let b = memory.allocate(pid, 1024).unwrap();
    let c = memory.allocate(pid, 1024).unwrap();

    memory.deallocate(pid, b).unwrap();
    memory.deallocate(pid, a).unwrap();
    memory.deallocate(pid, c).unwrap();

    // A single 3072-byte allocation should now land back at `a`, proving
    // the three freed blocks merged into one contiguous span.
    let merged = memory.allocate(pid, 3072).unwrap();
    assert_eq!(merged, a);
}

#[test]
fn process_memory_sums_only_that_processs_allocated_blocks() {
    let memory = MemoryManager::new(POOL_SIZE, null_collector());
    let (p1, p2) = (Pid(1), Pid(2));

    let a = memory.allocate(p1, 512).unwrap();
    memory.allocate(p2, 256).unwrap();
    assert_eq!(memory.process_memory(p1), 512);

    memory.deallocate(p1, a).unwrap();
    assert_eq!(memory.process_memory(p1), 0);
}

#[test]
fn allocating_zero_bytes_is_invalid_argument() {
    let memory = MemoryManager::new(POOL_SIZE, null_collector());
    assert!(matches!(
        memory.allocate(Pid(1), 0),
        Err(KernelError::InvalidArgument(_))
    ));
}

#[test]
fn allocating_the_entire_pool_then_anything_else_is_out_of_memory() {
    let memory = MemoryManager::new(4096, null_collector());
    memory.allocate(Pid(1), 4096).unwrap();
    assert!(matches!(
        memory.allocate(Pid(1), 1),
        Err(KernelError::OutOfMemory { .. })
    ));
}

#[test]
fn write_beyond_segment_bounds_is_invalid_argument_with_no_partial_write() {
    let memory = MemoryManager::new(POOL_SIZE, null_collector());
    let pid = Pid(1);
    let addr = memory.allocate(pid, 64).unwrap();

    let oversized = vec![0xAB; 128];
    assert!(matches!(
        memory.write(pid, addr, &oversized),
        Err(KernelError::InvalidArgument(_))
    ));
    assert_eq!(memory.read(pid, addr, 64).unwrap(), vec![0u8; 64]);
}
