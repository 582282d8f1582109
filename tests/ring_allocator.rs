use anyhow::Result;
use ash::vk;
use rayon::prelude::*;

use deimos::allocator::ring_allocator::{Block, ChunkInfo};
use deimos::{RingAllocation, RingAllocator, RingAllocatorSettings};

use framework::MockProvider;

mod framework;

fn settings(min_capacity: vk::DeviceSize) -> RingAllocatorSettings {
    RingAllocatorSettings {
        min_capacity,
        growth_factor: 2,
        ..Default::default()
    }
}

fn check_chunk(chunk: &ChunkInfo) {
    let mut offset = 0;
    let mut used = 0;
    let mut previous_free = false;
    for block in &chunk.blocks {
        assert_eq!(block.offset, offset, "blocks must be sorted and contiguous");
        assert!(block.size > 0, "blocks must not be empty");
        assert!(!(previous_free && block.free), "adjacent free blocks must be merged");
        if !block.free {
            used += block.size;
        }
        previous_free = block.free;
        offset += block.size;
    }
    assert_eq!(offset, chunk.capacity, "blocks must cover the whole chunk");
    assert_eq!(used, chunk.used);
    assert!(chunk.tail <= chunk.capacity);
}

#[test]
pub fn first_allocation_creates_a_chunk() -> Result<()> {
    let provider = MockProvider::default();
    let ring = RingAllocator::new(provider.clone(), settings(64 * 1024));
    assert_eq!(ring.capacity()?, 0, "no chunk should exist before the first allocation");

    let allocation = ring.allocate(100)?;
    assert_eq!(allocation.offset(), 0);
    assert_eq!(allocation.size(), 112, "sizes are rounded up to 16 bytes");

    let chunks = ring.chunks()?;
    assert_eq!(chunks.len(), 1);
    assert_eq!(
        chunks[0].blocks,
        vec![
            Block {
                offset: 0,
                size: 112,
                free: false
            },
            Block {
                offset: 112,
                size: 65424,
                free: true
            },
        ]
    );
    assert_eq!(ring.used()?, 112);
    assert_eq!(provider.created(), 1);

    ring.free(allocation)?;
    let chunks = ring.chunks()?;
    assert_eq!(
        chunks[0].blocks,
        vec![Block {
            offset: 0,
            size: 65536,
            free: true
        }]
    );
    assert_eq!(ring.used()?, 0);
    // The newest chunk stays around after it becomes empty.
    assert_eq!(provider.live(), 1);
    Ok(())
}

#[test]
pub fn allocations_do_not_overlap() -> Result<()> {
    let ring = RingAllocator::new(MockProvider::default(), settings(4096));
    let mut allocations = (1..=20u64).map(|i| ring.allocate(i * 8)).collect::<Result<Vec<_>>>()?;
    allocations.sort_by_key(|a| (a.buffer(), a.offset()));
    for pair in allocations.windows(2) {
        if pair[0].buffer() == pair[1].buffer() {
            assert!(pair[0].offset() + pair[0].size() <= pair[1].offset());
        }
    }
    for allocation in allocations.iter_mut() {
        let size = allocation.size() as usize;
        allocation.mapped_slice()?.fill(0xAB);
        assert_eq!(allocation.mapped_slice()?.len(), size);
    }
    for allocation in allocations {
        ring.free(allocation)?;
    }
    assert_eq!(ring.used()?, 0);
    Ok(())
}

#[test]
pub fn grows_and_destroys_old_empty_chunks() -> Result<()> {
    let provider = MockProvider::default();
    let ring = RingAllocator::new(provider.clone(), settings(1024));

    let first = ring.allocate(1024)?;
    let second = ring.allocate(16)?;
    assert_eq!(provider.created(), 2, "a full chunk must trigger a new chunk");
    assert_eq!(*provider.sizes.lock().unwrap(), vec![1024, 2048]);
    assert_eq!(ring.capacity()?, 3072);
    assert_ne!(first.buffer(), second.buffer());

    ring.free(first)?;
    assert_eq!(provider.live(), 1, "an empty chunk that is not the newest is destroyed");
    assert_eq!(ring.chunks()?.len(), 1);

    ring.free(second)?;
    assert_eq!(provider.live(), 1);
    Ok(())
}

#[test]
pub fn growth_destroys_an_empty_newest_chunk() -> Result<()> {
    let provider = MockProvider::default();
    let ring = RingAllocator::new(provider.clone(), settings(1024));
    let small = ring.allocate(16)?;
    ring.free(small)?;
    assert_eq!(provider.live(), 1);

    let big = ring.allocate(4096)?;
    assert_eq!(*provider.sizes.lock().unwrap(), vec![1024, 4096]);
    assert_eq!(provider.live(), 1, "the empty chunk is destroyed once a newer chunk replaces it");
    assert_eq!(ring.chunks()?.len(), 1);

    ring.free(big)?;
    assert_eq!(provider.live(), 1);
    assert_eq!(ring.capacity()?, 4096);
    Ok(())
}

#[test]
pub fn oversized_requests_get_a_fitting_chunk() -> Result<()> {
    let provider = MockProvider::default();
    let ring = RingAllocator::new(provider.clone(), settings(1024));
    let allocation = ring.allocate(5000)?;
    assert_eq!(allocation.size(), 5008);
    assert_eq!(ring.capacity()?, 5008);
    ring.free(allocation)?;
    Ok(())
}

#[test]
pub fn holes_are_reused() -> Result<()> {
    let ring = RingAllocator::new(MockProvider::default(), settings(1024));
    let a = ring.allocate(64)?;
    let b = ring.allocate(64)?;
    let _c = ring.allocate(64)?;
    let hole = a.offset();
    ring.free(a)?;
    let d = ring.allocate(32)?;
    assert_eq!(d.offset(), hole, "a fitting hole is preferred over the tail");
    assert_eq!(d.buffer(), b.buffer());
    Ok(())
}

#[test]
pub fn block_invariants_hold_under_mixed_use() -> Result<()> {
    let ring = RingAllocator::new(MockProvider::default(), settings(2048));
    let mut live: Vec<RingAllocation> = vec![];
    // Small deterministic LCG so the sequence is reproducible.
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        seed >> 33
    };

    for _ in 0..500 {
        if live.is_empty() || next() % 3 != 0 {
            live.push(ring.allocate(next() % 300 + 1)?);
        } else {
            let index = (next() as usize) % live.len();
            ring.free(live.swap_remove(index))?;
        }
        let chunks = ring.chunks()?;
        chunks.iter().for_each(check_chunk);
        let used: u64 = chunks.iter().map(|c| c.used).sum();
        assert_eq!(used, live.iter().map(|a| a.size()).sum::<u64>());
    }

    for allocation in live.drain(..) {
        ring.free(allocation)?;
    }
    assert_eq!(ring.used()?, 0);
    assert_eq!(ring.chunks()?.len(), 1, "only the newest chunk survives");
    Ok(())
}

#[test]
pub fn reset_keeps_only_the_newest_chunk() -> Result<()> {
    let provider = MockProvider::default();
    let ring = RingAllocator::new(provider.clone(), settings(1024));
    let stale = ring.allocate(1000)?;
    let _other = ring.allocate(1000)?;
    assert_eq!(provider.live(), 2);

    // SAFETY: nothing uses the allocations.
    unsafe { ring.reset()? };
    assert_eq!(provider.live(), 1);
    assert_eq!(ring.used()?, 0);
    let chunks = ring.chunks()?;
    assert_eq!(chunks[0].blocks.len(), 1);
    assert_eq!(chunks[0].tail, 0);

    // Freeing an allocation from before the reset is ignored.
    ring.free(stale)?;
    assert_eq!(ring.used()?, 0);

    let fresh = ring.allocate(16)?;
    assert_eq!(fresh.offset(), 0);
    Ok(())
}

#[test]
pub fn freeing_everything_then_resetting_leaves_one_free_block() -> Result<()> {
    let provider = MockProvider::default();
    let ring = RingAllocator::new(provider.clone(), settings(512));
    let allocations = (1..=40u64).map(|i| ring.allocate(i * 12)).collect::<Result<Vec<_>>>()?;
    assert!(provider.created() > 1);

    // Every other allocation first, then the rest back to front.
    let (first, second): (Vec<_>, Vec<_>) = allocations.into_iter().enumerate().partition(|(i, _)| i % 2 == 0);
    for (_, allocation) in first.into_iter().chain(second.into_iter().rev()) {
        ring.free(allocation)?;
    }
    assert_eq!(ring.used()?, 0);

    // SAFETY: every allocation was freed.
    unsafe { ring.reset()? };
    let chunks = ring.chunks()?;
    assert_eq!(chunks.len(), 1);
    assert_eq!(provider.live(), 1);
    assert_eq!(
        chunks[0].blocks,
        vec![Block {
            offset: 0,
            size: chunks[0].capacity,
            free: true
        }]
    );
    Ok(())
}

#[test]
pub fn shared_between_threads() -> Result<()> {
    let ring = RingAllocator::new(MockProvider::default(), settings(4096));
    let allocations = (0..256u64)
        .into_par_iter()
        .map(|i| ring.allocate(16 + (i % 7) * 16))
        .collect::<Result<Vec<_>>>()?;
    let total: u64 = allocations.iter().map(|a| a.size()).sum();
    assert_eq!(ring.used()?, total);
    allocations
        .into_par_iter()
        .try_for_each(|allocation| ring.free(allocation))?;
    assert_eq!(ring.used()?, 0);
    Ok(())
}
