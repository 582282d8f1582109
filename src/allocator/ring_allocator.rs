//! Growable ring allocator for transient, host-visible memory.
//!
//! The allocator owns a list of chunks, each backed by one buffer from a [`BufferProvider`]. A chunk is partitioned into
//! blocks sorted by offset. Allocations are carved from free blocks, and freeing merges neighbouring free blocks again.
//! When no chunk has room, a new chunk is created that is at least `growth_factor` times larger than the previous one,
//! so the allocator quickly settles at a size that fits the workload.
//!
//! Every operation is serialized through one mutex. Cloning a [`RingAllocator`] gives another handle to the same
//! allocator, so it can be handed to every recording thread.
//!
//! # Example
//! ```
//! # use deimos::prelude::*;
//! # use anyhow::Result;
//! # use deimos::allocator::provider::BufferProvider;
//! fn write_uniforms<P: BufferProvider>(ring: &RingAllocator<P>, data: &[u8]) -> Result<RingAllocation> {
//!     let mut allocation = ring.allocate(data.len() as u64)?;
//!     allocation.mapped_slice()?[..data.len()].copy_from_slice(data);
//!     Ok(allocation)
//! }
//! ```

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;

use crate::allocator::provider::{BufferProvider, DeviceBufferProvider, HostBuffer};
use crate::util::align::align;
use crate::{BufferRange, Error};

/// Every allocation size and offset is a multiple of this.
pub const RING_ALIGNMENT: vk::DeviceSize = 16;

/// Configuration of a [`RingAllocator`].
#[derive(Debug, Copy, Clone)]
pub struct RingAllocatorSettings {
    /// Capacity of the first chunk, and lower bound for every chunk after it.
    pub min_capacity: vk::DeviceSize,
    /// Each new chunk is at least this many times larger than the previous one.
    pub growth_factor: u64,
    /// Usage flags of the chunk buffers.
    pub usage: vk::BufferUsageFlags,
}

impl Default for RingAllocatorSettings {
    fn default() -> Self {
        Self {
            min_capacity: 64 * 1024,
            growth_factor: 2,
            usage: vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::INDEX_BUFFER
                | vk::BufferUsageFlags::UNIFORM_BUFFER
                | vk::BufferUsageFlags::STORAGE_BUFFER,
        }
    }
}

/// A range of a chunk.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Block {
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
    pub free: bool,
}

/// Snapshot of a single chunk, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub capacity: vk::DeviceSize,
    pub used: vk::DeviceSize,
    /// End of the rightmost allocated block.
    pub tail: vk::DeviceSize,
    pub blocks: Vec<Block>,
}

/// Memory handed out by a [`RingAllocator`]. Must be given back through [`RingAllocator::free()`] once the GPU is done
/// with it.
#[derive(Debug)]
pub struct RingAllocation {
    chunk: u64,
    epoch: u64,
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    pointer: Option<NonNull<c_void>>,
}

// SAFETY: The pointer refers to mapped device memory, not to host data owned by another thread.
unsafe impl Send for RingAllocation {}
unsafe impl Sync for RingAllocation {}

impl RingAllocation {
    /// Mapped memory of this allocation.
    /// # Errors
    /// Fails if the chunk buffer is not host visible.
    pub fn mapped_slice(&mut self) -> Result<&mut [u8]> {
        match self.pointer {
            Some(pointer) => Ok(unsafe { std::slice::from_raw_parts_mut(pointer.cast::<u8>().as_ptr(), self.size as usize) }),
            None => Err(Error::UnmappableBuffer.into()),
        }
    }

    pub fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    /// Size of the allocation after alignment.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Handle of the chunk buffer this allocation lives in.
    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }
}

impl BufferRange for RingAllocation {
    fn buffer_handle(&self) -> vk::Buffer {
        self.buffer
    }

    fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

struct Chunk<B> {
    id: u64,
    buffer: B,
    capacity: vk::DeviceSize,
    blocks: Vec<Block>,
    tail: vk::DeviceSize,
    used: vk::DeviceSize,
}

impl<B: HostBuffer> Chunk<B> {
    fn new(id: u64, buffer: B, capacity: vk::DeviceSize) -> Self {
        Self {
            id,
            buffer,
            capacity,
            blocks: vec![Block {
                offset: 0,
                size: capacity,
                free: true,
            }],
            tail: 0,
            used: 0,
        }
    }

    /// Smallest free block below the tail that fits `size`.
    fn best_fit_hole(&self, size: vk::DeviceSize) -> Option<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| block.free && block.offset < self.tail && block.size >= size)
            .min_by_key(|(_, block)| block.size)
            .map(|(index, _)| index)
    }

    /// The free block starting at the tail, if the allocation fits in it.
    fn tail_block(&self, size: vk::DeviceSize) -> Option<usize> {
        if self.tail + size > self.capacity {
            return None;
        }
        self.blocks
            .iter()
            .rposition(|block| block.free && block.offset == self.tail)
    }

    fn find(&self, size: vk::DeviceSize) -> Option<usize> {
        self.best_fit_hole(size).or_else(|| self.tail_block(size))
    }

    fn take(&mut self, index: usize, size: vk::DeviceSize) -> vk::DeviceSize {
        let block = self.blocks[index];
        debug_assert!(block.free && block.size >= size);
        if block.size > size {
            self.blocks.insert(
                index + 1,
                Block {
                    offset: block.offset + size,
                    size: block.size - size,
                    free: true,
                },
            );
        }
        self.blocks[index] = Block {
            offset: block.offset,
            size,
            free: false,
        };
        self.used += size;
        self.tail = self.tail.max(block.offset + size);
        block.offset
    }

    fn release(&mut self, offset: vk::DeviceSize) {
        let index = match self.blocks.binary_search_by_key(&offset, |block| block.offset) {
            Ok(index) if !self.blocks[index].free => index,
            Ok(_) => panic!("ring allocator: block at offset {offset} in chunk {} freed twice", self.id),
            Err(_) => panic!("ring allocator: no block at offset {offset} in chunk {}", self.id),
        };
        self.blocks[index].free = true;
        self.used -= self.blocks[index].size;

        let mut merged: Vec<Block> = Vec::with_capacity(self.blocks.len());
        for block in self.blocks.drain(..) {
            match merged.last_mut() {
                Some(last) if last.free && block.free => last.size += block.size,
                _ => merged.push(block),
            }
        }
        self.blocks = merged;
        self.tail = self
            .blocks
            .iter()
            .rev()
            .find(|block| !block.free)
            .map_or(0, |block| block.offset + block.size);
    }

    fn reset(&mut self) {
        self.blocks = vec![Block {
            offset: 0,
            size: self.capacity,
            free: true,
        }];
        self.tail = 0;
        self.used = 0;
    }

    fn info(&self) -> ChunkInfo {
        ChunkInfo {
            capacity: self.capacity,
            used: self.used,
            tail: self.tail,
            blocks: self.blocks.clone(),
        }
    }
}

struct RingInner<P: BufferProvider> {
    provider: P,
    settings: RingAllocatorSettings,
    // Oldest first, so the newest chunk is the last one.
    chunks: Vec<Chunk<P::Buffer>>,
    next_id: u64,
    epoch: u64,
}

impl<P: BufferProvider> RingInner<P> {
    fn allocation(&self, chunk_index: usize, offset: vk::DeviceSize, size: vk::DeviceSize) -> RingAllocation {
        let chunk = &self.chunks[chunk_index];
        RingAllocation {
            chunk: chunk.id,
            epoch: self.epoch,
            buffer: chunk.buffer.handle(),
            offset,
            size,
            // SAFETY: offset + size lies inside the chunk buffer.
            pointer: chunk
                .buffer
                .mapped_ptr()
                .and_then(|p| NonNull::new(unsafe { p.as_ptr().cast::<u8>().add(offset as usize) }.cast::<c_void>())),
        }
    }

    fn grow(&mut self, size: vk::DeviceSize) -> Result<usize> {
        let last = self.chunks.last().map_or(0, |chunk| chunk.capacity);
        let capacity = align(
            self.settings
                .min_capacity
                .max(last.saturating_mul(self.settings.growth_factor))
                .max(size),
            RING_ALIGNMENT,
        );
        let buffer = self.provider.create_buffer(capacity)?;
        debug!("Ring allocator: created chunk {} with capacity {capacity} bytes", self.next_id);
        // The previous newest chunk is no longer protected once it stops being the newest.
        if self.chunks.last().map_or(false, |chunk| chunk.used == 0) {
            if let Some(chunk) = self.chunks.pop() {
                debug!("Ring allocator: destroying empty chunk {} ({} bytes)", chunk.id, chunk.capacity);
            }
        }
        self.chunks.push(Chunk::new(self.next_id, buffer, capacity));
        self.next_id += 1;
        Ok(self.chunks.len() - 1)
    }
}

/// Growable sub-allocator for transient memory. See the [module level documentation](self).
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct RingAllocator<P: BufferProvider = DeviceBufferProvider> {
    #[derivative(Debug = "ignore")]
    inner: Arc<Mutex<RingInner<P>>>,
}

impl<P: BufferProvider> Clone for RingAllocator<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: BufferProvider> RingAllocator<P> {
    /// Create an empty allocator. The first chunk is created on the first allocation.
    pub fn new(provider: P, settings: RingAllocatorSettings) -> Self {
        assert!(settings.growth_factor > 0, "ring allocator growth factor must be at least 1");
        Self {
            inner: Arc::new(Mutex::new(RingInner {
                provider,
                settings,
                chunks: vec![],
                next_id: 0,
                epoch: 0,
            })),
        }
    }

    /// Allocate `size` bytes, rounded up to [`RING_ALIGNMENT`]. Searches the newest chunk first, then older chunks,
    /// and creates a new chunk if none has room.
    /// # Errors
    /// * Fails if creating a new chunk fails.
    /// * Fails if the internal lock is poisoned.
    pub fn allocate(&self, size: vk::DeviceSize) -> Result<RingAllocation> {
        let size = align(size.max(1), RING_ALIGNMENT);
        let mut inner = self.inner.lock().map_err(|_| Error::PoisonError)?;
        let found = inner
            .chunks
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, chunk)| chunk.find(size).map(|block| (index, block)));
        let (chunk_index, block_index) = match found {
            Some(found) => found,
            None => (inner.grow(size)?, 0),
        };
        let offset = inner.chunks[chunk_index].take(block_index, size);
        Ok(inner.allocation(chunk_index, offset, size))
    }

    /// Give an allocation back. Chunks other than the newest are destroyed once they are completely free.
    /// Allocations made before the last [`RingAllocator::reset()`] are ignored.
    /// # Panics
    /// Panics if the allocation does not belong to this allocator or was already freed.
    pub fn free(&self, allocation: RingAllocation) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| Error::PoisonError)?;
        if allocation.epoch != inner.epoch {
            trace!("Ring allocator: ignoring free of allocation from before the last reset");
            return Ok(());
        }
        let index = match inner.chunks.iter().position(|chunk| chunk.id == allocation.chunk) {
            Some(index) => index,
            None => panic!("ring allocator: freed allocation from unknown chunk {}", allocation.chunk),
        };
        inner.chunks[index].release(allocation.offset);
        let newest = inner.chunks.len() - 1;
        if index != newest && inner.chunks[index].used == 0 {
            let chunk = inner.chunks.remove(index);
            debug!("Ring allocator: destroying empty chunk {} ({} bytes)", chunk.id, chunk.capacity);
        }
        Ok(())
    }

    /// Destroy every chunk except the newest, and make the newest chunk one free block again.
    /// # Safety
    /// The GPU must be done with every outstanding allocation, and mapped slices of them must no longer be used.
    pub unsafe fn reset(&self) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| Error::PoisonError)?;
        let count = inner.chunks.len();
        if count > 1 {
            inner.chunks.drain(..count - 1);
        }
        if let Some(chunk) = inner.chunks.last_mut() {
            chunk.reset();
        }
        inner.epoch += 1;
        Ok(())
    }

    /// Snapshot of every chunk, oldest first.
    pub fn chunks(&self) -> Result<Vec<ChunkInfo>> {
        let inner = self.inner.lock().map_err(|_| Error::PoisonError)?;
        Ok(inner.chunks.iter().map(Chunk::info).collect())
    }

    /// Total bytes currently allocated.
    pub fn used(&self) -> Result<vk::DeviceSize> {
        let inner = self.inner.lock().map_err(|_| Error::PoisonError)?;
        Ok(inner.chunks.iter().map(|chunk| chunk.used).sum())
    }

    /// Total capacity of all chunks.
    pub fn capacity(&self) -> Result<vk::DeviceSize> {
        let inner = self.inner.lock().map_err(|_| Error::PoisonError)?;
        Ok(inner.chunks.iter().map(|chunk| chunk.capacity).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullBuffer(vk::DeviceSize);

    impl HostBuffer for NullBuffer {
        fn handle(&self) -> vk::Buffer {
            vk::Buffer::null()
        }

        fn size(&self) -> vk::DeviceSize {
            self.0
        }

        fn mapped_ptr(&self) -> Option<NonNull<c_void>> {
            None
        }
    }

    fn chunk(capacity: vk::DeviceSize) -> Chunk<NullBuffer> {
        Chunk::new(0, NullBuffer(capacity), capacity)
    }

    #[test]
    fn holes_are_preferred_over_the_tail() {
        let mut chunk = chunk(1024);
        let a = chunk.take(0, 64);
        let _b = chunk.take(1, 32);
        chunk.release(a);
        assert_eq!(chunk.tail, 96);
        assert_eq!(chunk.find(48), Some(0));
        assert_eq!(chunk.find(128).map(|index| chunk.blocks[index].offset), Some(96));
    }

    #[test]
    fn release_coalesces_and_recomputes_tail() {
        let mut chunk = chunk(256);
        let a = chunk.take(0, 16);
        let b = chunk.take(1, 16);
        let c = chunk.take(2, 16);
        chunk.release(b);
        assert_eq!(chunk.blocks.len(), 4);
        chunk.release(c);
        assert_eq!(chunk.tail, 16);
        assert_eq!(chunk.blocks.len(), 2);
        chunk.release(a);
        assert_eq!(
            chunk.blocks,
            vec![Block {
                offset: 0,
                size: 256,
                free: true
            }]
        );
        assert_eq!(chunk.used, 0);
    }

    #[test]
    #[should_panic]
    fn double_release_panics() {
        let mut chunk = chunk(256);
        let a = chunk.take(0, 16);
        chunk.release(a);
        chunk.release(a);
    }
}
