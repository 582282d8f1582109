//! Traits for plugging a memory allocator into deimos.

use std::ffi::c_void;
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

use crate::allocator::memory_type::MemoryType;

/// A device memory allocator. Buffers and images are generic over this, and default to
/// [`DefaultAllocator`](crate::DefaultAllocator).
///
/// Allocators are cloned into every resource they allocate for, so cloning must be cheap and must give a handle to the same
/// underlying allocator.
pub trait Allocator: Clone + Send + Sync {
    /// Memory allocation handed out by this allocator. Dropping it must return the memory.
    type Allocation: Allocation;

    /// Allocate memory satisfying the given requirements. The name is used for debugging only.
    /// # Errors
    /// Device memory exhaustion is reported immediately and never retried.
    fn allocate(&mut self, name: &str, requirements: &vk::MemoryRequirements, ty: MemoryType) -> Result<Self::Allocation>;
    /// Explicitly free an allocation.
    fn free(&mut self, allocation: Self::Allocation) -> Result<()>;
}

/// A single sub-allocation of device memory.
pub trait Allocation: Default + Send + Sync {
    /// The memory object this allocation lives in.
    /// # Safety
    /// The caller must not free this memory, and must only access the range starting at [`Allocation::offset()`].
    unsafe fn memory(&self) -> vk::DeviceMemory;
    /// Offset of this allocation inside [`Allocation::memory()`].
    fn offset(&self) -> vk::DeviceSize;
    /// Host pointer to the start of this allocation, if the memory is host visible.
    fn mapped_ptr(&self) -> Option<NonNull<c_void>>;
}
