//! Memory locations an allocation can be placed in.

/// Where an allocation should live. Passed to [`Allocator::allocate()`](crate::Allocator::allocate()).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MemoryType {
    /// Device local memory. Not accessible by the host. Most buffers and all images live here.
    GpuOnly,
    /// Host visible memory used for streaming data to the device. Ring allocator chunks and staging buffers use this.
    CpuToGpu,
    /// Host visible, cached memory for reading back results.
    GpuToCpu,
}

impl MemoryType {
    /// Whether allocations of this type always have a host pointer.
    pub fn is_host_visible(&self) -> bool {
        !matches!(self, MemoryType::GpuOnly)
    }
}

impl From<MemoryType> for gpu_allocator::MemoryLocation {
    fn from(value: MemoryType) -> Self {
        match value {
            MemoryType::GpuOnly => gpu_allocator::MemoryLocation::GpuOnly,
            MemoryType::CpuToGpu => gpu_allocator::MemoryLocation::CpuToGpu,
            MemoryType::GpuToCpu => gpu_allocator::MemoryLocation::GpuToCpu,
        }
    }
}
