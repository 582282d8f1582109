//! Source of the host-visible buffers that back transient allocators.
//!
//! The [`RingAllocator`](crate::RingAllocator) and the [`StagingPool`](crate::StagingPool) only do bookkeeping on top of
//! buffers handed out by a [`BufferProvider`]. [`DeviceBufferProvider`] creates real Vulkan buffers.

use std::ffi::c_void;
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

use crate::{Allocator, Buffer, DefaultAllocator, Device, MemoryType};

/// A buffer created by a [`BufferProvider`].
pub trait HostBuffer: Send + Sync {
    fn handle(&self) -> vk::Buffer;
    fn size(&self) -> vk::DeviceSize;
    /// Pointer to the start of the buffer memory, or `None` if the memory is not host visible.
    fn mapped_ptr(&self) -> Option<NonNull<c_void>>;
}

/// Creates buffers of a fixed kind on demand.
pub trait BufferProvider: Send {
    type Buffer: HostBuffer;

    /// Create a buffer of exactly `size` bytes.
    /// # Errors
    /// Memory exhaustion is reported immediately.
    fn create_buffer(&mut self, size: vk::DeviceSize) -> Result<Self::Buffer>;
}

/// Creates [`Buffer`]s with fixed usage flags and memory type.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DeviceBufferProvider<A: Allocator = DefaultAllocator> {
    #[derivative(Debug = "ignore")]
    device: Device,
    #[derivative(Debug = "ignore")]
    allocator: A,
    usage: vk::BufferUsageFlags,
    location: MemoryType,
}

impl<A: Allocator> DeviceBufferProvider<A> {
    pub fn new(device: Device, allocator: A, usage: vk::BufferUsageFlags, location: MemoryType) -> Self {
        Self {
            device,
            allocator,
            usage,
            location,
        }
    }

    /// Provider for host-visible buffers the device reads from, such as ring allocator chunks.
    pub fn upload(device: Device, allocator: A, usage: vk::BufferUsageFlags) -> Self {
        Self::new(device, allocator, usage, MemoryType::CpuToGpu)
    }
}

impl<A: Allocator> BufferProvider for DeviceBufferProvider<A> {
    type Buffer = Buffer<A>;

    fn create_buffer(&mut self, size: vk::DeviceSize) -> Result<Self::Buffer> {
        let buffer = Buffer::new(self.device.clone(), &mut self.allocator, size, self.usage, self.location)?;
        if self.location.is_host_visible() && !buffer.is_mapped() {
            warn!("Host visible buffer of {size} bytes was not mapped");
        }
        Ok(buffer)
    }
}

impl<A: Allocator> HostBuffer for Buffer<A> {
    fn handle(&self) -> vk::Buffer {
        // SAFETY: the handle is only used while the buffer is owned by the allocator that created it.
        unsafe { Buffer::handle(self) }
    }

    fn size(&self) -> vk::DeviceSize {
        Buffer::size(self)
    }

    fn mapped_ptr(&self) -> Option<NonNull<c_void>> {
        Buffer::mapped_ptr(self)
    }
}
