//! Wrappers for `VkBuffer` objects.
//!
//! A [`Buffer`] owns its Vulkan handle, memory and tracked [`BufferState`]. A [`BufferView`] is a plain copyable range
//! into a buffer, valid as long as the owning buffer lives. Anything that describes a range of a buffer implements
//! [`BufferRange`], which is what copy and bind commands accept.
//!
//! # Example
//! ```no_run
//! # use deimos::prelude::*;
//! # use anyhow::Result;
//! fn make_uniforms(device: Device, mut alloc: DefaultAllocator) -> Result<Buffer> {
//!     let buffer = Buffer::new(device, &mut alloc, 16u64, vk::BufferUsageFlags::UNIFORM_BUFFER, MemoryType::CpuToGpu)?;
//!     let mut view = buffer.view_full();
//!     view.mapped_slice::<f32>()?.copy_from_slice(&[1.0, 0.0, 1.0, 1.0]);
//!     Ok(buffer)
//! }
//! ```

use std::ffi::c_void;
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

use crate::resource::state::BufferState;
use crate::{Allocation, Allocator, DefaultAllocator, Device, Error, MemoryType};

/// A byte range of a buffer.
pub trait BufferRange {
    /// Handle of the buffer this range lives in.
    fn buffer_handle(&self) -> vk::Buffer;
    /// Offset of the range in bytes.
    fn offset(&self) -> vk::DeviceSize;
    /// Size of the range in bytes.
    fn size(&self) -> vk::DeviceSize;
}

/// Wrapper around a [`VkBuffer`](vk::Buffer).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Buffer<A: Allocator = DefaultAllocator> {
    #[derivative(Debug = "ignore")]
    device: Device,
    #[derivative(Debug = "ignore")]
    #[allow(dead_code)]
    memory: A::Allocation,
    address: vk::DeviceAddress,
    pointer: Option<NonNull<c_void>>,
    handle: vk::Buffer,
    size: vk::DeviceSize,
    state: BufferState,
}

// SAFETY: The only non-thread-safe member is the mapped pointer, which points to device memory owned by this buffer.
unsafe impl<A: Allocator> Send for Buffer<A> {}
unsafe impl<A: Allocator> Sync for Buffer<A> {}

/// View into a specific offset and range of a [`Buffer`].
/// There is no checking that the buffer is not dropped while using this.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferView {
    handle: vk::Buffer,
    pointer: Option<NonNull<c_void>>,
    address: vk::DeviceAddress,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
}

unsafe impl Send for BufferView {}
unsafe impl Sync for BufferView {}

impl<A: Allocator> Buffer<A> {
    /// Allocate a new buffer with a specific size, at a specific memory location.
    /// All usage flags must be given. Device addresses are always enabled.
    /// # Errors
    /// Fails if buffer creation or memory allocation fails. Nothing is retried.
    pub fn new(
        device: Device,
        allocator: &mut A,
        size: impl Into<vk::DeviceSize>,
        usage: vk::BufferUsageFlags,
        location: MemoryType,
    ) -> Result<Self> {
        let size = size.into();
        let concurrent = !device.is_single_queue();
        let mut info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS);
        info = if concurrent {
            info.sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(device.queue_families())
        } else {
            info.sharing_mode(vk::SharingMode::EXCLUSIVE)
        };
        let handle = unsafe { device.create_buffer(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkBuffer {handle:p} (size = {size} bytes)");

        let requirements = unsafe { device.get_buffer_memory_requirements(handle) };
        let memory = match allocator.allocate("buffer", &requirements, location) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(handle, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(handle, memory.memory(), memory.offset()) } {
            unsafe { device.destroy_buffer(handle, None) };
            return Err(e.into());
        }

        let address = unsafe {
            device.get_buffer_device_address(&vk::BufferDeviceAddressInfo::builder().buffer(handle).build())
        };

        Ok(Self {
            device,
            pointer: memory.mapped_ptr(),
            memory,
            handle,
            size,
            address,
            state: BufferState::new(handle, size),
        })
    }

    /// Allocate a new buffer in device local memory. This is the right location for most buffers.
    pub fn new_device_local(
        device: Device,
        allocator: &mut A,
        size: impl Into<vk::DeviceSize>,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self> {
        Self::new(device, allocator, size, usage, MemoryType::GpuOnly)
    }

    /// Creates a view into an offset and size of the buffer.
    /// # Errors
    /// Fails if `offset + size > self.size`.
    pub fn view(&self, offset: impl Into<vk::DeviceSize>, size: impl Into<vk::DeviceSize>) -> Result<BufferView> {
        let offset = offset.into();
        let size = size.into();
        if offset + size > self.size {
            return Err(Error::BufferViewOutOfRange.into());
        }
        Ok(BufferView {
            handle: self.handle,
            offset,
            // SAFETY: offset lies inside the mapped range, checked above.
            pointer: self
                .pointer
                .and_then(|p| NonNull::new(unsafe { p.as_ptr().cast::<u8>().add(offset as usize) }.cast::<c_void>())),
            address: self.address + offset,
            size,
        })
    }

    /// Creates a view of the entire buffer.
    pub fn view_full(&self) -> BufferView {
        BufferView {
            handle: self.handle,
            pointer: self.pointer,
            offset: 0,
            address: self.address,
            size: self.size,
        }
    }

    /// True if this buffer has a mapped pointer and can be written to directly.
    pub fn is_mapped(&self) -> bool {
        self.pointer.is_some()
    }

    /// Tracked synchronization state of this buffer.
    pub fn state(&self) -> &BufferState {
        &self.state
    }

    /// Obtain a handle to the raw vulkan buffer object.
    /// # Safety
    /// * The caller must not use this handle after `self` is dropped.
    /// * The caller must not call `vkDestroyBuffer` on this handle.
    pub unsafe fn handle(&self) -> vk::Buffer {
        self.handle
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn address(&self) -> vk::DeviceAddress {
        self.address
    }

    /// Host pointer to the start of the buffer, if it is mapped.
    pub fn mapped_ptr(&self) -> Option<NonNull<c_void>> {
        self.pointer
    }
}

impl<A: Allocator> BufferRange for Buffer<A> {
    fn buffer_handle(&self) -> vk::Buffer {
        self.handle
    }

    fn offset(&self) -> vk::DeviceSize {
        0
    }

    fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl<A: Allocator> Drop for Buffer<A> {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkBuffer {:p}", self.handle);
        unsafe {
            self.device.destroy_buffer(self.handle, None);
        }
    }
}

impl BufferView {
    /// Obtain a slice to the mapped memory of this view.
    /// # Errors
    /// Fails if this buffer is not mappable (not `HOST_VISIBLE`).
    pub fn mapped_slice<T>(&mut self) -> Result<&mut [T]> {
        match self.pointer {
            Some(pointer) => Ok(unsafe {
                std::slice::from_raw_parts_mut(pointer.cast::<T>().as_ptr(), self.size as usize / std::mem::size_of::<T>())
            }),
            None => Err(Error::UnmappableBuffer.into()),
        }
    }

    /// Obtain a handle to the raw vulkan buffer object.
    /// # Safety
    /// The caller must not use this handle after the owning buffer is dropped.
    pub unsafe fn handle(&self) -> vk::Buffer {
        self.handle
    }

    pub fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Device address of the start of this view.
    pub fn address(&self) -> vk::DeviceAddress {
        self.address
    }
}

impl BufferRange for BufferView {
    fn buffer_handle(&self) -> vk::Buffer {
        self.handle
    }

    fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    fn size(&self) -> vk::DeviceSize {
        self.size
    }
}
