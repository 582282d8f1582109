//! Contains a default allocator type based on the [`gpu_allocator`] crate that is good for most needs.

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk::{DeviceMemory, DeviceSize, MemoryRequirements};
use gpu_allocator::vulkan as vk_alloc;
use gpu_allocator::vulkan::AllocationScheme;

use crate::allocator::memory_type::MemoryType;
use crate::allocator::traits;
use crate::{Allocator, Device, Error, Instance, PhysicalDevice};

/// The default allocator. This calls into the `gpu_allocator` crate.
/// This allocator is `Clone`, `Send` and `Sync`. All its internal state is wrapped inside an `Arc<Mutex<T>>`, so every
/// clone refers to the same allocator.
///
/// # Example
/// ```no_run
/// # use deimos::prelude::*;
/// # use anyhow::Result;
/// # use deimos::allocator::default_allocator;
/// fn allocate_for(device: &Device, mut allocator: DefaultAllocator, buffer: vk::Buffer) -> Result<default_allocator::Allocation> {
///     let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
///     let memory = allocator.allocate("buffer_memory", &requirements, MemoryType::GpuOnly)?;
///     unsafe { device.bind_buffer_memory(buffer, memory.memory(), memory.offset())? };
///     Ok(memory)
/// }
/// ```
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct DefaultAllocator {
    #[derivative(Debug = "ignore")]
    alloc: Arc<Mutex<vk_alloc::Allocator>>,
}

/// Allocation returned from the default allocator. The memory is returned to the allocator when this is dropped.
#[derive(Derivative)]
#[derivative(Default, Debug)]
pub struct Allocation {
    // Both are `None` only for a default constructed or already freed allocation.
    #[derivative(Debug = "ignore")]
    allocator: Option<DefaultAllocator>,
    allocation: Option<vk_alloc::Allocation>,
}

impl DefaultAllocator {
    /// Create a new default allocator. Buffer device addresses are always enabled.
    /// # Errors
    /// * May fail if creating the internal `gpu_allocator` fails.
    pub fn new(instance: &Instance, device: &Device, physical_device: &PhysicalDevice) -> Result<Self> {
        let alloc = vk_alloc::Allocator::new(&vk_alloc::AllocatorCreateDesc {
            instance: (**instance).clone(),
            // SAFETY: The caller passed in a valid Device reference.
            device: unsafe { device.handle() },
            // SAFETY: The caller passed in a valid PhysicalDevice reference.
            physical_device: unsafe { physical_device.handle() },
            debug_settings: Default::default(),
            buffer_device_address: true,
        })?;
        Ok(Self {
            alloc: Arc::new(Mutex::new(alloc)),
        })
    }

    fn free_impl(&mut self, allocation: &mut Allocation) -> Result<()> {
        if let Some(memory) = allocation.allocation.take() {
            let mut alloc = self.alloc.lock().map_err(|_| Error::PoisonError)?;
            alloc.free(memory)?;
        }
        Ok(())
    }
}

impl Allocator for DefaultAllocator {
    type Allocation = Allocation;

    /// Allocates memory of a specific memory type. Get the requirements from `vkGetBufferMemoryRequirements` or
    /// `vkGetImageMemoryRequirements`.
    /// # Errors
    /// * Fails if the device is out of memory.
    /// * Fails if invalid [`MemoryRequirements`] were passed in.
    fn allocate(&mut self, name: &str, requirements: &MemoryRequirements, ty: MemoryType) -> Result<Self::Allocation> {
        let mut alloc = self.alloc.lock().map_err(|_| Error::PoisonError)?;
        let allocation = alloc.allocate(&vk_alloc::AllocationCreateDesc {
            name,
            requirements: *requirements,
            location: gpu_allocator::MemoryLocation::from(ty),
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        Ok(Allocation {
            allocator: Some(self.clone()),
            allocation: Some(allocation),
        })
    }

    /// Explicitly free memory. Dropping the allocation does the same.
    fn free(&mut self, mut allocation: Self::Allocation) -> Result<()> {
        self.free_impl(&mut allocation)
    }
}

impl traits::Allocation for Allocation {
    unsafe fn memory(&self) -> DeviceMemory {
        self.allocation
            .as_ref()
            .map(|allocation| allocation.memory())
            .unwrap_or_default()
    }

    fn offset(&self) -> DeviceSize {
        self.allocation
            .as_ref()
            .map(|allocation| allocation.offset())
            .unwrap_or_default()
    }

    fn mapped_ptr(&self) -> Option<NonNull<c_void>> {
        self.allocation.as_ref().and_then(|allocation| allocation.mapped_ptr())
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if let Some(mut allocator) = self.allocator.take() {
            if let Err(e) = allocator.free_impl(self) {
                error!("Failed to free allocation: {e}");
            }
        }
    }
}
