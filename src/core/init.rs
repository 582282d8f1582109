//! Exposes methods to make initialization of the library easier without losing flexibility.

use anyhow::Result;

use crate::descriptor::descriptor_pool::DescriptorPoolSize;
use crate::pool::{ResourcePool, ResourcePoolCreateInfo};
use crate::{Allocator, AppSettings, DebugMessenger, DefaultAllocator, Device, ExecutionManager, Instance, PhysicalDevice};

/// Struct that contains all common deimos resources to be used at initialization
pub type Deimos<A> = (
    Instance,
    PhysicalDevice,
    Device,
    A,
    ExecutionManager,
    ResourcePool<A>,
    Option<DebugMessenger>,
);

/// Initialize the context with the default allocator
pub fn initialize(settings: &AppSettings) -> Result<Deimos<DefaultAllocator>> {
    initialize_with_allocator(settings, |instance, physical_device, device| {
        DefaultAllocator::new(instance, device, physical_device)
    })
}

/// Initialize the context with a custom allocator
pub fn initialize_with_allocator<A: Allocator + 'static, F: FnOnce(&Instance, &PhysicalDevice, &Device) -> Result<A>>(
    settings: &AppSettings,
    make_alloc: F,
) -> Result<Deimos<A>> {
    let instance = Instance::new(settings)?;

    let debug_messenger = if settings.enable_validation {
        Some(DebugMessenger::new(&instance)?)
    } else {
        None
    };

    let physical_device = PhysicalDevice::select(&instance, settings)?;
    let device = Device::new(&instance, &physical_device, settings)?;
    let allocator = make_alloc(&instance, &physical_device, &device)?;
    let exec = ExecutionManager::new(device.clone(), &physical_device)?;
    let pool = ResourcePool::new(ResourcePoolCreateInfo {
        device: device.clone(),
        allocator: allocator.clone(),
        exec: exec.clone(),
        ring: settings.ring_allocator,
        staging: settings.staging_pool,
        descriptors: DescriptorPoolSize::default(),
    })?;

    Ok((instance, physical_device, device, allocator, exec, pool, debug_messenger))
}
