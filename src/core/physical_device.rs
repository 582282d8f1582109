//! Physical device selection.

use std::ffi::CStr;

use anyhow::Result;
use ash::vk;

use crate::core::queue::{QueueInfo, QueueType};
use crate::util::string::wrap_c_str;
use crate::{AppSettings, Error, Instance};

/// Stores queried properties of a Vulkan extension.
#[derive(Debug, Default, Clone)]
pub struct ExtensionProperties {
    /// Name of the extension.
    pub name: String,
    /// Specification version of the extension.
    pub spec_version: u32,
}

/// A physical device abstracts away an actual device, like a graphics card or integrated graphics card.
#[derive(Default, Debug)]
pub struct PhysicalDevice {
    handle: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    extension_properties: Vec<ExtensionProperties>,
    queue_families: Vec<vk::QueueFamilyProperties>,
    /// Requested queues, resolved to the queue families that serve them.
    queues: Vec<QueueInfo>,
}

impl PhysicalDevice {
    /// Selects the first physical device that satisfies the [`GPURequirements`](crate::GPURequirements) in the settings.
    /// # Errors
    /// * Fails with [`Error::NoGPU`] if no device matches.
    pub fn select(instance: &Instance, settings: &AppSettings) -> Result<Self> {
        let devices = unsafe { instance.enumerate_physical_devices()? };
        if devices.is_empty() {
            return Err(anyhow::Error::from(Error::NoGPU));
        }

        for device in devices {
            let physical_device = Self::query(instance, device)?;
            if let Some(physical_device) = physical_device.check_requirements(settings) {
                let name = unsafe { CStr::from_ptr(physical_device.properties.device_name.as_ptr()) };
                info!(
                    "Picked physical device {:?}, driver version {:?}.",
                    name, physical_device.properties.driver_version
                );
                info!(
                    "Device has {} bytes of available video memory, of which {} are device local.",
                    total_video_memory(&physical_device),
                    total_device_memory(&physical_device)
                );
                return Ok(physical_device);
            }
        }

        Err(anyhow::Error::from(Error::NoGPU))
    }

    fn query(instance: &Instance, handle: vk::PhysicalDevice) -> Result<Self> {
        let extension_properties = unsafe { instance.enumerate_device_extension_properties(handle)? }
            .iter()
            .map(|vk_properties| ExtensionProperties {
                name: unsafe { wrap_c_str(vk_properties.extension_name.as_ptr()) },
                spec_version: vk_properties.spec_version,
            })
            .collect();
        Ok(PhysicalDevice {
            handle,
            properties: unsafe { instance.get_physical_device_properties(handle) },
            memory_properties: unsafe { instance.get_physical_device_memory_properties(handle) },
            extension_properties,
            queue_families: unsafe { instance.get_physical_device_queue_family_properties(handle) },
            queues: vec![],
        })
    }

    fn check_requirements(mut self, settings: &AppSettings) -> Option<Self> {
        let requirements = &settings.gpu_requirements;
        if requirements.dedicated && self.properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
            return None;
        }
        if requirements.min_video_memory > total_video_memory(&self) {
            return None;
        }
        if requirements.min_dedicated_video_memory > total_device_memory(&self) {
            return None;
        }

        // Every request must be served, otherwise the device is rejected.
        self.queues = requirements
            .queues
            .iter()
            .map(|request| {
                let avoid = if request.dedicated {
                    dedicated_avoid_flags(request.queue_type)
                } else {
                    vk::QueueFlags::empty()
                };
                let (index, dedicated) = find_queue_family(&self.queue_families, request.queue_type, avoid)?;
                let family = &self.queue_families[index];
                Some(QueueInfo {
                    queue_type: request.queue_type,
                    dedicated,
                    family_index: index as u32,
                    flags: family.queue_flags,
                    transfer_granularity: family.min_image_transfer_granularity,
                })
            })
            .collect::<Option<Vec<_>>>()?;

        let has_extensions = requirements
            .device_extensions
            .iter()
            .all(|requested| self.extension_properties.iter().any(|ext| ext.name == *requested));
        if !has_extensions {
            return None;
        }

        Some(self)
    }

    /// Get all queue families available on this device
    pub fn queue_families(&self) -> &[vk::QueueFamilyProperties] {
        self.queue_families.as_slice()
    }

    /// Get all requested queues
    pub fn queues(&self) -> &[QueueInfo] {
        self.queues.as_slice()
    }

    /// Get all available device extensions
    pub fn extensions(&self) -> &[ExtensionProperties] {
        self.extension_properties.as_slice()
    }

    /// Get unsafe access to the physical device handle
    /// # Safety
    /// Any vulkan calls that modify the physical device state may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }
}

fn dedicated_avoid_flags(queue_type: QueueType) -> vk::QueueFlags {
    match queue_type {
        QueueType::Graphics => vk::QueueFlags::COMPUTE,
        QueueType::Compute => vk::QueueFlags::GRAPHICS,
        // Video and optical flow families are exposed as transfer capable on some drivers, skip those.
        QueueType::Transfer => {
            vk::QueueFlags::COMPUTE
                | vk::QueueFlags::GRAPHICS
                | vk::QueueFlags::OPTICAL_FLOW_NV
                | vk::QueueFlags::VIDEO_DECODE_KHR
                | vk::QueueFlags::VIDEO_ENCODE_KHR
        }
    }
}

fn total_video_memory(device: &PhysicalDevice) -> usize {
    device
        .memory_properties
        .memory_heaps
        .iter()
        .take(device.memory_properties.memory_heap_count as usize)
        .map(|heap| heap.size as usize)
        .sum()
}

fn total_device_memory(device: &PhysicalDevice) -> usize {
    device
        .memory_properties
        .memory_heaps
        .iter()
        .take(device.memory_properties.memory_heap_count as usize)
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size as usize)
        .sum()
}

/// Find a family supporting `queue_type`, preferring one that has none of the `avoid` flags.
/// Returns the family index and whether it is dedicated.
fn find_queue_family(families: &[vk::QueueFamilyProperties], queue_type: QueueType, avoid: vk::QueueFlags) -> Option<(usize, bool)> {
    let required = queue_type.flags();
    let capable = || {
        families
            .iter()
            .enumerate()
            .filter(move |(_, family)| family.queue_flags.contains(required))
    };
    capable()
        .find(|(_, family)| !family.queue_flags.intersects(avoid))
        .map(|(index, _)| (index, !avoid.is_empty()))
        .or_else(|| capable().next().map(|(index, _)| (index, false)))
}
