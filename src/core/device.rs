//! The logical device, through which almost the entire Vulkan API is accessed.

use std::collections::HashSet;
use std::ffi::{CStr, CString, NulError};
use std::fmt::Formatter;
use std::ops::Deref;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::util::string::unwrap_to_raw_strings;
use crate::{AppSettings, Error, Instance, PhysicalDevice};

/// Device extensions that deimos can load but that are not always enabled.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum ExtensionID {
    /// `VK_KHR_swapchain`, loaded when presenting is enabled in the [`AppSettings`].
    Swapchain,
}

impl std::fmt::Display for ExtensionID {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
struct DeviceInner {
    #[derivative(Debug = "ignore")]
    handle: ash::Device,
    queue_families: Vec<u32>,
    properties: vk::PhysicalDeviceProperties,
    extensions: HashSet<ExtensionID>,
    #[derivative(Debug = "ignore")]
    swapchain: Option<ash::extensions::khr::Swapchain>,
}

/// Wrapper around a `VkDevice`. Internal state is wrapped in an `Arc<DeviceInner>`, so this is cheap
/// to clone. The `VkDevice` is destroyed when the last copy is dropped.
#[derive(Debug, Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

fn queue_create_infos(physical_device: &PhysicalDevice, priorities: &[f32]) -> Vec<vk::DeviceQueueCreateInfo> {
    physical_device
        .queue_families()
        .iter()
        .enumerate()
        .filter_map(|(index, family)| {
            let requested = physical_device
                .queues()
                .iter()
                .filter(|queue| queue.family_index == index as u32)
                .count();
            if requested == 0 {
                return None;
            }
            let count = requested.min(family.queue_count as usize).min(priorities.len());
            Some(
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(index as u32)
                    .queue_priorities(&priorities[..count])
                    .build(),
            )
        })
        .collect()
}

fn is_supported(name: &CStr, available: &[vk::ExtensionProperties]) -> bool {
    available
        .iter()
        // SAFETY: Extension names returned by Vulkan are valid null-terminated strings.
        .any(|ext| name == unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
}

impl Device {
    /// Create the logical device with one queue per requested queue family. Timeline semaphores,
    /// `synchronization2`, dynamic rendering and buffer device addresses are always enabled.
    /// # Errors
    /// * Fails with [`Error::ExtensionNotSupported`] if presenting was requested, but the device has no swapchain support.
    /// * Fails if device creation fails, usually because a requested feature is unsupported.
    pub fn new(instance: &Instance, physical_device: &PhysicalDevice, settings: &AppSettings) -> Result<Self> {
        let priorities = vec![1.0f32; physical_device.queues().len().max(1)];
        let queue_infos = queue_create_infos(physical_device, &priorities);

        let mut extension_names = settings
            .gpu_requirements
            .device_extensions
            .iter()
            .map(|ext| CString::new(ext.clone()))
            .collect::<Result<Vec<CString>, NulError>>()?;

        let available = unsafe { instance.enumerate_device_extension_properties(physical_device.handle())? };
        let mut enabled = HashSet::new();
        if settings.present {
            let name = ash::extensions::khr::Swapchain::name();
            if !is_supported(name, &available) {
                return Err(Error::ExtensionNotSupported(ExtensionID::Swapchain).into());
            }
            extension_names.push(CString::from(name));
            enabled.insert(ExtensionID::Swapchain);
        }
        extension_names.dedup();

        info!("Enabled device extensions:");
        for ext in &extension_names {
            info!("{:?}", ext);
        }

        let mut features_1_1 = settings.gpu_requirements.features_1_1;
        let mut features_1_2 = settings.gpu_requirements.features_1_2;
        let mut features_1_3 = settings.gpu_requirements.features_1_3;
        features_1_2.timeline_semaphore = vk::TRUE;
        features_1_2.buffer_device_address = vk::TRUE;
        features_1_3.synchronization2 = vk::TRUE;
        features_1_3.dynamic_rendering = vk::TRUE;

        let extension_names_raw = unwrap_to_raw_strings(extension_names.as_slice());
        let info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(queue_infos.as_slice())
            .enabled_extension_names(extension_names_raw.as_slice())
            .enabled_features(&settings.gpu_requirements.features)
            .push_next(&mut features_1_1)
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3)
            .build();

        let handle = unsafe { instance.create_device(physical_device.handle(), &info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkDevice {:p}", handle.handle());

        let swapchain = if enabled.contains(&ExtensionID::Swapchain) {
            Some(ash::extensions::khr::Swapchain::new(instance, &handle))
        } else {
            None
        };

        Ok(Device {
            inner: Arc::new(DeviceInner {
                handle,
                queue_families: queue_infos.iter().map(|info| info.queue_family_index).collect(),
                properties: *physical_device.properties(),
                extensions: enabled,
                swapchain,
            }),
        })
    }

    /// Wait for the device to be completely idle.
    /// This should not be used as a synchronization measure, except on exit.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { Ok(self.inner.handle.device_wait_idle()?) }
    }

    /// Get unsafe access to the underlying VkDevice handle
    /// # Safety
    /// * The caller should not call `vkDestroyDevice` on this.
    /// * This handle is valid as long as there is a copy of `self` alive.
    pub unsafe fn handle(&self) -> ash::Device {
        self.inner.handle.clone()
    }

    /// Get the queue families that have queues created on this device.
    pub fn queue_families(&self) -> &[u32] {
        self.inner.queue_families.as_slice()
    }

    /// Get the device properties
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.inner.properties
    }

    /// Check if an extension is enabled.
    pub fn is_extension_enabled(&self, ext: ExtensionID) -> bool {
        self.inner.extensions.contains(&ext)
    }

    /// Returns [`Error::ExtensionNotSupported`] if the extension is not enabled.
    pub fn require_extension(&self, ext: ExtensionID) -> Result<()> {
        if self.is_extension_enabled(ext) {
            Ok(())
        } else {
            Err(Error::ExtensionNotSupported(ext).into())
        }
    }

    /// Access to the function pointers for `VK_KHR_swapchain`
    pub fn swapchain(&self) -> Option<&ash::extensions::khr::Swapchain> {
        self.inner.swapchain.as_ref()
    }

    /// True if only a single queue family is used, and thus the sharing mode for resources is always EXCLUSIVE.
    pub fn is_single_queue(&self) -> bool {
        self.inner.queue_families.len() == 1
    }
}

impl Deref for Device {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.inner.handle
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkDevice {:p}", self.handle.handle());
        unsafe {
            self.handle.destroy_device(None);
        }
    }
}
