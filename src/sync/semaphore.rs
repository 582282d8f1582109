//! Binary and timeline semaphores, used for GPU-GPU and GPU-CPU synchronization.

use std::time::Duration;

use anyhow::Result;
use ash::vk;

use crate::Device;

/// Wrapper around a binary [`VkSemaphore`](vk::Semaphore) object. These are only needed when interacting
/// with the presentation engine, everything else synchronizes through [`TimelineSemaphore`]s.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Semaphore {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary `VkSemaphore` object.
    pub fn new(device: Device) -> Result<Self> {
        let info = vk::SemaphoreCreateInfo::builder().build();
        let handle = unsafe { device.create_semaphore(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkSemaphore {handle:p}");
        Ok(Semaphore {
            device,
            handle,
        })
    }

    /// Get unsafe access to the underlying `VkSemaphore` object.
    /// # Safety
    /// Any vulkan calls that mutate the semaphore may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkSemaphore {:p}", self.handle);
        unsafe {
            self.device.destroy_semaphore(self.handle, None);
        }
    }
}

/// Wrapper around a timeline [`VkSemaphore`](vk::Semaphore). The counter value only ever increases.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct TimelineSemaphore {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Semaphore,
}

impl TimelineSemaphore {
    /// Create a new timeline semaphore with the given initial counter value.
    pub fn new(device: Device, initial_value: u64) -> Result<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::builder()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let info = vk::SemaphoreCreateInfo::builder().push_next(&mut type_info).build();
        let handle = unsafe { device.create_semaphore(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new timeline VkSemaphore {handle:p}");
        Ok(TimelineSemaphore {
            device,
            handle,
        })
    }

    /// Query the current counter value. This never blocks.
    pub fn value(&self) -> Result<u64> {
        Ok(unsafe { self.device.get_semaphore_counter_value(self.handle)? })
    }

    /// Block until the counter reaches `value`, or until the timeout expires. Passing `None` waits forever.
    /// Returns `false` if the timeout expired before the value was reached.
    pub fn wait(&self, value: u64, timeout: Option<Duration>) -> Result<bool> {
        let timeout = timeout.map_or(u64::MAX, |timeout| timeout.as_nanos().min(u64::MAX as u128) as u64);
        let info = vk::SemaphoreWaitInfo::builder()
            .semaphores(std::slice::from_ref(&self.handle))
            .values(std::slice::from_ref(&value))
            .build();
        match unsafe { self.device.wait_semaphores(&info, timeout) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Signal the semaphore to `value` from the host. The value must be larger than the current value.
    pub fn signal(&self, value: u64) -> Result<()> {
        let info = vk::SemaphoreSignalInfo::builder().semaphore(self.handle).value(value).build();
        unsafe { self.device.signal_semaphore(&info)? };
        Ok(())
    }

    /// Get unsafe access to the underlying `VkSemaphore` object.
    /// # Safety
    /// Signaling the semaphore outside of deimos can break submission serial tracking.
    pub unsafe fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for TimelineSemaphore {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying timeline VkSemaphore {:p}", self.handle);
        unsafe {
            self.device.destroy_semaphore(self.handle, None);
        }
    }
}
