use anyhow::Result;
use ash::vk;

use crate::{Device, Error};

/// Wrapper around a `VkCommandPool`. Each pool is only ever used by a single thread.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct CommandPool {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::CommandPool,
}

impl CommandPool {
    pub fn new(device: Device, family: u32, flags: vk::CommandPoolCreateFlags) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(flags)
            .queue_family_index(family)
            .build();
        let handle = unsafe { device.create_command_pool(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkCommandPool {handle:p} (family {family}, flags {flags:?})");
        Ok(CommandPool {
            device,
            handle,
        })
    }

    /// Allocate a single primary command buffer from this pool.
    pub fn allocate(&self) -> Result<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1)
            .build();
        let handle = unsafe { self.device.allocate_command_buffers(&info)? }
            .into_iter()
            .next()
            .ok_or(Error::Uncategorized("Command buffer allocation failed."))?;
        Ok(handle)
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkCommandPool {:p}", self.handle);
        unsafe {
            self.device.destroy_command_pool(self.handle, None);
        }
    }
}
