//! Wrapper structs around `VkPipelineLayout` objects.

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::pipeline::set_layout::{DescriptorSetLayout, DescriptorSetLayoutCreateInfo};
use crate::util::cache::{Cache, Resource};
use crate::Device;

/// A fully built Vulkan pipeline layout. This is a managed resource, so it cannot be manually
/// created or dropped.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PipelineLayout {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::PipelineLayout,
    set_layouts: Vec<Arc<DescriptorSetLayout>>,
}

/// Defines a range of Vulkan push constants.
#[derive(Debug, Clone, Default, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    /// Shader stages where this push constant range is used
    pub stage_flags: vk::ShaderStageFlags,
    /// Offset into the global push constant block of this range
    pub offset: u32,
    /// Size of this push constant range
    pub size: u32,
}

impl PushConstantRange {
    pub fn to_vk(&self) -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: self.stage_flags,
            offset: self.offset,
            size: self.size,
        }
    }
}

/// Define a pipeline layout, this includes all descriptor bindings and push constant ranges used by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PipelineLayoutCreateInfo {
    /// Pipeline layout flags
    pub flags: vk::PipelineLayoutCreateFlags,
    /// Descriptor set layouts for this pipeline layout, indexed by set number.
    pub set_layouts: Vec<DescriptorSetLayoutCreateInfo>,
    /// Push constant ranges used in this pipeline
    pub push_constants: Vec<PushConstantRange>,
}

impl PipelineLayout {
    /// Get unsafe access to the internal `VkPipelineLayout`.
    /// # Safety
    /// Any vulkan calls that mutate this pipeline layout may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    /// Get the descriptor set layouts of this pipeline layout.
    pub fn set_layouts(&self) -> &[Arc<DescriptorSetLayout>] {
        self.set_layouts.as_slice()
    }

    /// Get the layout of descriptor set `set`.
    pub fn set_layout(&self, set: u32) -> Option<&Arc<DescriptorSetLayout>> {
        self.set_layouts.get(set as usize)
    }
}

impl Resource for PipelineLayout {
    type Key = PipelineLayoutCreateInfo;
    type ExtraParams<'a> = &'a Cache<DescriptorSetLayout>;

    fn create(device: Device, key: &Self::Key, set_layout_cache: Self::ExtraParams<'_>) -> Result<Self> {
        let set_layouts = key
            .set_layouts
            .iter()
            .map(|info| set_layout_cache.get_or_create(&device, info, ()))
            .collect::<Result<Vec<_>>>()?;
        let handles = set_layouts
            .iter()
            .map(|layout| unsafe { layout.handle() })
            .collect::<Vec<_>>();

        let pc = key.push_constants.iter().map(|pc| pc.to_vk()).collect::<Vec<_>>();
        let info = vk::PipelineLayoutCreateInfo::builder()
            .flags(key.flags)
            .push_constant_ranges(pc.as_slice())
            .set_layouts(handles.as_slice())
            .build();

        let handle = unsafe { device.create_pipeline_layout(&info, None)? };

        #[cfg(feature = "log-objects")]
        trace!("Created new VkPipelineLayout {handle:p}");

        Ok(Self {
            device,
            handle,
            set_layouts,
        })
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkPipelineLayout {:p}", self.handle);
        unsafe {
            self.device.destroy_pipeline_layout(self.handle, None);
        }
    }
}
