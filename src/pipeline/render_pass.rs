//! Cached `VkRenderPass` objects for pipelines that do not use dynamic rendering.

use anyhow::Result;
use ash::vk;

use crate::util::cache::Resource;
use crate::Device;

/// Description of a single render pass attachment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentInfo {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl AttachmentInfo {
    /// Single-sampled color attachment that is cleared on load and stored.
    pub fn color(format: vk::Format, final_layout: vk::ImageLayout) -> Self {
        Self {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout,
        }
    }

    /// Single-sampled depth attachment that is cleared on load and not stored.
    pub fn depth(format: vk::Format) -> Self {
        Self {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }

    fn to_vk(self) -> vk::AttachmentDescription {
        vk::AttachmentDescription {
            flags: vk::AttachmentDescriptionFlags::empty(),
            format: self.format,
            samples: self.samples,
            load_op: self.load_op,
            store_op: self.store_op,
            stencil_load_op: self.stencil_load_op,
            stencil_store_op: self.stencil_store_op,
            initial_layout: self.initial_layout,
            final_layout: self.final_layout,
        }
    }
}

/// Reference to an attachment from within a subpass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentRef {
    pub attachment: u32,
    pub layout: vk::ImageLayout,
}

impl AttachmentRef {
    fn to_vk(self) -> vk::AttachmentReference {
        vk::AttachmentReference {
            attachment: self.attachment,
            layout: self.layout,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SubpassInfo {
    pub color: Vec<AttachmentRef>,
    /// Resolve targets. Either empty or the same length as `color`.
    pub resolve: Vec<AttachmentRef>,
    pub input: Vec<AttachmentRef>,
    pub depth_stencil: Option<AttachmentRef>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubpassDependencyInfo {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src_stages: vk::PipelineStageFlags,
    pub dst_stages: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub flags: vk::DependencyFlags,
}

/// Full description of a render pass. This is the cache key of a [`RenderPass`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderPassCreateInfo {
    pub attachments: Vec<AttachmentInfo>,
    pub subpasses: Vec<SubpassInfo>,
    pub dependencies: Vec<SubpassDependencyInfo>,
}

impl RenderPassCreateInfo {
    /// Render pass with a single subpass writing to `colors` and optionally a depth attachment.
    /// Color attachments come first, the depth attachment is last.
    pub fn single_pass(colors: &[AttachmentInfo], depth: Option<AttachmentInfo>) -> Self {
        let mut attachments = colors.to_vec();
        let color = (0..colors.len() as u32)
            .map(|attachment| AttachmentRef {
                attachment,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect();
        let depth_stencil = depth.map(|depth| {
            attachments.push(depth);
            AttachmentRef {
                attachment: colors.len() as u32,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            }
        });
        Self {
            attachments,
            subpasses: vec![SubpassInfo {
                color,
                resolve: vec![],
                input: vec![],
                depth_stencil,
            }],
            dependencies: vec![SubpassDependencyInfo {
                src_subpass: vk::SUBPASS_EXTERNAL,
                dst_subpass: 0,
                src_stages: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                dst_stages: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                flags: vk::DependencyFlags::empty(),
            }],
        }
    }

    /// Number of color attachments written by `subpass`.
    pub fn color_count(&self, subpass: u32) -> usize {
        self.subpasses
            .get(subpass as usize)
            .map(|subpass| subpass.color.len())
            .unwrap_or_default()
    }
}

/// A cached `VkRenderPass`.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct RenderPass {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::RenderPass,
    attachment_count: usize,
}

impl RenderPass {
    /// Get unsafe access to the underlying `VkRenderPass`.
    /// # Safety
    /// Any vulkan calls that mutate the render pass may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    pub fn attachment_count(&self) -> usize {
        self.attachment_count
    }
}

impl Resource for RenderPass {
    type Key = RenderPassCreateInfo;
    type ExtraParams<'a> = ();

    fn create(device: Device, key: &Self::Key, _: Self::ExtraParams<'_>) -> Result<Self> {
        let attachments = key
            .attachments
            .iter()
            .map(|attachment| attachment.to_vk())
            .collect::<Vec<_>>();

        // Reference arrays must outlive the subpass descriptions pointing into them.
        let refs = key
            .subpasses
            .iter()
            .map(|subpass| {
                let convert = |refs: &[AttachmentRef]| refs.iter().map(|r| r.to_vk()).collect::<Vec<_>>();
                (
                    convert(&subpass.color),
                    convert(&subpass.resolve),
                    convert(&subpass.input),
                    subpass.depth_stencil.map(AttachmentRef::to_vk),
                )
            })
            .collect::<Vec<_>>();

        let subpasses = refs
            .iter()
            .map(|(color, resolve, input, depth)| {
                let mut builder = vk::SubpassDescription::builder()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .color_attachments(color)
                    .input_attachments(input);
                if !resolve.is_empty() {
                    assert_eq!(resolve.len(), color.len(), "resolve attachments must match color attachments");
                    builder = builder.resolve_attachments(resolve);
                }
                if let Some(depth) = depth {
                    builder = builder.depth_stencil_attachment(depth);
                }
                builder.build()
            })
            .collect::<Vec<_>>();

        let dependencies = key
            .dependencies
            .iter()
            .map(|dep| vk::SubpassDependency {
                src_subpass: dep.src_subpass,
                dst_subpass: dep.dst_subpass,
                src_stage_mask: dep.src_stages,
                dst_stage_mask: dep.dst_stages,
                src_access_mask: dep.src_access,
                dst_access_mask: dep.dst_access,
                dependency_flags: dep.flags,
            })
            .collect::<Vec<_>>();

        let info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies)
            .build();
        let handle = unsafe { device.create_render_pass(&info, None)? };

        #[cfg(feature = "log-objects")]
        trace!("Created new VkRenderPass {handle:p}");

        Ok(Self {
            device,
            handle,
            attachment_count: attachments.len(),
        })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkRenderPass {:p}", self.handle);
        unsafe {
            self.device.destroy_render_pass(self.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pass_puts_depth_last() {
        let color = AttachmentInfo::color(vk::Format::R8G8B8A8_UNORM, vk::ImageLayout::PRESENT_SRC_KHR);
        let depth = AttachmentInfo::depth(vk::Format::D32_SFLOAT);
        let info = RenderPassCreateInfo::single_pass(&[color, color], Some(depth));
        assert_eq!(info.attachments.len(), 3);
        assert_eq!(info.subpasses[0].depth_stencil.map(|r| r.attachment), Some(2));
        assert_eq!(info.color_count(0), 2);
        assert_eq!(info.color_count(1), 0);
    }
}
