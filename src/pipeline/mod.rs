//! The pipeline module mainly exposes the [`PipelineCache`](crate::PipelineCache) struct. This manages creating
//! pipelines and every object they are derived from: shader modules, descriptor set layouts, pipeline layouts and render
//! passes. All of these are cached by a hash of their full description, so requesting the same description twice
//! gives back the same object. You probably only want one of these in the entire application, it is owned by the
//! [`ResourcePool`](crate::ResourcePool).
//!
//! # Example
//! The following example uses the [`PipelineBuilder`](crate::PipelineBuilder) utility to make a graphics pipeline and obtain it from the cache.
//!
//! ```
//! use deimos::prelude::*;
//!
//! # fn example(cache: &PipelineCache, vtx_code: Vec<u32>, frag_code: Vec<u32>) -> anyhow::Result<()> {
//! let vertex = ShaderCreateInfo::from_spirv(vk::ShaderStageFlags::VERTEX, vtx_code);
//! let fragment = ShaderCreateInfo::from_spirv(vk::ShaderStageFlags::FRAGMENT, frag_code);
//!
//! let pci = PipelineBuilder::new("sample")
//!     // One vertex binding at binding 0. We have to specify this before adding attributes
//!     .vertex_input(0, vk::VertexInputRate::VERTEX)
//!     // Equivalent of `layout (location = 0) in vec2 Attr1;`
//!     .vertex_attribute(0, 0, vk::Format::R32G32_SFLOAT)?
//!     .vertex_attribute(0, 1, vk::Format::R32G32_SFLOAT)?
//!     .blend_attachment_none()
//!     .cull_mask(vk::CullModeFlags::NONE)
//!     .color_formats(&[vk::Format::R8G8B8A8_SRGB], None)
//!     .attach_shader(vertex)
//!     .attach_shader(fragment)
//!     .build();
//!
//! // Created on first use, afterwards this is a hash lookup.
//! let pipeline = cache.get_pipeline(&pci)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::pipeline::create_info::RenderTarget;
use crate::pipeline::pipeline_layout::PipelineLayout;
use crate::pipeline::render_pass::RenderPass;
use crate::pipeline::shader::Shader;
use crate::util::cache::Resource;
use crate::{Device, Error, PipelineCreateInfo};

pub mod builder;
pub mod cache;
pub mod compute;
pub mod create_info;
pub mod framebuffer;
pub mod hash;
pub mod pipeline_layout;
pub mod render_pass;
pub mod set_layout;
pub mod shader;

/// Dependencies of a graphics pipeline that are resolved through other caches.
pub struct PipelineDeps<'a> {
    /// Shader modules, in the same order as the shaders in the create info.
    pub shaders: &'a [Arc<Shader>],
    pub layout: Arc<PipelineLayout>,
    /// Required when the pipeline targets a render pass.
    pub render_pass: Option<Arc<RenderPass>>,
}

/// A fully built Vulkan graphics pipeline. This is a managed resource, so it cannot be manually
/// cloned or dropped.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Pipeline {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Pipeline,
    layout: Arc<PipelineLayout>,
    render_pass: Option<Arc<RenderPass>>,
    name: String,
}

impl Pipeline {
    /// Get unsafe access to the underlying `VkPipeline`.
    /// # Safety
    /// Any vulkan calls that mutate the pipeline may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }

    /// The render pass this pipeline was built for, if it does not use dynamic rendering.
    pub fn render_pass(&self) -> Option<&Arc<RenderPass>> {
        self.render_pass.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Resource for Pipeline {
    type Key = PipelineCreateInfo;
    type ExtraParams<'a> = PipelineDeps<'a>;

    fn create(device: Device, key: &Self::Key, deps: Self::ExtraParams<'_>) -> Result<Self> {
        assert_eq!(key.shaders.len(), deps.shaders.len(), "pipeline `{}`: shader modules do not match its shaders", key.name);

        let entry_points = key
            .shaders
            .iter()
            .map(|shader| shader.entry_point_cstr())
            .collect::<Result<Vec<_>>>()?;
        let stages = key
            .shaders
            .iter()
            .zip(deps.shaders)
            .zip(&entry_points)
            .map(|((info, module), entry)| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(info.stage())
                    .module(unsafe { module.handle() })
                    .name(entry)
                    .build()
            })
            .collect::<Vec<_>>();

        let vertex_bindings = key.vk_vertex_bindings();
        let vertex_attributes = key.vk_vertex_attributes();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes)
            .build();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(key.topology)
            .primitive_restart_enable(key.primitive_restart)
            .build();
        let tessellation = key
            .tessellation_patch_points
            .map(|points| vk::PipelineTessellationStateCreateInfo::builder().patch_control_points(points).build());
        // Viewport and scissor are dynamic, only their counts matter.
        let viewport = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1)
            .build();
        let rasterization = key.vk_rasterization();
        let multisample = key.vk_multisample();
        let depth_stencil = key.vk_depth_stencil();
        let blend_attachments = key.vk_blend_attachments();
        let blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(key.blend_logic_op.is_some())
            .logic_op(key.blend_logic_op.unwrap_or(vk::LogicOp::COPY))
            .attachments(&blend_attachments)
            .build();
        let dynamic_states = key.dynamic_state_list();
        let dynamic = vk::PipelineDynamicStateCreateInfo::builder()
            .dynamic_states(&dynamic_states)
            .build();

        let mut rendering = match &key.target {
            RenderTarget::Dynamic(formats) => vk::PipelineRenderingCreateInfo::builder()
                .view_mask(formats.view_mask)
                .color_attachment_formats(&formats.color_formats)
                .depth_attachment_format(formats.depth_format.unwrap_or(vk::Format::UNDEFINED))
                .stencil_attachment_format(formats.stencil_format.unwrap_or(vk::Format::UNDEFINED))
                .build(),
            RenderTarget::RenderPass {
                ..
            } => vk::PipelineRenderingCreateInfo::default(),
        };
        let mut builder = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&blend)
            .dynamic_state(&dynamic)
            .layout(unsafe { deps.layout.handle() });
        if let Some(tessellation) = &tessellation {
            builder = builder.tessellation_state(tessellation);
        }

        match &key.target {
            RenderTarget::Dynamic(_) => {
                builder = builder.push_next(&mut rendering);
            }
            RenderTarget::RenderPass {
                subpass, ..
            } => {
                let render_pass = match &deps.render_pass {
                    Some(render_pass) => render_pass,
                    None => panic!("pipeline `{}` targets a render pass, but none was given", key.name),
                };
                builder = builder.render_pass(unsafe { render_pass.handle() }).subpass(*subpass);
            }
        }

        let info = builder.build();
        let handle = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&info), None)
                .map_err(|(_, err)| err)?
        }
        .into_iter()
        .next()
        .ok_or(Error::Uncategorized("graphics pipeline creation returned no pipeline"))?;

        #[cfg(feature = "log-objects")]
        trace!("Created new VkPipeline {handle:p} ({})", key.name);

        Ok(Self {
            device,
            handle,
            layout: deps.layout,
            render_pass: deps.render_pass,
            name: key.name.clone(),
        })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkPipeline {:p}", self.handle);
        unsafe {
            self.device.destroy_pipeline(self.handle, None);
        }
    }
}
