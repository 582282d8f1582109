//! The pipeline builder is used to easily create graphics pipelines correctly.

use std::collections::HashMap;

use anyhow::Result;
use ash::vk;

use crate::pipeline::create_info::*;
use crate::pipeline::pipeline_layout::PipelineLayoutCreateInfo;
use crate::pipeline::render_pass::RenderPassCreateInfo;
use crate::{Error, PipelineCreateInfo, ShaderCreateInfo};

/// Size in bytes of a vertex attribute format.
fn vertex_format_size(format: vk::Format) -> Option<u32> {
    let size = match format {
        vk::Format::R8_UNORM | vk::Format::R8_SNORM | vk::Format::R8_UINT | vk::Format::R8_SINT => 1,
        vk::Format::R8G8_UNORM | vk::Format::R8G8_SNORM | vk::Format::R16_SFLOAT | vk::Format::R16_UINT => 2,
        vk::Format::R8G8B8_UNORM => 3,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SNORM
        | vk::Format::R8G8B8A8_UINT
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::R16G16_SFLOAT
        | vk::Format::R32_SFLOAT
        | vk::Format::R32_UINT
        | vk::Format::R32_SINT => 4,
        vk::Format::R16G16B16A16_SFLOAT | vk::Format::R32G32_SFLOAT | vk::Format::R32G32_UINT => 8,
        vk::Format::R32G32B32_SFLOAT | vk::Format::R32G32B32_UINT => 12,
        vk::Format::R32G32B32A32_SFLOAT | vk::Format::R32G32B32A32_UINT => 16,
        _ => return None,
    };
    Some(size)
}

/// Used to facilitate creating a graphics pipeline.
///
/// For information on each method, please check the Vulkan spec for
/// [`VkGraphicsPipelineCreateInfo`](https://registry.khronos.org/vulkan/specs/1.3-extensions/man/html/VkGraphicsPipelineCreateInfo.html).
/// All builder methods correspond to entries directly, with minimal utilities added on top to enforce some invariants.
/// Viewport and scissor are always dynamic.
#[derive(Debug)]
pub struct PipelineBuilder {
    inner: PipelineCreateInfo,
    vertex_binding_offsets: HashMap<u32, u32>,
}

impl PipelineBuilder {
    /// Create a new empty pipeline with default settings for everything.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: PipelineCreateInfo {
                name: name.into(),
                topology: vk::PrimitiveTopology::TRIANGLE_LIST,
                ..Default::default()
            },
            vertex_binding_offsets: Default::default(),
        }
    }

    /// Add a vertex input binding. These are the binding indices for `vkCmdBindVertexBuffers`
    pub fn vertex_input(mut self, binding: u32, rate: vk::VertexInputRate) -> Self {
        self.vertex_binding_offsets.insert(binding, 0);
        self.inner.vertex_bindings.push(VertexInputBinding {
            binding,
            stride: 0,
            input_rate: rate,
        });
        self
    }

    /// Add a vertex attribute to the specified binding.
    /// Doing this will automatically calculate offsets and sizes, so make sure to add these in order of declaration in
    /// the shader.
    /// # Errors
    /// * Fails if the binding was not declared with [`Self::vertex_input()`].
    /// * Fails if the size of `format` is unknown.
    pub fn vertex_attribute(mut self, binding: u32, location: u32, format: vk::Format) -> Result<Self> {
        let size = vertex_format_size(format).ok_or(Error::UnsupportedVertexFormat(format))?;
        let offset = self
            .vertex_binding_offsets
            .get_mut(&binding)
            .ok_or(Error::NoVertexBinding)?;
        self.inner.vertex_attributes.push(VertexAttribute {
            location,
            binding,
            format,
            offset: *offset,
        });
        *offset += size;
        for descr in &mut self.inner.vertex_bindings {
            if descr.binding == binding {
                descr.stride += size;
            }
        }

        Ok(self)
    }

    /// Add a shader to the pipeline.
    pub fn attach_shader(mut self, info: ShaderCreateInfo) -> Self {
        self.inner.shaders.push(info);
        self
    }

    /// Set the pipeline layout.
    pub fn layout(mut self, layout: PipelineLayoutCreateInfo) -> Self {
        self.inner.layout = layout;
        self
    }

    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.inner.topology = topology;
        self
    }

    pub fn primitive_restart(mut self, enable: bool) -> Self {
        self.inner.primitive_restart = enable;
        self
    }

    /// Set depth testing mode.
    pub fn depth_test(mut self, enable: bool) -> Self {
        self.inner.depth_stencil.depth_test = enable;
        self
    }

    /// Set depth write mode.
    pub fn depth_write(mut self, enable: bool) -> Self {
        self.inner.depth_stencil.depth_write = enable;
        self
    }

    /// Set the depth compare operation.
    pub fn depth_op(mut self, op: vk::CompareOp) -> Self {
        self.inner.depth_stencil.compare_op = op;
        self
    }

    /// Toggle depth clamping.
    pub fn depth_clamp(mut self, enable: bool) -> Self {
        self.inner.rasterization.depth_clamp = enable;
        self
    }

    /// Configure all depth state in one call.
    pub fn depth(self, test: bool, write: bool, clamp: bool, op: vk::CompareOp) -> Self {
        self.depth_test(test)
            .depth_write(write)
            .depth_clamp(clamp)
            .depth_op(op)
    }

    /// Enable the depth bounds test.
    pub fn depth_bounds(mut self, min: f32, max: f32) -> Self {
        self.inner.depth_stencil.depth_bounds = Some((min, max));
        self
    }

    /// Enable depth bias.
    pub fn depth_bias(mut self, bias: DepthBias) -> Self {
        self.inner.rasterization.depth_bias = Some(bias);
        self
    }

    /// Enable stencil testing with separate front and back face state.
    pub fn stencil(mut self, front: StencilState, back: StencilState) -> Self {
        self.inner.depth_stencil.stencil = Some((front, back));
        self
    }

    /// Add a dynamic state to the pipeline. Viewport and scissor are always dynamic.
    pub fn dynamic_state(mut self, state: vk::DynamicState) -> Self {
        if !self.inner.dynamic_states.contains(&state) {
            self.inner.dynamic_states.push(state);
        }
        self
    }

    /// Add dynamic states to the pipeline.
    pub fn dynamic_states(mut self, states: &[vk::DynamicState]) -> Self {
        for state in states {
            self = self.dynamic_state(*state);
        }
        self
    }

    /// Set the polygon mode.
    pub fn polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.inner.rasterization.polygon_mode = mode;
        self
    }

    /// Set the face culling mask.
    pub fn cull_mask(mut self, cull: vk::CullModeFlags) -> Self {
        self.inner.rasterization.cull_mode = cull;
        self
    }

    /// Set the front face.
    pub fn front_face(mut self, face: vk::FrontFace) -> Self {
        self.inner.rasterization.front_face = face;
        self
    }

    pub fn line_width(mut self, width: f32) -> Self {
        self.inner.rasterization.line_width = width;
        self
    }

    /// Set the amount of MSAA samples.
    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.inner.multisample.samples = samples;
        self
    }

    /// Enable sample shading and set the sample shading rate.
    pub fn sample_shading(mut self, value: f32) -> Self {
        self.inner.multisample.sample_shading = Some(value);
        self
    }

    /// Enable tessellation with this many control points per patch.
    pub fn tessellation(mut self, patch_control_points: u32) -> Self {
        self.inner.tessellation_patch_points = Some(patch_control_points);
        // Tessellation requires the patch list topology, see VUID-VkGraphicsPipelineCreateInfo-pStages-00736
        self.inner.topology = vk::PrimitiveTopology::PATCH_LIST;
        self
    }

    /// Add a blend attachment, but with no blending enabled.
    pub fn blend_attachment_none(mut self) -> Self {
        self.inner.blend_attachments.push(BlendAttachment::none());
        self
    }

    /// Add a blend attachment writing to each color component
    pub fn blend_attachment(
        mut self,
        src_color: vk::BlendFactor,
        dst_color: vk::BlendFactor,
        color_op: vk::BlendOp,
        src_alpha: vk::BlendFactor,
        dst_alpha: vk::BlendFactor,
        alpha_op: vk::BlendOp,
    ) -> Self {
        self.inner.blend_attachments.push(BlendAttachment {
            blend_enable: true,
            src_color,
            dst_color,
            color_op,
            src_alpha,
            dst_alpha,
            alpha_op,
            write_mask: vk::ColorComponentFlags::RGBA,
        });
        self
    }

    /// Add an additive blend attachment, writing to each color component.
    pub fn blend_additive_unmasked(
        self,
        src: vk::BlendFactor,
        dst: vk::BlendFactor,
        src_alpha: vk::BlendFactor,
        dst_alpha: vk::BlendFactor,
    ) -> Self {
        self.blend_attachment(src, dst, vk::BlendOp::ADD, src_alpha, dst_alpha, vk::BlendOp::ADD)
    }

    pub fn blend_logic_op(mut self, op: vk::LogicOp) -> Self {
        self.inner.blend_logic_op = Some(op);
        self
    }

    /// Render with dynamic rendering into attachments of these formats.
    pub fn dynamic_rendering(mut self, formats: RenderingFormats) -> Self {
        self.inner.target = RenderTarget::Dynamic(formats);
        self
    }

    /// Convenience for dynamic rendering into color attachments and an optional depth attachment.
    pub fn color_formats(self, formats: &[vk::Format], depth_format: Option<vk::Format>) -> Self {
        self.dynamic_rendering(RenderingFormats {
            view_mask: 0,
            color_formats: formats.to_vec(),
            depth_format,
            stencil_format: None,
        })
    }

    /// Render into a subpass of a render pass.
    pub fn render_pass(mut self, render_pass: RenderPassCreateInfo, subpass: u32) -> Self {
        self.inner.target = RenderTarget::RenderPass {
            render_pass,
            subpass,
        };
        self
    }

    /// Build the pipeline create info structure.
    pub fn build(self) -> PipelineCreateInfo {
        self.inner
    }

    /// Obtain the pipeline name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_are_packed_in_declaration_order() -> Result<()> {
        let info = PipelineBuilder::new("packed")
            .vertex_input(0, vk::VertexInputRate::VERTEX)
            .vertex_attribute(0, 0, vk::Format::R32G32B32_SFLOAT)?
            .vertex_attribute(0, 1, vk::Format::R32G32_SFLOAT)?
            .build();
        assert_eq!(info.vertex_bindings[0].stride, 20);
        assert_eq!(info.vertex_attributes[1].offset, 12);
        Ok(())
    }

    #[test]
    fn attribute_without_binding_fails() {
        let result = PipelineBuilder::new("unbound").vertex_attribute(3, 0, vk::Format::R32_SFLOAT);
        assert!(result.is_err());
    }

    #[test]
    fn viewport_and_scissor_are_always_dynamic() {
        let info = PipelineBuilder::new("dynamic")
            .dynamic_states(&[vk::DynamicState::SCISSOR, vk::DynamicState::LINE_WIDTH])
            .build();
        assert_eq!(
            info.dynamic_state_list(),
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR, vk::DynamicState::LINE_WIDTH]
        );
    }

    #[test]
    fn name_is_not_part_of_the_key() {
        let a = PipelineBuilder::new("a").blend_attachment_none().build();
        let b = PipelineBuilder::new("b").blend_attachment_none().build();
        assert_eq!(a, b);
    }
}
