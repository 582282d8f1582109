//! Owned descriptions of graphics pipeline state. Every field that influences the created pipeline takes part in its
//! cache key, so two equal descriptions always resolve to the same [`Pipeline`](crate::Pipeline).

use ash::vk;

use crate::pipeline::pipeline_layout::PipelineLayoutCreateInfo;
use crate::pipeline::render_pass::RenderPassCreateInfo;
use crate::ShaderCreateInfo;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VertexInputBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: vk::VertexInputRate,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: vk::Format,
    pub offset: u32,
}

/// Depth bias factors. Hashed by bit pattern.
#[derive(Debug, Copy, Clone, Default)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub clamp: f32,
    pub slope_factor: f32,
}

#[derive(Debug, Copy, Clone)]
pub struct RasterizationState {
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_clamp: bool,
    pub depth_bias: Option<DepthBias>,
    pub line_width: f32,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_clamp: false,
            depth_bias: None,
            line_width: 1.0,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub fail_op: vk::StencilOp,
    pub pass_op: vk::StencilOp,
    pub depth_fail_op: vk::StencilOp,
    pub compare_op: vk::CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl StencilState {
    fn to_vk(self) -> vk::StencilOpState {
        vk::StencilOpState {
            fail_op: self.fail_op,
            pass_op: self.pass_op,
            depth_fail_op: self.depth_fail_op,
            compare_op: self.compare_op,
            compare_mask: self.compare_mask,
            write_mask: self.write_mask,
            reference: self.reference,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare_op: vk::CompareOp,
    /// Stencil state for front and back faces. `None` disables stencil testing.
    pub stencil: Option<(StencilState, StencilState)>,
    /// Minimum and maximum depth bounds. `None` disables the depth bounds test.
    pub depth_bounds: Option<(f32, f32)>,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            compare_op: vk::CompareOp::ALWAYS,
            stencil: None,
            depth_bounds: None,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct MultisampleState {
    pub samples: vk::SampleCountFlags,
    /// Minimum sample shading fraction. `None` disables sample shading.
    pub sample_shading: Option<f32>,
    pub alpha_to_coverage: bool,
    pub alpha_to_one: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            samples: vk::SampleCountFlags::TYPE_1,
            sample_shading: None,
            alpha_to_coverage: false,
            alpha_to_one: false,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BlendAttachment {
    pub blend_enable: bool,
    pub src_color: vk::BlendFactor,
    pub dst_color: vk::BlendFactor,
    pub color_op: vk::BlendOp,
    pub src_alpha: vk::BlendFactor,
    pub dst_alpha: vk::BlendFactor,
    pub alpha_op: vk::BlendOp,
    pub write_mask: vk::ColorComponentFlags,
}

impl BlendAttachment {
    /// Blending disabled, writing every component.
    pub fn none() -> Self {
        Self {
            blend_enable: false,
            src_color: vk::BlendFactor::ONE,
            dst_color: vk::BlendFactor::ZERO,
            color_op: vk::BlendOp::ADD,
            src_alpha: vk::BlendFactor::ONE,
            dst_alpha: vk::BlendFactor::ZERO,
            alpha_op: vk::BlendOp::ADD,
            write_mask: vk::ColorComponentFlags::RGBA,
        }
    }

    fn to_vk(self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::Bool32::from(self.blend_enable),
            src_color_blend_factor: self.src_color,
            dst_color_blend_factor: self.dst_color,
            color_blend_op: self.color_op,
            src_alpha_blend_factor: self.src_alpha,
            dst_alpha_blend_factor: self.dst_alpha,
            alpha_blend_op: self.alpha_op,
            color_write_mask: self.write_mask,
        }
    }
}

/// Attachment formats of a pipeline used with dynamic rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderingFormats {
    pub view_mask: u32,
    pub color_formats: Vec<vk::Format>,
    pub depth_format: Option<vk::Format>,
    pub stencil_format: Option<vk::Format>,
}

/// What a graphics pipeline renders into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// Dynamic rendering with the given attachment formats.
    Dynamic(RenderingFormats),
    /// A subpass of a render pass. The render pass is obtained from the render pass cache.
    RenderPass { render_pass: RenderPassCreateInfo, subpass: u32 },
}

impl Default for RenderTarget {
    fn default() -> Self {
        RenderTarget::Dynamic(RenderingFormats::default())
    }
}

/// Defines a full graphics pipeline. Use the [`PipelineBuilder`](crate::PipelineBuilder) to construct this.
/// Viewport and scissor are always dynamic state.
#[derive(Debug, Clone, Default, Derivative)]
#[derivative(PartialEq, Eq, Hash)]
pub struct PipelineCreateInfo {
    #[derivative(PartialEq = "ignore")]
    #[derivative(Hash = "ignore")]
    pub(crate) name: String,
    pub(crate) shaders: Vec<ShaderCreateInfo>,
    pub(crate) layout: PipelineLayoutCreateInfo,
    pub(crate) vertex_bindings: Vec<VertexInputBinding>,
    pub(crate) vertex_attributes: Vec<VertexAttribute>,
    pub(crate) topology: vk::PrimitiveTopology,
    pub(crate) primitive_restart: bool,
    pub(crate) tessellation_patch_points: Option<u32>,
    pub(crate) rasterization: RasterizationState,
    pub(crate) depth_stencil: DepthStencilState,
    pub(crate) multisample: MultisampleState,
    pub(crate) blend_attachments: Vec<BlendAttachment>,
    pub(crate) blend_logic_op: Option<vk::LogicOp>,
    pub(crate) dynamic_states: Vec<vk::DynamicState>,
    pub(crate) target: RenderTarget,
}

impl PipelineCreateInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shaders(&self) -> &[ShaderCreateInfo] {
        &self.shaders
    }

    pub fn layout(&self) -> &PipelineLayoutCreateInfo {
        &self.layout
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    /// Whether this pipeline uses the shader with the given code hash.
    pub fn uses_shader(&self, code_hash: u64) -> bool {
        self.shaders.iter().any(|shader| shader.code_hash() == code_hash)
    }

    pub(crate) fn dynamic_state_list(&self) -> Vec<vk::DynamicState> {
        let mut states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        for state in &self.dynamic_states {
            if !states.contains(state) {
                states.push(*state);
            }
        }
        states
    }

    pub(crate) fn vk_vertex_bindings(&self) -> Vec<vk::VertexInputBindingDescription> {
        self.vertex_bindings
            .iter()
            .map(|binding| vk::VertexInputBindingDescription {
                binding: binding.binding,
                stride: binding.stride,
                input_rate: binding.input_rate,
            })
            .collect()
    }

    pub(crate) fn vk_vertex_attributes(&self) -> Vec<vk::VertexInputAttributeDescription> {
        self.vertex_attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: attribute.binding,
                format: attribute.format,
                offset: attribute.offset,
            })
            .collect()
    }

    pub(crate) fn vk_blend_attachments(&self) -> Vec<vk::PipelineColorBlendAttachmentState> {
        self.blend_attachments.iter().map(|attachment| attachment.to_vk()).collect()
    }

    pub(crate) fn vk_rasterization(&self) -> vk::PipelineRasterizationStateCreateInfo {
        let state = &self.rasterization;
        let bias = state.depth_bias.unwrap_or_default();
        vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(state.polygon_mode)
            .cull_mode(state.cull_mode)
            .front_face(state.front_face)
            .depth_clamp_enable(state.depth_clamp)
            .depth_bias_enable(state.depth_bias.is_some())
            .depth_bias_constant_factor(bias.constant_factor)
            .depth_bias_clamp(bias.clamp)
            .depth_bias_slope_factor(bias.slope_factor)
            .line_width(state.line_width)
            .build()
    }

    pub(crate) fn vk_depth_stencil(&self) -> vk::PipelineDepthStencilStateCreateInfo {
        let state = &self.depth_stencil;
        let (front, back) = state.stencil.unwrap_or_default();
        let (min_bounds, max_bounds) = state.depth_bounds.unwrap_or((0.0, 1.0));
        vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(state.depth_test)
            .depth_write_enable(state.depth_write)
            .depth_compare_op(state.compare_op)
            .stencil_test_enable(state.stencil.is_some())
            .front(front.to_vk())
            .back(back.to_vk())
            .depth_bounds_test_enable(state.depth_bounds.is_some())
            .min_depth_bounds(min_bounds)
            .max_depth_bounds(max_bounds)
            .build()
    }

    pub(crate) fn vk_multisample(&self) -> vk::PipelineMultisampleStateCreateInfo {
        let state = &self.multisample;
        vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(state.samples)
            .sample_shading_enable(state.sample_shading.is_some())
            .min_sample_shading(state.sample_shading.unwrap_or(0.0))
            .alpha_to_coverage_enable(state.alpha_to_coverage)
            .alpha_to_one_enable(state.alpha_to_one)
            .build()
    }
}
