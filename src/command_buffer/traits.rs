//! Traits grouping the commands of each execution domain.

use anyhow::Result;
use ash::vk;

use crate::command_buffer::state::RenderingInfo;
use crate::{domain, BufferRange, ComputePipeline, Framebuffer, ImageView, Pipeline, RenderPass};

/// Trait representing a command buffer that supports transfer commands.
pub trait TransferCmdBuffer {
    /// Copy one buffer range to another. The ranges must have the same size.
    fn copy_buffer(self, src: &impl BufferRange, dst: &impl BufferRange) -> Result<Self>
    where
        Self: Sized;
    /// Copy a tightly packed buffer range into the first mip level and layers of an image view. The image must be in
    /// `TRANSFER_DST_OPTIMAL` layout.
    fn copy_buffer_to_image(self, src: &impl BufferRange, dst: &ImageView) -> Result<Self>
    where
        Self: Sized;
}

/// Trait representing a command buffer that supports graphics commands.
pub trait GraphicsCmdBuffer: TransferCmdBuffer {
    /// Begin a render pass on a framebuffer. The render area covers the whole framebuffer.
    fn begin_render_pass(self, render_pass: &RenderPass, framebuffer: &Framebuffer, clear_values: &[vk::ClearValue]) -> Self;
    /// End the current render pass.
    fn end_render_pass(self) -> Self;
    /// Begin a dynamic rendering scope. The equivalent of `vkCmdBeginRendering`.
    fn begin_rendering(self, info: &RenderingInfo) -> Self;
    /// End the current dynamic rendering scope.
    fn end_rendering(self) -> Self;
    /// Automatically set viewport and scissor region to the entire render area
    fn full_viewport_scissor(self) -> Self;
    /// Sets the viewport. The equivalent of `vkCmdSetViewport`.
    fn viewport(self, viewport: vk::Viewport) -> Self;
    /// Sets the scissor region. Equivalent of `vkCmdSetScissor`.
    fn scissor(self, scissor: vk::Rect2D) -> Self;
    /// Record a single drawcall. Equivalent of `vkCmdDraw`.
    /// # Errors
    /// Fails with [`Error::NoPipelineBound`](crate::Error::NoPipelineBound) if no graphics pipeline is bound.
    fn draw(self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<Self>
    where
        Self: Sized;
    /// Record a single indexed drawcall. Equivalent of `vkCmdDrawIndexed`
    fn draw_indexed(self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) -> Result<Self>
    where
        Self: Sized;
    /// Bind a graphics pipeline obtained from the [`PipelineCache`](crate::PipelineCache).
    fn bind_graphics_pipeline(self, pipeline: &Pipeline) -> Self;
    /// Bind a vertex buffer to the given vertex input binding.
    /// Equivalent of `vkCmdBindVertexBuffer`
    fn bind_vertex_buffer(self, binding: u32, buffer: &impl BufferRange) -> Self
    where
        Self: Sized;
    /// Bind an index buffer. Equivalent of `vkCmdBindIndexBuffer`
    fn bind_index_buffer(self, buffer: &impl BufferRange, ty: vk::IndexType) -> Self
    where
        Self: Sized;
}

/// Trait representing a command buffer that supports compute commands.
pub trait ComputeCmdBuffer: TransferCmdBuffer {
    /// Bind a compute pipeline obtained from the [`PipelineCache`](crate::PipelineCache).
    fn bind_compute_pipeline(self, pipeline: &ComputePipeline) -> Self;
    /// Dispatch compute work groups. Equivalent of `vkCmdDispatch`.
    /// # Errors
    /// Fails with [`Error::NoPipelineBound`](crate::Error::NoPipelineBound) if no compute pipeline is bound.
    fn dispatch(self, x: u32, y: u32, z: u32) -> Result<Self>
    where
        Self: Sized;
}

/// Domains that can record graphics commands.
pub trait GfxSupport: TransferSupport {}
/// Domains that can record transfer commands.
pub trait TransferSupport {}
/// Domains that can record compute commands.
pub trait ComputeSupport: TransferSupport {}

impl GfxSupport for domain::Graphics {}
impl GfxSupport for domain::All {}
impl TransferSupport for domain::Graphics {}
impl TransferSupport for domain::Transfer {}
impl TransferSupport for domain::Compute {}
impl TransferSupport for domain::All {}
impl ComputeSupport for domain::Compute {}
impl ComputeSupport for domain::All {}
