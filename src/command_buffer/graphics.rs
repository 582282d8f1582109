use anyhow::Result;
use ash::vk;

use crate::command_buffer::state::{RenderingAttachmentInfo, RenderingInfo};
use crate::command_buffer::IncompleteCommandBuffer;
use crate::domain::ExecutionDomain;
use crate::{BufferRange, Error, Framebuffer, GfxSupport, GraphicsCmdBuffer, Pipeline, RenderPass};

impl<D: GfxSupport + ExecutionDomain> GraphicsCmdBuffer for IncompleteCommandBuffer<D> {
    fn begin_render_pass(mut self, render_pass: &RenderPass, framebuffer: &Framebuffer, clear_values: &[vk::ClearValue]) -> Self {
        let area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: framebuffer.extent(),
        };
        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(unsafe { render_pass.handle() })
            .framebuffer(unsafe { framebuffer.handle() })
            .render_area(area)
            .clear_values(clear_values)
            .build();
        unsafe {
            self.device
                .cmd_begin_render_pass(self.handle, &info, vk::SubpassContents::INLINE);
        }
        self.current_render_area = area;
        self
    }

    fn end_render_pass(mut self) -> Self {
        unsafe {
            self.device.cmd_end_render_pass(self.handle);
        }
        self.current_render_area = vk::Rect2D::default();
        self
    }

    fn begin_rendering(mut self, info: &RenderingInfo) -> Self {
        let map_attachment = |attachment: &RenderingAttachmentInfo| {
            vk::RenderingAttachmentInfo::builder()
                .image_view(unsafe { attachment.image_view.handle() })
                .image_layout(attachment.image_layout)
                .resolve_mode(attachment.resolve_mode.unwrap_or(vk::ResolveModeFlags::NONE))
                .resolve_image_view(match &attachment.resolve_image_view {
                    Some(view) => unsafe { view.handle() },
                    None => vk::ImageView::null(),
                })
                .resolve_image_layout(attachment.resolve_image_layout.unwrap_or(vk::ImageLayout::UNDEFINED))
                .load_op(attachment.load_op)
                .store_op(attachment.store_op)
                .clear_value(attachment.clear_value)
                .build()
        };

        let color_attachments = info.color_attachments.iter().map(map_attachment).collect::<Vec<_>>();
        let depth_attachment = info.depth_attachment.as_ref().map(map_attachment);
        let stencil_attachment = info.stencil_attachment.as_ref().map(map_attachment);
        let mut vk_info = vk::RenderingInfo::builder()
            .flags(info.flags)
            .render_area(info.render_area)
            .layer_count(info.layer_count)
            .view_mask(info.view_mask)
            .color_attachments(color_attachments.as_slice());
        if let Some(depth) = &depth_attachment {
            vk_info = vk_info.depth_attachment(depth);
        }
        if let Some(stencil) = &stencil_attachment {
            vk_info = vk_info.stencil_attachment(stencil);
        }

        unsafe {
            self.device.cmd_begin_rendering(self.handle, &vk_info);
        }
        self.current_render_area = info.render_area;
        self
    }

    fn end_rendering(mut self) -> Self {
        unsafe {
            self.device.cmd_end_rendering(self.handle);
        }
        self.current_render_area = vk::Rect2D::default();
        self
    }

    fn full_viewport_scissor(self) -> Self {
        let area = self.current_render_area;
        self.viewport(vk::Viewport {
            x: area.offset.x as f32,
            y: area.offset.y as f32,
            width: area.extent.width as f32,
            height: area.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        })
        .scissor(area)
    }

    fn viewport(self, viewport: vk::Viewport) -> Self {
        unsafe {
            self.device
                .cmd_set_viewport(self.handle, 0, std::slice::from_ref(&viewport));
        }
        self
    }

    fn scissor(self, scissor: vk::Rect2D) -> Self {
        unsafe {
            self.device
                .cmd_set_scissor(self.handle, 0, std::slice::from_ref(&scissor));
        }
        self
    }

    fn draw(self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<Self> {
        if self.current_bindpoint != vk::PipelineBindPoint::GRAPHICS || self.current_pipeline_layout == vk::PipelineLayout::null() {
            return Err(Error::NoPipelineBound.into());
        }
        unsafe {
            self.device
                .cmd_draw(self.handle, vertex_count, instance_count, first_vertex, first_instance);
        }
        Ok(self)
    }

    fn draw_indexed(self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) -> Result<Self> {
        if self.current_bindpoint != vk::PipelineBindPoint::GRAPHICS || self.current_pipeline_layout == vk::PipelineLayout::null() {
            return Err(Error::NoPipelineBound.into());
        }
        unsafe {
            self.device
                .cmd_draw_indexed(self.handle, index_count, instance_count, first_index, vertex_offset, first_instance)
        }
        Ok(self)
    }

    fn bind_graphics_pipeline(mut self, pipeline: &Pipeline) -> Self {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.handle, vk::PipelineBindPoint::GRAPHICS, pipeline.handle());
        }
        self.current_bindpoint = vk::PipelineBindPoint::GRAPHICS;
        self.current_pipeline_layout = unsafe { pipeline.layout().handle() };
        self
    }

    fn bind_vertex_buffer(self, binding: u32, buffer: &impl BufferRange) -> Self {
        unsafe {
            self.device.cmd_bind_vertex_buffers(
                self.handle,
                binding,
                std::slice::from_ref(&buffer.buffer_handle()),
                std::slice::from_ref(&buffer.offset()),
            )
        };
        self
    }

    fn bind_index_buffer(self, buffer: &impl BufferRange, ty: vk::IndexType) -> Self {
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.handle, buffer.buffer_handle(), buffer.offset(), ty);
        }
        self
    }
}
