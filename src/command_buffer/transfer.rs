use anyhow::Result;
use ash::vk;

use crate::command_buffer::IncompleteCommandBuffer;
use crate::domain::ExecutionDomain;
use crate::{BufferRange, Error, ImageView, TransferCmdBuffer, TransferSupport};

impl<D: TransferSupport + ExecutionDomain> TransferCmdBuffer for IncompleteCommandBuffer<D> {
    /// Copy one buffer to the other.
    /// # Errors
    /// Fails if the buffer ranges do not have the same size.
    fn copy_buffer(self, src: &impl BufferRange, dst: &impl BufferRange) -> Result<Self> {
        if src.size() != dst.size() {
            return Err(Error::InvalidBufferCopy.into());
        }

        let copy = vk::BufferCopy {
            src_offset: src.offset(),
            dst_offset: dst.offset(),
            size: src.size(),
        };

        unsafe {
            self.device
                .cmd_copy_buffer(self.handle, src.buffer_handle(), dst.buffer_handle(), std::slice::from_ref(&copy));
        }

        Ok(self)
    }

    /// Copy a buffer to the base mip level of the specified image.
    fn copy_buffer_to_image(self, src: &impl BufferRange, dst: &ImageView) -> Result<Self> {
        let extent = dst.size();
        let copy = vk::BufferImageCopy {
            buffer_offset: src.offset(),
            // Zero means tightly packed.
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: dst.aspect(),
                mip_level: dst.base_level(),
                base_array_layer: dst.base_layer(),
                layer_count: dst.layer_count(),
            },
            image_offset: vk::Offset3D::default(),
            image_extent: extent,
        };

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.handle,
                src.buffer_handle(),
                dst.image(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&copy),
            );
        }

        Ok(self)
    }
}
