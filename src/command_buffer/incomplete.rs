use std::marker::PhantomData;

use anyhow::Result;
use ash::vk;

use crate::command_buffer::{CommandBuffer, CommandBufferSlot, IncompleteCommandBuffer};
use crate::domain::ExecutionDomain;
use crate::sync::barrier::{BarrierBatch, BarrierRecorder};
use crate::{BufferState, DescriptorSet, Device, Error, ImageState, ResourceState, SubresourceRange};

impl<D: ExecutionDomain> IncompleteCommandBuffer<D> {
    pub(crate) fn new(device: Device, slot: CommandBufferSlot, flags: vk::CommandBufferUsageFlags) -> Result<Self> {
        let handle = slot.handle;
        let cmd = IncompleteCommandBuffer {
            device,
            slot: Some(slot),
            handle,
            current_pipeline_layout: vk::PipelineLayout::null(),
            current_bindpoint: vk::PipelineBindPoint::default(),
            current_render_area: vk::Rect2D::default(),
            _domain: PhantomData,
            _not_send: PhantomData,
        };
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags).build();
        // On failure, dropping `cmd` returns the slot to its pool.
        unsafe { cmd.device.begin_command_buffer(cmd.handle, &begin_info)? };
        Ok(cmd)
    }

    /// Finish recording a command buffer and move its contents into a finished
    /// command buffer that can be submitted
    pub fn finish(mut self) -> Result<CommandBuffer<D>> {
        unsafe { self.device.end_command_buffer(self.handle)? }
        let slot = match self.slot.take() {
            Some(slot) => slot,
            None => panic!("command buffer was already finished"),
        };
        slot.queue.mark_executable(&slot.pool, slot.handle)?;
        Ok(CommandBuffer::from_slot(slot))
    }

    /// Transition a range of an image to a new state, recording a barrier only for subresources that are
    /// not in that state yet. See [`ImageState::transition()`].
    pub fn transition_image(mut self, image: &ImageState, range: SubresourceRange, target: ResourceState) -> Self {
        let mut batch = BarrierBatch::new();
        image.transition(range, target, &mut batch);
        batch.record(&mut self);
        self
    }

    /// Transition a buffer to a new state. See [`BufferState::transition()`].
    pub fn transition_buffer(mut self, buffer: &BufferState, target: ResourceState) -> Self {
        let mut batch = BarrierBatch::new();
        buffer.transition(target, &mut batch);
        batch.record(&mut self);
        self
    }

    /// Record every barrier in a batch with a single `vkCmdPipelineBarrier2`. Use this to coalesce
    /// transitions of many resources.
    pub fn barriers(mut self, batch: BarrierBatch) -> Self {
        batch.record(&mut self);
        self
    }

    /// vkCmdPipelineBarrier2. Barriers recorded through this are not known to any state tracker.
    pub fn pipeline_barrier_2(self, dependency: &vk::DependencyInfo) -> Self {
        unsafe {
            self.device.cmd_pipeline_barrier2(self.handle, dependency);
        }
        self
    }

    /// Bind descriptor sets starting at `first_set`, using the layout of the currently bound pipeline.
    /// # Errors
    /// Fails with [`Error::NoPipelineBound`] if no pipeline is bound.
    pub fn bind_descriptor_sets(self, first_set: u32, sets: &[&DescriptorSet]) -> Result<Self> {
        if self.current_pipeline_layout == vk::PipelineLayout::null() {
            return Err(Error::NoPipelineBound.into());
        }
        let handles = sets.iter().map(|set| unsafe { set.handle() }).collect::<Vec<_>>();
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.handle,
                self.current_bindpoint,
                self.current_pipeline_layout,
                first_set,
                handles.as_slice(),
                &[],
            );
        }
        Ok(self)
    }

    /// Upload push constants. These are small packets of data stored inside the command buffer, so their state is tracked while executing.
    /// Direct translation of [`vkCmdPushConstants`](https://registry.khronos.org/vulkan/specs/1.3-extensions/man/html/vkCmdPushConstants.html).
    /// # Errors
    /// Fails with [`Error::NoPipelineBound`] if no pipeline is bound.
    pub fn push_constants<T: Copy>(self, stage: vk::ShaderStageFlags, offset: u32, data: &[T]) -> Result<Self> {
        if self.current_pipeline_layout == vk::PipelineLayout::null() {
            return Err(Error::NoPipelineBound.into());
        }
        unsafe {
            let (_, data, _) = data.align_to::<u8>();
            self.device
                .cmd_push_constants(self.handle, self.current_pipeline_layout, stage, offset, data);
        }
        Ok(self)
    }

    /// Get unsafe access to the underlying command buffer
    /// # Safety
    /// Recording commands that change image layouts outside of the state trackers makes their stored state incorrect.
    pub unsafe fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }
}

impl<D: ExecutionDomain> BarrierRecorder for IncompleteCommandBuffer<D> {
    fn record_barriers(&mut self, images: &[vk::ImageMemoryBarrier2], buffers: &[vk::BufferMemoryBarrier2]) {
        let dependency = vk::DependencyInfo::builder()
            .image_memory_barriers(images)
            .buffer_memory_barriers(buffers)
            .build();
        unsafe {
            self.device.cmd_pipeline_barrier2(self.handle, &dependency);
        }
    }
}

impl<D: ExecutionDomain> Drop for IncompleteCommandBuffer<D> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            // Still recording. Reusing it later resets it through vkBeginCommandBuffer.
            slot.queue.release_command_buffer(&slot.pool, slot.handle);
        }
    }
}
