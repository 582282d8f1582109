use anyhow::Result;
use ash::vk;

use crate::command_buffer::IncompleteCommandBuffer;
use crate::domain::ExecutionDomain;
use crate::{ComputeCmdBuffer, ComputePipeline, ComputeSupport, Error};

impl<D: ComputeSupport + ExecutionDomain> ComputeCmdBuffer for IncompleteCommandBuffer<D> {
    fn bind_compute_pipeline(mut self, pipeline: &ComputePipeline) -> Self {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.handle, vk::PipelineBindPoint::COMPUTE, pipeline.handle());
        }
        self.current_bindpoint = vk::PipelineBindPoint::COMPUTE;
        self.current_pipeline_layout = unsafe { pipeline.layout().handle() };
        self
    }

    fn dispatch(self, x: u32, y: u32, z: u32) -> Result<Self> {
        if self.current_bindpoint != vk::PipelineBindPoint::COMPUTE || self.current_pipeline_layout == vk::PipelineLayout::null() {
            return Err(Error::NoPipelineBound.into());
        }
        unsafe {
            self.device.cmd_dispatch(self.handle, x, y, z);
        }
        Ok(self)
    }
}
