pub use ash::vk;

pub use crate::core::app_info::*;
pub use crate::core::debug::DebugMessenger;
pub use crate::core::device::{Device, ExtensionID};
pub use crate::core::error::Error;
pub use crate::core::instance::Instance;
pub use crate::core::physical_device::PhysicalDevice;
pub use crate::core::queue::{Queue, QueueInfo, QueueType};

pub use crate::sync::barrier::{BarrierBatch, BarrierRecorder};
pub use crate::sync::domain;
pub use crate::sync::execution_manager::ExecutionManager;
pub use crate::sync::future::SubmissionFuture;
pub use crate::sync::semaphore::*;
pub use crate::sync::submit_batch::{SemaphoreOp, SubmitBatch};
pub use crate::sync::timeline::SubmissionTimeline;
pub use crate::sync::PipelineStage;

pub use crate::command_buffer::traits::*;
pub use crate::command_buffer::{CommandBuffer, IncompleteCommandBuffer};

pub use crate::allocator::default_allocator::DefaultAllocator;
pub use crate::allocator::memory_type::MemoryType;
pub use crate::allocator::ring_allocator::{RingAllocation, RingAllocator, RingAllocatorSettings};
pub use crate::allocator::staging_pool::{StagingAllocation, StagingPool, StagingPoolSettings};
pub use crate::allocator::traits::*;

pub use crate::resource::buffer::{Buffer, BufferRange, BufferView};
pub use crate::resource::image::{Image, ImageCreateInfo, ImageView, ImageViewCreateInfo, ImgView};
pub use crate::resource::state::{BufferState, ImageState, ResourceState, SubresourceRange};

pub use crate::pipeline::builder::PipelineBuilder;
pub use crate::pipeline::cache::PipelineCache;
pub use crate::pipeline::compute::{ComputePipeline, ComputePipelineBuilder};
pub use crate::pipeline::create_info::PipelineCreateInfo;
pub use crate::pipeline::framebuffer::{Framebuffer, FramebufferCache, FramebufferCreateInfo};
pub use crate::pipeline::render_pass::{RenderPass, RenderPassCreateInfo};
pub use crate::pipeline::set_layout::{DescriptorBinding, DescriptorSetLayoutCreateInfo};
pub use crate::pipeline::shader::ShaderCreateInfo;
pub use crate::pipeline::Pipeline;

pub use crate::descriptor::descriptor_pool::DescriptorAllocator;
pub use crate::descriptor::descriptor_set::DescriptorSet;

pub use crate::pool::{ResourcePool, ResourcePoolCreateInfo};
