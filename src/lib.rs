//! Vulkan command submission and resource synchronization core.
//!
//! Deimos sits between a renderer and the Vulkan API. It tracks the layout and last access of every buffer and image so
//! barriers are derived instead of written by hand, hands out transient and staging memory that is recycled once the GPU
//! is done with it, submits command buffers against per-queue timeline semaphores and caches derived objects such as
//! pipelines, render passes and framebuffers.
//!
//! To get started, the easiest way is to simply
//! ```
//! // Import all important types and traits.
//! use deimos::prelude::*;
//! // Or import types under a namespace.
//! use deimos::prelude as dm;
//! ```
//!
//! # Example
//!
//! First, define an [`AppSettings`](crate::AppSettings) structure that outlines requirements and information about the
//! application. Deimos uses this to pick a suitable GPU and initialize Vulkan for it.
//! ```no_run
//! use deimos::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let settings = AppBuilder::new()
//!     .version((1, 0, 0))
//!     .name("Deimos demo app")
//!     .validation(true)
//!     .gpu(GPURequirements {
//!         dedicated: true,
//!         queues: vec![
//!             QueueRequest { dedicated: false, queue_type: QueueType::Graphics },
//!             QueueRequest { dedicated: true, queue_type: QueueType::Transfer },
//!             QueueRequest { dedicated: true, queue_type: QueueType::Compute },
//!         ],
//!         ..Default::default()
//!     })
//!     .build();
//! let (instance, physical_device, device, allocator, exec, pool, debug_messenger) = deimos::initialize(&settings)?;
//! # Ok(())
//! # }
//! ```
//! For further example code, check out the following modules
//! - [`sync`] for queue submission, timeline semaphores and gpu futures.
//! - [`resource`] for buffers, images and their tracked state.
//! - [`allocator`] for device memory, the ring allocator and the staging pool.
//! - [`command_buffer`] for the commands available in each execution domain.
//! - [`pipeline`] for pipeline creation and the derived object caches.
//! - [`descriptor`] for descriptor set management.
//! - [`util`] for various utilities like buffer uploads and deferred deletion.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod allocator;
pub mod command_buffer;
pub mod core;
pub mod descriptor;
pub mod pipeline;
pub mod pool;
pub mod resource;
pub mod sync;
pub mod util;

pub use crate::core::init::*;

mod assertions {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use crate::allocator::ring_allocator::RingAllocator;
    use crate::allocator::staging_pool::StagingPool;
    use crate::command_buffer::state::{RenderingAttachmentInfo, RenderingInfo};
    use crate::util::cache::Cache;
    use crate::{domain, CommandBuffer, Device, ExecutionManager, IncompleteCommandBuffer, Pipeline, PipelineCache, Queue, ResourcePool};

    assert_impl_all!(Device: Send, Sync, Clone);
    assert_impl_all!(ExecutionManager: Send, Sync, Clone);
    assert_impl_all!(Queue: Send, Sync);
    assert_impl_all!(RingAllocator: Send, Sync);
    assert_impl_all!(StagingPool: Send, Sync);
    assert_impl_all!(ResourcePool: Send, Sync, Clone);
    assert_impl_all!(PipelineCache: Send, Sync, Clone);
    assert_impl_all!(Cache<Pipeline>: Send, Sync);
    assert_impl_all!(CommandBuffer<domain::All>: Send);
    assert_not_impl_any!(IncompleteCommandBuffer<domain::All>: Send);
    assert_impl_all!(RenderingAttachmentInfo: std::fmt::Debug, Clone);
    assert_impl_all!(RenderingInfo: std::fmt::Debug, Clone);
}
