//! Synchronization between queues, command buffers and the host.
//!
//! Every [`Queue`](crate::Queue) owns a timeline semaphore that is signaled with a new submission serial on each
//! submit. Everything that must wait for GPU work (command buffer recycling, staging buffer reuse, deferred deletion)
//! compares against the value of that semaphore through the [`SubmissionTimeline`](timeline::SubmissionTimeline) trait.

use ash::vk;

pub mod barrier;
pub mod domain;
pub mod execution_manager;
pub mod future;
pub mod semaphore;
pub mod submit_batch;
pub mod timeline;

/// Pipeline stage mask used for barriers and semaphore operations.
pub type PipelineStage = vk::PipelineStageFlags2;
