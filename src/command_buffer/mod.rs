//! Most functions in this module are a relatively thin wrapper over Vulkan commands.
//!
//! # Domains
//!
//! The most important feature is that of execution domains. Commands are divided into four domains:
//! - [Transfer](crate::domain::Transfer): All transfer and copy related commands.
//! - [Graphics](crate::domain::Graphics): All graphics and rendering related commands.
//! - [Compute](crate::domain::Compute): GPU compute commands, most notably `vkCmdDispatch`
//! - [All](crate::domain::All): All of the above.
//!
//! This concept abstracts over that of queue families. A command buffer over a domain is allocated from a queue that supports all operations
//! on its domain.
//!
//! # Lifecycle
//!
//! Command buffers are pooled per queue, per thread and per set of pool flags. An [`IncompleteCommandBuffer`] is in the recording state
//! and is bound to the thread that acquired it. Calling [`IncompleteCommandBuffer::finish()`] ends recording and produces a
//! [`CommandBuffer`], which may be sent to another thread and added to a [`SubmitBatch`](crate::SubmitBatch). Once the submission
//! it was part of has retired on the queue's timeline, the command buffer is reused for a later acquire. Dropping a command buffer without
//! submitting it returns it to its pool immediately.
//!
//! # Commands
//! All commands are implemented through traits for each domain. These are all defined inside the [`traits`] module, and are most easily imported
//! through the [`prelude`](crate::prelude).

use std::marker::PhantomData;
use std::sync::Arc;

use ash::vk;

use crate::core::queue::{PoolKey, Queue};
use crate::domain::ExecutionDomain;
use crate::Device;

pub mod compute;
pub mod graphics;
pub mod incomplete;
pub mod recycler;
pub mod state;
pub mod traits;
pub mod transfer;

pub(crate) mod command_pool;

/// A pooled command buffer together with the queue and pool it came from.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct CommandBufferSlot {
    #[derivative(Debug = "ignore")]
    pub queue: Arc<Queue>,
    pub pool: PoolKey,
    pub handle: vk::CommandBuffer,
}

/// This struct represents a finished command buffer. This command buffer can't be recorded to anymore.
/// It can only be obtained by calling [`IncompleteCommandBuffer::finish()`].
/// # Example
/// ```no_run
/// # use deimos::*;
/// # use deimos::domain::ExecutionDomain;
/// # use anyhow::Result;
///
/// fn finish_and_wait<D: ExecutionDomain>(exec: &ExecutionManager, cmd: IncompleteCommandBuffer<D>) -> Result<()> {
///     let cmd: CommandBuffer<D> = cmd.finish()?;
///     let queue = cmd.queue().clone();
///     let serial = exec.submit_command_buffer(cmd)?;
///     queue.wait_for(serial, None)?;
///     Ok(())
/// }
/// ```
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CommandBuffer<D: ExecutionDomain> {
    slot: Option<CommandBufferSlot>,
    #[derivative(Debug = "ignore")]
    _domain: PhantomData<D>,
}

/// This struct represents an incomplete command buffer, in the recording state.
/// Calling [`IncompleteCommandBuffer::finish()`] turns it into a [`CommandBuffer`] which can then be submitted
/// to the queue it was allocated from. See also [`ExecutionManager`](crate::ExecutionManager).
///
/// An incomplete command buffer is not `Send`: one command buffer is recorded by exactly one thread, the thread that owns its pool.
///
/// # Example
/// ```no_run
/// # use deimos::*;
/// # use deimos::domain::Graphics;
/// # use anyhow::Result;
///
/// fn submit_some_commands(exec: &ExecutionManager) -> Result<()> {
///     let cmd: IncompleteCommandBuffer<Graphics> = exec.on_domain::<Graphics>()?;
///     // ... record some commands
///     exec.submit_command_buffer(cmd.finish()?)?;
///     exec.wait_idle()?;
///     Ok(())
/// }
/// ```
#[derive(Derivative)]
#[derivative(Debug)]
pub struct IncompleteCommandBuffer<D: ExecutionDomain> {
    #[derivative(Debug = "ignore")]
    device: Device,
    slot: Option<CommandBufferSlot>,
    handle: vk::CommandBuffer,
    current_pipeline_layout: vk::PipelineLayout,
    current_bindpoint: vk::PipelineBindPoint,
    current_render_area: vk::Rect2D,
    #[derivative(Debug = "ignore")]
    _domain: PhantomData<D>,
    #[derivative(Debug = "ignore")]
    _not_send: PhantomData<*const ()>,
}

impl<D: ExecutionDomain> CommandBuffer<D> {
    pub(crate) fn from_slot(slot: CommandBufferSlot) -> Self {
        Self {
            slot: Some(slot),
            _domain: PhantomData,
        }
    }

    pub(crate) fn into_slot(mut self) -> CommandBufferSlot {
        match self.slot.take() {
            Some(slot) => slot,
            None => panic!("command buffer was already consumed"),
        }
    }

    fn slot(&self) -> &CommandBufferSlot {
        match &self.slot {
            Some(slot) => slot,
            None => panic!("command buffer was already consumed"),
        }
    }

    /// The queue this command buffer was allocated from, and must be submitted to.
    pub fn queue(&self) -> &Arc<Queue> {
        &self.slot().queue
    }

    /// Get unsafe access to the underlying command buffer
    /// # Safety
    /// Any vulkan calls that modify the command buffer state may lead to validation errors or put the
    /// system in an undefined state.
    pub unsafe fn handle(&self) -> vk::CommandBuffer {
        self.slot().handle
    }
}

impl<D: ExecutionDomain> Drop for CommandBuffer<D> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.queue.release_command_buffer(&slot.pool, slot.handle);
        }
    }
}
