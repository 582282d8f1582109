//! Batches of command buffers submitted together, with explicit semaphore edges.

use std::sync::Arc;

use ash::vk;

use crate::command_buffer::{CommandBuffer, CommandBufferSlot};
use crate::domain::ExecutionDomain;
use crate::{PipelineStage, Queue, Semaphore, TimelineSemaphore};

/// A semaphore wait or signal operation inside a batch. For binary semaphores the value is ignored.
#[derive(Debug, Copy, Clone)]
pub struct SemaphoreOp {
    semaphore: vk::Semaphore,
    value: u64,
    stage: PipelineStage,
}

impl SemaphoreOp {
    pub(crate) fn info(&self) -> vk::SemaphoreSubmitInfo {
        vk::SemaphoreSubmitInfo::builder()
            .semaphore(self.semaphore)
            .value(self.value)
            .stage_mask(self.stage)
            .build()
    }

    /// Stage at which the operation happens.
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Timeline value, or zero for binary semaphores.
    pub fn value(&self) -> u64 {
        self.value
    }
}

/// A batch of command buffers that are submitted to one queue in a single `vkQueueSubmit2` call.
/// Ordering with other submissions is only established through the waits added to the batch. The queue's own
/// timeline semaphore signal is added automatically on submission.
///
/// Any semaphore added to the batch must stay alive until the submission has completed.
///
/// # Example
/// ```no_run
/// # use deimos::*;
/// # use anyhow::Result;
/// fn upload_then_draw(exec: &ExecutionManager, upload: CommandBuffer<domain::Transfer>, draw: CommandBuffer<domain::All>) -> Result<()> {
///     let transfer = exec.get_queue::<domain::Transfer>()?;
///     let serial = exec.submit(exec.start_submit_batch::<domain::Transfer>()?.command_buffer(upload))?;
///     // The draw waits on the upload before any vertex input happens.
///     let batch = exec
///         .start_submit_batch::<domain::All>()?
///         .command_buffer(draw)
///         .wait_timeline(&transfer, serial, PipelineStage::VERTEX_INPUT);
///     exec.submit(batch)?;
///     Ok(())
/// }
/// ```
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SubmitBatch {
    #[derivative(Debug = "ignore")]
    queue: Arc<Queue>,
    cmds: Vec<CommandBufferSlot>,
    waits: Vec<SemaphoreOp>,
    signals: Vec<SemaphoreOp>,
}

impl SubmitBatch {
    /// Create an empty batch that will be submitted to `queue`.
    pub fn new(queue: Arc<Queue>) -> Self {
        Self {
            queue,
            cmds: vec![],
            waits: vec![],
            signals: vec![],
        }
    }

    /// Add a finished command buffer to the batch. Command buffers execute in the order they were added.
    /// # Panics
    /// Panics if the command buffer was allocated from a different queue.
    pub fn command_buffer<D: ExecutionDomain>(mut self, cmd: CommandBuffer<D>) -> Self {
        let slot = cmd.into_slot();
        assert!(
            Arc::ptr_eq(&slot.queue, &self.queue),
            "command buffer {:p} was allocated from another queue",
            slot.handle
        );
        self.cmds.push(slot);
        self
    }

    /// Wait on a binary semaphore, for example a swapchain image acquire semaphore.
    pub fn wait_semaphore(mut self, semaphore: &Semaphore, stage: PipelineStage) -> Self {
        self.waits.push(SemaphoreOp {
            semaphore: unsafe { semaphore.handle() },
            value: 0,
            stage,
        });
        self
    }

    /// Wait until a timeline semaphore reaches `value`.
    pub fn wait_timeline_semaphore(mut self, semaphore: &TimelineSemaphore, value: u64, stage: PipelineStage) -> Self {
        self.waits.push(SemaphoreOp {
            semaphore: unsafe { semaphore.handle() },
            value,
            stage,
        });
        self
    }

    /// Wait until the submission with `serial` on `queue` has completed. This is how ordering between queues is expressed.
    pub fn wait_timeline(self, queue: &Queue, serial: u64, stage: PipelineStage) -> Self {
        self.wait_timeline_semaphore(queue.timeline(), serial, stage)
    }

    /// Signal a binary semaphore when the batch completes, for example a present semaphore.
    pub fn signal_semaphore(mut self, semaphore: &Semaphore, stage: PipelineStage) -> Self {
        self.signals.push(SemaphoreOp {
            semaphore: unsafe { semaphore.handle() },
            value: 0,
            stage,
        });
        self
    }

    /// Signal a timeline semaphore to `value` when the batch completes.
    pub fn signal_timeline_semaphore(mut self, semaphore: &TimelineSemaphore, value: u64, stage: PipelineStage) -> Self {
        self.signals.push(SemaphoreOp {
            semaphore: unsafe { semaphore.handle() },
            value,
            stage,
        });
        self
    }

    /// Queue this batch will be submitted to.
    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    pub(crate) fn command_buffers(&self) -> &[CommandBufferSlot] {
        self.cmds.as_slice()
    }

    pub(crate) fn take_command_buffers(&mut self) -> Vec<CommandBufferSlot> {
        std::mem::take(&mut self.cmds)
    }

    pub fn waits(&self) -> &[SemaphoreOp] {
        self.waits.as_slice()
    }

    pub fn signals(&self) -> &[SemaphoreOp] {
        self.signals.as_slice()
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }
}

impl Drop for SubmitBatch {
    fn drop(&mut self) {
        // Command buffers that never made it into a submission go back to their pool.
        for slot in self.cmds.drain(..) {
            slot.queue.release_command_buffer(&slot.pool, slot.handle);
        }
    }
}
