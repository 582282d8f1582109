//! Submission serial bookkeeping.

use std::sync::Arc;

use anyhow::Result;

/// Source of submission serials. A [`Queue`](crate::Queue) is the main implementation: every submission to it
/// produces the next serial, and a serial is retired once the queue's timeline semaphore reached it.
///
/// Allocators that recycle memory after GPU use, such as the [`StagingPool`](crate::StagingPool), only see
/// the queue through this trait.
pub trait SubmissionTimeline: Send + Sync {
    /// Serial of the most recent submission. Zero if nothing was submitted yet.
    fn last_submitted(&self) -> u64;
    /// Largest serial that the GPU is known to have finished executing. This must never block.
    fn last_retired(&self) -> Result<u64>;

    /// Whether the submission with this serial has finished executing.
    fn is_retired(&self, serial: u64) -> Result<bool> {
        Ok(self.last_retired()? >= serial)
    }
}

impl<T: SubmissionTimeline + ?Sized> SubmissionTimeline for Arc<T> {
    fn last_submitted(&self) -> u64 {
        self.as_ref().last_submitted()
    }

    fn last_retired(&self) -> Result<u64> {
        self.as_ref().last_retired()
    }
}
