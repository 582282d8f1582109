//! Futures that resolve once a submission has retired.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::Result;
use futures::future::FusedFuture;

use crate::sync::timeline::SubmissionTimeline;

/// A future that completes once the submission with a given serial has finished executing on the GPU.
/// A value can be attached, which is handed back on completion. This is useful to keep resources alive
/// until the GPU is done with them, or to hand out the result of an upload.
///
/// Note that this future works by periodically polling the timeline, since Vulkan has no way to
/// register a callback on completion.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SubmissionFuture<T = ()> {
    #[derivative(Debug = "ignore")]
    timeline: Arc<dyn SubmissionTimeline>,
    serial: u64,
    #[derivative(Debug = "ignore")]
    value: Option<T>,
}

impl<T> Unpin for SubmissionFuture<T> {}

impl SubmissionFuture<()> {
    /// Create a future for the submission with `serial` on `timeline`.
    pub fn new(timeline: Arc<dyn SubmissionTimeline>, serial: u64) -> Self {
        Self {
            timeline,
            serial,
            value: Some(()),
        }
    }

    /// Attach a value to this future, which is returned once the submission has completed.
    pub fn attach_value<T>(self, value: T) -> SubmissionFuture<T> {
        SubmissionFuture {
            timeline: self.timeline,
            serial: self.serial,
            value: Some(value),
        }
    }
}

impl<T> SubmissionFuture<T> {
    /// Serial of the submission this future waits on.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Check whether the submission has completed, without blocking.
    pub fn is_complete(&self) -> Result<bool> {
        self.timeline.is_retired(self.serial)
    }
}

impl<T> Future for SubmissionFuture<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let complete = match self.timeline.is_retired(self.serial) {
            Ok(complete) => complete,
            Err(err) => return Poll::Ready(Err(err)),
        };

        if complete {
            match self.value.take() {
                Some(value) => Poll::Ready(Ok(value)),
                None => panic!("SubmissionFuture polled after completion"),
            }
        } else {
            let waker = ctx.waker().clone();
            std::thread::spawn(move || {
                // Poll again in 5 milliseconds.
                std::thread::sleep(Duration::from_millis(5));
                waker.wake();
            });
            Poll::Pending
        }
    }
}

impl<T> FusedFuture for SubmissionFuture<T> {
    fn is_terminated(&self) -> bool {
        self.value.is_none()
    }
}
