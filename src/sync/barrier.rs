//! Collects pipeline barriers so they can be recorded with a single command.

use ash::vk;

/// Something that can record a batch of `synchronization2` barriers, usually a command buffer.
pub trait BarrierRecorder {
    /// Record one pipeline barrier command containing all given barriers. Never called with both slices empty.
    fn record_barriers(&mut self, images: &[vk::ImageMemoryBarrier2], buffers: &[vk::BufferMemoryBarrier2]);
}

/// A list of image and buffer barriers that is recorded as one `vkCmdPipelineBarrier2` call.
/// The state trackers in [`resource::state`](crate::resource::state) append to this.
#[derive(Debug, Default, Clone)]
pub struct BarrierBatch {
    images: Vec<vk::ImageMemoryBarrier2>,
    buffers: Vec<vk::BufferMemoryBarrier2>,
}

// The barrier structs only hold a null p_next pointer and plain handles.
unsafe impl Send for BarrierBatch {}
unsafe impl Sync for BarrierBatch {}

impl BarrierBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_image(&mut self, barrier: vk::ImageMemoryBarrier2) {
        self.images.push(barrier);
    }

    pub fn push_buffer(&mut self, barrier: vk::BufferMemoryBarrier2) {
        self.buffers.push(barrier);
    }

    /// Append all barriers of another batch.
    pub fn extend(&mut self, other: BarrierBatch) {
        self.images.extend(other.images);
        self.buffers.extend(other.buffers);
    }

    pub fn image_barriers(&self) -> &[vk::ImageMemoryBarrier2] {
        self.images.as_slice()
    }

    pub fn buffer_barriers(&self) -> &[vk::BufferMemoryBarrier2] {
        self.buffers.as_slice()
    }

    /// Total number of barriers in the batch.
    pub fn len(&self) -> usize {
        self.images.len() + self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record every barrier in this batch as one command. Nothing is recorded for an empty batch.
    /// Returns whether a command was recorded.
    pub fn record(self, recorder: &mut impl BarrierRecorder) -> bool {
        if self.is_empty() {
            return false;
        }
        recorder.record_barriers(&self.images, &self.buffers);
        true
    }
}
