//! Synchronization state tracking for images and buffers.
//!
//! Every image stores one [`ResourceState`] per (mip level, array layer), every buffer stores one state for the whole
//! resource. The stored state is always the state established by the last barrier issued through the tracker.
//! Transitioning to a new state appends the required barriers to a [`BarrierBatch`], which is then recorded into a
//! command buffer with a single `vkCmdPipelineBarrier2`.
//!
//! # Example
//! ```no_run
//! # use deimos::prelude::*;
//! # use anyhow::Result;
//! fn prepare_for_sampling(cmd: IncompleteCommandBuffer<domain::Graphics>, image: &Image) -> IncompleteCommandBuffer<domain::Graphics> {
//!     cmd.transition_image(
//!         image.state(),
//!         SubresourceRange::full(),
//!         ResourceState::for_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
//!     )
//! }
//! ```

use std::sync::{Mutex, MutexGuard};

use ash::vk;

use crate::sync::barrier::BarrierBatch;
use crate::PipelineStage;

/// Synchronization state of a subresource: its layout and the stages and accesses of its last use.
/// Buffers always use [`vk::ImageLayout::UNDEFINED`] as layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ResourceState {
    pub layout: vk::ImageLayout,
    pub stages: PipelineStage,
    pub access: vk::AccessFlags2,
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::for_layout(vk::ImageLayout::UNDEFINED)
    }
}

impl ResourceState {
    pub const fn new(layout: vk::ImageLayout, stages: PipelineStage, access: vk::AccessFlags2) -> Self {
        Self {
            layout,
            stages,
            access,
        }
    }

    /// The stages and accesses an image in this layout is used with. Layouts without a natural usage
    /// are treated as being accessed by every command.
    pub fn for_layout(layout: vk::ImageLayout) -> Self {
        let (stages, access) = match layout {
            vk::ImageLayout::UNDEFINED | vk::ImageLayout::PREINITIALIZED => (PipelineStage::NONE, vk::AccessFlags2::NONE),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
                PipelineStage::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            ),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            | vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
            | vk::ImageLayout::STENCIL_ATTACHMENT_OPTIMAL => (
                PipelineStage::EARLY_FRAGMENT_TESTS | PipelineStage::LATE_FRAGMENT_TESTS,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
            | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
            | vk::ImageLayout::STENCIL_READ_ONLY_OPTIMAL => (
                PipelineStage::EARLY_FRAGMENT_TESTS | PipelineStage::LATE_FRAGMENT_TESTS | PipelineStage::FRAGMENT_SHADER,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::SHADER_READ,
            ),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
                PipelineStage::VERTEX_SHADER | PipelineStage::FRAGMENT_SHADER | PipelineStage::COMPUTE_SHADER,
                vk::AccessFlags2::SHADER_READ,
            ),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (PipelineStage::TRANSFER, vk::AccessFlags2::TRANSFER_READ),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL => (PipelineStage::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE),
            vk::ImageLayout::PRESENT_SRC_KHR => (PipelineStage::NONE, vk::AccessFlags2::NONE),
            _ => (
                PipelineStage::ALL_COMMANDS,
                vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
            ),
        };
        Self::new(layout, stages, access)
    }

    /// State of a buffer accessed with the given stages and access flags.
    pub const fn buffer(stages: PipelineStage, access: vk::AccessFlags2) -> Self {
        Self::new(vk::ImageLayout::UNDEFINED, stages, access)
    }

    pub const fn buffer_transfer_src() -> Self {
        Self::buffer(PipelineStage::TRANSFER, vk::AccessFlags2::TRANSFER_READ)
    }

    pub const fn buffer_transfer_dst() -> Self {
        Self::buffer(PipelineStage::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
    }

    pub const fn buffer_vertex_input() -> Self {
        Self::buffer(PipelineStage::VERTEX_INPUT, vk::AccessFlags2::VERTEX_ATTRIBUTE_READ)
    }

    pub const fn buffer_index_input() -> Self {
        Self::buffer(PipelineStage::INDEX_INPUT, vk::AccessFlags2::INDEX_READ)
    }

    /// Read from shaders in the given stages, either as uniform or storage buffer.
    pub const fn buffer_shader_read(stages: PipelineStage) -> Self {
        Self::buffer(stages, vk::AccessFlags2::SHADER_READ)
    }

    pub const fn buffer_shader_write(stages: PipelineStage) -> Self {
        Self::buffer(stages, vk::AccessFlags2::from_raw(
            vk::AccessFlags2::SHADER_READ.as_raw() | vk::AccessFlags2::SHADER_WRITE.as_raw(),
        ))
    }
}

/// A range of mip levels and array layers of an image. Counts can be [`vk::REMAINING_MIP_LEVELS`] and
/// [`vk::REMAINING_ARRAY_LAYERS`] to cover everything from the base onwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    pub const fn new(base_mip: u32, mip_count: u32, base_layer: u32, layer_count: u32) -> Self {
        Self {
            base_mip,
            mip_count,
            base_layer,
            layer_count,
        }
    }

    /// Every mip level and array layer of the image.
    pub const fn full() -> Self {
        Self::new(0, vk::REMAINING_MIP_LEVELS, 0, vk::REMAINING_ARRAY_LAYERS)
    }

    /// All layers of a single mip level.
    pub const fn mip(level: u32) -> Self {
        Self::new(level, 1, 0, vk::REMAINING_ARRAY_LAYERS)
    }

    fn resolve(&self, mip_levels: u32, layers: u32) -> SubresourceRange {
        let mip_count = if self.mip_count == vk::REMAINING_MIP_LEVELS {
            mip_levels.saturating_sub(self.base_mip)
        } else {
            self.mip_count
        };
        let layer_count = if self.layer_count == vk::REMAINING_ARRAY_LAYERS {
            layers.saturating_sub(self.base_layer)
        } else {
            self.layer_count
        };
        let resolved = SubresourceRange::new(self.base_mip, mip_count, self.base_layer, layer_count);
        assert!(
            mip_count > 0
                && layer_count > 0
                && resolved.base_mip + mip_count <= mip_levels
                && resolved.base_layer + layer_count <= layers,
            "subresource range {self:?} is out of bounds for an image with {mip_levels} mips and {layers} layers"
        );
        resolved
    }
}

/// Image aspect a view or barrier on an image of this format must use. Combined depth/stencil formats include both aspects.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT => vk::ImageAspectFlags::DEPTH,
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Per-subresource state of an image.
#[derive(Debug)]
pub struct ImageState {
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
    layers: u32,
    // Indexed by `mip * layers + layer`.
    states: Mutex<Vec<ResourceState>>,
}

impl ImageState {
    /// Start tracking an image. Every subresource starts in the given layout.
    pub fn new(image: vk::Image, format: vk::Format, mip_levels: u32, layers: u32, initial_layout: vk::ImageLayout) -> Self {
        assert!(mip_levels > 0 && layers > 0, "an image needs at least one mip level and one layer");
        Self {
            image,
            aspect: aspect_for_format(format),
            mip_levels,
            layers,
            states: Mutex::new(vec![ResourceState::for_layout(initial_layout); (mip_levels * layers) as usize]),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ResourceState>> {
        // State writes are single assignments, so a panic elsewhere cannot leave them half updated.
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn index(&self, mip: u32, layer: u32) -> usize {
        (mip * self.layers + layer) as usize
    }

    /// Current state of a single subresource.
    pub fn state(&self, mip: u32, layer: u32) -> ResourceState {
        assert!(mip < self.mip_levels && layer < self.layers, "subresource ({mip}, {layer}) out of bounds");
        self.lock()[self.index(mip, layer)]
    }

    /// The state shared by every subresource in the range, or `None` if the range is in mixed states.
    pub fn uniform_state(&self, range: SubresourceRange) -> Option<ResourceState> {
        let range = range.resolve(self.mip_levels, self.layers);
        let states = self.lock();
        let first = states[self.index(range.base_mip, range.base_layer)];
        self.subresources(range)
            .all(|(mip, layer)| states[self.index(mip, layer)] == first)
            .then_some(first)
    }

    fn subresources(&self, range: SubresourceRange) -> impl Iterator<Item = (u32, u32)> {
        (range.base_mip..range.base_mip + range.mip_count)
            .flat_map(move |mip| (range.base_layer..range.base_layer + range.layer_count).map(move |layer| (mip, layer)))
    }

    /// Transition a range to `target`, appending the barriers this needs to `batch`.
    ///
    /// Nothing is emitted if the whole range already is in the target state. A range in one uniform state
    /// produces one barrier. A range in mixed states is split per mip level into runs of consecutive layers with the same
    /// source state, and subresources already in the target state are skipped.
    /// Returns the number of barriers appended.
    /// # Panics
    /// Panics if the range does not lie inside the image.
    pub fn transition(&self, range: SubresourceRange, target: ResourceState, batch: &mut BarrierBatch) -> usize {
        let range = range.resolve(self.mip_levels, self.layers);
        let mut states = self.lock();
        let first = states[self.index(range.base_mip, range.base_layer)];
        let uniform = self
            .subresources(range)
            .all(|(mip, layer)| states[self.index(mip, layer)] == first);

        let mut emitted = 0;
        if uniform {
            if first == target {
                return 0;
            }
            batch.push_image(self.barrier(first, target, range));
            emitted += 1;
        } else {
            for mip in range.base_mip..range.base_mip + range.mip_count {
                let end = range.base_layer + range.layer_count;
                let mut start = range.base_layer;
                while start < end {
                    let source = states[self.index(mip, start)];
                    let mut run_end = start + 1;
                    while run_end < end && states[self.index(mip, run_end)] == source {
                        run_end += 1;
                    }
                    if source != target {
                        batch.push_image(self.barrier(source, target, SubresourceRange::new(mip, 1, start, run_end - start)));
                        emitted += 1;
                    }
                    start = run_end;
                }
            }
        }

        for (mip, layer) in self.subresources(range) {
            let index = self.index(mip, layer);
            states[index] = target;
        }
        emitted
    }

    /// Overwrite the stored state without emitting a barrier. Use this when the layout was changed by something
    /// other than the tracker, such as the final layout of a render pass or a swapchain acquire.
    pub fn assume(&self, range: SubresourceRange, state: ResourceState) {
        let range = range.resolve(self.mip_levels, self.layers);
        let mut states = self.lock();
        for (mip, layer) in self.subresources(range) {
            let index = self.index(mip, layer);
            states[index] = state;
        }
    }

    fn barrier(&self, src: ResourceState, dst: ResourceState, range: SubresourceRange) -> vk::ImageMemoryBarrier2 {
        vk::ImageMemoryBarrier2::builder()
            .src_stage_mask(src.stages)
            .src_access_mask(src.access)
            .dst_stage_mask(dst.stages)
            .dst_access_mask(dst.access)
            .old_layout(src.layout)
            .new_layout(dst.layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.aspect,
                base_mip_level: range.base_mip,
                level_count: range.mip_count,
                base_array_layer: range.base_layer,
                layer_count: range.layer_count,
            })
            .build()
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Aspect used for every barrier on this image.
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }
}

/// Whole-resource state of a buffer.
#[derive(Debug)]
pub struct BufferState {
    buffer: vk::Buffer,
    size: vk::DeviceSize,
    state: Mutex<ResourceState>,
}

impl BufferState {
    /// Start tracking a buffer that has not been used yet.
    pub fn new(buffer: vk::Buffer, size: vk::DeviceSize) -> Self {
        Self {
            buffer,
            size,
            state: Mutex::new(ResourceState::default()),
        }
    }

    pub fn state(&self) -> ResourceState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Transition the buffer to `target`, appending a barrier to `batch` unless it already is in that state.
    /// Returns whether a barrier was appended.
    pub fn transition(&self, target: ResourceState, batch: &mut BarrierBatch) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *state == target {
            return false;
        }
        batch.push_buffer(
            vk::BufferMemoryBarrier2::builder()
                .src_stage_mask(state.stages)
                .src_access_mask(state.access)
                .dst_stage_mask(target.stages)
                .dst_access_mask(target.access)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(self.buffer)
                .offset(0)
                .size(self.size)
                .build(),
        );
        *state = target;
        true
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_remaining_counts() {
        let range = SubresourceRange::new(1, vk::REMAINING_MIP_LEVELS, 2, vk::REMAINING_ARRAY_LAYERS).resolve(4, 6);
        assert_eq!(range, SubresourceRange::new(1, 3, 2, 4));
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_range_panics() {
        SubresourceRange::new(0, 5, 0, 1).resolve(4, 1);
    }

    #[test]
    fn depth_stencil_formats_include_stencil() {
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(aspect_for_format(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(aspect_for_format(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
    }
}
