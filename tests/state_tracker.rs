use ash::vk;
use ash::vk::Handle;
use rayon::prelude::*;

use deimos::{BarrierBatch, BufferState, ImageState, PipelineStage, ResourceState, SubresourceRange};

use framework::MockRecorder;

mod framework;

fn color_image(mips: u32, layers: u32) -> ImageState {
    ImageState::new(
        vk::Image::from_raw(1),
        vk::Format::R8G8B8A8_UNORM,
        mips,
        layers,
        vk::ImageLayout::UNDEFINED,
    )
}

fn transfer_dst() -> ResourceState {
    ResourceState::for_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
}

fn shader_read() -> ResourceState {
    ResourceState::for_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
}

#[test]
pub fn uniform_range_produces_one_barrier() {
    let image = color_image(3, 2);
    let mut batch = BarrierBatch::new();
    assert_eq!(image.transition(SubresourceRange::full(), transfer_dst(), &mut batch), 1);

    let barrier = batch.image_barriers()[0];
    assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(barrier.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(barrier.src_stage_mask, PipelineStage::NONE);
    assert_eq!(barrier.dst_stage_mask, PipelineStage::TRANSFER);
    assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
    assert_eq!(barrier.subresource_range.level_count, 3);
    assert_eq!(barrier.subresource_range.layer_count, 2);
    assert_eq!(barrier.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);

    for mip in 0..3 {
        for layer in 0..2 {
            assert_eq!(image.state(mip, layer), transfer_dst());
        }
    }
}

#[test]
pub fn transition_to_current_state_is_a_no_op() {
    let image = color_image(1, 1);
    let mut batch = BarrierBatch::new();
    image.transition(SubresourceRange::full(), transfer_dst(), &mut batch);
    let mut second = BarrierBatch::new();
    assert_eq!(image.transition(SubresourceRange::full(), transfer_dst(), &mut second), 0);
    assert!(second.is_empty());
}

#[test]
pub fn mixed_ranges_are_split_per_mip_into_layer_runs() {
    let image = color_image(2, 4);
    let mut batch = BarrierBatch::new();
    image.transition(SubresourceRange::new(0, 1, 1, 2), transfer_dst(), &mut batch);
    assert_eq!(image.uniform_state(SubresourceRange::full()), None);

    let mut batch = BarrierBatch::new();
    let emitted = image.transition(SubresourceRange::full(), shader_read(), &mut batch);
    // Mip 0: layer 0, layers 1..3 and layer 3 each have their own source state. Mip 1 is one run.
    assert_eq!(emitted, 4);
    let ranges = batch
        .image_barriers()
        .iter()
        .map(|b| {
            (
                b.subresource_range.base_mip_level,
                b.subresource_range.base_array_layer,
                b.subresource_range.layer_count,
                b.old_layout,
            )
        })
        .collect::<Vec<_>>();
    assert_eq!(
        ranges,
        vec![
            (0, 0, 1, vk::ImageLayout::UNDEFINED),
            (0, 1, 2, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            (0, 3, 1, vk::ImageLayout::UNDEFINED),
            (1, 0, 4, vk::ImageLayout::UNDEFINED),
        ]
    );
    assert_eq!(image.uniform_state(SubresourceRange::full()), Some(shader_read()));
}

#[test]
pub fn subresources_already_in_the_target_state_are_skipped() {
    let image = color_image(2, 4);
    let mut batch = BarrierBatch::new();
    image.transition(SubresourceRange::mip(1), shader_read(), &mut batch);

    let mut batch = BarrierBatch::new();
    assert_eq!(image.transition(SubresourceRange::full(), shader_read(), &mut batch), 1);
    let barrier = batch.image_barriers()[0];
    assert_eq!(barrier.subresource_range.base_mip_level, 0);
    assert_eq!(barrier.subresource_range.layer_count, 4);
}

#[test]
pub fn depth_stencil_images_use_both_aspects() {
    let image = ImageState::new(
        vk::Image::from_raw(2),
        vk::Format::D24_UNORM_S8_UINT,
        1,
        1,
        vk::ImageLayout::UNDEFINED,
    );
    let mut batch = BarrierBatch::new();
    image.transition(
        SubresourceRange::full(),
        ResourceState::for_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        &mut batch,
    );
    assert_eq!(
        batch.image_barriers()[0].subresource_range.aspect_mask,
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    );
}

#[test]
pub fn assume_changes_state_without_barriers() {
    let image = color_image(1, 1);
    let present = ResourceState::for_layout(vk::ImageLayout::PRESENT_SRC_KHR);
    image.assume(SubresourceRange::full(), present);
    assert_eq!(image.state(0, 0), present);

    let mut batch = BarrierBatch::new();
    image.transition(SubresourceRange::full(), transfer_dst(), &mut batch);
    assert_eq!(batch.image_barriers()[0].old_layout, vk::ImageLayout::PRESENT_SRC_KHR);
}

#[test]
pub fn buffer_barriers_follow_the_last_access() {
    let buffer = BufferState::new(vk::Buffer::from_raw(3), 256);
    let mut batch = BarrierBatch::new();
    assert!(buffer.transition(ResourceState::buffer_transfer_dst(), &mut batch));
    assert!(buffer.transition(ResourceState::buffer_vertex_input(), &mut batch));
    // Same state again, no barrier even though the previous access was a read.
    assert!(!buffer.transition(ResourceState::buffer_vertex_input(), &mut batch));

    let barriers = batch.buffer_barriers();
    assert_eq!(barriers.len(), 2);
    assert_eq!(barriers[1].src_stage_mask, PipelineStage::TRANSFER);
    assert_eq!(barriers[1].src_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
    assert_eq!(barriers[1].dst_stage_mask, PipelineStage::VERTEX_INPUT);
    assert_eq!(barriers[1].size, 256);
    assert_eq!(buffer.state(), ResourceState::buffer_vertex_input());
}

#[test]
pub fn batches_are_recorded_as_one_command() {
    let image = color_image(1, 2);
    let buffer = BufferState::new(vk::Buffer::from_raw(4), 64);
    let mut batch = BarrierBatch::new();
    image.transition(SubresourceRange::full(), transfer_dst(), &mut batch);
    buffer.transition(ResourceState::buffer_transfer_src(), &mut batch);

    let mut recorder = MockRecorder::default();
    assert!(batch.record(&mut recorder));
    assert_eq!(recorder.commands.len(), 1);
    assert_eq!(recorder.commands[0].0.len(), 1);
    assert_eq!(recorder.commands[0].1.len(), 1);

    assert!(!BarrierBatch::new().record(&mut recorder));
    assert_eq!(recorder.commands.len(), 1, "an empty batch records nothing");
}

#[test]
pub fn layers_can_be_transitioned_from_many_threads() {
    let image = color_image(1, 64);
    let total: usize = (0..64u32)
        .into_par_iter()
        .map(|layer| {
            let mut batch = BarrierBatch::new();
            image.transition(SubresourceRange::new(0, 1, layer, 1), transfer_dst(), &mut batch)
        })
        .sum();
    assert_eq!(total, 64);
    assert_eq!(image.uniform_state(SubresourceRange::full()), Some(transfer_dst()));
}

#[test]
#[should_panic]
pub fn out_of_bounds_state_query_panics() {
    let image = color_image(1, 1);
    image.state(1, 0);
}
