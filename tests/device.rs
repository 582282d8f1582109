use anyhow::Result;
use ash::vk;
use ash::vk::Handle;
use futures::executor::block_on;

use deimos::prelude::*;
use deimos::command_buffer::recycler::CommandBufferState;
use deimos::util::upload::upload_buffer;

mod framework;

#[test]
pub fn alloc_buffer() -> Result<()> {
    let Some(mut context) = framework::make_context() else {
        return Ok(());
    };
    const ALLOC_SIZE: u64 = 1024u64;
    let buffer = Buffer::new(
        context.device.clone(),
        &mut context.allocator,
        ALLOC_SIZE,
        vk::BufferUsageFlags::STORAGE_BUFFER,
        MemoryType::GpuOnly,
    )?;
    assert_ne!(unsafe { buffer.handle().as_raw() }, 0, "Buffer handle should not be null.");
    assert!(buffer.size() >= ALLOC_SIZE, "Allocated buffer should at least fit requested size.");
    assert_eq!(buffer.state().state(), ResourceState::default(), "A new buffer has not been accessed yet.");
    Ok(())
}

#[test]
pub fn empty_submission_retires() -> Result<()> {
    let Some(context) = framework::make_context() else {
        return Ok(());
    };
    let exec = &context.exec;
    let cmd = exec.on_domain::<domain::Transfer>()?.finish()?;
    let queue = cmd.queue().clone();
    let serial = exec.submit_command_buffer(cmd)?;
    assert_eq!(serial, 1, "the first submission on a queue gets serial 1");
    assert!(queue.wait_for(serial, None)?);
    assert!(queue.is_retired(serial)?);

    // The retired command buffer is handed out again.
    exec.retire()?;
    let again = exec.on_domain::<domain::Transfer>()?.finish()?;
    let serial = exec.submit_command_buffer(again)?;
    assert_eq!(serial, 2);
    exec.wait_idle()?;
    Ok(())
}

#[test]
pub fn upload_buffer_resolves_to_the_buffer() -> Result<()> {
    let Some(context) = framework::make_context() else {
        return Ok(());
    };
    let data: Vec<u32> = (0..256).collect();
    let future = upload_buffer(&context.pool, &data, vk::BufferUsageFlags::STORAGE_BUFFER)?;
    assert_eq!(context.pool.staging().used_count()?, 0, "the staging buffer goes back to the pool after submission");
    let buffer = block_on(future)?;
    assert_eq!(buffer.size(), 1024);
    assert_eq!(buffer.state().state(), ResourceState::buffer_transfer_dst());
    context.pool.next_frame()?;
    Ok(())
}

#[test]
pub fn ring_allocations_are_mapped() -> Result<()> {
    let Some(context) = framework::make_context() else {
        return Ok(());
    };
    let ring = context.pool.ring();
    let mut allocation = ring.allocate(64)?;
    allocation.mapped_slice()?.copy_from_slice(&[1u8; 64]);
    assert_ne!(allocation.buffer(), vk::Buffer::null());
    ring.free(allocation)?;
    assert_eq!(ring.used()?, 0);
    Ok(())
}

#[test]
pub fn descriptor_sets_share_cached_layouts() -> Result<()> {
    let Some(context) = framework::make_context() else {
        return Ok(());
    };
    let info = DescriptorSetLayoutCreateInfo::new(vec![DescriptorBinding::new(
        0,
        vk::DescriptorType::STORAGE_BUFFER,
        vk::ShaderStageFlags::COMPUTE,
    )]);
    let layout = context.pool.pipelines().get_set_layout(&info)?;
    let same = context.pool.pipelines().get_set_layout(&info)?;
    assert!(std::sync::Arc::ptr_eq(&layout, &same));

    let sets = (0..4)
        .map(|_| context.pool.descriptors().allocate(&layout))
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(sets.len(), 4);
    assert_eq!(context.pool.descriptors().pool_count(), 1);
    Ok(())
}

#[test]
pub fn deferred_objects_are_dropped_after_retirement() -> Result<()> {
    let Some(context) = framework::make_context() else {
        return Ok(());
    };
    let tracker = std::sync::Arc::new(());
    let queue = context.exec.get_queue::<domain::Transfer>()?;
    let cmd = context.exec.on_domain::<domain::Transfer>()?.finish()?;
    let serial = context.exec.submit_command_buffer(cmd)?;
    context.pool.defer_delete(tracker.clone(), &queue, serial)?;
    assert_eq!(std::sync::Arc::strong_count(&tracker), 2);

    queue.wait_for(serial, None)?;
    context.pool.next_frame()?;
    assert_eq!(std::sync::Arc::strong_count(&tracker), 1);
    Ok(())
}

#[test]
pub fn waiting_frees_every_submitted_command_buffer() -> Result<()> {
    let Some(context) = framework::make_context() else {
        return Ok(());
    };
    let exec = &context.exec;
    let queue = exec.get_queue::<domain::Graphics>()?;
    let mut handles = vec![];
    for expected in 1..=3 {
        let cmd = exec.on_domain::<domain::Graphics>()?.finish()?;
        handles.push(unsafe { cmd.handle() });
        assert_eq!(exec.submit_command_buffer(cmd)?, expected);
    }
    queue.wait()?;
    assert_eq!(queue.last_retired()?, 3);
    for handle in handles {
        assert_eq!(queue.command_buffer_state(handle)?, Some(CommandBufferState::Free));
    }
    Ok(())
}
