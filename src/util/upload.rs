//! Staged uploads into device-local buffers.

use anyhow::Result;
use ash::vk;

use crate::sync::future::SubmissionFuture;
use crate::{domain, Allocator, Buffer, ResourcePool, ResourceState, StagingAllocation, TransferCmdBuffer};

/// Perform a staged upload to a new device-local buffer with the given usage. The data is copied into a buffer from
/// the pool's staging pool and then copied on the transfer queue. Returns a future that resolves to the buffer once
/// the copy has completed. The buffer is left in the transfer destination state.
/// # Panics
/// Panics if `data` is empty.
/// # Example
/// ```
/// # use deimos::prelude::*;
/// # async fn example(pool: &ResourcePool) -> anyhow::Result<()> {
/// let vertices: [f32; 6] = [-1.0, -1.0, 1.0, -1.0, 0.0, 1.0];
/// let buffer = deimos::util::upload::upload_buffer(pool, &vertices, vk::BufferUsageFlags::VERTEX_BUFFER)?.await?;
/// # Ok(())
/// # }
/// ```
pub fn upload_buffer<T: Copy, A: Allocator>(
    pool: &ResourcePool<A>,
    data: &[T],
    usage: vk::BufferUsageFlags,
) -> Result<SubmissionFuture<Buffer<A>>> {
    let size = std::mem::size_of_val(data);
    assert!(size > 0, "cannot upload an empty buffer");
    // SAFETY: `T: Copy` has no drop glue, and the byte view covers exactly the memory of `data`.
    let bytes = unsafe { std::slice::from_raw_parts(data.as_ptr().cast::<u8>(), size) };

    let (future, buffer) = pool
        .staging()
        .with_allocation(size as vk::DeviceSize, |staging| record_copy(pool, staging, bytes, usage))?;
    debug!("Uploading {size} bytes, completes with serial {}", future.serial());
    Ok(future.attach_value(buffer))
}

fn record_copy<A: Allocator>(
    pool: &ResourcePool<A>,
    staging: &mut StagingAllocation,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> Result<(SubmissionFuture<()>, Buffer<A>)> {
    staging.mapped_slice()?.copy_from_slice(bytes);

    let mut allocator = pool.allocator().clone();
    let buffer = Buffer::new_device_local(
        pool.device().clone(),
        &mut allocator,
        bytes.len() as vk::DeviceSize,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
    )?;
    let dst = buffer.view_full();

    let exec = pool.exec();
    let cmd = exec
        .on_domain::<domain::Transfer>()?
        .transition_buffer(buffer.state(), ResourceState::buffer_transfer_dst())
        .copy_buffer(&*staging, &dst)?
        .finish()?;
    let future = exec.submit_async(exec.start_submit_batch::<domain::Transfer>()?.command_buffer(cmd))?;
    Ok((future, buffer))
}
