use std::sync::Arc;

use anyhow::{anyhow, Result};

use deimos::{StagingPool, StagingPoolSettings};

use framework::{MockProvider, MockTimeline};

mod framework;

fn make_pool(delete_delay: u64) -> (StagingPool<MockProvider, Arc<MockTimeline>>, MockProvider, Arc<MockTimeline>) {
    let provider = MockProvider::default();
    let timeline = MockTimeline::new();
    let pool = StagingPool::new(
        provider.clone(),
        timeline.clone(),
        StagingPoolSettings {
            delete_delay,
            oversize_multiplier: 4,
        },
    );
    (pool, provider, timeline)
}

#[test]
pub fn buffers_are_reused_after_their_submission_retires() -> Result<()> {
    let (pool, provider, timeline) = make_pool(5);

    let mut first = pool.allocate(256)?;
    first.mapped_slice()?.fill(7);
    timeline.submit();
    pool.set_unused(first)?;

    // Serial 1 has not retired yet, so the buffer may still be read by the GPU.
    let second = pool.allocate(256)?;
    assert_eq!(provider.created(), 2);

    timeline.retire_up_to(1);
    let third = pool.allocate(256)?;
    assert_eq!(provider.created(), 2, "the retired buffer is handed out again");
    assert_eq!(pool.used_count()?, 2);

    pool.set_unused(second)?;
    pool.set_unused(third)?;
    assert_eq!(pool.used_count()?, 0);
    Ok(())
}

#[test]
pub fn oversized_buffers_are_not_reused_for_small_requests() -> Result<()> {
    let (pool, provider, _timeline) = make_pool(5);
    let big = pool.allocate(1024)?;
    pool.set_unused(big)?;

    let small = pool.allocate(100)?;
    assert_eq!(small.capacity(), 100, "1024 bytes is more than four times the request");
    assert_eq!(provider.created(), 2);

    let medium = pool.allocate(300)?;
    assert_eq!(medium.capacity(), 1024);
    assert_eq!(medium.size(), 300);
    assert_eq!(provider.created(), 2);
    Ok(())
}

#[test]
pub fn the_smallest_fitting_buffer_is_picked() -> Result<()> {
    let (pool, _provider, _timeline) = make_pool(5);
    let large = pool.allocate(1600)?;
    let small = pool.allocate(512)?;
    pool.set_unused(large)?;
    pool.set_unused(small)?;

    let allocation = pool.allocate(400)?;
    assert_eq!(allocation.capacity(), 512);
    Ok(())
}

#[test]
pub fn unused_buffers_are_destroyed_after_the_delete_delay() -> Result<()> {
    let (pool, provider, timeline) = make_pool(5);
    let allocation = pool.allocate(64)?;
    timeline.advance_to(3);
    pool.set_unused(allocation)?;

    timeline.retire_up_to(8);
    assert_eq!(pool.remove_unused()?, 0, "the buffer survives until the retired serial passes 3 + 5");
    assert_eq!(provider.live(), 1);

    timeline.retire_up_to(9);
    assert_eq!(pool.remove_unused()?, 1);
    assert_eq!(provider.live(), 0);
    assert!(pool.is_empty()?);
    Ok(())
}

#[test]
pub fn buffers_in_use_are_never_destroyed() -> Result<()> {
    let (pool, provider, timeline) = make_pool(0);
    let allocation = pool.allocate(64)?;
    timeline.advance_to(100);
    assert_eq!(pool.remove_unused()?, 0);
    assert_eq!(provider.live(), 1);
    assert_eq!(pool.total_capacity()?, 64);
    pool.set_unused(allocation)?;
    Ok(())
}

#[test]
pub fn buffers_read_by_another_queue_wait_for_that_queue() -> Result<()> {
    let (pool, provider, timeline) = make_pool(0);
    let graphics = MockTimeline::new();
    let allocation = pool.allocate(128)?;
    let serial = graphics.submit();
    pool.set_unused_after(allocation, graphics.clone(), serial)?;

    // The pool's own timeline is idle, but the graphics submission still reads the buffer.
    timeline.advance_to(10);
    let other = pool.allocate(128)?;
    assert_eq!(provider.created(), 2);
    assert_eq!(pool.remove_unused()?, 0);
    assert_eq!(provider.live(), 2);

    graphics.retire_up_to(serial);
    let reused = pool.allocate(128)?;
    assert_eq!(provider.created(), 2, "the buffer is reused once the graphics submission retired");
    pool.set_unused(other)?;
    pool.set_unused(reused)?;
    Ok(())
}

#[test]
pub fn scoped_allocations_return_to_the_pool_on_failure() -> Result<()> {
    let (pool, provider, timeline) = make_pool(5);
    let result: Result<()> = pool.with_allocation(256, |staging| {
        staging.mapped_slice()?.fill(1);
        Err(anyhow!("submission failed"))
    });
    assert!(result.is_err());
    assert_eq!(pool.used_count()?, 0, "a failed upload must not keep its staging buffer");

    let size = pool.with_allocation(256, |staging| {
        timeline.submit();
        Ok(staging.capacity())
    })?;
    assert_eq!(size, 256);
    assert_eq!(provider.created(), 1, "the buffer of the failed upload is reused");
    assert_eq!(pool.used_count()?, 0);
    Ok(())
}

#[test]
#[should_panic]
pub fn zero_sized_allocations_panic() {
    let (pool, _provider, _timeline) = make_pool(5);
    let _ = pool.allocate(0);
}
