use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use ash::vk;
use futures::executor::block_on;
use futures::future::FusedFuture;

use deimos::command_buffer::recycler::{CommandBufferRecycler, CommandBufferState};
use deimos::core::queue::select_queue;
use deimos::util::deferred_delete::DeletionQueue;
use deimos::{QueueInfo, SubmissionFuture, SubmissionTimeline};

use framework::MockTimeline;

mod framework;

fn queue(flags: vk::QueueFlags, granularity: u32) -> QueueInfo {
    QueueInfo {
        flags,
        transfer_granularity: vk::Extent3D {
            width: granularity,
            height: granularity,
            depth: granularity,
        },
        ..Default::default()
    }
}

#[test]
pub fn dedicated_queues_win_ties() {
    let queues = [
        queue(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 1),
        queue(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 1),
        queue(vk::QueueFlags::TRANSFER, 1),
    ];
    assert_eq!(select_queue(&queues, vk::QueueFlags::TRANSFER, None, &[]), Some(2));
    assert_eq!(select_queue(&queues, vk::QueueFlags::COMPUTE, None, &[]), Some(1));
    assert_eq!(select_queue(&queues, vk::QueueFlags::GRAPHICS, None, &[]), Some(0));
}

#[test]
pub fn finer_granularity_beats_fewer_capabilities() {
    let queues = [
        queue(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 1),
        queue(vk::QueueFlags::TRANSFER, 8),
    ];
    assert_eq!(select_queue(&queues, vk::QueueFlags::TRANSFER, None, &[]), Some(0));
}

#[test]
pub fn minimum_granularity_rejects_coarse_queues() {
    let queues = [
        // Zero granularity means only whole mip levels can be transferred.
        queue(vk::QueueFlags::TRANSFER, 0),
        queue(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 4),
    ];
    let min = vk::Extent3D {
        width: 4,
        height: 4,
        depth: 4,
    };
    assert_eq!(select_queue(&queues, vk::QueueFlags::TRANSFER, Some(min), &[]), Some(1));
    assert_eq!(select_queue(&queues, vk::QueueFlags::TRANSFER, Some(min), &[1]), None);
}

#[test]
pub fn excluded_and_incapable_queues_are_skipped() {
    let queues = [queue(vk::QueueFlags::TRANSFER, 1), queue(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 1)];
    assert_eq!(select_queue(&queues, vk::QueueFlags::TRANSFER, None, &[0]), Some(1));
    assert_eq!(select_queue(&queues, vk::QueueFlags::GRAPHICS, None, &[]), None);
}

fn allocate_next(next: &mut u64) -> Result<u64, ()> {
    *next += 1;
    Ok(*next)
}

#[test]
pub fn command_buffers_are_recycled_after_retirement() {
    let mut recycler = CommandBufferRecycler::<u64>::new();
    let mut next = 0;

    let first = recycler.acquire(0, || allocate_next(&mut next)).unwrap();
    assert_eq!(recycler.state(first), Some(CommandBufferState::Recording));
    recycler.mark_executable(first);
    recycler.mark_submitted(first, 1);

    let second = recycler.acquire(0, || allocate_next(&mut next)).unwrap();
    assert_ne!(first, second, "a command buffer in flight is never handed out");
    recycler.mark_executable(second);
    recycler.mark_submitted(second, 2);

    let third = recycler.acquire(1, || allocate_next(&mut next)).unwrap();
    assert_eq!(third, first);
    assert_eq!(recycler.len(), 2);
    assert_eq!(recycler.count(CommandBufferState::Submitted), 1);

    assert_eq!(recycler.retire(2), 1);
    assert_eq!(recycler.state(second), Some(CommandBufferState::Free));
}

#[test]
pub fn unsubmitted_command_buffers_return_immediately() {
    let mut recycler = CommandBufferRecycler::<u64>::new();
    let mut next = 0;
    let handle = recycler.acquire(0, || allocate_next(&mut next)).unwrap();
    recycler.mark_executable(handle);
    recycler.release(handle);
    assert_eq!(recycler.acquire(0, || allocate_next(&mut next)).unwrap(), handle);
    assert_eq!(recycler.len(), 1);
}

#[test]
pub fn allocation_errors_are_propagated() {
    let mut recycler = CommandBufferRecycler::<u64>::new();
    assert_eq!(recycler.acquire(0, || Err::<u64, _>("out of memory")), Err("out of memory"));
    assert!(recycler.is_empty());
}

#[test]
#[should_panic]
pub fn submitting_while_recording_panics() {
    let mut recycler = CommandBufferRecycler::<u64>::new();
    let handle = recycler.acquire(0, || Ok::<_, ()>(7)).unwrap();
    recycler.mark_submitted(handle, 1);
}

#[test]
pub fn future_resolves_once_the_serial_retires() -> Result<()> {
    let timeline = MockTimeline::new();
    let serial = timeline.submit();
    let mut future = SubmissionFuture::new(timeline.clone(), serial).attach_value(String::from("done"));
    assert!(!future.is_complete()?);
    assert!(!future.is_terminated());

    let signal = timeline.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        signal.retire_up_to(serial);
    });

    let value = block_on(&mut future)?;
    assert_eq!(value, "done");
    assert!(future.is_terminated());
    assert!(timeline.is_retired(serial)?);
    handle.join().unwrap();
    Ok(())
}

#[test]
pub fn future_for_a_retired_serial_is_ready() -> Result<()> {
    let timeline = MockTimeline::new();
    timeline.advance_to(4);
    let future = SubmissionFuture::new(timeline as Arc<dyn SubmissionTimeline>, 3);
    assert!(future.is_complete()?);
    block_on(future)?;
    Ok(())
}

#[test]
pub fn deferred_values_are_dropped_in_serial_order() {
    let tracker = Arc::new(());
    let mut queue = DeletionQueue::new();
    queue.push(tracker.clone(), 1);
    queue.push(tracker.clone(), 3);
    assert_eq!(Arc::strong_count(&tracker), 3);

    assert_eq!(queue.collect(0), 0);
    assert_eq!(queue.collect(2), 1);
    assert_eq!(Arc::strong_count(&tracker), 2);
    assert_eq!(queue.collect(3), 1);
    assert!(queue.is_empty());
    assert_eq!(Arc::strong_count(&tracker), 1);
}
