//! Logical queues with their own submission serials, command buffer pools and timeline semaphore.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::ThreadId;
use std::time::Duration;

use anyhow::Result;
use ash::vk;

use crate::command_buffer::command_pool::CommandPool;
use crate::command_buffer::recycler::{CommandBufferRecycler, CommandBufferState};
use crate::command_buffer::{CommandBufferSlot, IncompleteCommandBuffer};
use crate::core::device::ExtensionID;
use crate::domain::ExecutionDomain;
use crate::sync::submit_batch::SubmitBatch;
use crate::sync::timeline::SubmissionTimeline;
use crate::{Device, Error, Semaphore, TimelineSemaphore};

/// Abstraction over vulkan queue capabilities. Note that in raw Vulkan, there is no 'Graphics queue'. Deimos will expose one, but behind the scenes the exposed
/// e.g. graphics queue and transfer could point to the same hardware queue.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq, Hash)]
pub enum QueueType {
    #[default]
    Graphics = vk::QueueFlags::GRAPHICS.as_raw() as isize,
    Compute = vk::QueueFlags::COMPUTE.as_raw() as isize,
    Transfer = vk::QueueFlags::TRANSFER.as_raw() as isize,
}

impl QueueType {
    /// The queue flags this queue type requires.
    pub fn flags(self) -> vk::QueueFlags {
        vk::QueueFlags::from_raw(self as vk::Flags)
    }
}

/// Stores all information of a queue that was found on the physical device.
#[derive(Default, Debug, Copy, Clone)]
pub struct QueueInfo {
    /// Functionality that this queue provides.
    pub queue_type: QueueType,
    /// Whether this is a dedicated queue or not.
    pub dedicated: bool,
    /// The queue family index.
    pub family_index: u32,
    /// All supported operations on this queue, instead of its primary type.
    pub flags: vk::QueueFlags,
    /// Minimum image transfer granularity of the queue family. `(0, 0, 0)` means only whole mip levels can be transferred.
    pub transfer_granularity: vk::Extent3D,
}

fn granularity_component(value: u32) -> u32 {
    if value == 0 {
        u32::MAX
    } else {
        value
    }
}

fn granularity_rank(extent: vk::Extent3D) -> (u32, u64) {
    let (w, h, d) = (
        granularity_component(extent.width),
        granularity_component(extent.height),
        granularity_component(extent.depth),
    );
    (w.max(h).max(d), w as u64 * h as u64 * d as u64)
}

fn fits_granularity(extent: vk::Extent3D, max: vk::Extent3D) -> bool {
    granularity_component(extent.width) <= granularity_component(max.width)
        && granularity_component(extent.height) <= granularity_component(max.height)
        && granularity_component(extent.depth) <= granularity_component(max.depth)
}

/// Pick the queue that supports every flag in `required` with the finest image transfer granularity.
/// Queues whose index is in `exclude` are skipped. If `min_granularity` is set, queues with a coarser granularity in any
/// dimension are rejected. Ties are broken by the number of unrequested capabilities, then by index, so dedicated
/// queues win over general purpose ones.
///
/// # Example
/// ```
/// # use deimos::*;
/// # use deimos::core::queue::select_queue;
/// let queues = [
///     QueueInfo { flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, transfer_granularity: vk::Extent3D { width: 1, height: 1, depth: 1 }, ..Default::default() },
///     QueueInfo { flags: vk::QueueFlags::TRANSFER, transfer_granularity: vk::Extent3D { width: 1, height: 1, depth: 1 }, ..Default::default() },
/// ];
/// assert_eq!(select_queue(&queues, vk::QueueFlags::TRANSFER, None, &[]), Some(1));
/// assert_eq!(select_queue(&queues, vk::QueueFlags::TRANSFER, None, &[1]), Some(0));
/// ```
pub fn select_queue(infos: &[QueueInfo], required: vk::QueueFlags, min_granularity: Option<vk::Extent3D>, exclude: &[usize]) -> Option<usize> {
    infos
        .iter()
        .enumerate()
        .filter(|(index, info)| !exclude.contains(index) && info.flags.contains(required))
        .filter(|(_, info)| min_granularity.map_or(true, |min| fits_granularity(info.transfer_granularity, min)))
        .min_by_key(|(index, info)| {
            let extra = (info.flags & !required).as_raw().count_ones();
            (granularity_rank(info.transfer_granularity), extra, *index)
        })
        .map(|(index, _)| index)
}

/// Physical VkQueue object.
#[derive(Debug)]
pub(crate) struct DeviceQueue {
    pub handle: vk::Queue,
}

/// Key of a command pool inside a queue. Pools are never shared between threads.
pub(crate) type PoolKey = (ThreadId, vk::CommandPoolCreateFlags);

#[derive(Debug)]
struct PoolEntry {
    pool: CommandPool,
    recycler: CommandBufferRecycler<vk::CommandBuffer>,
}

/// Exposes a logical command queue on the device. Note that the physical `VkQueue` object could be multiplexed
/// between different logical queues (e.g. on devices with only one queue).
///
/// Every submission to a queue gets the next submission serial, and signals the queue's timeline semaphore
/// to that serial once it completes. Command buffers are pooled per thread and per set of pool flags, and return to
/// their pool once their submission has retired.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Queue {
    #[derivative(Debug = "ignore")]
    device: Device,
    queue: Arc<Mutex<DeviceQueue>>,
    info: QueueInfo,
    timeline: TimelineSemaphore,
    /// Serial of the last successful submission. Held while a submission is enqueued.
    submission: Mutex<u64>,
    pools: Mutex<HashMap<PoolKey, PoolEntry>>,
}

impl Queue {
    pub(crate) fn new(device: Device, queue: Arc<Mutex<DeviceQueue>>, info: QueueInfo) -> Result<Self> {
        let timeline = TimelineSemaphore::new(device.clone(), 0)?;
        Ok(Queue {
            device,
            queue,
            info,
            timeline,
            submission: Mutex::new(0),
            pools: Mutex::new(HashMap::new()),
        })
    }

    fn acquire_device_queue(&self) -> Result<MutexGuard<DeviceQueue>> {
        Ok(self.queue.lock().map_err(|_| Error::PoisonError)?)
    }

    fn lock_pools(&self) -> Result<MutexGuard<HashMap<PoolKey, PoolEntry>>> {
        Ok(self.pools.lock().map_err(|_| Error::PoisonError)?)
    }

    /// Obtain a command buffer in the recording state from this thread's pool with the given flags. A retired command
    /// buffer is reused if there is one, otherwise a new one is allocated.
    /// # Panics
    /// Panics if this queue does not support the operations of domain `D`.
    pub fn acquire_command_buffer<D: ExecutionDomain>(self: &Arc<Self>, flags: vk::CommandPoolCreateFlags) -> Result<IncompleteCommandBuffer<D>> {
        assert!(
            self.info.flags.contains(D::required_flags()),
            "queue with flags {:?} cannot record commands requiring {:?}",
            self.info.flags,
            D::required_flags()
        );

        let key: PoolKey = (std::thread::current().id(), flags | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let completed = self.timeline.value()?;
        let handle = {
            let mut pools = self.lock_pools()?;
            let entry = match pools.entry(key) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    let pool = CommandPool::new(self.device.clone(), self.info.family_index, key.1)?;
                    entry.insert(PoolEntry {
                        pool,
                        recycler: CommandBufferRecycler::new(),
                    })
                }
            };
            let PoolEntry {
                pool,
                recycler,
            } = entry;
            recycler.acquire(completed, || pool.allocate())?
        };

        let slot = CommandBufferSlot {
            queue: self.clone(),
            pool: key,
            handle,
        };
        IncompleteCommandBuffer::new(self.device.clone(), slot, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
    }

    pub(crate) fn mark_executable(&self, pool: &PoolKey, handle: vk::CommandBuffer) -> Result<()> {
        let mut pools = self.lock_pools()?;
        match pools.get_mut(pool) {
            Some(entry) => entry.recycler.mark_executable(handle),
            None => panic!("command buffer {handle:p} does not belong to this queue"),
        }
        Ok(())
    }

    pub(crate) fn release_command_buffer(&self, pool: &PoolKey, handle: vk::CommandBuffer) {
        match self.pools.lock() {
            Ok(mut pools) => {
                if let Some(entry) = pools.get_mut(pool) {
                    entry.recycler.release(handle);
                }
            }
            Err(_) => error!("Command pool lock poisoned, leaking command buffer {handle:p}"),
        }
    }

    /// State of a command buffer owned by this queue, or `None` if this queue does not know the handle.
    pub fn command_buffer_state(&self, handle: vk::CommandBuffer) -> Result<Option<CommandBufferState>> {
        let pools = self.lock_pools()?;
        Ok(pools.values().find_map(|entry| entry.recycler.state(handle)))
    }

    /// Submit a batch of command buffers with its semaphore waits and signals. The queue's timeline semaphore is
    /// always signaled with the serial assigned to this submission, which is returned.
    ///
    /// Serial assignment and the actual `vkQueueSubmit2` call happen atomically, so serials are enqueued in order.
    /// # Panics
    /// Panics if the batch was created for another queue.
    /// # Errors
    /// Fails if the submission is rejected by the driver, for example on device loss. No serial is consumed in that case.
    pub fn submit(&self, mut batch: SubmitBatch) -> Result<u64> {
        assert!(
            std::ptr::eq(batch.queue().as_ref(), self),
            "submit batch was created for another queue"
        );

        let cmds = batch
            .command_buffers()
            .iter()
            .map(|slot| vk::CommandBufferSubmitInfo::builder().command_buffer(slot.handle).build())
            .collect::<Vec<_>>();
        let waits = batch
            .waits()
            .iter()
            .map(|wait| wait.info())
            .collect::<Vec<_>>();

        let serial = {
            let mut last = self.submission.lock().map_err(|_| Error::PoisonError)?;
            let serial = *last + 1;
            let mut signals = batch
                .signals()
                .iter()
                .map(|signal| signal.info())
                .collect::<Vec<_>>();
            signals.push(
                vk::SemaphoreSubmitInfo::builder()
                    .semaphore(unsafe { self.timeline.handle() })
                    .value(serial)
                    .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
                    .build(),
            );
            let submit = vk::SubmitInfo2::builder()
                .wait_semaphore_infos(waits.as_slice())
                .command_buffer_infos(cmds.as_slice())
                .signal_semaphore_infos(signals.as_slice())
                .build();

            let queue = self.acquire_device_queue()?;
            unsafe {
                self.device
                    .queue_submit2(queue.handle, std::slice::from_ref(&submit), vk::Fence::null())?;
            }
            *last = serial;
            serial
        };

        let slots = batch.take_command_buffers();
        let mut pools = self.lock_pools()?;
        for slot in slots {
            if let Some(entry) = pools.get_mut(&slot.pool) {
                entry.recycler.mark_submitted(slot.handle, serial);
            }
        }
        trace!(
            "Submitted {} command buffer(s) to queue family {} with serial {serial}",
            cmds.len(),
            self.info.family_index
        );
        Ok(serial)
    }

    /// Move every command buffer whose submission has retired back to its free list. Returns the retired serial.
    pub fn retire(&self) -> Result<u64> {
        let completed = self.timeline.value()?;
        let mut pools = self.lock_pools()?;
        for entry in pools.values_mut() {
            entry.recycler.retire(completed);
        }
        Ok(completed)
    }

    /// Block until every submission made to this queue so far has completed.
    pub fn wait(&self) -> Result<()> {
        let target = self.last_submitted();
        self.timeline.wait(target, None)?;
        self.retire()?;
        Ok(())
    }

    /// Block until the submission with this serial has completed, or until the timeout expires.
    /// Returns `false` on timeout.
    pub fn wait_for(&self, serial: u64, timeout: Option<Duration>) -> Result<bool> {
        self.timeline.wait(serial, timeout)
    }

    /// Present a swapchain image owned by the application. Returns `true` if the swapchain is suboptimal.
    /// # Errors
    /// * Fails with [`Error::ExtensionNotSupported`] if presenting was not enabled in the [`AppSettings`](crate::AppSettings).
    /// * Fails with the error returned by `vkQueuePresentKHR`, for example `VK_ERROR_OUT_OF_DATE_KHR`.
    pub fn present(&self, swapchain: vk::SwapchainKHR, image_index: u32, wait: &[&Semaphore]) -> Result<bool> {
        let functions = self
            .device
            .swapchain()
            .ok_or(Error::ExtensionNotSupported(ExtensionID::Swapchain))?;
        let semaphores = wait
            .iter()
            .map(|semaphore| unsafe { semaphore.handle() })
            .collect::<Vec<_>>();
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(semaphores.as_slice())
            .swapchains(std::slice::from_ref(&swapchain))
            .image_indices(std::slice::from_ref(&image_index))
            .build();
        let queue = self.acquire_device_queue()?;
        Ok(unsafe { functions.queue_present(queue.handle, &info)? })
    }

    /// Number of submissions made to this queue.
    pub fn submission_count(&self) -> u64 {
        self.last_submitted()
    }

    /// The timeline semaphore signaled by every submission on this queue.
    pub fn timeline(&self) -> &TimelineSemaphore {
        &self.timeline
    }

    /// Obtain the raw vulkan handle of a queue.
    /// # Safety
    /// The handle may be shared with other logical queues, submitting to it directly breaks serial tracking.
    pub unsafe fn handle(&self) -> Result<vk::Queue> {
        Ok(self.acquire_device_queue()?.handle)
    }

    pub fn info(&self) -> &QueueInfo {
        &self.info
    }
}

impl SubmissionTimeline for Queue {
    fn last_submitted(&self) -> u64 {
        match self.submission.lock() {
            Ok(serial) => *serial,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn last_retired(&self) -> Result<u64> {
        self.timeline.value()
    }
}
