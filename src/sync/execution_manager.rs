//! Exposes the [`ExecutionManager`], used to allocate and submit command buffers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use ash::vk;

use crate::command_buffer::*;
use crate::core::queue::{select_queue, DeviceQueue, Queue, QueueInfo};
use crate::sync::domain::ExecutionDomain;
use crate::sync::future::SubmissionFuture;
use crate::sync::submit_batch::SubmitBatch;
use crate::{Device, Error, PhysicalDevice, Semaphore};

/// The execution manager owns every queue and is responsible for allocating command buffers on correct
/// queues. To obtain any command buffer, you must allocate it by calling
/// [`ExecutionManager::on_domain()`]. An execution domain is a type that implements
/// the [`domain::ExecutionDomain`](crate::domain::ExecutionDomain) trait. Four domains are already defined, and these should cover
/// virtually every available use case.
///
/// - [`domain::All`](crate::domain::All) supports all operations and is essentially a combination of the other three domains.
/// - [`domain::Graphics`](crate::domain::Graphics) supports only graphics operations.
/// - [`domain::Transfer`](crate::domain::Transfer) supports only transfer operations.
/// - [`domain::Compute`](crate::domain::Compute) supports only compute operations.
///
/// Submissions never block. Only [`ExecutionManager::wait_idle()`] and [`Queue::wait()`] wait on the GPU.
///
/// # Example
/// ```no_run
/// # use deimos::*;
/// # use anyhow::Result;
/// fn record(exec: &ExecutionManager, src: &BufferView, dst: &BufferView) -> Result<()> {
///     // Obtain a command buffer on the Transfer domain
///     let cmd = exec.on_domain::<domain::Transfer>()?
///         .copy_buffer(src, dst)?
///         .finish()?;
///     let serial = exec.submit(exec.start_submit_batch::<domain::Transfer>()?.command_buffer(cmd))?;
///     exec.get_queue::<domain::Transfer>()?.wait_for(serial, None)?;
///     Ok(())
/// }
/// ```
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct ExecutionManager {
    #[derivative(Debug = "ignore")]
    device: Device,
    queues: Arc<Vec<Arc<Queue>>>,
}

impl ExecutionManager {
    /// Create a new execution manager with one logical queue per requested queue. Requests that map to a queue
    /// family with fewer hardware queues than requested share the underlying `VkQueue`. You should only ever
    /// have one instance of this struct in your program.
    pub fn new(device: Device, physical_device: &PhysicalDevice) -> Result<Self> {
        let mut counts = HashMap::<u32, u32>::new();
        let mut device_queues = HashMap::<u32, Arc<Mutex<DeviceQueue>>>::new();

        let queues = physical_device
            .queues()
            .iter()
            .map(|queue| -> Result<Arc<Queue>> {
                let max_count = physical_device
                    .queue_families()
                    .get(queue.family_index as usize)
                    .map(|family| family.queue_count)
                    .ok_or(Error::NoCapableQueue)?;
                let index = counts.entry(queue.family_index).or_insert(0);
                let device_queue = match device_queues.get(&queue.family_index) {
                    // Out of hardware queues in this family, alias the last one created.
                    Some(existing) if *index >= max_count => existing.clone(),
                    _ => {
                        let device_queue = Arc::new(Mutex::new(DeviceQueue {
                            handle: unsafe { device.get_device_queue(queue.family_index, *index) },
                        }));
                        *index += 1;
                        device_queues.insert(queue.family_index, device_queue.clone());
                        device_queue
                    }
                };
                Ok(Arc::new(Queue::new(device.clone(), device_queue, *queue)?))
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Created device queues:");
        for queue in &queues {
            let info = queue.info();
            info!(
                "Queue #{:?}({}) supports {:?} (dedicated: {}, transfer granularity: {:?})",
                info.queue_type, info.family_index, info.flags, info.dedicated, info.transfer_granularity
            )
        }

        Ok(ExecutionManager {
            device,
            queues: Arc::new(queues),
        })
    }

    /// Obtain a command buffer capable of operating on the specified domain, from the calling thread's default pool.
    pub fn on_domain<D: ExecutionDomain>(&self) -> Result<IncompleteCommandBuffer<D>> {
        self.on_domain_with_flags::<D>(vk::CommandPoolCreateFlags::TRANSIENT)
    }

    /// Obtain a command buffer from the calling thread's pool with the given creation flags.
    pub fn on_domain_with_flags<D: ExecutionDomain>(&self, flags: vk::CommandPoolCreateFlags) -> Result<IncompleteCommandBuffer<D>> {
        let queue = self.get_queue::<D>()?;
        queue.acquire_command_buffer::<D>(flags)
    }

    /// Begin a submit batch on the queue serving domain `D`.
    pub fn start_submit_batch<D: ExecutionDomain>(&self) -> Result<SubmitBatch> {
        Ok(SubmitBatch::new(self.get_queue::<D>()?))
    }

    /// Submit a batch to its queue. Returns the submission serial.
    pub fn submit(&self, batch: SubmitBatch) -> Result<u64> {
        let queue = batch.queue().clone();
        queue.submit(batch)
    }

    /// Submit a single command buffer to the queue serving its domain.
    pub fn submit_command_buffer<D: ExecutionDomain>(&self, cmd: CommandBuffer<D>) -> Result<u64> {
        let batch = SubmitBatch::new(cmd.queue().clone()).command_buffer(cmd);
        self.submit(batch)
    }

    /// Submit a batch and obtain a future that resolves once it has completed.
    pub fn submit_async(&self, batch: SubmitBatch) -> Result<SubmissionFuture> {
        let queue = batch.queue().clone();
        let serial = queue.submit(batch)?;
        Ok(SubmissionFuture::new(queue, serial))
    }

    /// Present a swapchain image on the first queue with graphics support.
    pub fn present(&self, swapchain: vk::SwapchainKHR, image_index: u32, wait: &[&Semaphore]) -> Result<bool> {
        let queue = self
            .select(vk::QueueFlags::GRAPHICS, None, &[])
            .ok_or(Error::NoCapableQueue)?;
        queue.present(swapchain, image_index, wait)
    }

    /// Block until every queue has finished all of its submissions. This waits on the timeline semaphores,
    /// and recycles every command buffer afterwards.
    pub fn wait_idle(&self) -> Result<()> {
        for queue in self.queues.iter() {
            queue.wait()?;
        }
        Ok(())
    }

    /// Total number of submissions over all queues.
    pub fn submission_count(&self) -> u64 {
        self.queues.iter().map(|queue| queue.submission_count()).sum()
    }

    /// Wait for a submission on a specific queue with an optional timeout. Returns `false` on timeout.
    pub fn wait_for(&self, queue: &Queue, serial: u64, timeout: Option<Duration>) -> Result<bool> {
        queue.wait_for(serial, timeout)
    }

    /// Recycle command buffers of retired submissions on every queue.
    pub fn retire(&self) -> Result<()> {
        for queue in self.queues.iter() {
            queue.retire()?;
        }
        Ok(())
    }

    /// Pick the capable queue with the finest transfer granularity, skipping queues in `exclude`.
    /// See [`select_queue`] for the exact rules.
    pub fn select(&self, flags: vk::QueueFlags, min_granularity: Option<vk::Extent3D>, exclude: &[&Arc<Queue>]) -> Option<Arc<Queue>> {
        let infos = self.queues.iter().map(|queue| *queue.info()).collect::<Vec<QueueInfo>>();
        let excluded = self
            .queues
            .iter()
            .enumerate()
            .filter(|(_, queue)| exclude.iter().any(|other| Arc::ptr_eq(queue, other)))
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        select_queue(&infos, flags, min_granularity, &excluded).map(|index| self.queues[index].clone())
    }

    /// Obtain the queue serving domain `D`. The queue requested for this domain is preferred, otherwise the
    /// best capable queue is picked.
    /// # Errors
    /// Fails with [`Error::NoCapableQueue`] if no queue supports the domain.
    pub fn get_queue<D: ExecutionDomain>(&self) -> Result<Arc<Queue>> {
        self.queues
            .iter()
            .find(|queue| D::queue_is_preferred(queue.info()))
            .cloned()
            .or_else(|| self.select(D::required_flags(), None, &[]))
            .ok_or_else(|| Error::NoCapableQueue.into())
    }

    /// All queues owned by this execution manager.
    pub fn queues(&self) -> &[Arc<Queue>] {
        self.queues.as_slice()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}
