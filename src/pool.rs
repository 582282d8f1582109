//! The [`ResourcePool`] bundles every shared cache and transient allocator into one service object.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;

use crate::allocator::provider::DeviceBufferProvider;
use crate::allocator::ring_allocator::{RingAllocator, RingAllocatorSettings};
use crate::allocator::staging_pool::{StagingPool, StagingPoolSettings};
use crate::descriptor::descriptor_pool::{DescriptorAllocator, DescriptorPoolSize};
use crate::pipeline::framebuffer::FramebufferCache;
use crate::sync::timeline::SubmissionTimeline;
use crate::util::deferred_delete::DeletionQueue;
use crate::{domain, Allocator, DefaultAllocator, Device, Error, ExecutionManager, MemoryType, PipelineCache, Queue};

/// Everything needed to create a [`ResourcePool`].
pub struct ResourcePoolCreateInfo<A: Allocator = DefaultAllocator> {
    pub device: Device,
    pub allocator: A,
    pub exec: ExecutionManager,
    pub ring: RingAllocatorSettings,
    pub staging: StagingPoolSettings,
    pub descriptors: DescriptorPoolSize,
}

type Deferred = Box<dyn Send>;

struct QueueDeletions {
    queue: Arc<Queue>,
    items: DeletionQueue<Deferred>,
}

/// Acts as a global resource pool that can safely be shared everywhere. Cloning gives another handle to the same
/// caches and allocators.
///
/// Call [`ResourcePool::next_frame()`] once per frame to recycle command buffers, destroy staging buffers that have
/// been unused for long enough and drop deferred objects whose submissions have retired.
#[derive(Derivative)]
#[derivative(Debug(bound = ""), Clone(bound = ""))]
pub struct ResourcePool<A: Allocator = DefaultAllocator> {
    #[derivative(Debug = "ignore")]
    device: Device,
    #[derivative(Debug = "ignore")]
    allocator: A,
    exec: ExecutionManager,
    pipelines: PipelineCache,
    framebuffers: FramebufferCache,
    descriptors: DescriptorAllocator,
    #[derivative(Debug = "ignore")]
    ring: RingAllocator<DeviceBufferProvider<A>>,
    staging: StagingPool<DeviceBufferProvider<A>, Arc<Queue>>,
    #[derivative(Debug = "ignore")]
    deletions: Arc<Mutex<Vec<QueueDeletions>>>,
}

impl<A: Allocator> ResourcePool<A> {
    /// Create the resource pool. Staging buffers are tracked on the queue serving the transfer domain.
    pub fn new(info: ResourcePoolCreateInfo<A>) -> Result<Self> {
        let pipelines = PipelineCache::new(info.device.clone());
        let framebuffers = FramebufferCache::new(info.device.clone(), pipelines.render_passes().clone());
        let ring_provider = DeviceBufferProvider::upload(info.device.clone(), info.allocator.clone(), info.ring.usage);
        let staging_provider = DeviceBufferProvider::new(
            info.device.clone(),
            info.allocator.clone(),
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryType::CpuToGpu,
        );
        let transfer = info.exec.get_queue::<domain::Transfer>()?;
        let deletions = info
            .exec
            .queues()
            .iter()
            .map(|queue| QueueDeletions {
                queue: queue.clone(),
                items: DeletionQueue::new(),
            })
            .collect();

        Ok(Self {
            descriptors: DescriptorAllocator::new(info.device.clone(), info.descriptors),
            ring: RingAllocator::new(ring_provider, info.ring),
            staging: StagingPool::new(staging_provider, transfer, info.staging),
            device: info.device,
            allocator: info.allocator,
            exec: info.exec,
            pipelines,
            framebuffers,
            deletions: Arc::new(Mutex::new(deletions)),
        })
    }

    /// Keep `value` alive until the submission `serial` on `queue` has retired.
    /// # Panics
    /// Panics if `queue` is not owned by this pool's execution manager.
    pub fn defer_delete<T: Send + 'static>(&self, value: T, queue: &Arc<Queue>, serial: u64) -> Result<()> {
        let mut deletions = self.deletions.lock().map_err(|_| Error::PoisonError)?;
        match deletions.iter_mut().find(|entry| Arc::ptr_eq(&entry.queue, queue)) {
            Some(entry) => entry.items.push(Box::new(value), serial),
            None => panic!("deferred deletion on a queue that is not owned by this resource pool"),
        }
        Ok(())
    }

    /// Per-frame maintenance: recycle retired command buffers, remove unused staging buffers and drop deferred
    /// objects whose submissions have retired.
    pub fn next_frame(&self) -> Result<()> {
        self.exec.retire()?;
        let staging = self.staging.remove_unused()?;
        let mut dropped = 0;
        {
            let mut deletions = self.deletions.lock().map_err(|_| Error::PoisonError)?;
            for entry in deletions.iter_mut() {
                let retired = entry.queue.last_retired()?;
                dropped += entry.items.collect(retired);
            }
        }
        trace!("Resource pool maintenance: destroyed {staging} staging buffers, dropped {dropped} deferred objects");
        Ok(())
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn exec(&self) -> &ExecutionManager {
        &self.exec
    }

    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    pub fn framebuffers(&self) -> &FramebufferCache {
        &self.framebuffers
    }

    pub fn descriptors(&self) -> &DescriptorAllocator {
        &self.descriptors
    }

    /// Transient ring allocator for per-frame data.
    pub fn ring(&self) -> &RingAllocator<DeviceBufferProvider<A>> {
        &self.ring
    }

    /// Staging pool for uploads on the transfer queue.
    pub fn staging(&self) -> &StagingPool<DeviceBufferProvider<A>, Arc<Queue>> {
        &self.staging
    }
}
