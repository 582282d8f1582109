#![allow(dead_code)]

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use ash::vk;
use ash::vk::Handle;

use deimos::allocator::provider::{BufferProvider, HostBuffer};
use deimos::{
    AppBuilder, BarrierRecorder, DefaultAllocator, Device, ExecutionManager, GPURequirements, Instance, PhysicalDevice,
    QueueRequest, QueueType, ResourcePool, SubmissionTimeline,
};

pub struct Context {
    pub pool: ResourcePool<DefaultAllocator>,
    pub exec: ExecutionManager,
    pub allocator: DefaultAllocator,
    pub device: Device,
    pub phys_device: Arc<PhysicalDevice>,
    pub instance: Arc<Instance>,
}

/// Creates a headless deimos context ready for automated tests, or `None` if this machine has no usable Vulkan device.
pub fn make_context() -> Option<Context> {
    make_context_with_queues([QueueRequest {
        dedicated: false,
        queue_type: QueueType::Graphics,
    }])
}

/// Create a headless deimos context and request some queues
pub fn make_context_with_queues(queues: impl Into<Vec<QueueRequest>>) -> Option<Context> {
    let _ = pretty_env_logger::try_init();
    let settings = AppBuilder::new()
        .name("deimos test framework")
        .version((0, 0, 1))
        .validation(false)
        .ring_min_capacity(1024u64)
        .gpu(GPURequirements {
            dedicated: false,
            min_video_memory: 0,
            min_dedicated_video_memory: 0,
            queues: queues.into(),
            ..Default::default()
        })
        .build();
    match deimos::initialize(&settings) {
        Ok((instance, phys_device, device, allocator, exec, pool, _)) => Some(Context {
            instance: Arc::new(instance),
            phys_device: Arc::new(phys_device),
            device,
            allocator,
            exec,
            pool,
        }),
        Err(err) => {
            eprintln!("test framework: skipping device test, no Vulkan context: {err}");
            None
        }
    }
}

/// Host memory pretending to be a mapped buffer.
pub struct MockBuffer {
    handle: u64,
    memory: NonNull<u8>,
    size: vk::DeviceSize,
    live: Arc<AtomicUsize>,
}

// SAFETY: the memory is owned by this buffer and only written through allocations handed out for it.
unsafe impl Send for MockBuffer {}
unsafe impl Sync for MockBuffer {}

impl HostBuffer for MockBuffer {
    fn handle(&self) -> vk::Buffer {
        vk::Buffer::from_raw(self.handle)
    }

    fn size(&self) -> vk::DeviceSize {
        self.size
    }

    fn mapped_ptr(&self) -> Option<NonNull<c_void>> {
        Some(self.memory.cast())
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        // SAFETY: created from a boxed slice of exactly `size` bytes in `MockProvider::create_buffer`.
        unsafe {
            let slice = std::ptr::slice_from_raw_parts_mut(self.memory.as_ptr(), self.size as usize);
            drop(Box::from_raw(slice));
        }
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Buffer provider backed by host memory. Counts created and live buffers.
#[derive(Clone, Default)]
pub struct MockProvider {
    pub created: Arc<AtomicUsize>,
    pub live: Arc<AtomicUsize>,
    pub sizes: Arc<std::sync::Mutex<Vec<vk::DeviceSize>>>,
}

impl MockProvider {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl BufferProvider for MockProvider {
    type Buffer = MockBuffer;

    fn create_buffer(&mut self, size: vk::DeviceSize) -> Result<MockBuffer> {
        let memory = Box::into_raw(vec![0u8; size as usize].into_boxed_slice());
        let handle = self.created.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        self.live.fetch_add(1, Ordering::SeqCst);
        self.sizes.lock().unwrap().push(size);
        Ok(MockBuffer {
            handle,
            memory: NonNull::new(memory.cast::<u8>()).unwrap(),
            size,
            live: self.live.clone(),
        })
    }
}

/// Timeline whose serials are advanced by hand.
#[derive(Debug, Default)]
pub struct MockTimeline {
    submitted: AtomicU64,
    retired: AtomicU64,
}

impl MockTimeline {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pretend a new submission happened and return its serial.
    pub fn submit(&self) -> u64 {
        self.submitted.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn retire_up_to(&self, serial: u64) {
        self.retired.store(serial, Ordering::SeqCst);
    }

    /// Submit and retire until both counters reach `serial`.
    pub fn advance_to(&self, serial: u64) {
        self.submitted.store(serial, Ordering::SeqCst);
        self.retired.store(serial, Ordering::SeqCst);
    }
}

impl SubmissionTimeline for MockTimeline {
    fn last_submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    fn last_retired(&self) -> Result<u64> {
        Ok(self.retired.load(Ordering::SeqCst))
    }
}

/// Records every barrier command instead of sending it to a command buffer.
#[derive(Debug, Default)]
pub struct MockRecorder {
    pub commands: Vec<(Vec<vk::ImageMemoryBarrier2>, Vec<vk::BufferMemoryBarrier2>)>,
}

impl BarrierRecorder for MockRecorder {
    fn record_barriers(&mut self, images: &[vk::ImageMemoryBarrier2], buffers: &[vk::BufferMemoryBarrier2]) {
        self.commands.push((images.to_vec(), buffers.to_vec()));
    }
}
