//! Exposes all structs needed to store initialization parameters.

use ash::vk;

use crate::allocator::ring_allocator::RingAllocatorSettings;
use crate::allocator::staging_pool::StagingPoolSettings;
use crate::core::queue::QueueType;

/// Structure holding a queue with specific capabilities to request from the physical device.
///
/// See also: [`GPURequirements`](crate::GPURequirements), [`QueueType`](crate::core::queue::QueueType), [`Queue`](crate::core::queue::Queue)
///
/// # Example
/// ```
/// # use deimos::*;
/// let transfer = QueueRequest {
///     dedicated: true,
///     queue_type: QueueType::Transfer
/// };
///
/// let graphics = QueueRequest {
///     dedicated: false,
///     queue_type: QueueType::Graphics
/// };
/// ```
#[derive(Debug, Copy, Clone)]
pub struct QueueRequest {
    /// Whether this queue should be dedicated if possible. For example, requesting a dedicated queue of type [`QueueType::Transfer`] will try to
    /// match this to a queue that does not have graphics or compute capabilities.
    ///
    /// Note that some queues might still expose other features even if they are dedicated. Graphics and compute queues always
    /// support transfer operations.
    pub dedicated: bool,
    /// Capabilities that are requested from the queue. Graphics and compute both imply transfer capabilities.
    pub queue_type: QueueType,
}

/// Minimum requirements for the GPU. This will be used to determine what physical device is selected, and enable
/// optional Vulkan features and extensions.
///
/// Timeline semaphores, `synchronization2`, dynamic rendering and buffer device addresses are always enabled, since the
/// submission layer depends on them.
/// # Example
/// ```
/// # use deimos::*;
/// let mut requirements = GPURequirements {
///     dedicated: true,
///     min_video_memory: 1024  * 1024 * 1024,
///     min_dedicated_video_memory: 1024  * 1024 * 1024,
///     queues: vec![
///         QueueRequest {
///             dedicated: false,
///             queue_type: QueueType::Graphics,
///         }
///     ],
///     ..Default::default()
/// };
/// // Enable an optional Vulkan feature.
/// requirements.features.sampler_anisotropy = vk::TRUE;
/// ```
#[derive(Default, Debug)]
pub struct GPURequirements {
    /// Whether a dedicated GPU is required. Setting this to true will discard integrated GPUs.
    pub dedicated: bool,
    /// Minimum amount of video memory required, in bytes. Note that this might count shared memory if RAM is shared.
    pub min_video_memory: usize,
    /// Minimum amount of dedicated video memory, in bytes. This only counts memory that is on the device.
    pub min_dedicated_video_memory: usize,
    /// Command queue types requested from the physical device. For more information, see
    /// [`QueueRequest`]
    pub queues: Vec<QueueRequest>,
    /// Optional Vulkan 1.0 features that are required from the physical device.
    pub features: vk::PhysicalDeviceFeatures,
    /// Optional Vulkan 1.1 features that are required from the physical device.
    pub features_1_1: vk::PhysicalDeviceVulkan11Features,
    /// Optional Vulkan 1.2 features that are required from the physical device.
    pub features_1_2: vk::PhysicalDeviceVulkan12Features,
    /// Optional Vulkan 1.3 features that are required from the physical device.
    pub features_1_3: vk::PhysicalDeviceVulkan13Features,
    /// Vulkan device extensions that should be present and enabled.
    pub device_extensions: Vec<String>,
}

/// Application settings used to initialize the deimos context.
#[derive(Debug)]
pub struct AppSettings {
    /// Application name. Possibly displayed in debugging tools, task manager, etc.
    pub name: String,
    /// Application version.
    pub version: (u32, u32, u32),
    /// Enable Vulkan validation layers for additional debug output. For developing this should almost always be on.
    pub enable_validation: bool,
    /// Load `VK_KHR_swapchain` so queues can present images to a swapchain owned by the application.
    pub present: bool,
    /// Extra instance extensions, typically the platform surface extensions required by the windowing layer.
    pub instance_extensions: Vec<String>,
    /// Minimum requirements the selected physical device should have.
    pub gpu_requirements: GPURequirements,
    /// Chunk sizing and buffer usage of the transient ring allocator.
    pub ring_allocator: RingAllocatorSettings,
    /// Reuse and destruction policy of the staging buffer pool.
    pub staging_pool: StagingPoolSettings,
}

/// The app builder is a convenience struct to easily create [`AppSettings`](crate::AppSettings).
///
/// For information about each of the fields, see [`AppSettings`](crate::AppSettings)
/// # Example
/// ```
/// # use deimos::*;
/// let info: AppSettings = AppBuilder::new()
///     .name("My deimos application")
///     .ring_min_capacity(64 * 1024u64)
///     .staging_delete_delay(5)
///     .validation(true)
///     .build();
/// ```
pub struct AppBuilder {
    inner: AppSettings,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppBuilder {
    /// Create a new app builder with default settings.
    pub fn new() -> Self {
        AppBuilder {
            inner: AppSettings {
                name: String::from(""),
                version: (0, 0, 0),
                enable_validation: false,
                present: false,
                instance_extensions: vec![],
                gpu_requirements: GPURequirements::default(),
                ring_allocator: RingAllocatorSettings::default(),
                staging_pool: StagingPoolSettings::default(),
            },
        }
    }

    /// Sets the application name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    /// Sets the application version.
    pub fn version(mut self, ver: impl Into<(u32, u32, u32)>) -> Self {
        self.inner.version = ver.into();
        self
    }

    /// Enable the Vulkan validation layers.
    pub fn validation(mut self, val: bool) -> Self {
        self.inner.enable_validation = val;
        self
    }

    /// Enable presentation support through `VK_KHR_swapchain`.
    pub fn present(mut self, val: bool) -> Self {
        self.inner.present = val;
        self
    }

    /// Add an instance extension, for example one required to create a window surface.
    pub fn instance_extension(mut self, name: impl Into<String>) -> Self {
        self.inner.instance_extensions.push(name.into());
        self
    }

    /// The gpu requirements that the physical device must satisfy.
    pub fn gpu(mut self, gpu: GPURequirements) -> Self {
        self.inner.gpu_requirements = gpu;
        self
    }

    /// Minimum capacity of ring allocator chunks, in bytes.
    pub fn ring_min_capacity(mut self, size: impl Into<u64>) -> Self {
        self.inner.ring_allocator.min_capacity = size.into();
        self
    }

    /// Factor by which each new ring allocator chunk grows compared to the previous one.
    pub fn ring_growth_factor(mut self, factor: u64) -> Self {
        self.inner.ring_allocator.growth_factor = factor;
        self
    }

    /// Buffer usage flags of the ring allocator's chunks.
    pub fn ring_usage(mut self, usage: vk::BufferUsageFlags) -> Self {
        self.inner.ring_allocator.usage = usage;
        self
    }

    /// Number of submissions an unused staging buffer survives before it may be destroyed.
    pub fn staging_delete_delay(mut self, delay: u64) -> Self {
        self.inner.staging_pool.delete_delay = delay;
        self
    }

    /// Largest ratio between a reused staging buffer's capacity and the requested size.
    pub fn staging_oversize_multiplier(mut self, multiplier: u64) -> Self {
        self.inner.staging_pool.oversize_multiplier = multiplier;
        self
    }

    /// Build the resulting application settings.
    pub fn build(self) -> AppSettings {
        self.inner
    }
}
