//! A descriptor allocator that automatically grows by creating new descriptor pools. It is completely managed for you
//! so you dont need to create pools manually.

use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;

use crate::descriptor::descriptor_set::DescriptorSet;
use crate::pipeline::set_layout::DescriptorSetLayout;
use crate::{Device, Error};

const POOL_DESCRIPTOR_TYPES: [vk::DescriptorType; 11] = [
    vk::DescriptorType::SAMPLER,
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::SAMPLED_IMAGE,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
    vk::DescriptorType::STORAGE_TEXEL_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::STORAGE_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
    vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
    vk::DescriptorType::INPUT_ATTACHMENT,
];

/// Defines how large each descriptor pool is.
#[derive(Debug, Copy, Clone)]
pub struct DescriptorPoolSize {
    /// Maximum number of sets allocated from a single pool.
    pub max_sets: u32,
    /// Number of descriptors of every type in a single pool.
    pub descriptors_per_type: u32,
}

impl Default for DescriptorPoolSize {
    fn default() -> Self {
        Self {
            max_sets: 256,
            descriptors_per_type: 512,
        }
    }
}

impl Display for DescriptorPoolSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DescriptorPoolSize ({} sets, {} descriptors per type)",
            self.max_sets, self.descriptors_per_type
        )
    }
}

/// Memory pool for descriptor sets
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct DescriptorPool {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::DescriptorPool,
    // Allocating and freeing from the same pool requires external synchronization.
    #[derivative(Debug = "ignore")]
    lock: Mutex<()>,
}

impl DescriptorPool {
    fn new(device: Device, size: DescriptorPoolSize) -> Result<Self> {
        let pool_sizes = POOL_DESCRIPTOR_TYPES
            .iter()
            .map(|ty| vk::DescriptorPoolSize {
                ty: *ty,
                descriptor_count: size.descriptors_per_type,
            })
            .collect::<Vec<_>>();
        let info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(size.max_sets)
            .pool_sizes(&pool_sizes)
            .build();

        let handle = unsafe { device.create_descriptor_pool(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkDescriptorPool {handle:p}");

        Ok(Self {
            device,
            handle,
            lock: Mutex::new(()),
        })
    }

    fn allocate(&self, layout: vk::DescriptorSetLayout) -> std::result::Result<vk::DescriptorSet, vk::Result> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.handle)
            .set_layouts(&layouts)
            .build();
        let sets = unsafe { self.device.allocate_descriptor_sets(&info)? };
        sets.first().copied().ok_or(vk::Result::ERROR_UNKNOWN)
    }

    pub(crate) fn free(&self, set: vk::DescriptorSet) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| Error::PoisonError)?;
        unsafe {
            self.device
                .free_descriptor_sets(self.handle, std::slice::from_ref(&set))?;
        }
        Ok(())
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkDescriptorPool {:p}", self.handle);
        unsafe {
            self.device.destroy_descriptor_pool(self.handle, None);
        }
    }
}

/// Allocates descriptor sets, creating a new pool whenever the current one is exhausted. Sets keep their pool alive,
/// so pools are destroyed once the allocator and every set allocated from them are gone.
/// Cloning gives another handle to the same allocator.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct DescriptorAllocator {
    #[derivative(Debug = "ignore")]
    device: Device,
    size: DescriptorPoolSize,
    #[derivative(Debug = "ignore")]
    pools: Arc<Mutex<Vec<Arc<DescriptorPool>>>>,
}

impl DescriptorAllocator {
    pub fn new(device: Device, size: DescriptorPoolSize) -> Self {
        Self {
            device,
            size,
            pools: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Allocate a descriptor set with this layout.
    /// # Errors
    /// * Fails with [`Error::EmptyDescriptorBinding`] if the layout has no bindings.
    /// * Fails if a new pool could not be created, or if allocation fails for another reason than pool exhaustion.
    pub fn allocate(&self, layout: &Arc<DescriptorSetLayout>) -> Result<DescriptorSet> {
        if layout.info().bindings().is_empty() {
            return Err(Error::EmptyDescriptorBinding.into());
        }
        let handle = unsafe { layout.handle() };
        let mut pools = self.pools.lock().map_err(|_| Error::PoisonError)?;

        if let Some(pool) = pools.last() {
            match pool.allocate(handle) {
                Ok(set) => return Ok(DescriptorSet::new(self.device.clone(), set, pool.clone(), layout.clone())),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {}
                Err(err) => return Err(Error::VkError(err).into()),
            }
        }

        let pool = Arc::new(DescriptorPool::new(self.device.clone(), self.size)?);
        debug!("Descriptor allocator: created pool {} ({})", pools.len(), self.size);
        pools.push(pool.clone());
        let set = pool.allocate(handle).map_err(Error::VkError)?;
        Ok(DescriptorSet::new(self.device.clone(), set, pool, layout.clone()))
    }

    /// Number of pools created so far.
    pub fn pool_count(&self) -> usize {
        self.pools.lock().map(|pools| pools.len()).unwrap_or_default()
    }
}
