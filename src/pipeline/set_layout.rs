use anyhow::Result;
use ash::vk;

use crate::util::cache::Resource;
use crate::Device;

/// A single binding of a descriptor set layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

impl DescriptorBinding {
    pub fn new(binding: u32, ty: vk::DescriptorType, stages: vk::ShaderStageFlags) -> Self {
        Self {
            binding,
            ty,
            count: 1,
            stages,
        }
    }
}

/// Describes a descriptor set layout. Bindings are kept sorted by binding index, so the order in which they were
/// given does not influence the cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutCreateInfo {
    bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayoutCreateInfo {
    /// # Panics
    /// Panics if two bindings share the same binding index.
    pub fn new(mut bindings: Vec<DescriptorBinding>) -> Self {
        bindings.sort_by_key(|binding| binding.binding);
        for pair in bindings.windows(2) {
            assert_ne!(pair[0].binding, pair[1].binding, "duplicate descriptor binding {}", pair[0].binding);
        }
        Self {
            bindings,
        }
    }

    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    /// Find the binding with this index.
    pub fn binding(&self, binding: u32) -> Option<&DescriptorBinding> {
        self.bindings
            .binary_search_by_key(&binding, |b| b.binding)
            .ok()
            .map(|index| &self.bindings[index])
    }
}

/// A fully built Vulkan descriptor set layout. This is a managed resource, so it cannot be manually
/// cloned or dropped.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DescriptorSetLayout {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::DescriptorSetLayout,
    info: DescriptorSetLayoutCreateInfo,
}

impl DescriptorSetLayout {
    /// Get unsafe access to the underlying `VkDescriptorSetLayout`.
    /// # Safety
    /// Any vulkan calls that mutate the layout may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    /// The description this layout was created from.
    pub fn info(&self) -> &DescriptorSetLayoutCreateInfo {
        &self.info
    }
}

impl Resource for DescriptorSetLayout {
    type Key = DescriptorSetLayoutCreateInfo;
    type ExtraParams<'a> = ();

    fn create(device: Device, key: &Self::Key, _: Self::ExtraParams<'_>) -> Result<Self> {
        let bindings = key
            .bindings
            .iter()
            .map(|binding| vk::DescriptorSetLayoutBinding {
                binding: binding.binding,
                descriptor_type: binding.ty,
                descriptor_count: binding.count,
                stage_flags: binding.stages,
                p_immutable_samplers: std::ptr::null(),
            })
            .collect::<Vec<_>>();
        let info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(bindings.as_slice())
            .build();
        let handle = unsafe { device.create_descriptor_set_layout(&info, None)? };

        #[cfg(feature = "log-objects")]
        trace!("Created new VkDescriptorSetLayout {handle:p}");

        Ok(Self {
            device,
            handle,
            info: key.clone(),
        })
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkDescriptorSetLayout {:p}", self.handle);
        unsafe {
            self.device.destroy_descriptor_set_layout(self.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_order_does_not_matter() {
        let ubo = DescriptorBinding::new(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX);
        let tex = DescriptorBinding::new(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT);
        let a = DescriptorSetLayoutCreateInfo::new(vec![ubo, tex]);
        let b = DescriptorSetLayoutCreateInfo::new(vec![tex, ubo]);
        assert_eq!(a, b);
        assert_eq!(a.binding(1).map(|b| b.ty), Some(vk::DescriptorType::COMBINED_IMAGE_SAMPLER));
        assert!(a.binding(2).is_none());
    }

    #[test]
    #[should_panic]
    fn duplicate_bindings_panic() {
        let ubo = DescriptorBinding::new(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX);
        let _ = DescriptorSetLayoutCreateInfo::new(vec![ubo, ubo]);
    }
}
