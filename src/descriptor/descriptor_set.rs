use std::sync::Arc;

use ash::vk;

use crate::descriptor::descriptor_pool::DescriptorPool;
use crate::pipeline::set_layout::{DescriptorSetLayout, DescriptorSetLayoutCreateInfo};
use crate::{BufferRange, Device, ImageView};

/// An allocated descriptor set. Freed back to its pool on drop.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DescriptorSet {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::DescriptorSet,
    #[derivative(Debug = "ignore")]
    pool: Arc<DescriptorPool>,
    layout: Arc<DescriptorSetLayout>,
}

impl DescriptorSet {
    pub(crate) fn new(
        device: Device,
        handle: vk::DescriptorSet,
        pool: Arc<DescriptorPool>,
        layout: Arc<DescriptorSetLayout>,
    ) -> Self {
        #[cfg(feature = "log-objects")]
        trace!("Allocated VkDescriptorSet {handle:p}");
        Self {
            device,
            handle,
            pool,
            layout,
        }
    }

    /// Get unsafe access to the underlying `VkDescriptorSet`.
    /// # Safety
    /// Any vulkan calls that mutate the descriptor set may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }

    pub fn layout(&self) -> &Arc<DescriptorSetLayout> {
        &self.layout
    }

    /// Start writing descriptors into this set.
    pub fn update(&self) -> DescriptorSetUpdate<'_> {
        DescriptorSetUpdate {
            set: self,
            writes: vec![],
        }
    }
}

impl Drop for DescriptorSet {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Freeing VkDescriptorSet {:p}", self.handle);
        if let Err(err) = self.pool.free(self.handle) {
            error!("Failed to free descriptor set: {err}");
        }
    }
}

/// What a single descriptor write points at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DescriptorResource {
    Buffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    Image {
        sampler: vk::Sampler,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    },
}

/// A single descriptor write into a set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub array_element: u32,
    pub ty: vk::DescriptorType,
    pub resource: DescriptorResource,
}

/// Filter `writes` against the bindings of a set layout. Writes to bindings absent from the layout are skipped.
/// # Panics
/// Panics if a write's descriptor type differs from the type of its binding in the layout.
pub fn plan_writes<'w>(layout: &DescriptorSetLayoutCreateInfo, writes: &'w [DescriptorWrite]) -> Vec<&'w DescriptorWrite> {
    writes
        .iter()
        .filter(|write| match layout.binding(write.binding) {
            Some(binding) => {
                assert_eq!(
                    binding.ty, write.ty,
                    "descriptor write to binding {} has type {:?}, but the layout declares {:?}",
                    write.binding, write.ty, binding.ty
                );
                true
            }
            None => {
                trace!("Skipping descriptor write to binding {} absent from the layout", write.binding);
                false
            }
        })
        .collect()
}

/// Collects descriptor writes for a set, then applies them in one `vkUpdateDescriptorSets` call.
/// The set must not be in use by the GPU while it is updated.
#[derive(Debug)]
pub struct DescriptorSetUpdate<'s> {
    set: &'s DescriptorSet,
    writes: Vec<DescriptorWrite>,
}

impl<'s> DescriptorSetUpdate<'s> {
    /// Write a buffer range to a buffer binding, such as a uniform or storage buffer.
    pub fn buffer(mut self, binding: u32, ty: vk::DescriptorType, buffer: &impl BufferRange) -> Self {
        self.writes.push(DescriptorWrite {
            binding,
            array_element: 0,
            ty,
            resource: DescriptorResource::Buffer {
                buffer: buffer.buffer_handle(),
                offset: buffer.offset(),
                range: buffer.size(),
            },
        });
        self
    }

    /// Write an image view to an image binding. `sampler` is only used for combined image samplers.
    pub fn image(
        mut self,
        binding: u32,
        ty: vk::DescriptorType,
        view: &ImageView,
        layout: vk::ImageLayout,
        sampler: vk::Sampler,
    ) -> Self {
        self.writes.push(DescriptorWrite {
            binding,
            array_element: 0,
            ty,
            resource: DescriptorResource::Image {
                sampler,
                view: unsafe { view.handle() },
                layout,
            },
        });
        self
    }

    pub fn sampled_image(self, binding: u32, view: &ImageView, sampler: vk::Sampler) -> Self {
        self.image(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            view,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            sampler,
        )
    }

    pub fn storage_image(self, binding: u32, view: &ImageView) -> Self {
        self.image(
            binding,
            vk::DescriptorType::STORAGE_IMAGE,
            view,
            vk::ImageLayout::GENERAL,
            vk::Sampler::null(),
        )
    }

    /// Add a raw write.
    pub fn write(mut self, write: DescriptorWrite) -> Self {
        self.writes.push(write);
        self
    }

    /// Apply every write valid for the set's layout. Returns the number of applied writes.
    pub fn apply(self) -> usize {
        let writes = plan_writes(self.set.layout.info(), &self.writes);

        // Info arrays must outlive the write structs pointing into them.
        let buffer_infos = writes
            .iter()
            .map(|write| match write.resource {
                DescriptorResource::Buffer {
                    buffer,
                    offset,
                    range,
                } => Some([vk::DescriptorBufferInfo {
                    buffer,
                    offset,
                    range,
                }]),
                DescriptorResource::Image {
                    ..
                } => None,
            })
            .collect::<Vec<_>>();
        let image_infos = writes
            .iter()
            .map(|write| match write.resource {
                DescriptorResource::Image {
                    sampler,
                    view,
                    layout,
                } => Some([vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: layout,
                }]),
                DescriptorResource::Buffer {
                    ..
                } => None,
            })
            .collect::<Vec<_>>();

        let vk_writes = writes
            .iter()
            .enumerate()
            .map(|(index, write)| {
                let builder = vk::WriteDescriptorSet::builder()
                    .dst_set(self.set.handle)
                    .dst_binding(write.binding)
                    .dst_array_element(write.array_element)
                    .descriptor_type(write.ty);
                match (&buffer_infos[index], &image_infos[index]) {
                    (Some(buffer), _) => builder.buffer_info(buffer).build(),
                    (_, Some(image)) => builder.image_info(image).build(),
                    (None, None) => unreachable!(),
                }
            })
            .collect::<Vec<_>>();

        if !vk_writes.is_empty() {
            unsafe {
                self.set.device.update_descriptor_sets(&vk_writes, &[]);
            }
        }
        vk_writes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::set_layout::DescriptorBinding;

    fn uniform(binding: u32) -> DescriptorWrite {
        DescriptorWrite {
            binding,
            array_element: 0,
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            resource: DescriptorResource::Buffer {
                buffer: vk::Buffer::null(),
                offset: 0,
                range: 64,
            },
        }
    }

    fn layout() -> DescriptorSetLayoutCreateInfo {
        DescriptorSetLayoutCreateInfo::new(vec![DescriptorBinding::new(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
        )])
    }

    #[test]
    fn writes_to_absent_bindings_are_skipped() {
        let writes = [uniform(0), uniform(5)];
        let planned = plan_writes(&layout(), &writes);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].binding, 0);
    }

    #[test]
    #[should_panic]
    fn type_mismatch_panics() {
        let mut write = uniform(0);
        write.ty = vk::DescriptorType::STORAGE_BUFFER;
        let _ = plan_writes(&layout(), &[write]);
    }
}
