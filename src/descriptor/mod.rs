//! This module handles everything related to descriptor sets.
//!
//! Descriptor sets are allocated from a [`DescriptorAllocator`](crate::DescriptorAllocator), which grows by creating a
//! new descriptor pool whenever the current one runs out of space, removing the need to declare its size upfront.
//! Set layouts come from the [`PipelineCache`](crate::PipelineCache), so sets with equal bindings share a layout.
//!
//! Writes are collected with [`DescriptorSet::update()`](crate::DescriptorSet::update) and applied in one call.
//! Writes to bindings the layout does not declare are skipped, while a write whose type contradicts the layout is a
//! programming error and panics.
//!
//! # Example
//!
//! ```
//! use deimos::prelude::*;
//! # fn example(pool: &ResourcePool, ubo: &BufferView, tex: &ImageView, sampler: vk::Sampler) -> anyhow::Result<()> {
//! let layout = pool.pipelines().get_set_layout(&DescriptorSetLayoutCreateInfo::new(vec![
//!     DescriptorBinding::new(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
//!     DescriptorBinding::new(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
//! ]))?;
//! let set = pool.descriptors().allocate(&layout)?;
//! set.update()
//!     .buffer(0, vk::DescriptorType::UNIFORM_BUFFER, ubo)
//!     // In GLSL: layout(set = X, binding = 1) uniform sampler2D tex;
//!     .sampled_image(1, tex, sampler)
//!     .apply();
//! # Ok(())
//! # }
//! ```

pub mod descriptor_pool;
pub mod descriptor_set;
