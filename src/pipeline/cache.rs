//! The [`PipelineCache`] ties together the caches for pipelines and every object they are derived from.

use std::sync::Arc;

use anyhow::Result;

use crate::pipeline::compute::{ComputePipeline, ComputePipelineCreateInfo, ComputePipelineDeps};
use crate::pipeline::create_info::RenderTarget;
use crate::pipeline::pipeline_layout::{PipelineLayout, PipelineLayoutCreateInfo};
use crate::pipeline::render_pass::{RenderPass, RenderPassCreateInfo};
use crate::pipeline::set_layout::{DescriptorSetLayout, DescriptorSetLayoutCreateInfo};
use crate::pipeline::shader::Shader;
use crate::pipeline::{Pipeline, PipelineDeps};
use crate::util::cache::Cache;
use crate::{Device, PipelineCreateInfo, ShaderCreateInfo};

/// The main pipeline cache struct. Every object is created on first request and afterwards looked up by the hash of
/// its description. Cloning gives another handle to the same caches.
/// # Example usage
/// ```
/// use deimos::prelude::*;
/// # fn example(cache: &PipelineCache, code: Vec<u32>) -> anyhow::Result<()> {
/// let pci = ComputePipelineBuilder::new("my_pipeline")
///     .set_shader(ShaderCreateInfo::from_spirv(vk::ShaderStageFlags::COMPUTE, code))
///     .build();
/// let a = cache.get_compute_pipeline(&pci)?;
/// let b = cache.get_compute_pipeline(&pci)?;
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// # Ok(())
/// # }
/// ```
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct PipelineCache {
    #[derivative(Debug = "ignore")]
    device: Device,
    shaders: Cache<Shader>,
    set_layouts: Cache<DescriptorSetLayout>,
    pipeline_layouts: Cache<PipelineLayout>,
    render_passes: Cache<RenderPass>,
    pipelines: Cache<Pipeline>,
    compute_pipelines: Cache<ComputePipeline>,
}

impl PipelineCache {
    /// Create a new empty pipeline cache.
    pub fn new(device: Device) -> Self {
        Self {
            device,
            shaders: Cache::new("shader"),
            set_layouts: Cache::new("descriptor set layout"),
            pipeline_layouts: Cache::new("pipeline layout"),
            render_passes: Cache::new("render pass"),
            pipelines: Cache::new("pipeline"),
            compute_pipelines: Cache::new("compute pipeline"),
        }
    }

    fn get_shader(&self, info: &ShaderCreateInfo) -> Result<Arc<Shader>> {
        self.shaders.get_or_create(&self.device, info.code(), ())
    }

    /// Get the descriptor set layout for these bindings.
    pub fn get_set_layout(&self, info: &DescriptorSetLayoutCreateInfo) -> Result<Arc<DescriptorSetLayout>> {
        self.set_layouts.get_or_create(&self.device, info, ())
    }

    /// Get the pipeline layout for these set layouts and push constant ranges.
    pub fn get_pipeline_layout(&self, info: &PipelineLayoutCreateInfo) -> Result<Arc<PipelineLayout>> {
        self.pipeline_layouts
            .get_or_create(&self.device, info, &self.set_layouts)
    }

    pub fn get_render_pass(&self, info: &RenderPassCreateInfo) -> Result<Arc<RenderPass>> {
        self.render_passes.get_or_create(&self.device, info, ())
    }

    /// Get the graphics pipeline for this description, creating it and everything it depends on on a miss.
    /// # Errors
    /// Fails if creating any of the Vulkan objects fails. Nothing is cached for a failed pipeline.
    pub fn get_pipeline(&self, info: &PipelineCreateInfo) -> Result<Arc<Pipeline>> {
        if let Some(pipeline) = self.pipelines.get(info)? {
            return Ok(pipeline);
        }

        let shaders = info
            .shaders
            .iter()
            .map(|shader| self.get_shader(shader))
            .collect::<Result<Vec<_>>>()?;
        let layout = self.get_pipeline_layout(&info.layout)?;
        let render_pass = match &info.target {
            RenderTarget::RenderPass {
                render_pass, ..
            } => Some(self.get_render_pass(render_pass)?),
            RenderTarget::Dynamic(_) => None,
        };
        self.pipelines.get_or_create(
            &self.device,
            info,
            PipelineDeps {
                shaders: &shaders,
                layout,
                render_pass,
            },
        )
    }

    /// Get the compute pipeline for this description, creating it on a miss.
    pub fn get_compute_pipeline(&self, info: &ComputePipelineCreateInfo) -> Result<Arc<ComputePipeline>> {
        if let Some(pipeline) = self.compute_pipelines.get(info)? {
            return Ok(pipeline);
        }

        let shader = self.get_shader(&info.shader)?;
        let layout = self.get_pipeline_layout(&info.layout)?;
        self.compute_pipelines.get_or_create(
            &self.device,
            info,
            ComputePipelineDeps {
                shader: &shader,
                layout,
            },
        )
    }

    /// Drop the shader module with this code hash and every pipeline built from it, for example after the shader
    /// was recompiled. Returns the number of evicted pipelines.
    /// Objects still referenced elsewhere are destroyed once the last reference is dropped.
    pub fn invalidate_shader(&self, code_hash: u64) -> Result<usize> {
        self.shaders.retain(|code, _| code.hash() != code_hash)?;
        let graphics = self.pipelines.retain(|info, _| !info.uses_shader(code_hash))?;
        let compute = self
            .compute_pipelines
            .retain(|info, _| info.shader.code_hash() != code_hash)?;
        let evicted = graphics.len() + compute.len();
        if evicted > 0 {
            info!("Shader {code_hash:#018x} invalidated, evicted {evicted} pipelines");
        }
        Ok(evicted)
    }

    /// Drop every cached object.
    pub fn clear(&self) -> Result<()> {
        // Pipelines first, they hold references to everything else.
        self.pipelines.clear()?;
        self.compute_pipelines.clear()?;
        self.pipeline_layouts.clear()?;
        self.set_layouts.clear()?;
        self.render_passes.clear()?;
        self.shaders.clear()?;
        Ok(())
    }

    /// Shared render pass cache, used by the [`FramebufferCache`](crate::FramebufferCache).
    pub fn render_passes(&self) -> &Cache<RenderPass> {
        &self.render_passes
    }

    /// Number of cached graphics and compute pipelines.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len() + self.compute_pipelines.len()
    }
}
