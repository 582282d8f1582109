//! Wrapper types for compute pipelines

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::pipeline::pipeline_layout::{PipelineLayout, PipelineLayoutCreateInfo};
use crate::pipeline::shader::Shader;
use crate::util::cache::Resource;
use crate::{Device, ShaderCreateInfo};

/// Create info for a compute pipeline. Use the [`ComputePipelineBuilder`](crate::ComputePipelineBuilder)
/// struct to construct this.
#[derive(Debug, Clone, Derivative)]
#[derivative(PartialEq, Eq, Hash)]
pub struct ComputePipelineCreateInfo {
    #[derivative(PartialEq = "ignore")]
    #[derivative(Hash = "ignore")]
    pub(crate) name: String,
    pub(crate) shader: ShaderCreateInfo,
    pub(crate) layout: PipelineLayoutCreateInfo,
}

impl ComputePipelineCreateInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shader(&self) -> &ShaderCreateInfo {
        &self.shader
    }

    pub fn layout(&self) -> &PipelineLayoutCreateInfo {
        &self.layout
    }
}

/// Builder struct similar to [`PipelineBuilder`](crate::PipelineBuilder), but for compute pipelines. Since compute pipelines are much simpler,
/// there is much less work to do when building one.
#[derive(Debug)]
pub struct ComputePipelineBuilder {
    name: String,
    shader: Option<ShaderCreateInfo>,
    layout: PipelineLayoutCreateInfo,
}

impl ComputePipelineBuilder {
    /// Create a new compute pipeline with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shader: None,
            layout: Default::default(),
        }
    }

    /// Set the compute shader that will be used for this pipeline. Note that compute pipelines
    /// can only have one shader.
    pub fn set_shader(mut self, shader: ShaderCreateInfo) -> Self {
        self.shader = Some(shader);
        self
    }

    pub fn layout(mut self, layout: PipelineLayoutCreateInfo) -> Self {
        self.layout = layout;
        self
    }

    /// Build the compute pipeline create info.
    /// # Panics
    /// Panics if no shader was set, or if the shader is not a compute shader.
    pub fn build(self) -> ComputePipelineCreateInfo {
        let shader = match self.shader {
            Some(shader) => shader,
            None => panic!("compute pipeline `{}` has no shader", self.name),
        };
        assert_eq!(
            shader.stage(),
            vk::ShaderStageFlags::COMPUTE,
            "compute pipeline `{}` needs a compute shader",
            self.name
        );
        ComputePipelineCreateInfo {
            name: self.name,
            shader,
            layout: self.layout,
        }
    }

    /// Obtain the pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Dependencies of a compute pipeline that are resolved through other caches.
pub struct ComputePipelineDeps<'a> {
    pub shader: &'a Shader,
    pub layout: Arc<PipelineLayout>,
}

/// A fully built compute pipeline. This is a managed resource, owned by the [`PipelineCache`](crate::PipelineCache).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ComputePipeline {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Pipeline,
    layout: Arc<PipelineLayout>,
    name: String,
}

impl ComputePipeline {
    /// Get unsafe access to the underlying `VkPipeline`.
    /// # Safety
    /// Any vulkan calls that mutate the pipeline may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Resource for ComputePipeline {
    type Key = ComputePipelineCreateInfo;
    type ExtraParams<'a> = ComputePipelineDeps<'a>;

    fn create(device: Device, key: &Self::Key, deps: Self::ExtraParams<'_>) -> Result<Self> {
        let entry = key.shader.entry_point_cstr()?;
        let stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(unsafe { deps.shader.handle() })
            .name(&entry)
            .build();
        let info = vk::ComputePipelineCreateInfo::builder()
            .stage(stage)
            .layout(unsafe { deps.layout.handle() })
            .build();
        let handle = unsafe {
            device
                .create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&info), None)
                .map_err(|(_, err)| err)?
        }
        .into_iter()
        .next()
        .ok_or(crate::Error::Uncategorized("compute pipeline creation returned no pipeline"))?;

        #[cfg(feature = "log-objects")]
        trace!("Created new compute VkPipeline {handle:p} ({})", key.name);

        Ok(Self {
            device,
            handle,
            layout: deps.layout,
            name: key.name.clone(),
        })
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying compute VkPipeline {:p}", self.handle);
        unsafe {
            self.device.destroy_pipeline(self.handle, None);
        }
    }
}
