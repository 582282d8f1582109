use std::ffi::CString;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::util::cache::{hash_key, Resource};
use crate::Device;

/// SPIR-V code together with its content hash. Two pieces of code are the same key if their hashes match.
#[derive(Debug, Clone)]
pub struct ShaderCode {
    code: Arc<[u32]>,
    hash: u64,
}

impl ShaderCode {
    pub fn new(code: impl Into<Arc<[u32]>>) -> Self {
        let code = code.into();
        let hash = hash_key(&*code);
        Self {
            code,
            hash,
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.code
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for ShaderCode {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for ShaderCode {}

impl Hash for ShaderCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash)
    }
}

/// Shader module. This is managed by the pipeline cache internally.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Shader {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::ShaderModule,
    code_hash: u64,
}

impl Shader {
    /// Get unsafe access to the underlying `VkShaderModule` object.
    /// # Safety
    /// Any vulkan calls that mutate the shader module may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    pub fn code_hash(&self) -> u64 {
        self.code_hash
    }
}

/// A shader stage of a pipeline. Use [`ShaderCreateInfo::from_spirv`] to construct this.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderCreateInfo {
    stage: vk::ShaderStageFlags,
    entry_point: String,
    code: ShaderCode,
}

impl ShaderCreateInfo {
    /// Load in a spirv binary into a shader create info structure. The entry point is `main`.
    pub fn from_spirv(stage: vk::ShaderStageFlags, code: impl Into<Arc<[u32]>>) -> Self {
        Self {
            stage,
            entry_point: String::from("main"),
            code: ShaderCode::new(code),
        }
    }

    /// Use a different entry point than `main`.
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn code(&self) -> &ShaderCode {
        &self.code
    }

    pub fn code_hash(&self) -> u64 {
        self.code.hash()
    }

    pub(crate) fn entry_point_cstr(&self) -> Result<CString> {
        Ok(CString::new(self.entry_point.as_str())?)
    }
}

impl Resource for Shader {
    type Key = ShaderCode;
    type ExtraParams<'a> = ();

    fn create(device: Device, key: &Self::Key, _: Self::ExtraParams<'_>) -> Result<Self> {
        let info = vk::ShaderModuleCreateInfo::builder().code(key.words()).build();
        let handle = unsafe { device.create_shader_module(&info, None)? };

        #[cfg(feature = "log-objects")]
        trace!("Created new VkShaderModule {handle:p}");

        Ok(Self {
            device,
            handle,
            code_hash: key.hash(),
        })
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkShaderModule {:p}", self.handle);
        unsafe {
            self.device.destroy_shader_module(self.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_code_is_the_same_key() {
        let a = ShaderCreateInfo::from_spirv(vk::ShaderStageFlags::VERTEX, vec![0x07230203, 1, 2, 3]);
        let b = ShaderCreateInfo::from_spirv(vk::ShaderStageFlags::VERTEX, vec![0x07230203, 1, 2, 3]);
        assert_eq!(a, b);
        assert_eq!(a.code_hash(), b.code_hash());
    }

    #[test]
    fn stage_and_entry_point_are_part_of_the_key() {
        let code = vec![0x07230203, 1, 2, 3];
        let vs = ShaderCreateInfo::from_spirv(vk::ShaderStageFlags::VERTEX, code.clone());
        let fs = ShaderCreateInfo::from_spirv(vk::ShaderStageFlags::FRAGMENT, code.clone());
        let other = ShaderCreateInfo::from_spirv(vk::ShaderStageFlags::VERTEX, code).with_entry_point("other");
        assert_ne!(vs, fs);
        assert_ne!(vs, other);
        assert_eq!(vs.code(), fs.code());
    }
}
