//! Exposes the deimos error type

use std::ffi::NulError;
use std::sync::PoisonError;

use ash;
use gpu_allocator::AllocationError;
use thiserror::Error;

use crate::core::device::ExtensionID;

/// Error type that deimos can return.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to load the Vulkan library.
    #[error("Failed to load Vulkan.")]
    LoadFailed(ash::LoadingError),
    /// Could not convert rust string to C-String because it has null bytes
    #[error("Invalid C string")]
    InvalidString(NulError),
    /// Generic Vulkan error type. Device exhaustion (`VK_ERROR_OUT_OF_DEVICE_MEMORY` and friends) is reported through this.
    #[error("Vulkan error: `{0}`")]
    VkError(ash::vk::Result),
    /// No suitable GPU found.
    #[error("No physical device found matching requirements.")]
    NoGPU,
    /// No queue was found with the requested capabilities. Did you forget to request it?
    #[error("No queue found with the requested capabilities. Did you forget a queue request on initialization?")]
    NoCapableQueue,
    /// Vulkan allocation error.
    #[error("Vulkan allocation error: `{0}`")]
    AllocationError(AllocationError),
    /// Poisoned mutex
    #[error("Poisoned mutex")]
    PoisonError,
    /// Buffer view out of range of original buffer
    #[error("Buffer view is not a valid range in the parent buffer.")]
    BufferViewOutOfRange,
    /// Buffer copy between views of different sizes is not allowed.
    #[error("Buffer copy has invalid buffer views as range.")]
    InvalidBufferCopy,
    /// Mappable buffer expected
    #[error("Requested mappable buffer, but buffer does not have a memory map")]
    UnmappableBuffer,
    /// Image extents do not describe a valid 1D, 2D or 3D image.
    #[error("Image extents invalid.")]
    InvalidImageExtent,
    /// Tried to allocate a descriptor set for an empty layout.
    #[error("Empty descriptor set.")]
    EmptyDescriptorBinding,
    /// Vertex attribute added for a binding that was never declared.
    #[error("Vertex attribute added to undeclared binding.")]
    NoVertexBinding,
    /// Vertex attribute format with no known size.
    #[error("Unsupported vertex attribute format `{0:?}`.")]
    UnsupportedVertexFormat(ash::vk::Format),
    /// No pipeline is bound, but the command requires one.
    #[error("No pipeline bound to command buffer.")]
    NoPipelineBound,
    /// Function call requires extension to be enabled, but this extension was not requested or not available.
    #[error("Extension {0} required for this feature, but not enabled.")]
    ExtensionNotSupported(ExtensionID),
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

impl From<ash::LoadingError> for Error {
    fn from(value: ash::LoadingError) -> Self {
        Error::LoadFailed(value)
    }
}

impl From<NulError> for Error {
    fn from(value: NulError) -> Self {
        Error::InvalidString(value)
    }
}

impl From<ash::vk::Result> for Error {
    fn from(value: ash::vk::Result) -> Self {
        Error::VkError(value)
    }
}

impl From<AllocationError> for Error {
    fn from(value: AllocationError) -> Self {
        Error::AllocationError(value)
    }
}

impl From<(Vec<ash::vk::Pipeline>, ash::vk::Result)> for Error {
    fn from((_, result): (Vec<ash::vk::Pipeline>, ash::vk::Result)) -> Self {
        Error::VkError(result)
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}
