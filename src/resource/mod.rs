//! Exposes common Vulkan resources such as buffers and images, and the state tracking shared by both.

pub mod buffer;
pub mod image;
pub mod state;
