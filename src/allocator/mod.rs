//! Device memory allocation.
//!
//! # Allocator traits
//! [`traits`] defines the interface any allocator must implement. Most types that take an allocator parameter default to
//! the [`DefaultAllocator`](default_allocator::DefaultAllocator), which is based on the `gpu_allocator` crate.
//! # Transient memory
//! Two allocators sit on top of buffers from a [`BufferProvider`](provider::BufferProvider):
//! * The [`RingAllocator`](ring_allocator::RingAllocator) sub-allocates small, short lived ranges such as per-draw uniforms.
//! * The [`StagingPool`](staging_pool::StagingPool) hands out whole staging buffers for uploads and recycles them once the GPU is
//!   done with them.

pub mod default_allocator;
pub mod memory_type;
pub mod provider;
pub mod ring_allocator;
pub mod staging_pool;
pub mod traits;
