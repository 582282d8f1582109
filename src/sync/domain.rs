//! Domains abstract over the concept of Vulkan queue families.
//!
//! Commands are divided into four domains:
//! - [Transfer](crate::domain::Transfer): All transfer and copy related commands.
//! - [Graphics](crate::domain::Graphics): All graphics and rendering related commands.
//! - [Compute](crate::domain::Compute): GPU compute commands, most notably `vkCmdDispatch`
//! - [All](crate::domain::All): All of the above.
//!
//! A command buffer over a domain is allocated from a queue that supports all operations
//! on its domain, and as few other domains as possible (to try to catch dedicated transfer/async compute queues). For this reason, always try to
//! allocate from the most restrictive domain you can.

use ash::vk;

use crate::core::queue::{QueueInfo, QueueType};

/// This trait defines an execution domain. A domain specifies the queue capabilities its commands need, and
/// which requested queue it prefers.
pub trait ExecutionDomain: Send + Sync + 'static {
    /// Queue flags a queue must have to execute commands of this domain.
    fn required_flags() -> vk::QueueFlags;

    /// Returns true if this queue was requested for this domain specifically.
    fn queue_is_preferred(queue: &QueueInfo) -> bool;
}

/// Supports all operations (graphics, transfer and compute).
/// This may not always be available (although it usually is).
/// For your main rendering operations, this is typically the correct domain to
/// choose.
pub struct All;
/// Supports graphics operations. Additionally, any domain supporting graphics also supports
/// transfer operations as required by the Vulkan specification.
pub struct Graphics;
/// Supports transfer operations. You should only use this domain for dedicated transfer operations,
/// such as data uploads. When possible, a dedicated transfer queue will be used.
pub struct Transfer;
/// Supports compute operations. For main rendering, you typically want to use the [`All`] domain
/// instead of this, as switching between queues for every compute operation has too much overhead.
pub struct Compute;

impl ExecutionDomain for Graphics {
    fn required_flags() -> vk::QueueFlags {
        vk::QueueFlags::GRAPHICS
    }

    fn queue_is_preferred(queue: &QueueInfo) -> bool {
        queue.queue_type == QueueType::Graphics
    }
}

impl ExecutionDomain for Transfer {
    fn required_flags() -> vk::QueueFlags {
        vk::QueueFlags::TRANSFER
    }

    fn queue_is_preferred(queue: &QueueInfo) -> bool {
        queue.queue_type == QueueType::Transfer
    }
}

impl ExecutionDomain for Compute {
    fn required_flags() -> vk::QueueFlags {
        vk::QueueFlags::COMPUTE
    }

    fn queue_is_preferred(queue: &QueueInfo) -> bool {
        queue.queue_type == QueueType::Compute
    }
}

impl ExecutionDomain for All {
    fn required_flags() -> vk::QueueFlags {
        vk::QueueFlags::COMPUTE | vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER
    }

    fn queue_is_preferred(queue: &QueueInfo) -> bool {
        queue.flags.contains(Self::required_flags())
    }
}
