//! Cached `VkFramebuffer` objects.
//!
//! A framebuffer is keyed by its render pass description and the identity of its attachment views. The key keeps
//! the views alive, so framebuffers referencing a view that is about to be destroyed (for example on resize) must be
//! removed through [`FramebufferCache::evict_view()`].

use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::pipeline::render_pass::{RenderPass, RenderPassCreateInfo};
use crate::util::cache::{Cache, Resource};
use crate::{Device, ImageView};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FramebufferCreateInfo {
    pub render_pass: RenderPassCreateInfo,
    pub attachments: Vec<ImageView>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

impl FramebufferCreateInfo {
    /// Framebuffer covering the full size of the first attachment.
    /// # Panics
    /// Panics if there are no attachments.
    pub fn from_attachments(render_pass: RenderPassCreateInfo, attachments: Vec<ImageView>) -> Self {
        let first = match attachments.first() {
            Some(view) => view,
            None => panic!("framebuffer needs at least one attachment"),
        };
        let (width, height, layers) = (first.width(), first.height(), first.layer_count());
        Self {
            render_pass,
            attachments,
            width,
            height,
            layers,
        }
    }

    /// Whether this framebuffer references the view with this id.
    pub fn references(&self, view_id: u64) -> bool {
        self.attachments.iter().any(|view| view.id() == view_id)
    }
}

/// A cached `VkFramebuffer`. Keeps its render pass alive.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Framebuffer {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Framebuffer,
    render_pass: Arc<RenderPass>,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Get unsafe access to the underlying `VkFramebuffer`.
    /// # Safety
    /// Any vulkan calls that mutate the framebuffer may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    pub fn render_pass(&self) -> &Arc<RenderPass> {
        &self.render_pass
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Resource for Framebuffer {
    type Key = FramebufferCreateInfo;
    type ExtraParams<'a> = Arc<RenderPass>;

    fn create(device: Device, key: &Self::Key, render_pass: Self::ExtraParams<'_>) -> Result<Self> {
        assert_eq!(
            key.attachments.len(),
            render_pass.attachment_count(),
            "framebuffer attachment count does not match its render pass"
        );
        let attachments = key
            .attachments
            .iter()
            .map(|view| unsafe { view.handle() })
            .collect::<Vec<_>>();
        let info = vk::FramebufferCreateInfo::builder()
            .render_pass(unsafe { render_pass.handle() })
            .attachments(&attachments)
            .width(key.width)
            .height(key.height)
            .layers(key.layers)
            .build();
        let handle = unsafe { device.create_framebuffer(&info, None)? };

        #[cfg(feature = "log-objects")]
        trace!("Created new VkFramebuffer {handle:p}");

        Ok(Self {
            device,
            handle,
            render_pass,
            extent: vk::Extent2D {
                width: key.width,
                height: key.height,
            },
        })
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkFramebuffer {:p}", self.handle);
        unsafe {
            self.device.destroy_framebuffer(self.handle, None);
        }
    }
}

/// Cache of framebuffers, sharing the render pass cache with the [`PipelineCache`](crate::PipelineCache).
/// Cloning gives another handle to the same cache.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct FramebufferCache {
    #[derivative(Debug = "ignore")]
    device: Device,
    render_passes: Cache<RenderPass>,
    framebuffers: Cache<Framebuffer>,
}

impl FramebufferCache {
    pub fn new(device: Device, render_passes: Cache<RenderPass>) -> Self {
        Self {
            device,
            render_passes,
            framebuffers: Cache::new("framebuffer"),
        }
    }

    /// Get the framebuffer for this description, creating it and its render pass if necessary.
    pub fn get_or_create(&self, info: &FramebufferCreateInfo) -> Result<Arc<Framebuffer>> {
        let render_pass = self.render_passes.get_or_create(&self.device, &info.render_pass, ())?;
        self.framebuffers.get_or_create(&self.device, info, render_pass)
    }

    /// Drop every framebuffer that references `view`. Returns the number of evicted framebuffers.
    /// Framebuffers still referenced elsewhere are destroyed once the last reference is dropped.
    pub fn evict_view(&self, view: &ImageView) -> Result<usize> {
        let id = view.id();
        let removed = self.framebuffers.retain(|key, _| !key.references(id))?;
        Ok(removed.len())
    }

    pub fn clear(&self) -> Result<()> {
        self.framebuffers.clear()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }
}
