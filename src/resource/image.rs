//! Provides utilities to manage [`VkImage`](vk::Image) and [`VkImageView`](vk::ImageView) objects.
//!
//! # Images
//!
//! Images are managed through the [`Image`] struct. They are usually backed by a memory allocation, except when
//! the handle is owned by something else, like a swapchain. Either way, every image carries an [`ImageState`] that tracks the
//! layout of each subresource.
//!
//! # Image views
//!
//! [`ImageView`] is a reference-counted [`ImgView`]. Every view gets a unique id on creation, which is what
//! framebuffers and other derived objects use as its identity, since Vulkan may reuse handles.

use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::resource::state::{aspect_for_format, ImageState};
use crate::{Allocation, Allocator, DefaultAllocator, Device, Error, MemoryType};

/// Abstraction over a [`VkImage`](vk::Image). Stores information about size, format, etc. and couples the image
/// together with its memory allocation and tracked state.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Image<A: Allocator = DefaultAllocator> {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Image,
    /// If this is None, the image is not owned by us and is never destroyed here.
    #[derivative(Debug = "ignore")]
    memory: Option<A::Allocation>,
    format: vk::Format,
    /// For 2D images, `size.depth == 1`.
    size: vk::Extent3D,
    layers: u32,
    mip_levels: u32,
    samples: vk::SampleCountFlags,
    state: Arc<ImageState>,
}

unsafe impl<A: Allocator> Send for Image<A> {}
unsafe impl<A: Allocator> Sync for Image<A> {}

/// Abstraction over a [`VkImageView`](vk::ImageView). Views refer to a range of mip levels and array layers of an image.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ImgView {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::ImageView,
    image: vk::Image,
    format: vk::Format,
    samples: vk::SampleCountFlags,
    aspect: vk::ImageAspectFlags,
    /// Size of the base mip level of this view.
    size: vk::Extent3D,
    base_level: u32,
    level_count: u32,
    base_layer: u32,
    layer_count: u32,
    /// Unique id, because Vulkan handles may be reused after destruction.
    id: u64,
}

/// Reference-counted version of [`ImgView`]. Equality and hashing use the unique id of the view.
#[derive(Debug, Clone)]
pub struct ImageView(pub Arc<ImgView>);

impl Deref for ImageView {
    type Target = ImgView;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for ImageView {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ImageView {}

impl Hash for ImageView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

unsafe impl Send for ImgView {}
unsafe impl Sync for ImgView {}

/// Settings that describe how an image should be created
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct ImageCreateInfo {
    pub width: u32,
    pub height: u32,
    /// Set to 1 for 2D images.
    pub depth: u32,
    pub usage: vk::ImageUsageFlags,
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    /// Set to 1 if not using mipmapping
    pub mip_levels: u32,
    /// Set to 1 for non-array textures.
    pub layers: u32,
}

impl Default for ImageCreateInfo {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            usage: vk::ImageUsageFlags::empty(),
            format: vk::Format::R8G8B8A8_UNORM,
            samples: vk::SampleCountFlags::TYPE_1,
            mip_levels: 1,
            layers: 1,
        }
    }
}

/// Settings that describe how an image view should be created from its [`Image`].
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct ImageViewCreateInfo {
    /// Leave as `None` to derive the aspect from the image format.
    pub aspect: Option<vk::ImageAspectFlags>,
    pub view_type: vk::ImageViewType,
    pub base_mip_level: u32,
    /// `None` for all remaining mip levels.
    pub level_count: Option<u32>,
    pub base_layer: u32,
    /// `None` for all remaining layers.
    pub layers: Option<u32>,
}

fn image_type(width: u32, height: u32, depth: u32) -> Option<vk::ImageType> {
    match (width, height, depth) {
        (0, _, _) | (_, 0, _) | (_, _, 0) => None,
        (_, 1, 1) => Some(vk::ImageType::TYPE_1D),
        (_, _, 1) => Some(vk::ImageType::TYPE_2D),
        _ => Some(vk::ImageType::TYPE_3D),
    }
}

impl<A: Allocator> Image<A> {
    /// Create a new image and allocate device local memory for it. Every subresource starts out in
    /// the `UNDEFINED` layout.
    /// # Errors
    /// * Fails with [`Error::InvalidImageExtent`] if a dimension is zero.
    /// * Fails if image creation or allocation fails.
    pub fn new(device: Device, alloc: &mut A, info: ImageCreateInfo) -> Result<Self> {
        let image_type = image_type(info.width, info.height, info.depth).ok_or(Error::InvalidImageExtent)?;
        let concurrent = !device.is_single_queue()
            && !info
                .usage
                .intersects(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        let extent = vk::Extent3D {
            width: info.width,
            height: info.height,
            depth: info.depth,
        };
        let mut create_info = vk::ImageCreateInfo::builder()
            .image_type(image_type)
            .format(info.format)
            .extent(extent)
            .mip_levels(info.mip_levels)
            .array_layers(info.layers)
            .samples(info.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(info.usage)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        create_info = if concurrent {
            create_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(device.queue_families())
        } else {
            create_info.sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let handle = unsafe { device.create_image(&create_info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImage {handle:p}");

        let requirements = unsafe { device.get_image_memory_requirements(handle) };
        let memory = match alloc.allocate("image", &requirements, MemoryType::GpuOnly) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(handle, None) };
                return Err(e);
            }
        };
        if let Err(e) = unsafe { device.bind_image_memory(handle, memory.memory(), memory.offset()) } {
            unsafe { device.destroy_image(handle, None) };
            return Err(e.into());
        }

        Ok(Self {
            device,
            handle,
            format: info.format,
            size: extent,
            layers: info.layers,
            mip_levels: info.mip_levels,
            samples: info.samples,
            memory: Some(memory),
            state: Arc::new(ImageState::new(
                handle,
                info.format,
                info.mip_levels,
                info.layers,
                vk::ImageLayout::UNDEFINED,
            )),
        })
    }

    /// Wrap an image owned by someone else, such as a swapchain image. The handle is never destroyed by this wrapper.
    /// The tracker assumes every subresource is in `initial_layout`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_external(
        device: Device,
        handle: vk::Image,
        format: vk::Format,
        size: vk::Extent3D,
        layers: u32,
        mip_levels: u32,
        samples: vk::SampleCountFlags,
        initial_layout: vk::ImageLayout,
    ) -> Self {
        Self {
            device,
            handle,
            memory: None,
            format,
            size,
            layers,
            mip_levels,
            samples,
            state: Arc::new(ImageState::new(handle, format, mip_levels, layers, initial_layout)),
        }
    }

    /// Create a view of every mip level and layer of this image.
    /// # Errors
    /// Fails if view creation fails.
    pub fn whole_view(&self) -> Result<ImageView> {
        let view_type = match (image_type(self.size.width, self.size.height, self.size.depth), self.layers > 1) {
            (Some(vk::ImageType::TYPE_1D), false) => vk::ImageViewType::TYPE_1D,
            (Some(vk::ImageType::TYPE_1D), true) => vk::ImageViewType::TYPE_1D_ARRAY,
            (Some(vk::ImageType::TYPE_3D), _) => vk::ImageViewType::TYPE_3D,
            (_, false) => vk::ImageViewType::TYPE_2D,
            (_, true) => vk::ImageViewType::TYPE_2D_ARRAY,
        };
        self.view(ImageViewCreateInfo {
            aspect: None,
            view_type,
            base_mip_level: 0,
            level_count: None,
            base_layer: 0,
            layers: None,
        })
    }

    /// Construct an [`ImageView`] of a subresource range of this image.
    /// The view is valid as long as `self` is.
    /// # Panics
    /// Panics if the requested range lies outside the image.
    pub fn view(&self, create_info: ImageViewCreateInfo) -> Result<ImageView> {
        let ImageViewCreateInfo {
            aspect,
            view_type,
            base_mip_level,
            level_count,
            base_layer,
            layers,
        } = create_info;
        let aspect = aspect.unwrap_or_else(|| aspect_for_format(self.format));
        let level_count = level_count.unwrap_or(self.mip_levels.saturating_sub(base_mip_level));
        let layer_count = layers.unwrap_or(self.layers.saturating_sub(base_layer));
        assert!(
            level_count > 0 && base_mip_level + level_count <= self.mip_levels,
            "image view mip range {base_mip_level}+{level_count} out of bounds ({} levels)",
            self.mip_levels
        );
        assert!(
            layer_count > 0 && base_layer + layer_count <= self.layers,
            "image view layer range {base_layer}+{layer_count} out of bounds ({} layers)",
            self.layers
        );

        let info = vk::ImageViewCreateInfo::builder()
            .image(self.handle)
            .view_type(view_type)
            .format(self.format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level,
                level_count,
                base_array_layer: base_layer,
                layer_count,
            })
            .build();

        let handle = unsafe { self.device.create_image_view(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImageView {handle:p}");
        let mip_extent = |extent: u32| (extent >> base_mip_level).max(1);
        Ok(ImageView(Arc::new(ImgView {
            device: self.device.clone(),
            handle,
            image: self.handle,
            format: self.format,
            samples: self.samples,
            aspect,
            size: vk::Extent3D {
                width: mip_extent(self.size.width),
                height: mip_extent(self.size.height),
                depth: mip_extent(self.size.depth),
            },
            base_level: base_mip_level,
            level_count,
            base_layer,
            layer_count,
            id: ImgView::next_id(),
        })))
    }

    /// Whether this image is owned by us or by an external manager (such as the swapchain).
    pub fn is_owned(&self) -> bool {
        self.memory.is_some()
    }

    /// Tracked per-subresource state of this image.
    pub fn state(&self) -> &ImageState {
        &self.state
    }

    /// Shared handle to the tracked state, for code that outlives the borrow of the image.
    pub fn shared_state(&self) -> Arc<ImageState> {
        self.state.clone()
    }

    /// Get unsafe access to the underlying `VkImage` handle.
    /// # Safety
    /// Layout changes made through the raw handle are not seen by the state tracker.
    pub unsafe fn handle(&self) -> vk::Image {
        self.handle
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn size(&self) -> vk::Extent3D {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn depth(&self) -> u32 {
        self.size.depth
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}

impl<A: Allocator> Drop for Image<A> {
    fn drop(&mut self) {
        if self.is_owned() {
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkImage {:p}", self.handle);
            unsafe {
                self.device.destroy_image(self.handle, None);
            }
        }
    }
}

impl ImgView {
    fn next_id() -> u64 {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        NEXT_ID.fetch_add(1, Ordering::Relaxed)
    }

    /// Get unsafe access to the underlying `VkImageView` handle.
    /// # Safety
    /// The handle must not be used after the view is dropped.
    pub unsafe fn handle(&self) -> vk::ImageView {
        self.handle
    }

    /// Handle of the viewed image.
    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    /// Size of the first mip level in this view.
    pub fn size(&self) -> vk::Extent3D {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn base_level(&self) -> u32 {
        self.base_level
    }

    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    pub fn base_layer(&self) -> u32 {
        self.base_layer
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    /// Unique id of this view.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ImgView {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkImageView {:p}", self.handle);
        unsafe {
            self.device.destroy_image_view(self.handle, None);
        }
    }
}
