//! Depth buffer management.
//!
//! One depth image shared by every framebuffer. It is sized to the swapchain
//! extent and rebuilt together with the swapchain. Sharing a single image
//! across frames in flight is safe because the render pass dependency orders
//! each frame's depth writes after the previous frame's.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use viewer_rhi::command::CommandPool;
//! use viewer_rhi::device::Device;
//! use viewer_renderer::depth_buffer::DepthBuffer;
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool) -> Result<(), viewer_rhi::RhiError> {
//! let extent = vk::Extent2D { width: 1920, height: 1080 };
//! let depth_buffer = DepthBuffer::new(device, pool, extent)?;
//! let _view = depth_buffer.image_view();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::info;

use viewer_rhi::RhiResult;
use viewer_rhi::command::CommandPool;
use viewer_rhi::device::Device;
use viewer_rhi::image::{Image, ImageDesc, ImageView, find_depth_format};

/// Creation parameters for a depth attachment of `extent` in `format`.
pub fn depth_image_desc(extent: vk::Extent2D, format: vk::Format) -> ImageDesc {
    ImageDesc {
        width: extent.width,
        height: extent.height,
        format,
        tiling: vk::ImageTiling::OPTIMAL,
        usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
    }
}

pub struct DepthBuffer {
    // Dropped before `image`
    view: ImageView,
    image: Image,
}

impl DepthBuffer {
    /// Create a depth image in the first supported depth format and move it
    /// to `DEPTH_STENCIL_ATTACHMENT_OPTIMAL`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedFormat` when no candidate depth format is usable.
    pub fn new(device: Arc<Device>, pool: &CommandPool, extent: vk::Extent2D) -> RhiResult<Self> {
        let format = find_depth_format(&device)?;
        let image = Image::new(device.clone(), &depth_image_desc(extent, format))?;
        let view = ImageView::new(
            device,
            image.handle(),
            format,
            vk::ImageAspectFlags::DEPTH,
        )?;

        image.transition_layout(
            pool,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;

        info!(
            "Depth buffer created: {}x{} ({:?})",
            extent.width, extent.height, format
        );

        Ok(Self { view, image })
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.view.handle()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_image_desc() {
        let extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        let desc = depth_image_desc(extent, vk::Format::D32_SFLOAT);
        assert_eq!((desc.width, desc.height), (640, 480));
        assert_eq!(desc.tiling, vk::ImageTiling::OPTIMAL);
        assert_eq!(desc.usage, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        assert_eq!(desc.memory_properties, vk::MemoryPropertyFlags::DEVICE_LOCAL);
    }

    #[test]
    fn test_depth_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<DepthBuffer>();
    }
}
