//! Sampled texture on the GPU.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use viewer_resources::TextureData;
use viewer_rhi::RhiResult;
use viewer_rhi::buffer::{Buffer, BufferUsage};
use viewer_rhi::command::CommandPool;
use viewer_rhi::device::Device;
use viewer_rhi::image::{Image, ImageDesc, ImageView, Sampler, SamplerDesc};

/// Color textures are stored as sRGB so sampling returns linear values.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// An immutable texture: image, view and sampler.
pub struct Texture {
    sampler: Sampler,
    view: ImageView,
    image: Image,
}

impl Texture {
    /// Upload `data` through a staging buffer and leave the image in
    /// `SHADER_READ_ONLY_OPTIMAL`.
    pub fn upload(
        device: Arc<Device>,
        pool: &CommandPool,
        data: &TextureData,
        sampler_desc: &SamplerDesc,
    ) -> RhiResult<Self> {
        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, &data.pixels)?;

        let image = Image::new(
            device.clone(),
            &ImageDesc {
                width: data.width,
                height: data.height,
                format: TEXTURE_FORMAT,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            },
        )?;

        image.transition_layout(
            pool,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        image.copy_from_buffer(pool, &staging)?;
        image.transition_layout(
            pool,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;
        drop(staging);

        let view = ImageView::new(
            device.clone(),
            image.handle(),
            TEXTURE_FORMAT,
            vk::ImageAspectFlags::COLOR,
        )?;
        let sampler = Sampler::new(device, sampler_desc)?;

        info!("Texture uploaded: {}x{}", data.width, data.height);

        Ok(Self {
            sampler,
            view,
            image,
        })
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.view.handle()
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}
