//! Images, image views, samplers and layout transitions.
//!
//! Layout transitions are limited to a closed table; see
//! [`transition_masks`]. Any other pair is rejected with
//! [`RhiError::UnsupportedLayoutTransition`] instead of guessing at the
//! required synchronization.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::Buffer;
use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::DeviceMemory;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Pipeline stages and access masks for one layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

/// Look up the barrier parameters for `old -> new`.
///
/// | old | new |
/// |---|---|
/// | `UNDEFINED` | `TRANSFER_DST_OPTIMAL` |
/// | `TRANSFER_DST_OPTIMAL` | `SHADER_READ_ONLY_OPTIMAL` |
/// | `UNDEFINED` | `DEPTH_STENCIL_ATTACHMENT_OPTIMAL` |
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedLayoutTransition`] for every other pair.
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> RhiResult<TransitionMasks> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => {
            Ok(TransitionMasks {
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
            })
        }
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(TransitionMasks {
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
            })
        }
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
            Ok(TransitionMasks {
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            })
        }
        _ => Err(RhiError::UnsupportedLayoutTransition { old, new }),
    }
}

/// Whether `format` carries a stencil component.
#[inline]
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Whether `format` is one of the depth formats the viewer uses.
#[inline]
pub fn is_depth_format(format: vk::Format) -> bool {
    DEPTH_FORMAT_CANDIDATES.contains(&format)
}

/// Aspect mask for a barrier that moves an image of `format` into `layout`.
pub fn aspect_mask(format: vk::Format, layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    if layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Pick the first candidate whose tiling features contain `features`.
///
/// `properties_of` returns the format properties for a candidate, which keeps
/// the selection logic independent of a live device.
pub fn find_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    properties_of: impl Fn(vk::Format) -> vk::FormatProperties,
) -> RhiResult<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = properties_of(format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .ok_or_else(|| {
            RhiError::UnsupportedFormat(format!(
                "none of {:?} supports {:?} with {:?} tiling",
                candidates, features, tiling
            ))
        })
}

/// Choose the depth attachment format for `device`.
pub fn find_depth_format(device: &Device) -> RhiResult<vk::Format> {
    find_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        |format| device.format_properties(format),
    )
}

/// Parameters for a 2D, single-mip image.
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub memory_properties: vk::MemoryPropertyFlags,
}

/// A 2D image with its own memory allocation.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    // Freed after `image` is destroyed in `Drop`
    memory: DeviceMemory,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Image {
    /// Create the image, allocate matching memory and bind it.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for zero dimensions and
    /// [`RhiError::NoSuitableMemoryType`] when no memory type fits.
    pub fn new(device: Arc<Device>, desc: &ImageDesc) -> RhiResult<Self> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Image dimensions must be non-zero, got {}x{}",
                desc.width, desc.height
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(desc.tiling)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let memory = DeviceMemory::allocate(device.clone(), requirements, desc.memory_properties)
            .and_then(|memory| {
                unsafe {
                    device
                        .handle()
                        .bind_image_memory(image, memory.handle(), 0)?;
                }
                Ok(memory)
            });
        let memory = match memory {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        debug!(
            "Created {}x{} image ({:?})",
            desc.width, desc.height, desc.format
        );

        Ok(Self {
            device,
            image,
            memory,
            format: desc.format,
            extent: vk::Extent2D {
                width: desc.width,
                height: desc.height,
            },
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn memory(&self) -> &DeviceMemory {
        &self.memory
    }

    /// Move the whole image from `old` to `new` with a blocking one-shot barrier.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnsupportedLayoutTransition`] before recording
    /// anything when the pair is not in the table.
    pub fn transition_layout(
        &self,
        pool: &CommandPool,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> RhiResult<()> {
        let masks = transition_masks(old, new)?;

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(full_range(aspect_mask(self.format, new)))
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        pool.submit_blocking(|cmd| {
            cmd.pipeline_barrier(
                masks.src_stage,
                masks.dst_stage,
                std::slice::from_ref(&barrier),
            );
            Ok(())
        })?;

        debug!("Image transitioned {:?} -> {:?}", old, new);
        Ok(())
    }

    /// Copy tightly packed pixel data from `src` into the whole image.
    ///
    /// The image must be in `TRANSFER_DST_OPTIMAL`.
    pub fn copy_from_buffer(&self, pool: &CommandPool, src: &Buffer) -> RhiResult<()> {
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            });

        pool.submit_blocking(|cmd| {
            cmd.copy_buffer_to_image(
                src.handle(),
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
            );
            Ok(())
        })
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }
        debug!(
            "Destroyed {}x{} image",
            self.extent.width, self.extent.height
        );
    }
}

fn full_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// A 2D view over a single-mip image.
pub struct ImageView {
    device: Arc<Device>,
    view: vk::ImageView,
}

impl ImageView {
    /// Create a view over `image`. The image may be owned elsewhere
    /// (swapchain images) but must outlive the view.
    pub fn new(
        device: Arc<Device>,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
    ) -> RhiResult<Self> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(full_range(aspect_mask));

        let view = unsafe { device.handle().create_image_view(&create_info, None)? };

        Ok(Self { device, view })
    }

    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }
    }
}

/// Texture sampler settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc {
    pub filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    /// `None` disables anisotropic filtering
    pub max_anisotropy: Option<f32>,
    pub mipmap_mode: vk::SamplerMipmapMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            max_anisotropy: Some(16.0),
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        }
    }
}

impl SamplerDesc {
    /// Clamp the requested anisotropy to what the device supports.
    pub fn clamped_to(mut self, limits: &vk::PhysicalDeviceLimits) -> Self {
        self.max_anisotropy = self
            .max_anisotropy
            .map(|requested| requested.min(limits.max_sampler_anisotropy));
        self
    }
}

pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    pub fn new(device: Arc<Device>, desc: &SamplerDesc) -> RhiResult<Self> {
        let desc = desc.clamped_to(device.limits());

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.filter)
            .min_filter(desc.filter)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .anisotropy_enable(desc.max_anisotropy.is_some())
            .max_anisotropy(desc.max_anisotropy.unwrap_or(1.0))
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(desc.mipmap_mode)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0);

        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };

        debug!(
            "Created sampler ({:?}, {:?}, anisotropy {:?})",
            desc.filter, desc.address_mode, desc.max_anisotropy
        );

        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Destroyed sampler");
    }
}
