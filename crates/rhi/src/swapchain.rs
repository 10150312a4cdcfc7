//! Swapchain management.
//!
//! This module negotiates the surface contract (format, present mode, extent
//! and image count), creates the `VkSwapchainKHR` with one view per image, and
//! wraps acquisition and presentation.
//!
//! A [`Swapchain`] is never rebuilt in place. Recreation releases the old
//! object entirely and negotiates a fresh [`SurfaceContract`]; the renderer's
//! swapchain manager owns that sequence.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use viewer_rhi::device::Device;
//! use viewer_rhi::swapchain::{SurfaceContract, Swapchain, SwapchainSupportDetails};
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     surface: vk::SurfaceKHR,
//! #     surface_loader: &ash::khr::surface::Instance,
//! # ) -> Result<(), viewer_rhi::RhiError> {
//! let support = SwapchainSupportDetails::query(device.physical_device(), surface, surface_loader)?;
//! let contract = SurfaceContract::negotiate(&support, (800, 600))?;
//! let swapchain = Swapchain::new(device.clone(), surface, &contract)?;
//! println!("{} images", swapchain.image_count());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::ImageView;

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// True if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Everything the swapchain, render pass and pipeline must agree on.
///
/// Derived from the surface capabilities and the window size by
/// [`SurfaceContract::negotiate`], which is pure: the same inputs always give
/// the same contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceContract {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SurfaceContract {
    /// Negotiate a contract for a framebuffer of `window_size` pixels.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] when the surface exposes no
    /// format or no present mode.
    pub fn negotiate(
        support: &SwapchainSupportDetails,
        window_size: (u32, u32),
    ) -> RhiResult<Self> {
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let (width, height) = window_size;

        Ok(Self {
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, width, height),
            image_count: determine_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        })
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height.max(1) as f32
    }
}

/// Result of asking the swapchain for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready; `suboptimal` is informational only.
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface and must be recreated.
    OutOfDate,
}

/// Result of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    #[inline]
    pub fn needs_recreation(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// Map a raw acquire result onto [`AcquireOutcome`].
///
/// `ERROR_OUT_OF_DATE_KHR` is not an error; every other failure is.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<AcquireOutcome> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(RhiError::VulkanError(e)),
    }
}

/// Map a raw present result onto [`PresentOutcome`].
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(RhiError::VulkanError(e)),
    }
}

/// Vulkan swapchain wrapper.
///
/// Owns the swapchain handle and one color view per image. The images
/// themselves belong to the swapchain.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    // Destroyed before `swapchain` in `Drop`
    image_views: Vec<ImageView>,
    contract: SurfaceContract,
}

impl Swapchain {
    /// Creates a swapchain matching `contract`.
    ///
    /// The previous swapchain, if any, must already be destroyed.
    pub fn new(
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        contract: &SurfaceContract,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(device.instance(), device.handle());

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            contract.extent.width,
            contract.extent.height,
            contract.format,
            contract.color_space,
            contract.present_mode,
            contract.image_count
        );

        let families = device.queue_families();
        let family_indices = [families.graphics, families.present];

        let (sharing_mode, family_slice) = if families.is_shared() {
            debug!("Using EXCLUSIVE sharing mode (same queue family for graphics and present)");
            (vk::SharingMode::EXCLUSIVE, &[][..])
        } else {
            debug!(
                "Using CONCURRENT sharing mode between graphics ({}) and present ({}) queues",
                families.graphics, families.present
            );
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(contract.image_count)
            .image_format(contract.format)
            .image_color_space(contract.color_space)
            .image_extent(contract.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_slice)
            .pre_transform(contract.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(contract.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };

        let mut image_views = Vec::with_capacity(images.len());
        for (i, &image) in images.iter().enumerate() {
            match ImageView::new(
                device.clone(),
                image,
                contract.format,
                vk::ImageAspectFlags::COLOR,
            ) {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    drop(image_views);
                    unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                    return Err(RhiError::SwapchainError(format!(
                        "Failed to create image view {}: {}",
                        i, e
                    )));
                }
            }
        }

        info!("Swapchain created with {} images", images.len());

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            contract: *contract,
        })
    }

    /// Acquire the next image, signalling `semaphore` when it is ready.
    ///
    /// Blocks without timeout.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        classify_acquire(result)
    }

    /// Queue `image_index` for presentation once `wait_semaphore` is signalled.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };
        classify_present(result)
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn contract(&self) -> &SurfaceContract {
        &self.contract
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.contract.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.contract.extent
    }

    /// Number of images actually created, which may exceed the requested count.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[ImageView] {
        &self.image_views
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.image_views.clear();

        unsafe {
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.contract.extent.width,
            self.contract.extent.height,
            self.images.len()
        );
    }
}

/// Chooses the surface format.
///
/// A lone `UNDEFINED` entry means the surface has no preference.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    if let [only] = formats
        && only.format == vk::Format::UNDEFINED
    {
        debug!("Surface has no preferred format, using B8G8R8A8_UNORM");
        return preferred;
    }

    if formats.contains(&preferred) {
        debug!("Selected preferred surface format: B8G8R8A8_UNORM with SRGB_NONLINEAR");
        return preferred;
    }

    match formats.first() {
        Some(&first) => {
            warn!("Using first available surface format: {:?}", first.format);
            first
        }
        None => preferred,
    }
}

/// Chooses the present mode: MAILBOX, then IMMEDIATE, then FIFO.
///
/// FIFO is always available.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    for mode in [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE] {
        if present_modes.contains(&mode) {
            debug!("Selected {:?} present mode", mode);
            return mode;
        }
    }

    debug!("Selected FIFO present mode (vsync)");
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent.
///
/// If the current extent is not set (width is `u32::MAX`), clamps the
/// requested size to the surface's min/max extents.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{})",
        extent.width, extent.height, width, height
    );

    extent
}

/// One more than the minimum, capped by the maximum when it is non-zero.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn support(current_extent: vk::Extent2D) -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent,
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![
                surface_format(vk::Format::R8G8B8A8_UNORM),
                surface_format(vk::Format::B8G8R8A8_UNORM),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    const UNDEFINED_EXTENT: vk::Extent2D = vk::Extent2D {
        width: u32::MAX,
        height: u32::MAX,
    };

    #[test]
    fn test_choose_surface_format_undefined_means_any() {
        let selected = choose_surface_format(&[surface_format(vk::Format::UNDEFINED)]);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_prefers_bgra_unorm() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
            surface_format(vk::Format::B8G8R8A8_UNORM),
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::B8G8R8A8_UNORM
        );
    }

    #[test]
    fn test_choose_surface_format_requires_matching_color_space() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM),
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn test_choose_surface_format_fallback() {
        let formats = [surface_format(vk::Format::R8G8B8A8_SRGB)];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R8G8B8A8_SRGB
        );
    }

    #[test]
    fn test_choose_present_mode_prefers_mailbox() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_choose_present_mode_immediate_before_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::IMMEDIATE);
    }

    #[test]
    fn test_choose_present_mode_fallback_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let details = support(vk::Extent2D {
            width: 1920,
            height: 1080,
        });
        let extent = choose_extent(&details.capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let mut details = support(UNDEFINED_EXTENT);
        details.capabilities.min_image_extent = vk::Extent2D {
            width: 100,
            height: 100,
        };
        details.capabilities.max_image_extent = vk::Extent2D {
            width: 2000,
            height: 2000,
        };
        let caps = &details.capabilities;

        let extent = choose_extent(caps, 3000, 3000);
        assert_eq!((extent.width, extent.height), (2000, 2000));

        let extent = choose_extent(caps, 50, 50);
        assert_eq!((extent.width, extent.height), (100, 100));

        let extent = choose_extent(caps, 800, 600);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_choose_extent_zero_area_clamps_to_minimum() {
        let details = support(UNDEFINED_EXTENT);
        let extent = choose_extent(&details.capabilities, 0, 0);
        assert_eq!((extent.width, extent.height), (1, 1));
    }

    #[test]
    fn test_determine_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let roomy = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&roomy), 3);

        // 0 means no limit
        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unbounded), 4);
    }

    #[test]
    fn test_negotiate_contract() {
        let contract = SurfaceContract::negotiate(&support(UNDEFINED_EXTENT), (800, 600)).unwrap();
        assert_eq!(contract.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(contract.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!((contract.extent.width, contract.extent.height), (800, 600));
        assert_eq!(contract.image_count, 3);
        assert_eq!(contract.pre_transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
    }

    #[test]
    fn test_negotiate_is_idempotent() {
        let details = support(UNDEFINED_EXTENT);
        let first = SurfaceContract::negotiate(&details, (1024, 768)).unwrap();
        let second = SurfaceContract::negotiate(&details, (1024, 768)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_negotiate_rejects_inadequate_support() {
        let mut details = support(UNDEFINED_EXTENT);
        details.present_modes.clear();
        assert!(matches!(
            SurfaceContract::negotiate(&details, (800, 600)),
            Err(RhiError::SwapchainError(_))
        ));
    }

    #[test]
    fn test_aspect_ratio() {
        let contract = SurfaceContract::negotiate(&support(UNDEFINED_EXTENT), (800, 600)).unwrap();
        assert!((contract.aspect_ratio() - 4.0 / 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = support(UNDEFINED_EXTENT);
        assert!(adequate.is_adequate());

        let mut no_formats = support(UNDEFINED_EXTENT);
        no_formats.formats.clear();
        assert!(!no_formats.is_adequate());
    }

    #[test]
    fn test_classify_acquire() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireOutcome::Acquired {
                image_index: 2,
                suboptimal: false
            }
        );
        assert_eq!(
            classify_acquire(Ok((0, true))).unwrap(),
            AcquireOutcome::Acquired {
                image_index: 0,
                suboptimal: true
            }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn test_classify_present() {
        assert_eq!(classify_present(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentOutcome::Suboptimal);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::OutOfDate
        );
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn test_present_outcome_needs_recreation() {
        assert!(!PresentOutcome::Presented.needs_recreation());
        assert!(PresentOutcome::Suboptimal.needs_recreation());
        assert!(PresentOutcome::OutOfDate.needs_recreation());
    }
}
