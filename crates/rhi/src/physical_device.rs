//! Physical device (GPU) selection.
//!
//! The selection process:
//! 1. Enumerate all available GPUs
//! 2. Find a graphics queue family and a family that can present to the surface
//! 3. Verify `VK_KHR_swapchain` and at least one surface format and present mode
//! 4. Verify `samplerAnisotropy`
//! 5. Pick the highest scoring candidate (discrete GPUs first)
//!
//! Surface format and present mode availability is checked here, once, rather
//! than on every swapchain recreation.
//!
//! # Example
//!
//! ```no_run
//! use viewer_rhi::instance::Instance;
//! use viewer_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! let instance = Instance::new(&[], false)?;
//! // The surface normally comes from the window.
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null();
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let device_info = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! println!("Selected GPU: {}", device_info.device_name());
//! # Ok::<(), viewer_rhi::RhiError>(())
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::swapchain::SwapchainSupportDetails;

/// Device extensions the viewer cannot run without.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Queue family indices as discovered while scanning a device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Resolve into concrete family indices when both are known.
    pub fn complete(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics_family?,
            present: self.present_family?,
        })
    }
}

/// Resolved graphics and present queue families. They may be the same family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Whether one family serves both graphics and presentation.
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Everything the rest of the crate needs to know about the chosen GPU.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilies,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Select the most suitable GPU for rendering to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] when no device meets the requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut best: Option<(PhysicalDeviceInfo, u32)> = None;
    for device in devices {
        let Some(info) = check_device_suitability(instance, device, surface, surface_loader)?
        else {
            continue;
        };
        let score = rate_device_type(info.properties.device_type);
        debug!(
            "GPU '{}' ({}) - Score: {}",
            info.device_name(),
            info.device_type_name(),
            score
        );
        if best.as_ref().is_none_or(|(_, best_score)| score > *best_score) {
            best = Some((info, score));
        }
    }

    let Some((selected, score)) = best else {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, Score: {}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
        score
    );

    Ok(selected)
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<Option<PhysicalDeviceInfo>> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let device_name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "Unknown".to_string());

    let family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(device) };
    let indices = find_queue_families(&family_properties, |index| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, index, surface)
            .unwrap_or(false)
    });
    let Some(queue_families) = indices.complete() else {
        debug!(
            "GPU '{}' skipped: missing required queue families (graphics={}, present={})",
            device_name,
            indices.graphics_family.is_some(),
            indices.present_family.is_some()
        );
        return Ok(None);
    };

    let available = unsafe { instance.enumerate_device_extension_properties(device)? };
    let missing = missing_extensions(&available, REQUIRED_DEVICE_EXTENSIONS);
    if !missing.is_empty() {
        debug!(
            "GPU '{}' skipped: missing extension(s) {:?}",
            device_name, missing
        );
        return Ok(None);
    }

    // Only meaningful once the swapchain extension is known to exist
    let support = SwapchainSupportDetails::query(device, surface, surface_loader)?;
    if !support.is_adequate() {
        debug!(
            "GPU '{}' skipped: {} surface format(s), {} present mode(s)",
            device_name,
            support.formats.len(),
            support.present_modes.len()
        );
        return Ok(None);
    }

    if features.sampler_anisotropy == vk::FALSE {
        debug!(
            "GPU '{}' skipped: sampler anisotropy not supported",
            device_name
        );
        return Ok(None);
    }

    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    Ok(Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
    }))
}

/// Find the first graphics family and the first family that can present.
///
/// A family that supports both is preferred for presentation so the
/// swapchain can use exclusive sharing.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        let has_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let can_present = supports_present(i);

        if has_graphics && can_present {
            return QueueFamilyIndices {
                graphics_family: Some(i),
                present_family: Some(i),
            };
        }
        if has_graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }
        if can_present && indices.present_family.is_none() {
            indices.present_family = Some(i);
        }
    }

    indices
}

/// Names from `required` that are absent from `available`.
pub fn missing_extensions(
    available: &[vk::ExtensionProperties],
    required: &[&CStr],
) -> Vec<String> {
    required
        .iter()
        .filter(|name| {
            !available
                .iter()
                .any(|ext| ext.extension_name_as_c_str().is_ok_and(|n| n == **name))
        })
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

fn rate_device_type(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        let mut ext = vk::ExtensionProperties::default();
        for (dst, src) in ext.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = *src as std::ffi::c_char;
        }
        ext
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
        assert!(indices.complete().is_none());
    }

    #[test]
    fn test_shared_family_preferred() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
        ];
        // Family 0 cannot present, family 2 can do both.
        let indices = find_queue_families(&families, |i| i != 0);
        assert_eq!(
            indices.complete(),
            Some(QueueFamilies {
                graphics: 2,
                present: 2
            })
        );
    }

    #[test]
    fn test_separate_present_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::TRANSFER, 1),
        ];
        let indices = find_queue_families(&families, |i| i == 1);
        let resolved = indices.complete().unwrap();
        assert_eq!(resolved.graphics, 0);
        assert_eq!(resolved.present, 1);
        assert!(!resolved.is_shared());
        assert_eq!(resolved.unique(), vec![0, 1]);
    }

    #[test]
    fn test_empty_families_are_skipped() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::GRAPHICS, 4),
        ];
        let indices = find_queue_families(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_no_present_support() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];
        let indices = find_queue_families(&families, |_| false);
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_unique_families_shared() {
        let families = QueueFamilies {
            graphics: 3,
            present: 3,
        };
        assert!(families.is_shared());
        assert_eq!(families.unique(), vec![3]);
    }

    #[test]
    fn test_missing_extensions() {
        let available = [extension(c"VK_KHR_swapchain"), extension(c"VK_KHR_maintenance1")];
        assert!(missing_extensions(&available, REQUIRED_DEVICE_EXTENSIONS).is_empty());

        let available = [extension(c"VK_KHR_maintenance1")];
        assert_eq!(
            missing_extensions(&available, REQUIRED_DEVICE_EXTENSIONS),
            vec!["VK_KHR_swapchain".to_string()]
        );
    }

    #[test]
    fn test_discrete_gpu_scores_highest() {
        assert!(
            rate_device_type(vk::PhysicalDeviceType::DISCRETE_GPU)
                > rate_device_type(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert!(
            rate_device_type(vk::PhysicalDeviceType::INTEGRATED_GPU)
                > rate_device_type(vk::PhysicalDeviceType::CPU)
        );
    }
}
