//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
///
/// Every variant except [`RhiError::VulkanError`] describes a capability or
/// configuration problem that retrying cannot fix.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// No physical device satisfies the viewer's requirements
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A required device extension is not supported
    #[error("Missing required extension: {0}")]
    MissingExtension(String),

    /// Validation was requested but the layer is not installed
    #[error("Validation layer {0} requested but not available")]
    MissingValidationLayer(String),

    /// No memory type matches the requested type bits and properties
    #[error("No suitable memory type (type bits {type_bits:#b}, properties {properties:?})")]
    NoSuitableMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },

    /// Layout transition pair outside the supported table
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// None of the candidate formats supports the requested features
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface query error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RhiError::UnsupportedLayoutTransition {
            old: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            new: vk::ImageLayout::UNDEFINED,
        };
        let msg = err.to_string();
        assert!(msg.contains("SHADER_READ_ONLY_OPTIMAL"));
        assert!(msg.contains("UNDEFINED"));

        let err = RhiError::NoSuitableMemoryType {
            type_bits: 0b101,
            properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        };
        assert!(err.to_string().contains("0b101"));
    }

    #[test]
    fn test_vk_result_conversion() {
        let err: RhiError = vk::Result::ERROR_DEVICE_LOST.into();
        assert!(matches!(
            err,
            RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)
        ));
    }
}
