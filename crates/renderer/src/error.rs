//! Error type for the renderer layer.

use thiserror::Error;

use viewer_resources::ResourceError;
use viewer_rhi::RhiError;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error("Failed to load asset: {0}")]
    Resource(#[from] ResourceError),

    /// Window or surface failures reported by the platform layer.
    #[error(transparent)]
    Platform(#[from] viewer_core::Error),
}

pub type RendererResult<T> = Result<T, RendererError>;

#[cfg(test)]
mod tests {
    use super::*;
    use viewer_rhi::vk;

    #[test]
    fn test_rhi_error_is_transparent() {
        let err: RendererError = RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST).into();
        assert_eq!(
            err.to_string(),
            RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST).to_string()
        );
    }

    #[test]
    fn test_resource_error_conversion() {
        let err: RendererError =
            ResourceError::FileNotFound(std::path::PathBuf::from("x.png")).into();
        assert!(matches!(err, RendererError::Resource(_)));
        assert!(err.to_string().contains("x.png"));
    }
}
