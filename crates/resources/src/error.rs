//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The OBJ parser rejected the file.
    #[error("Failed to load OBJ: {0}")]
    Obj(#[from] tobj::LoadError),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The file parsed but its contents cannot be used.
    #[error("Invalid data in '{path}': {message}")]
    InvalidData {
        path: PathBuf,
        message: String,
    },
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found_display() {
        let err = ResourceError::FileNotFound(PathBuf::from("models/missing.obj"));
        assert_eq!(err.to_string(), "File not found: models/missing.obj");
    }

    #[test]
    fn test_invalid_data_display() {
        let err = ResourceError::InvalidData {
            path: PathBuf::from("a.obj"),
            message: "no texture coordinates".to_string(),
        };
        assert!(err.to_string().contains("no texture coordinates"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ResourceError = io.into();
        assert!(matches!(err, ResourceError::Io(_)));
    }
}
