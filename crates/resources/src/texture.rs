//! Texture decoding.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ResourceError, ResourceResult};

/// Decoded RGBA8 pixels, row-major, top row first.
#[derive(Clone, Debug)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Decode an image file, converting whatever channel layout it has to RGBA8.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        debug!("Loading texture from {:?}", path);

        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        let texture = Self::from_rgba8(width, height, rgba.into_raw()).map_err(|message| {
            ResourceError::InvalidData {
                path: path.to_path_buf(),
                message,
            }
        })?;

        info!("Loaded texture {:?}: {}x{}", path, width, height);

        Ok(texture)
    }

    /// Wrap raw RGBA8 pixels, checking that the size matches the dimensions.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, String> {
        if width == 0 || height == 0 {
            return Err(format!("texture has zero size ({}x{})", width, height));
        }

        let expected = width as usize * height as usize * Self::BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(format!(
                "expected {} bytes of RGBA8 data for {}x{}, got {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    #[inline]
    pub fn size_in_bytes(&self) -> u64 {
        self.pixels.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba8() {
        let texture = TextureData::from_rgba8(2, 2, vec![255; 16]).unwrap();
        assert_eq!((texture.width, texture.height), (2, 2));
        assert_eq!(texture.size_in_bytes(), 16);
    }

    #[test]
    fn test_from_rgba8_rejects_wrong_length() {
        assert!(TextureData::from_rgba8(2, 2, vec![0; 12]).is_err());
    }

    #[test]
    fn test_from_rgba8_rejects_zero_size() {
        assert!(TextureData::from_rgba8(0, 4, Vec::new()).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = TextureData::load(Path::new("textures/nope.png"));
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }
}
