//! Asset loading for the model viewer.
//!
//! This crate turns files on disk into plain CPU-side data:
//! - Wavefront OBJ meshes, flattened to a triangle list
//! - RGBA8 textures decoded from PNG or JPEG
//!
//! Nothing here touches the GPU; the renderer uploads the results.

mod error;

pub mod model;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use model::{MeshVertex, Model};
pub use texture::TextureData;
