//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate wraps the `ash` handles the viewer needs in RAII types that
//! destroy themselves on drop. It handles:
//! - Instance, physical device selection and logical device creation
//! - Explicit memory-type selection and allocation for buffers and images
//! - Blocking one-shot command submission and image layout transitions
//! - Swapchain, render pass and framebuffer creation
//! - Descriptor, shader and pipeline objects
//! - Synchronization primitives

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
