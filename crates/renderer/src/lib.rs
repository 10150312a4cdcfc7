//! Frame loop and swapchain lifecycle for the model viewer.
//!
//! This crate orchestrates the rendering process:
//! - Uploading the mesh and texture and binding them for the shaders
//! - Building and rebuilding everything that depends on the swapchain
//! - Pre-recording one draw command buffer per swapchain image
//! - Frame-slot synchronization with up to [`MAX_FRAMES_IN_FLIGHT`] frames queued

mod error;

pub mod bindings;
pub mod command_recorder;
pub mod depth_buffer;
pub mod frame_manager;
pub mod mesh;
pub mod renderer;
pub mod swapchain_manager;
pub mod texture;
pub mod ubo;

pub use error::{RendererError, RendererResult};
pub use renderer::{FrameOutcome, FramePhase, Renderer};

/// Maximum number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;
