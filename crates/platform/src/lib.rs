//! Platform layer for the model viewer.
//!
//! This crate provides:
//! - Window management via winit
//! - Vulkan surface creation from raw window handles
//! - The resize notification handed to the renderer

mod resize;
mod window;

pub use resize::ResizeFlag;
pub use window::{Surface, Window, get_required_extensions};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
