//! Core utilities shared by every crate of the model viewer.
//!
//! This crate provides:
//! - Error types and result aliases
//! - Logging initialization
//! - A frame clock for animation time and FPS reporting
//! - The viewer configuration loaded from TOML

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::{ConfigError, ViewerConfig};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging};
pub use timer::FrameClock;
