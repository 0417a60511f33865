//! Core engine services
//!
//! Configuration loading and the shared error types.

pub mod config;
pub mod error;

pub use config::{ConfigError, SceneConfig};
pub use error::SceneError;
