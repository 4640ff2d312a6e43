//! Core types and utilities shared by the world and the renderer

pub mod types;
pub mod error;
pub mod logging;
pub mod config;
pub mod time;
pub mod telemetry;
pub mod camera;
pub mod input;
pub mod camera_controller;

pub use types::*;
pub use error::Error;
pub use logging::fatal;
