//! Application settings loaded from JSON
//!
//! Every field has a default, so a partial (or missing) settings file is
//! valid. Values are validated once after loading; there is no runtime
//! reconfiguration.

use std::path::Path;

use glam::UVec3;
use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::terrain::TerrainParams;
use crate::voxel::streaming::StreamingConfig;
use crate::voxel::world::WorldDescriptor;

/// Default settings file location
pub const DEFAULT_CONFIG_PATH: &str = "cfg/settings.json";

/// Largest chunk edge in bricks; 16³ slots is the limit of the 12-bit offset field
pub const MAX_CHUNK_SIZE: u32 = 16;

/// Top-level settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub world: WorldConfig,
    pub render: RenderConfig,
    pub camera: CameraConfig,
}

/// Window creation settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub app_name: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            app_name: "brickmap".to_string(),
            width: 1280,
            height: 720,
            vsync: false,
        }
    }
}

/// World extent, chunk layout and streaming capacities
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Chunk grid extent (x, y, z)
    pub chunks: [u32; 3],
    /// Chunk edge length in bricks
    pub chunk_size: u32,
    /// Brick capacity every chunk's GPU brick buffer starts with
    pub starting_brick_capacity: u32,
    /// Maximum brick requests recorded per tick
    pub load_queue_capacity: u32,
    pub terrain: TerrainParams,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunks: [2, 2, 1],
            chunk_size: 16,
            starting_brick_capacity: 16,
            load_queue_capacity: 1024,
            terrain: TerrainParams::default(),
        }
    }
}

impl WorldConfig {
    /// Descriptor consumed by world generation
    pub fn descriptor(&self) -> WorldDescriptor {
        WorldDescriptor::new(UVec3::from_array(self.chunks), self.chunk_size)
    }

    /// Capacities handed to the streaming manager
    pub fn streaming(&self) -> StreamingConfig {
        StreamingConfig {
            starting_brick_capacity: self.starting_brick_capacity,
            load_queue_capacity: self.load_queue_capacity,
        }
    }
}

/// Ray tracer settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// 0 = path traced, 1 = normals, 2 = brick residency
    pub render_mode: u32,
    /// Sun direction as (horizontal, vertical) angles in radians
    pub sun_position: [f32; 2],
    /// Ray queue slots; 0 means one per pixel
    pub ray_queue_capacity: u32,
    /// Log the rolling telemetry every this many frames (0 disables)
    pub telemetry_interval: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            render_mode: 0,
            sun_position: [0.005, 0.1],
            ray_queue_capacity: 0,
            telemetry_interval: 200,
        }
    }
}

/// Initial camera placement and controls
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub position: [f32; 3],
    /// Radians around +Z, 0 looks along +Y
    pub horizontal_angle: f32,
    /// Radians above the horizon
    pub vertical_angle: f32,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub focal_distance: f32,
    pub lens_radius: f32,
    pub enable_depth_of_field: bool,
    pub speed: f32,
    pub sprint_speed: f32,
    pub sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [64.0, 64.0, 160.0],
            horizontal_angle: std::f32::consts::FRAC_PI_4,
            vertical_angle: -0.35,
            fov: 70.0,
            focal_distance: 100.0,
            lens_radius: 0.5,
            enable_depth_of_field: false,
            speed: 10.0,
            sprint_speed: 200.0,
            sensitivity: 0.012,
        }
    }
}

impl AppConfig {
    /// Parse and validate settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::warn!("Settings file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        let world = &self.world;
        if world.chunk_size == 0 || world.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Config(format!(
                "chunk_size must be in 1..={}, got {}",
                MAX_CHUNK_SIZE, world.chunk_size
            )));
        }
        if world.chunks.iter().any(|&c| c == 0) {
            return Err(Error::Config(format!("chunk grid extent must be positive, got {:?}", world.chunks)));
        }
        if world.starting_brick_capacity == 0 {
            return Err(Error::Config("starting_brick_capacity must be positive".into()));
        }
        if world.load_queue_capacity == 0 {
            return Err(Error::Config("load_queue_capacity must be positive".into()));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be positive, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.render.render_mode > 2 {
            return Err(Error::Config(format!("unknown render_mode {}", self.render.render_mode)));
        }
        Ok(())
    }
}
