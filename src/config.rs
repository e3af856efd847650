use bevy::prelude::Resource;

use crate::{
    error::{Result, TerrainError},
    tables::MAX_CELL_TRIANGLES,
    types::Value,
};

/// Terrain streaming configuration.
///
/// Inserted as a resource by [`TerrainPlugin`](crate::plugin::TerrainPlugin):
///
/// ```rust,ignore
/// app.add_plugins(TerrainPlugin {
///     config: TerrainConfig::default()
///         .with_view_distance(4)
///         .with_noise_scale(0.5),
/// });
/// ```
///
/// Modifying the resource at runtime rebuilds the terrain from scratch on the next frame,
/// discarding every edit.
#[derive(Resource, Clone, Debug, PartialEq)]
pub struct TerrainConfig {
    /// Chunks loaded along each axis from the viewer's chunk, counting it. The loaded window
    /// is a cube of `2 * view_distance - 1` chunks per side. Default: `6`.
    pub view_distance: u32,
    /// Maximum number of chunks recycled (regenerated at a new coordinate) per tick.
    ///
    /// Higher values fill the window faster after a long move but cost more per frame.
    /// Default: `8`.
    pub max_recycled_per_frame: usize,
    /// World-space side length of a chunk. Default: `16.0`.
    pub chunk_size: Value,
    /// Cells per chunk axis. Default: `16`.
    pub segments: usize,
    /// Multiplier applied to noise-domain coordinates (chunk units). Default: `1.0`.
    pub noise_scale: Value,
    /// Iso-surface threshold; corners at or above it are solid. Default: `0.5`.
    pub iso_threshold: Value,
    /// Seed of the terrain noise.
    pub seed: i32,
    /// World-space radius of an edit brush. Default: `chunk_size / 4`.
    pub edit_radius: Value,
    /// Field change per second while editing. Default: `2.0`.
    pub edit_speed: Value,
    /// When set, each regeneration reports the first corner at or below this value as an
    /// occupancy signal.
    pub spawn_threshold: Option<Value>,
    /// Carve open space around the viewer when the terrain is first generated. Default: `true`.
    pub carve_spawn_cavity: bool,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        let chunk_size = 16.;
        Self {
            view_distance: 6,
            max_recycled_per_frame: 8,
            chunk_size,
            segments: 16,
            noise_scale: 1.,
            iso_threshold: 0.5,
            seed: 1337,
            edit_radius: chunk_size / 4.,
            edit_speed: 2.,
            spawn_threshold: None,
            carve_spawn_cavity: true,
        }
    }
}

impl TerrainConfig {
    pub fn with_view_distance(mut self, view_distance: u32) -> Self {
        self.view_distance = view_distance;
        self
    }

    pub fn with_max_recycled_per_frame(mut self, max: usize) -> Self {
        self.max_recycled_per_frame = max;
        self
    }

    /// Sets the chunk size and rescales the edit radius to a quarter of it.
    pub fn with_chunk_size(mut self, chunk_size: Value) -> Self {
        self.chunk_size = chunk_size;
        self.edit_radius = chunk_size / 4.;
        self
    }

    pub fn with_segments(mut self, segments: usize) -> Self {
        self.segments = segments;
        self
    }

    pub fn with_noise_scale(mut self, noise_scale: Value) -> Self {
        self.noise_scale = noise_scale;
        self
    }

    pub fn with_threshold(mut self, threshold: Value) -> Self {
        self.iso_threshold = threshold;
        self
    }

    pub fn with_seed(mut self, seed: i32) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_edit_radius(mut self, radius: Value) -> Self {
        self.edit_radius = radius;
        self
    }

    pub fn with_spawn_threshold(mut self, threshold: Value) -> Self {
        self.spawn_threshold = Some(threshold);
        self
    }

    pub fn with_spawn_cavity(mut self, carve: bool) -> Self {
        self.carve_spawn_cavity = carve;
        self
    }

    /// Checks every field against its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.view_distance == 0 {
            return Err(TerrainError::InvalidConfig("view_distance must be at least 1"));
        }
        if self.max_recycled_per_frame == 0 {
            return Err(TerrainError::InvalidConfig("max_recycled_per_frame must be at least 1"));
        }
        if !(self.chunk_size.is_finite() && self.chunk_size > 0.) {
            return Err(TerrainError::InvalidConfig("chunk_size must be positive"));
        }
        if self.segments == 0 {
            return Err(TerrainError::InvalidConfig("segments must be at least 1"));
        }
        if !self.noise_scale.is_finite() {
            return Err(TerrainError::InvalidConfig("noise_scale must be finite"));
        }
        if !(0.0..=1.0).contains(&self.iso_threshold) {
            return Err(TerrainError::InvalidConfig("iso_threshold must be within [0, 1]"));
        }
        if !(self.edit_radius.is_finite() && self.edit_radius >= 0.) {
            return Err(TerrainError::InvalidConfig("edit_radius must be non-negative"));
        }
        Ok(())
    }

    /// World-space size of one cell.
    pub fn cell_size(&self) -> Value {
        self.chunk_size / self.segments as Value
    }

    /// Chebyshev radius of the loaded window, in chunks.
    pub fn view_radius(&self) -> i32 {
        self.view_distance as i32 - 1
    }

    /// Number of chunks in the loaded window.
    pub fn chunk_count(&self) -> usize {
        let side = 2 * self.view_radius() as usize + 1;
        side * side * side
    }

    /// Squared viewer movement that triggers a new window computation: half a chunk.
    pub fn retarget_distance_squared(&self) -> Value {
        self.chunk_size * self.chunk_size / 4.
    }

    /// Worst-case triangle count of one chunk.
    pub fn max_triangles(&self) -> usize {
        self.segments.pow(3) * MAX_CELL_TRIANGLES
    }

    /// Field change for one frame of editing: negative digs, positive fills.
    pub fn edit_delta(&self, dt: Value, dig: bool) -> Value {
        let change = self.edit_speed * dt;
        if dig { -change } else { change }
    }
}
