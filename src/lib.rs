pub mod bridge;
pub mod chunk;
pub mod config;
pub mod error;
pub mod field;
pub mod interp;
pub mod marching;
pub mod mesh;
pub mod plugin;
pub mod streamer;
pub mod tables;
pub mod types;

pub use plugin::TerrainPlugin;
