//! cloudproj - point cloud projection renderer
//!
//! Loads a LiDAR or PLY dataset, uploads it to the projection engine and
//! writes the projected frame as PNG.
//!
//! ## Key Components
//!
//! - [`config::AppConfig`] - Layered TOML + environment configuration
//! - [`camera::Camera`] - Look-at camera that frames the dataset by default
//! - [`app::run`] - One load, filter, render and save cycle

pub mod app;
pub mod camera;
pub mod config;
