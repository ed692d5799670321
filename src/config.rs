//! Application configuration
//!
//! Configuration is loaded from multiple sources with the following priority (lowest to highest):
//! 1. `config/default.toml` (version controlled)
//! 2. `config/user.toml` (gitignored, user overrides)
//! 3. Environment variables (`CPJ_SECTION__KEY`)

use figment::{Figment, providers::{Format, Toml, Env}};
use serde::{Serialize, Deserialize};
use std::path::{Path, PathBuf};

use cloudproj_compute::{ChunkOrder, ChunkPartitioner, EngineConfig, VisualizationMode, DEFAULT_DEVICE_BUFFER_BYTES};
use cloudproj_core::export::PlyEncoding;
use cloudproj_core::normals::DEFAULT_KNN;
use cloudproj_core::{CellMinimumClassifier, LoadOptions};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Loading and preprocessing
    #[serde(default)]
    pub point_cloud: PointCloudConfig,
    /// Output image and projection settings
    #[serde(default)]
    pub rendering: RenderingConfig,
    /// Height filter grid and heightmap output
    #[serde(default)]
    pub height_filter: HeightFilterConfig,
    /// Ground classifier settings
    #[serde(default)]
    pub ground_filter: GroundFilterConfig,
    /// Camera configuration
    #[serde(default)]
    pub camera: CameraConfig,
    /// Device thread pool
    #[serde(default)]
    pub compute: ComputeConfig,
    /// Debug configuration
    #[serde(default)]
    pub debug: DebugConfig,
}

impl AppConfig {
    /// Load configuration from default locations
    ///
    /// Priority (lowest to highest):
    /// 1. `config/default.toml`
    /// 2. `config/user.toml`
    /// 3. Environment variables (`CPJ_*`)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific config directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let default_path = config_dir.join("default.toml");
        let user_path = config_dir.join("user.toml");

        let mut figment = Figment::new();

        if default_path.exists() {
            figment = figment.merge(Toml::file(&default_path));
        }

        // Load user config (optional)
        if user_path.exists() {
            figment = figment.merge(Toml::file(&user_path));
        }

        // Environment variables override everything
        // CPJ_RENDERING__HQR=false -> rendering.hqr = false
        figment = figment.merge(Env::prefixed("CPJ_").split("__"));

        figment.extract().map_err(ConfigError::from)
    }

    /// Engine settings derived from this configuration
    pub fn to_engine_config(&self) -> EngineConfig {
        let pc = &self.point_cloud;
        let r = &self.rendering;
        EngineConfig {
            width: r.width,
            height: r.height,
            background_color: r.background_color,
            chunk_capacity: ChunkPartitioner::from_buffer_bytes(pc.device_buffer_bytes)
                .map(|p| p.capacity())
                .unwrap_or(0),
            sort: pc.sort,
            reduce: pc.reduce,
            reduce_iterations: pc.reduce_iterations,
            reduce_grid_resolution: pc.reduce_grid_resolution,
            hqr: r.hqr,
            distance_threshold: r.distance_threshold,
            visualization_mode: r.visualization_mode,
            normalized_color: r.normalized_color,
            class_range: (r.class_range[0], r.class_range[1]),
            filter_by_height: r.filter_by_height,
            filter_by_ground: r.filter_by_ground,
            height_filter_grid: (self.height_filter.subdivisions[0], self.height_filter.subdivisions[1]),
            parallel_chunks: r.parallel_chunks,
            chunk_order: r.chunk_order,
            worker_threads: self.compute.worker_threads,
        }
    }

    /// Loader settings derived from this configuration
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            use_cache: self.point_cloud.use_cache,
            compute_normals: self.point_cloud.compute_normals,
            knn: self.point_cloud.knn,
        }
    }

    /// Ground classifier built from `ground_filter`
    pub fn ground_classifier(&self) -> CellMinimumClassifier {
        CellMinimumClassifier::new(self.ground_filter.cell_size, self.ground_filter.tolerance)
    }
}

/// Point cloud loading and preprocessing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCloudConfig {
    /// Read and write `<stem>.bin` caches
    pub use_cache: bool,
    /// Morton-sort chunks on upload
    pub sort: bool,
    /// Grid-reduce chunks on upload
    pub reduce: bool,
    pub reduce_iterations: u32,
    pub reduce_grid_resolution: u32,
    /// Estimate normals when the source has none
    pub compute_normals: bool,
    /// Neighbours used for normal estimation
    pub knn: usize,
    /// Size of one device buffer; bounds the chunk size
    pub device_buffer_bytes: u64,
    /// Directory for PLY exports
    pub export_dir: PathBuf,
    pub export_encoding: PlyEncoding,
}

impl Default for PointCloudConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            sort: true,
            reduce: false,
            reduce_iterations: 1,
            reduce_grid_resolution: 1024,
            compute_normals: false,
            knn: DEFAULT_KNN,
            device_buffer_bytes: DEFAULT_DEVICE_BUFFER_BYTES,
            export_dir: PathBuf::from("export"),
            export_encoding: PlyEncoding::default(),
        }
    }
}

/// Where frames are projected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Cpu,
    Gpu,
}

/// Rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderingConfig {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Background color [r, g, b]
    pub background_color: [f32; 3],
    /// Average the nearest depth band instead of taking one point
    pub hqr: bool,
    pub distance_threshold: f32,
    pub visualization_mode: VisualizationMode,
    /// Stretch RGB to the cloud's color range
    pub normalized_color: bool,
    /// Half-open range of drawn class ids
    pub class_range: [u32; 2],
    pub filter_by_height: bool,
    pub filter_by_ground: bool,
    pub parallel_chunks: bool,
    pub chunk_order: ChunkOrder,
    pub backend: Backend,
}

impl Default for RenderingConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            width: engine.width,
            height: engine.height,
            background_color: engine.background_color,
            hqr: engine.hqr,
            distance_threshold: engine.distance_threshold,
            visualization_mode: engine.visualization_mode,
            normalized_color: engine.normalized_color,
            class_range: [engine.class_range.0, engine.class_range.1],
            filter_by_height: false,
            filter_by_ground: false,
            parallel_chunks: false,
            chunk_order: ChunkOrder::Ascending,
            backend: Backend::Cpu,
        }
    }
}

/// Height filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightFilterConfig {
    /// Grid cells along x and y
    pub subdivisions: [u32; 2],
    /// Write the heightmap after filtering
    pub build_dtm: bool,
    pub dtm_path: PathBuf,
}

impl Default for HeightFilterConfig {
    fn default() -> Self {
        Self {
            subdivisions: [100, 100],
            build_dtm: false,
            dtm_path: PathBuf::from("DTM.png"),
        }
    }
}

/// Ground classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundFilterConfig {
    /// Cell edge length in scene units
    pub cell_size: f32,
    /// Height above the cell minimum still counted as ground
    pub tolerance: f32,
}

impl Default for GroundFilterConfig {
    fn default() -> Self {
        let classifier = CellMinimumClassifier::default();
        Self {
            cell_size: classifier.cell_size,
            tolerance: classifier.tolerance,
        }
    }
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Eye position; framed from the cloud bounds when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eye: Option<[f32; 3]>,
    /// Look-at point; the cloud center when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<[f32; 3]>,
    pub up: [f32; 3],
    /// Vertical field of view in degrees
    pub fov: f32,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane; derived from the cloud bounds when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub far: Option<f32>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            eye: None,
            target: None,
            up: [0.0, 0.0, 1.0],
            fov: 45.0,
            near: 0.1,
            far: None,
        }
    }
}

/// Compute configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    /// Device threads (0 = one per core)
    pub worker_threads: usize,
}

/// Debug configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Configuration error
#[derive(Debug)]
pub struct ConfigError {
    source: figment::Error,
}

impl From<figment::Error> for ConfigError {
    fn from(source: figment::Error) -> Self {
        ConfigError { source }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Configuration error: {}", self.source)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.rendering.width, 1280);
        assert_eq!(config.height_filter.subdivisions, [100, 100]);
        assert_eq!(config.rendering.backend, Backend::Cpu);
        assert!(config.camera.eye.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("distance_threshold"));
        assert!(toml.contains("subdivisions"));
        assert!(!toml.contains("eye"));
    }

    #[test]
    fn test_engine_config_conversion() {
        let mut config = AppConfig::default();
        config.point_cloud.device_buffer_bytes = 3200;
        config.rendering.class_range = [2, 3];
        config.height_filter.subdivisions = [10, 20];
        config.compute.worker_threads = 3;

        let engine = config.to_engine_config();
        assert_eq!(engine.chunk_capacity, 100);
        assert_eq!(engine.class_range, (2, 3));
        assert_eq!(engine.height_filter_grid, (10, 20));
        assert_eq!(engine.worker_threads, 3);
        assert!(engine.validate().is_ok());
    }

    #[test]
    fn test_tiny_device_buffer_fails_validation() {
        let mut config = AppConfig::default();
        config.point_cloud.device_buffer_bytes = 16;
        assert!(config.to_engine_config().validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [rendering]
            hqr = false
            visualization_mode = "height"

            [camera]
            eye = [1.0, 2.0, 3.0]
            "#,
        )
        .unwrap();
        assert!(!config.rendering.hqr);
        assert_eq!(config.rendering.visualization_mode, VisualizationMode::Height);
        assert_eq!(config.rendering.width, 1280);
        assert_eq!(config.camera.eye, Some([1.0, 2.0, 3.0]));
        assert_eq!(config.camera.fov, 45.0);
    }
}
