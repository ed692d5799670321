//! Offline frame rendering
//!
//! [`run`] drives one load → upload → filter → render → save cycle and
//! joins every background task it started before returning.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cloudproj_compute::{ComputeError, EngineConfig, Frame, PointCloudEngine};
use cloudproj_core::export::export_in_background;
use cloudproj_core::{
    load_point_cloud, BackgroundTask, CloudError, LoadSource, PlacedCloud, PointStore, SceneTree,
};
use cloudproj_math::{mat4, Mat4};
use cloudproj_render::{GpuContext, GpuError, GpuProjector};

use crate::camera::{transform_aabb, Camera};
use crate::config::{AppConfig, Backend, ConfigError};

/// What to render and where to put it
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Dataset path without extension
    pub stem: PathBuf,
    /// Output PNG
    pub output: PathBuf,
    /// Export the loaded cloud as PLY
    pub export: bool,
    /// Heightmap output, overriding `height_filter.dtm_path`
    pub heightmap: Option<PathBuf>,
}

/// Outcome of a [`run`]
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub source: LoadSource,
    pub points_loaded: usize,
    pub points_uploaded: usize,
    pub backend: Backend,
    pub output: PathBuf,
    pub heightmap: Option<PathBuf>,
    pub export: Option<PathBuf>,
}

/// Errors that end a run
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Cloud(CloudError),
    Compute(ComputeError),
    Gpu(GpuError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "{}", err),
            AppError::Cloud(err) => write!(f, "{}", err),
            AppError::Compute(err) => write!(f, "{}", err),
            AppError::Gpu(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Cloud(err) => Some(err),
            AppError::Compute(err) => Some(err),
            AppError::Gpu(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<CloudError> for AppError {
    fn from(err: CloudError) -> Self {
        AppError::Cloud(err)
    }
}

impl From<ComputeError> for AppError {
    fn from(err: ComputeError) -> Self {
        AppError::Compute(err)
    }
}

impl From<GpuError> for AppError {
    fn from(err: GpuError) -> Self {
        AppError::Gpu(err)
    }
}

/// Name of a dataset: the stem's file name
fn dataset_name(stem: &Path) -> String {
    stem.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "point_cloud".to_string())
}

/// Place the dataset in a scene and return it with its world transform
fn place(name: &str, store: Arc<PointStore>) -> Result<PlacedCloud, CloudError> {
    let mut scene = SceneTree::new();
    let root = scene.root();
    let group = scene
        .add_group(root, "datasets", mat4::IDENTITY)
        .ok_or_else(|| CloudError::InvalidInput("scene root missing".into()))?;
    scene.add_point_cloud(group, name, mat4::IDENTITY, store);
    scene
        .flatten()
        .into_iter()
        .next()
        .ok_or_else(|| CloudError::InvalidInput(format!("dataset '{}' was not placed", name)))
}

/// Join a background task, logging instead of failing
fn finish<T: fmt::Debug>(task: BackgroundTask<T>) -> Option<T> {
    let name = task.name().to_string();
    match task.join() {
        Ok(value) => {
            log::info!("Background {} finished: {:?}", name, value);
            Some(value)
        }
        Err(err) => {
            log::error!("Background {} failed: {}", name, err);
            None
        }
    }
}

/// Backend that can honour `config`: the GPU only runs the standard path
fn select_backend(config: &AppConfig) -> Backend {
    match config.rendering.backend {
        Backend::Gpu if config.rendering.hqr => {
            log::warn!("The GPU backend has no hqr path, rendering on the CPU");
            Backend::Cpu
        }
        backend => backend,
    }
}

fn render_gpu(engine: &PointCloudEngine, view_proj: &Mat4) -> Result<Frame, GpuError> {
    let context = GpuContext::headless()?;
    let mut projector = GpuProjector::new(&context.device);
    projector.upload(&context.device, engine);
    projector.render(&context, view_proj)
}

/// Load, filter, render and save one frame
pub fn run(config: &AppConfig, options: &RunOptions) -> Result<RunSummary, AppError> {
    let engine_config: EngineConfig = config.to_engine_config();
    engine_config.validate()?;

    let loaded = load_point_cloud(&options.stem, &config.load_options())?;
    let mut tasks = Vec::new();
    tasks.extend(loaded.cache_task);

    let name = dataset_name(&options.stem);
    let placed = place(&name, Arc::clone(&loaded.store))?;

    let export_task = if options.export {
        Some(export_in_background(
            Arc::clone(&placed.store),
            &config.point_cloud.export_dir,
            &name,
            config.point_cloud.export_encoding,
        )?)
    } else {
        None
    };

    let result = render_frame(config, options, engine_config, &placed);

    // Tasks are joined even when rendering failed
    for task in tasks {
        finish(task);
    }
    let export = export_task.and_then(finish);

    let (points_uploaded, backend, heightmap) = result?;
    Ok(RunSummary {
        source: loaded.source,
        points_loaded: loaded.store.len(),
        points_uploaded,
        backend,
        output: options.output.clone(),
        heightmap,
        export,
    })
}

fn render_frame(
    config: &AppConfig,
    options: &RunOptions,
    engine_config: EngineConfig,
    placed: &PlacedCloud,
) -> Result<(usize, Backend, Option<PathBuf>), AppError> {
    let mut engine = PointCloudEngine::new(engine_config)?;
    let report = engine.set_point_cloud(Arc::clone(&placed.store))?;

    let heightmap = match (&options.heightmap, config.height_filter.build_dtm) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(config.height_filter.dtm_path.clone()),
        (None, false) => None,
    };
    if let Some(path) = &heightmap {
        engine.filter_by_height()?.save_dtm(path)?;
    }
    if config.rendering.filter_by_ground {
        engine.filter_by_ground(&config.ground_classifier())?;
    }

    let bounds = transform_aabb(placed.store.aabb(), &placed.world_transform);
    let camera = Camera::framing(&bounds, &config.camera);
    let view_proj = mat4::mul(
        camera.view_projection(config.rendering.width, config.rendering.height),
        placed.world_transform,
    );

    let (frame, backend) = match select_backend(config) {
        Backend::Cpu => (engine.render(&view_proj)?, Backend::Cpu),
        Backend::Gpu => match render_gpu(&engine, &view_proj) {
            Ok(frame) => (frame, Backend::Gpu),
            Err(GpuError::NoAdapter) => {
                log::warn!("No GPU adapter, rendering on the CPU");
                (engine.render(&view_proj)?, Backend::Cpu)
            }
            Err(err) => return Err(err.into()),
        },
    };
    frame.save_png(&options.output)?;

    Ok((report.points_uploaded, backend, heightmap))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_name() {
        assert_eq!(dataset_name(Path::new("data/street")), "street");
        assert_eq!(dataset_name(Path::new("/")), "point_cloud");
    }

    #[test]
    fn test_select_backend() {
        let mut config = AppConfig::default();
        assert_eq!(select_backend(&config), Backend::Cpu);

        config.rendering.backend = Backend::Gpu;
        config.rendering.hqr = true;
        assert_eq!(select_backend(&config), Backend::Cpu);

        config.rendering.hqr = false;
        assert_eq!(select_backend(&config), Backend::Gpu);
    }

    #[test]
    fn test_place_keeps_store() {
        let store = Arc::new(PointStore::new());
        let placed = place("street", Arc::clone(&store)).unwrap();
        assert_eq!(placed.name, "street");
        assert_eq!(placed.world_transform, mat4::IDENTITY);
        assert!(Arc::ptr_eq(&placed.store, &store));
    }
}
