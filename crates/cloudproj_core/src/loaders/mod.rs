//! Dataset loading
//!
//! A dataset is addressed by its stem (`data/street`). [`load_point_cloud`]
//! tries, in order:
//!
//! 1. `<stem>.bin` when caching is enabled
//! 2. `<stem>.ply`
//! 3. `<stem>.las`
//! 4. `<stem>.laz`
//!
//! A source that fails to parse is logged and the next one is tried; when
//! none loads, the last parse error is returned rather than `NotFound`.
//! After a source parse (or a normal recomputation) the cache is rewritten
//! on a background thread.

pub mod ply;
pub mod lidar;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{self, cache_path};
use crate::normals::{compute_normals, DEFAULT_KNN};
use crate::{BackgroundTask, CloudError, PointStore};

/// Where a loaded store came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadSource {
    Cache,
    Ply,
    Las,
    Laz,
}

impl LoadSource {
    fn extension(self) -> &'static str {
        match self {
            LoadSource::Cache => cache::CACHE_EXTENSION,
            LoadSource::Ply => "ply",
            LoadSource::Las => "las",
            LoadSource::Laz => "laz",
        }
    }
}

/// Options controlling [`load_point_cloud`]
#[derive(Clone, Debug)]
pub struct LoadOptions {
    pub use_cache: bool,
    pub compute_normals: bool,
    pub knn: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            compute_normals: false,
            knn: DEFAULT_KNN,
        }
    }
}

/// Result of a load: the shared store plus the pending cache write, if any
#[derive(Debug)]
pub struct LoadedCloud {
    pub store: Arc<PointStore>,
    pub source: LoadSource,
    pub cache_task: Option<BackgroundTask<PathBuf>>,
}

fn with_extension(stem: &Path, extension: &str) -> PathBuf {
    let mut path = stem.as_os_str().to_owned();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

fn read_source(stem: &Path) -> Result<(PointStore, LoadSource), CloudError> {
    let mut last_err = None;
    for source in [LoadSource::Ply, LoadSource::Las, LoadSource::Laz] {
        let path = with_extension(stem, source.extension());
        if !path.exists() {
            continue;
        }
        let result = match source {
            LoadSource::Ply => ply::read_ply(&path),
            _ => lidar::read_las(&path),
        };
        match result {
            Ok(store) => {
                log::info!("Loaded {} ({} points)", path.display(), store.len());
                return Ok((store, source));
            }
            Err(err) => {
                log::warn!("Could not load {}: {}", path.display(), err);
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| CloudError::NotFound(stem.display().to_string())))
}

/// Load a dataset by stem, preferring the cache
pub fn load_point_cloud(stem: &Path, options: &LoadOptions) -> Result<LoadedCloud, CloudError> {
    let cache_file = cache_path(stem);
    let mut cached = None;
    if options.use_cache && cache_file.exists() {
        match cache::read_cache(&cache_file) {
            Ok(store) => cached = Some(store),
            Err(err) => log::warn!("Ignoring cache {}: {}", cache_file.display(), err),
        }
    }

    let (mut store, source, mut dirty) = match cached {
        Some(store) => (store, LoadSource::Cache, false),
        None => {
            let (store, source) = read_source(stem)?;
            (store, source, true)
        }
    };

    if options.compute_normals && !store.metadata.normals_computed {
        compute_normals(&mut store, options.knn)?;
        dirty = true;
    }

    let store = Arc::new(store);
    let cache_task = if dirty {
        Some(cache::write_cache_in_background(cache_file, Arc::clone(&store))?)
    } else {
        None
    };

    Ok(LoadedCloud { store, source, cache_task })
}
