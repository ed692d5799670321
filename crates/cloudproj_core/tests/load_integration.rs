//! Integration tests for dataset loading, caching and export

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use cloudproj_core::cache::{cache_path, read_cache, write_cache};
use cloudproj_core::export::{export_in_background, PlyEncoding};
use cloudproj_core::{
    load_point_cloud, CloudError, LoadOptions, LoadSource, PointRecord, PointStore, ReturnClass, Vec3,
};
use las::point::Classification;
use las::{Builder, Point, Transform, Vector, Writer};

/// Fresh directory under the system temp dir
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cloudproj_core_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_sample_ply(stem: &PathBuf) {
    let text = "ply\nformat ascii 1.0\nelement vertex 3\n\
        property float x\nproperty float y\nproperty float z\n\
        property uchar red\nproperty uchar green\nproperty uchar blue\n\
        end_header\n0 0 0 255 0 0\n1 0 0 0 255 0\n0 1 2 0 0 255\n";
    let mut path = stem.clone().into_os_string();
    path.push(".ply");
    fs::write(path, text).unwrap();
}

#[test]
fn test_cache_file_round_trip() {
    let dir = scratch_dir("cache_round_trip");
    let path = dir.join("cloud.bin");

    let mut store = PointStore::new();
    for i in 0..50 {
        let f = i as f32;
        store.push(
            PointRecord::new(Vec3::new(f, -f, f * 0.5), [i as u8, 255 - i as u8, 7])
                .with_normal(Vec3::Z)
                .with_return_class(ReturnClass::from_raw(1, 2, (i % 7) as u8, 2.0)),
        );
    }
    store.metadata.normals_computed = true;
    store.metadata.max_class_id = 6;
    store.metadata.max_return_count = 2.0;

    write_cache(&path, &store).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), 50 * 32 + 46);

    let loaded = read_cache(&path).unwrap();
    assert_eq!(loaded.records(), store.records());
    assert_eq!(loaded.aabb(), store.aabb());
    assert_eq!(loaded.metadata, store.metadata);
}

#[test]
fn test_source_then_cache() {
    let dir = scratch_dir("source_then_cache");
    let stem = dir.join("street");
    write_sample_ply(&stem);

    let first = load_point_cloud(&stem, &LoadOptions::default()).unwrap();
    assert_eq!(first.source, LoadSource::Ply);
    assert_eq!(first.store.len(), 3);
    let written = first.cache_task.expect("cache regenerated").join().unwrap();
    assert_eq!(written, cache_path(&stem));

    let second = load_point_cloud(&stem, &LoadOptions::default()).unwrap();
    assert_eq!(second.source, LoadSource::Cache);
    assert!(second.cache_task.is_none());
    assert_eq!(second.store.records(), first.store.records());
}

#[test]
fn test_cache_disabled_reads_source() {
    let dir = scratch_dir("cache_disabled");
    let stem = dir.join("street");
    write_sample_ply(&stem);
    load_point_cloud(&stem, &LoadOptions::default())
        .unwrap()
        .cache_task
        .unwrap()
        .join()
        .unwrap();

    let options = LoadOptions { use_cache: false, ..LoadOptions::default() };
    let loaded = load_point_cloud(&stem, &options).unwrap();
    assert_eq!(loaded.source, LoadSource::Ply);
    if let Some(task) = loaded.cache_task {
        task.join().unwrap();
    }
}

#[test]
fn test_corrupt_cache_falls_back_to_source() {
    let dir = scratch_dir("corrupt_cache");
    let stem = dir.join("street");
    write_sample_ply(&stem);
    fs::write(cache_path(&stem), [1, 2, 3]).unwrap();

    let loaded = load_point_cloud(&stem, &LoadOptions::default()).unwrap();
    assert_eq!(loaded.source, LoadSource::Ply);
    loaded.cache_task.unwrap().join().unwrap();
    assert!(read_cache(&cache_path(&stem)).is_ok());
}

#[test]
fn test_normals_requested_rewrites_cache() {
    let dir = scratch_dir("normals_rewrite");
    let stem = dir.join("plane");
    let mut text = String::from(
        "ply\nformat ascii 1.0\nelement vertex 25\nproperty float x\nproperty float y\nproperty float z\nend_header\n",
    );
    for i in 0..5 {
        for j in 0..5 {
            text.push_str(&format!("{} {} 0\n", i, j));
        }
    }
    let mut path = stem.clone().into_os_string();
    path.push(".ply");
    fs::write(path, text).unwrap();

    load_point_cloud(&stem, &LoadOptions::default())
        .unwrap()
        .cache_task
        .unwrap()
        .join()
        .unwrap();

    let options = LoadOptions { compute_normals: true, knn: 6, ..LoadOptions::default() };
    let loaded = load_point_cloud(&stem, &options).unwrap();
    assert_eq!(loaded.source, LoadSource::Cache);
    assert!(loaded.store.metadata.normals_computed);
    loaded.cache_task.expect("normals trigger a rewrite").join().unwrap();

    let cached = read_cache(&cache_path(&stem)).unwrap();
    assert!(cached.metadata.normals_computed);
    assert!(cached.records().iter().all(|r| (r.normal.z - 1.0).abs() < 1e-3));
}

#[test]
fn test_background_export() {
    let dir = scratch_dir("export");
    let store: PointStore = [PointRecord::new(Vec3::new(1.0, 2.0, 3.0), [9, 8, 7])]
        .into_iter()
        .collect();

    let task = export_in_background(Arc::new(store), &dir.join("PointClouds"), "one", PlyEncoding::Ascii).unwrap();
    let path = task.join().unwrap();
    assert_eq!(path, dir.join("PointClouds").join("one.ply"));
    let text = fs::read_to_string(path).unwrap();
    assert!(text.ends_with("1 2 3 9 8 7\n"));
}

#[test]
fn test_truncated_ply_reports_parse_error() {
    let dir = scratch_dir("truncated_ply");
    let stem = dir.join("cloud");
    let text = "ply\nformat ascii 1.0\nelement vertex 3\n\
        property float x\nproperty float y\nproperty float z\n\
        end_header\n0 0 0\n";
    fs::write(dir.join("cloud.ply"), text).unwrap();

    let options = LoadOptions { use_cache: false, ..LoadOptions::default() };
    let err = load_point_cloud(&stem, &options).unwrap_err();
    assert!(matches!(err, CloudError::Parse(_)), "{}", err);
}

/// Three points with a large header offset, two classes and three returns
fn write_sample_las(path: &PathBuf) {
    let mut builder = Builder::from((1, 2));
    builder.transforms = Vector {
        x: Transform { scale: 0.01, offset: 1000.0 },
        y: Transform { scale: 0.01, offset: 2000.0 },
        z: Transform { scale: 0.01, offset: 10.0 },
    };
    let header = builder.into_header().unwrap();
    let mut writer = Writer::from_path(path, header).unwrap();

    let points = [
        (1001.5, 2002.25, 12.0, 100, 1, Classification::Ground),
        (1000.0, 2000.0, 10.5, 200, 2, Classification::Building),
        (1003.0, 2001.0, 11.0, 0, 3, Classification::Unclassified),
    ];
    for (x, y, z, intensity, return_number, classification) in points {
        writer
            .write_point(Point {
                x,
                y,
                z,
                intensity,
                return_number,
                number_of_returns: 3,
                classification,
                ..Point::default()
            })
            .unwrap();
    }
    writer.close().unwrap();
}

#[test]
fn test_las_source_then_cache() {
    let dir = scratch_dir("las_source");
    let stem = dir.join("survey");
    write_sample_las(&dir.join("survey.las"));

    let loaded = load_point_cloud(&stem, &LoadOptions::default()).unwrap();
    assert_eq!(loaded.source, LoadSource::Las);
    let store = &loaded.store;
    assert_eq!(store.len(), 3);
    assert!(store.channels.intensity);
    assert!(!store.channels.color);

    // Positions are relative to the header offset
    let first = store.records()[0].position;
    assert!((first - Vec3::new(1.5, 2.25, 2.0)).length() < 1e-3, "{:?}", first);
    let second = store.records()[1].position;
    assert!((second - Vec3::new(0.0, 0.0, 0.5)).length() < 1e-3, "{:?}", second);

    // Returns 1, 2 and 3 are populated, so the normalizer is 2
    assert_eq!(store.metadata.max_return_count, 2.0);
    let rc = store.records()[0].return_class();
    assert!((rc.return_number - 0.5).abs() <= 1.0 / 255.0);
    assert!((store.records()[1].return_class().return_number - 1.0).abs() <= 1.0 / 255.0);

    assert_eq!(store.records()[0].class_id(), 2);
    assert_eq!(store.records()[1].class_id(), 6);
    assert_eq!(store.records()[2].class_id(), 1);
    assert_eq!(store.metadata.max_class_id, 6);

    assert_eq!(store.records()[0].rgb(), [128, 128, 128]);
    assert_eq!(store.records()[1].rgb(), [255, 255, 255]);
    assert_eq!(store.records()[2].rgb(), [0, 0, 0]);

    let written = loaded.cache_task.expect("cache regenerated").join().unwrap();
    assert_eq!(written, cache_path(&stem));
    let cached = read_cache(&written).unwrap();
    assert_eq!(cached.records(), store.records());

    let again = load_point_cloud(&stem, &LoadOptions::default()).unwrap();
    assert_eq!(again.source, LoadSource::Cache);
}
