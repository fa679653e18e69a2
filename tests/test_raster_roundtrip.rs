use bloomcast::types::GeoTransform;
use bloomcast::RasterStore;
use gdal::spatial_ref::SpatialRef;
use ndarray::{Array2, Array3, Axis};
use std::collections::HashMap;
use tempfile::TempDir;

fn tag_map() -> HashMap<String, String> {
    let mut tags = HashMap::new();
    tags.insert("satellite".to_string(), "sentinel-2a".to_string());
    tags.insert("id".to_string(), "12".to_string());
    tags.insert("date".to_string(), "2020-08-15".to_string());
    tags.insert("scale".to_string(), "10".to_string());
    tags
}

#[test]
fn test_write_open_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("roundtrip.tif");

    let mut bands = Array3::<f32>::zeros((3, 5, 7));
    for b in 0..3 {
        for r in 0..5 {
            for c in 0..7 {
                bands[[b, r, c]] = (b * 1000 + r * 10 + c) as f32;
            }
        }
    }
    let transform = GeoTransform::from_gdal([450_000.0, 10.0, 0.0, 5_200_000.0, 0.0, -10.0]);
    let wkt = SpatialRef::from_epsg(32633).unwrap().to_wkt().unwrap();

    RasterStore::write(&path, &bands, &transform, &wkt, &tag_map()).unwrap();
    let opened = RasterStore::open(&path).unwrap();

    assert_eq!(opened.bands.dim(), (3, 5, 7));
    assert_eq!(opened.bands, bands);
    assert_eq!(opened.geo_transform, transform);
    assert!(!opened.projection.is_empty());

    assert_eq!(opened.tags.satellite, "sentinel-2a");
    assert_eq!(opened.tags.lake_id, 12);
    assert_eq!(opened.tags.date, "2020-08-15");
    assert_eq!(opened.tags.scale, 10);
}

#[test]
fn test_nan_pixels_survive_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nan.tif");

    let mut grid = Array2::<f32>::from_elem((4, 4), 1.5);
    grid[[1, 3]] = f32::NAN;
    let transform = GeoTransform::from_gdal([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]);

    RasterStore::write_single_band(&path, &grid, &transform, "", &tag_map()).unwrap();
    let opened = RasterStore::open(&path).unwrap();

    let band = opened.bands.index_axis(Axis(0), 0);
    assert!(band[[1, 3]].is_nan());
    assert_eq!(band[[0, 0]], 1.5);
}

#[test]
fn test_open_missing_required_tag_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("untagged.tif");

    let bands = Array3::<f32>::zeros((1, 2, 2));
    let transform = GeoTransform::from_gdal([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]);
    let mut tags = tag_map();
    tags.remove("satellite");

    RasterStore::write(&path, &bands, &transform, "", &tags).unwrap();
    let err = RasterStore::open(&path).unwrap_err();
    assert_eq!(err.kind(), bloomcast::FailureKind::Configuration);
}

#[test]
fn test_open_nonexistent_file_fails() {
    let result = RasterStore::open("does_not_exist.tif");
    assert!(result.is_err());
}
