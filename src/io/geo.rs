use crate::types::{GeoTransform, PipelineResult};
use gdal::spatial_ref::{CoordTransform, SpatialRef};

/// Raster corner positions reprojected to geographic (lat, lon).
///
/// `corner1` is the top-left pixel corner, `corner2` the bottom-right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerCoordinates {
    pub corner1: (f64, f64),
    pub corner2: (f64, f64),
}

/// Reproject the grid corners of a raster into EPSG:4326 (lat, lon) pairs
pub fn corner_coordinates(
    geo_transform: &GeoTransform,
    projection_wkt: &str,
    width: usize,
    height: usize,
) -> PipelineResult<CornerCoordinates> {
    let top_left = geo_transform.apply(0.0, 0.0);
    let bottom_right = geo_transform.apply(width as f64, height as f64);

    let source = SpatialRef::from_wkt(projection_wkt)?;
    let target = SpatialRef::from_epsg(4326)?;
    // Keep (x, y) = (lon, lat) regardless of the authority's axis order
    source.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    target.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);

    let transform = CoordTransform::new(&source, &target)?;
    let mut xs = [top_left.0, bottom_right.0];
    let mut ys = [top_left.1, bottom_right.1];
    let mut zs = [0.0, 0.0];
    transform.transform_coords(&mut xs, &mut ys, &mut zs)?;

    log::debug!(
        "Corners reprojected to lat/lon: ({:.6}, {:.6}) / ({:.6}, {:.6})",
        ys[0],
        xs[0],
        ys[1],
        xs[1]
    );

    Ok(CornerCoordinates {
        corner1: (ys[0], xs[0]),
        corner2: (ys[1], xs[1]),
    })
}
