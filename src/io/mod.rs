//! I/O modules for reading and writing georeferenced rasters

pub mod geo;
pub mod raster;

pub use geo::{corner_coordinates, CornerCoordinates};
pub use raster::RasterStore;
