use crate::types::{
    Band, BandStack, GeoTransform, PipelineError, PipelineResult, RasterTags, SourceRaster,
};
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::{Array3, Axis};
use std::collections::HashMap;
use std::path::Path;

/// GeoTIFF reader/writer for multi-band float rasters
pub struct RasterStore;

impl RasterStore {
    /// Open a raster file and read all bands, tags, and georeferencing
    pub fn open<P: AsRef<Path>>(path: P) -> PipelineResult<SourceRaster> {
        log::debug!("Opening raster: {}", path.as_ref().display());

        let dataset = Dataset::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count() as usize;

        if band_count == 0 {
            return Err(PipelineError::Configuration(format!(
                "Raster {} has no bands",
                path.as_ref().display()
            )));
        }

        let mut bands = Array3::<f32>::zeros((band_count, height, width));
        for i in 0..band_count {
            let rasterband = dataset.rasterband((i + 1) as isize)?;
            let buffer =
                rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
            let band = ndarray::Array2::from_shape_vec((height, width), buffer.data).map_err(
                |e| PipelineError::Configuration(format!("Failed to reshape band data: {}", e)),
            )?;
            bands.index_axis_mut(Axis(0), i).assign(&band);
        }

        let tags = RasterTags::from_map(Self::read_tags(&dataset))?;
        let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let projection = dataset.projection();

        log::debug!(
            "Read {} bands of {}x{} from {} ({})",
            band_count,
            height,
            width,
            path.as_ref().display(),
            tags.satellite
        );

        Ok(SourceRaster {
            bands,
            tags,
            geo_transform,
            projection,
        })
    }

    /// Write a multi-band float raster as GeoTIFF
    pub fn write<P: AsRef<Path>>(
        path: P,
        bands: &BandStack,
        geo_transform: &GeoTransform,
        projection: &str,
        tags: &HashMap<String, String>,
    ) -> PipelineResult<()> {
        log::debug!("Writing raster: {}", path.as_ref().display());

        let (band_count, height, width) = bands.dim();
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<f32, _>(
            path.as_ref(),
            width as isize,
            height as isize,
            band_count as isize,
        )?;

        dataset.set_geo_transform(&geo_transform.to_gdal())?;
        if !projection.is_empty() {
            dataset.set_projection(projection)?;
        }

        for i in 0..band_count {
            let band = bands.index_axis(Axis(0), i);
            let flat_data: Vec<f32> = band.iter().cloned().collect();
            let buffer = gdal::raster::Buffer::new((width, height), flat_data);
            let mut rasterband = dataset.rasterband((i + 1) as isize)?;
            rasterband.write((0, 0), (width, height), &buffer)?;
            rasterband.set_no_data_value(Some(f32::NAN as f64))?;
        }

        for (key, value) in tags {
            dataset.set_metadata_item(key, value, "")?;
        }

        Ok(())
    }

    /// Write a single-band float raster as GeoTIFF
    pub fn write_single_band<P: AsRef<Path>>(
        path: P,
        band: &Band,
        geo_transform: &GeoTransform,
        projection: &str,
        tags: &HashMap<String, String>,
    ) -> PipelineResult<()> {
        let stack = band.clone().insert_axis(Axis(0));
        Self::write(path, &stack, geo_transform, projection, tags)
    }

    /// Read the default metadata domain as a tag map
    fn read_tags(dataset: &Dataset) -> HashMap<String, String> {
        let mut tags = HashMap::new();
        if let Some(entries) = dataset.metadata_domain("") {
            for entry in entries {
                if let Some((key, value)) = entry.split_once('=') {
                    tags.insert(key.to_string(), value.to_string());
                }
            }
        }
        tags
    }
}
