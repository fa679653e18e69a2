use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Single raster band (rows x cols)
pub type Band = Array2<f32>;

/// Multi-band raster stack (bands x rows x cols)
pub type BandStack = Array3<f32>;

/// Single-band prediction output (rows x cols)
pub type PredictionGrid = Array2<f32>;

/// Boolean grid marking pixels whose original measurement was non-finite
pub type NoDataMask = Array2<bool>;

/// Substitute written in place of non-finite samples and back-filled bands.
///
/// One shared constant: the estimator only ever sees finite inputs, and every
/// pixel that received it is re-masked to NaN in the final output.
pub const NAN_SUBSTITUTE: f32 = -999.0;

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Map a (col, row) pixel position to projected (x, y) coordinates
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }
}

/// Imaging source classification, recognized from the `satellite` tag prefix.
///
/// The family determines how many canonical spectral bands the sensor delivers
/// natively and therefore how many synthetic bands must be back-filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorFamily {
    /// Sentinel-class sensors: all nine canonical spectral bands present
    Sentinel,
    /// Landsat-class sensors: five native bands, the rest back-filled
    Landsat,
}

impl SensorFamily {
    /// Classify a `satellite` tag value by prefix
    pub fn from_tag(satellite: &str) -> PipelineResult<Self> {
        if satellite.starts_with("sentinel") {
            Ok(SensorFamily::Sentinel)
        } else if satellite.starts_with("landsat") {
            Ok(SensorFamily::Landsat)
        } else {
            Err(PipelineError::Configuration(format!(
                "Satellite \"{}\" predictions not implemented yet",
                satellite
            )))
        }
    }

    /// Number of canonical spectral bands the sensor delivers natively
    pub fn native_band_count(&self) -> usize {
        match self {
            SensorFamily::Sentinel => 9,
            SensorFamily::Landsat => 5,
        }
    }
}

impl std::fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorFamily::Sentinel => write!(f, "sentinel"),
            SensorFamily::Landsat => write!(f, "landsat"),
        }
    }
}

/// Tags read from a raster's default metadata domain.
///
/// The required keys identify the sensor, the lake, and the acquisition; the
/// full raw map is retained so it can be copied onto the prediction raster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterTags {
    pub satellite: String,
    pub lake_id: i64,
    pub date: String,
    pub scale: i32,
    pub raw: HashMap<String, String>,
}

impl RasterTags {
    /// Parse the required keys out of a raw tag map
    pub fn from_map(raw: HashMap<String, String>) -> PipelineResult<Self> {
        let satellite = Self::required(&raw, "satellite")?.to_string();
        let lake_id = Self::required(&raw, "id")?
            .parse::<i64>()
            .map_err(|e| PipelineError::Configuration(format!("Invalid \"id\" tag: {}", e)))?;
        let date = Self::required(&raw, "date")?.to_string();
        let scale = Self::required(&raw, "scale")?
            .parse::<i32>()
            .map_err(|e| PipelineError::Configuration(format!("Invalid \"scale\" tag: {}", e)))?;

        Ok(Self {
            satellite,
            lake_id,
            date,
            scale,
            raw,
        })
    }

    fn required<'a>(raw: &'a HashMap<String, String>, key: &str) -> PipelineResult<&'a str> {
        raw.get(key)
            .map(|v| v.as_str())
            .ok_or_else(|| PipelineError::Configuration(format!("Missing required tag \"{}\"", key)))
    }
}

/// Immutable view of one input raster file
#[derive(Debug, Clone)]
pub struct SourceRaster {
    /// Band data, bands x rows x cols
    pub bands: BandStack,
    pub tags: RasterTags,
    pub geo_transform: GeoTransform,
    /// Coordinate reference system as WKT
    pub projection: String,
}

impl SourceRaster {
    /// Grid dimensions as (rows, cols)
    pub fn grid_shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.bands.dim();
        (rows, cols)
    }

    /// The first spectral band, before any augmentation touched it
    pub fn first_band(&self) -> Band {
        self.bands.index_axis(ndarray::Axis(0), 0).to_owned()
    }
}

/// Derived raster with the fixed target band count
#[derive(Debug, Clone)]
pub struct AugmentedRaster {
    pub bands: BandStack,
    pub geo_transform: GeoTransform,
    pub projection: String,
}

impl AugmentedRaster {
    pub fn band_count(&self) -> usize {
        self.bands.dim().0
    }
}

/// Per-lake scalar constants injected as uniform bands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LakeConstants {
    pub area_sq_km: f32,
    pub pct_developed: f32,
    pub pct_agricultural: f32,
}

/// Error taxonomy as seen by the session ledger.
///
/// Every kind is fatal to the single item that raised it, never to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Configuration,
    Lookup,
    Io,
    Inference,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Configuration => write!(f, "configuration"),
            FailureKind::Lookup => write!(f, "lookup"),
            FailureKind::Io => write!(f, "io"),
            FailureKind::Inference => write!(f, "inference"),
        }
    }
}

/// Error types for the prediction pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No constants found for lake id {0}")]
    UnknownLake(i64),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    /// Classify this error into the ledger's failure taxonomy
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Configuration(_) => FailureKind::Configuration,
            PipelineError::UnknownLake(_) => FailureKind::Lookup,
            PipelineError::Io(_)
            | PipelineError::Gdal(_)
            | PipelineError::Json(_)
            | PipelineError::Csv(_) => FailureKind::Io,
            PipelineError::Inference(_) => FailureKind::Inference,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
