//! Bloomcast: per-lake chlorophyll-a surface mapping from satellite rasters
//!
//! This library turns multi-sensor satellite imagery of lakes into
//! georeferenced concentration maps: each input raster is normalized to a
//! fixed 12-band feature shape (native spectral bands, sentinel back-fill for
//! reduced sensors, three per-lake constant bands), a pretrained pointwise
//! regression model is run over every pixel, and the output raster restores
//! the original no-data mask so synthetic fill values never leak into the
//! visible product.

pub mod core;
pub mod io;
pub mod pipeline;
pub mod session;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    AugmentedRaster, Band, BandStack, FailureKind, GeoTransform, LakeConstants, NoDataMask,
    PipelineError, PipelineResult, PredictionGrid, RasterTags, SensorFamily, SourceRaster,
    NAN_SUBSTITUTE,
};

pub use crate::core::{AugmentParams, BandAugmentor, Estimator, InferenceEngine, PredictionStats};
pub use io::{corner_coordinates, CornerCoordinates, RasterStore};
pub use pipeline::{
    process_item, run_batch, ConstantSource, ItemArtifacts, ItemOutcome, ItemStage, ResultSink,
    RunContext, SpatialPrediction,
};
pub use session::{FailedItem, SessionLedger, SessionReport};
