//! Per-item orchestration and the sequential batch run loop.
//!
//! Each input moves through Augmenting -> Inferring -> Exporting; any error
//! moves it to Failed and the run continues with the next item. All
//! dependencies arrive through an explicit [`RunContext`], never through
//! ambient global state.

use crate::core::augment::CONSTANT_BAND_COUNT;
use crate::core::{BandAugmentor, Estimator, InferenceEngine};
use crate::io::{corner_coordinates, RasterStore};
use crate::session::{SessionLedger, SessionReport};
use crate::types::{
    AugmentedRaster, FailureKind, LakeConstants, PipelineError, PipelineResult, PredictionGrid,
    SourceRaster,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// External lookup of per-lake constants, keyed by lake id.
///
/// Implementations must fail with `UnknownLake` for ids absent from the
/// source; absence is a hard per-item failure, never a default.
pub trait ConstantSource: Send + Sync {
    fn constants_for(&self, lake_id: i64) -> PipelineResult<LakeConstants>;
}

impl ConstantSource for HashMap<i64, LakeConstants> {
    fn constants_for(&self, lake_id: i64) -> PipelineResult<LakeConstants> {
        self.get(&lake_id)
            .copied()
            .ok_or(PipelineError::UnknownLake(lake_id))
    }
}

/// Durable store for finished prediction records (production mode).
///
/// The pipeline publishes each record exactly once and never retries.
pub trait ResultSink: Send + Sync {
    fn publish(&self, record: &SpatialPrediction) -> PipelineResult<()>;
}

/// Structured record describing one finished prediction raster
#[derive(Debug, Clone, Serialize)]
pub struct SpatialPrediction {
    pub lake_id: i64,
    /// Basename of the prediction raster
    pub raster_image: String,
    /// Acquisition date as ISO-8601
    pub date: String,
    pub corner1_latitude: f64,
    pub corner1_longitude: f64,
    pub corner2_latitude: f64,
    pub corner2_longitude: f64,
    pub scale: i32,
    pub session_id: String,
}

/// Processing stage an item was in when its outcome was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemStage {
    Pending,
    Augmenting,
    Inferring,
    Exporting,
}

impl std::fmt::Display for ItemStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStage::Pending => write!(f, "pending"),
            ItemStage::Augmenting => write!(f, "augmenting"),
            ItemStage::Inferring => write!(f, "inferring"),
            ItemStage::Exporting => write!(f, "exporting"),
        }
    }
}

/// Output files produced for one successfully processed input
#[derive(Debug, Clone)]
pub struct ItemArtifacts {
    pub augmented_path: PathBuf,
    pub prediction_path: PathBuf,
}

/// Tagged outcome of one item; failures carry the stage and taxonomy kind
/// instead of unwinding through the run loop.
#[derive(Debug)]
pub enum ItemOutcome {
    Succeeded(ItemArtifacts),
    Failed {
        stage: ItemStage,
        kind: FailureKind,
        message: String,
    },
}

impl ItemOutcome {
    fn failed(stage: ItemStage, error: PipelineError) -> Self {
        ItemOutcome::Failed {
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Everything one run needs, constructed once at startup and threaded
/// through every call
pub struct RunContext {
    pub estimator: Box<dyn Estimator>,
    pub constants: Box<dyn ConstantSource>,
    pub sink: Option<Box<dyn ResultSink>>,
    pub augmentor: BandAugmentor,
    pub engine: InferenceEngine,
    /// Session output directories are created under this root
    pub output_root: PathBuf,
    /// Status files (success log, error list) land here
    pub status_dir: PathBuf,
    /// Dump sanitized sample matrices as CSV next to each prediction
    pub debug_artifacts: bool,
}

impl RunContext {
    pub fn new(
        estimator: Box<dyn Estimator>,
        constants: Box<dyn ConstantSource>,
        output_root: PathBuf,
        status_dir: PathBuf,
    ) -> Self {
        Self {
            estimator,
            constants,
            sink: None,
            augmentor: BandAugmentor::new(),
            engine: InferenceEngine::new(),
            output_root,
            status_dir,
            debug_artifacts: false,
        }
    }

    /// Attach a result sink (production mode)
    pub fn with_sink(mut self, sink: Box<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_debug_artifacts(mut self, debug_artifacts: bool) -> Self {
        self.debug_artifacts = debug_artifacts;
        self
    }
}

/// Derive an output filename by tagging a suffix onto the input's stem,
/// keeping the full extension chain ("lake.tif" -> "lake_modified.tif")
fn output_path(out_dir: &Path, input: &Path, suffix: &str) -> PathBuf {
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tagged = match filename.split_once('.') {
        Some((stem, rest)) => format!("{}_{}.{}", stem, suffix, rest),
        None => format!("{}_{}", filename, suffix),
    };
    out_dir.join(tagged)
}

/// Drive one input through augmentation, inference, and export.
///
/// Never panics or unwinds for control flow: every error is folded into the
/// returned outcome. Partial artifacts from a failed item stay on disk; they
/// are uniquely named per session.
pub fn process_item(
    ctx: &RunContext,
    out_dir: &Path,
    session_id: &str,
    input: &Path,
) -> ItemOutcome {
    log::debug!("Item {} -> {}", input.display(), ItemStage::Augmenting);
    let augment_result = (|| {
        let raster = RasterStore::open(input)?;
        let constants = ctx.constants.constants_for(raster.tags.lake_id)?;
        let augmented = ctx.augmentor.augment(&raster, &constants)?;

        // Durable artifact; inference consumes the in-memory copy directly
        let augmented_path = output_path(out_dir, input, "modified");
        RasterStore::write(
            &augmented_path,
            &augmented.bands,
            &augmented.geo_transform,
            &augmented.projection,
            &raster.tags.raw,
        )?;
        Ok((raster, augmented, augmented_path))
    })();
    let (raster, augmented, augmented_path): (SourceRaster, AugmentedRaster, PathBuf) =
        match augment_result {
            Ok(staged) => staged,
            Err(e) => return ItemOutcome::failed(ItemStage::Augmenting, e),
        };

    log::debug!("Item {} -> {}", input.display(), ItemStage::Inferring);
    let infer_result = (|| {
        let first_band = raster.first_band();
        let grid = ctx
            .engine
            .infer(ctx.estimator.as_ref(), &augmented, &first_band)?;
        if ctx.debug_artifacts {
            dump_debug_samples(ctx, out_dir, input, &raster, &augmented, &grid)?;
        }
        Ok(grid)
    })();
    let grid: PredictionGrid = match infer_result {
        Ok(grid) => grid,
        Err(e) => return ItemOutcome::failed(ItemStage::Inferring, e),
    };

    log::debug!("Item {} -> {}", input.display(), ItemStage::Exporting);
    let export_result = (|| {
        let prediction_path = output_path(out_dir, input, "predicted");
        RasterStore::write_single_band(
            &prediction_path,
            &grid,
            &raster.geo_transform,
            &raster.projection,
            &raster.tags.raw,
        )?;

        if let Some(sink) = &ctx.sink {
            let record = build_record(&raster, &prediction_path, session_id)?;
            sink.publish(&record)?;
        }
        Ok(prediction_path)
    })();
    match export_result {
        Ok(prediction_path) => ItemOutcome::Succeeded(ItemArtifacts {
            augmented_path,
            prediction_path,
        }),
        Err(e) => ItemOutcome::failed(ItemStage::Exporting, e),
    }
}

/// Process every input sequentially, feeding the session ledger.
///
/// One item's failure never aborts the run; the returned report accounts for
/// every input exactly once.
pub fn run_batch(ctx: &RunContext, inputs: &[PathBuf]) -> PipelineResult<SessionReport> {
    let mut ledger = SessionLedger::begin(&ctx.status_dir)?;

    let out_dir = ctx
        .output_root
        .join(format!("tif_out_{}", ledger.session_id()));
    std::fs::create_dir_all(&out_dir)?;

    log::info!("Number of files to run: {}", inputs.len());

    for (index, input) in inputs.iter().enumerate() {
        log::info!("[{}/{}] {}", index + 1, inputs.len(), input.display());

        match process_item(ctx, &out_dir, ledger.session_id(), input) {
            ItemOutcome::Succeeded(artifacts) => {
                log::info!("✅ {}", artifacts.prediction_path.display());
                if let Err(e) = ledger.record_success(input) {
                    // The append sits inside the item's accounting: a success
                    // that cannot be recorded is reported as a failed item
                    ledger.record_failure(input, e.kind(), e.to_string());
                }
            }
            ItemOutcome::Failed {
                stage,
                kind,
                message,
            } => {
                log::debug!("Item {} failed while {}", input.display(), stage);
                ledger.record_failure(input, kind, message);
            }
        }
        // Item buffers (band stacks, sample matrices) drop here, before the
        // next raster is opened
    }

    ledger.finalize()
}

/// Build the structured record the result sink persists
fn build_record(
    raster: &SourceRaster,
    prediction_path: &Path,
    session_id: &str,
) -> PipelineResult<SpatialPrediction> {
    let (rows, cols) = raster.grid_shape();
    let corners = corner_coordinates(&raster.geo_transform, &raster.projection, cols, rows)?;

    let date = NaiveDate::parse_from_str(&raster.tags.date, "%Y-%m-%d")
        .map_err(|e| PipelineError::Configuration(format!("Invalid \"date\" tag: {}", e)))?;

    Ok(SpatialPrediction {
        lake_id: raster.tags.lake_id,
        raster_image: prediction_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        date: date.format("%Y-%m-%dT00:00:00").to_string(),
        corner1_latitude: corners.corner1.0,
        corner1_longitude: corners.corner1.1,
        corner2_latitude: corners.corner2.0,
        corner2_longitude: corners.corner2.1,
        scale: raster.tags.scale,
        session_id: session_id.to_string(),
    })
}

/// Dump the sanitized sample matrix with per-sample predictions as CSV
fn dump_debug_samples(
    ctx: &RunContext,
    out_dir: &Path,
    input: &Path,
    raster: &SourceRaster,
    augmented: &AugmentedRaster,
    grid: &PredictionGrid,
) -> PipelineResult<()> {
    let mut samples = ctx.engine.sample_matrix(&augmented.bands)?;
    ctx.engine.sanitize(&mut samples);

    let mut csv_path = output_path(out_dir, input, "predicted").into_os_string();
    csv_path.push(".csv");
    let csv_path = PathBuf::from(csv_path);

    let mut writer = csv::Writer::from_path(&csv_path)?;

    let spectral_features = samples.ncols().saturating_sub(CONSTANT_BAND_COUNT);
    let mut header: Vec<String> = (1..=spectral_features).map(|i| format!("b{}", i)).collect();
    header.extend([
        "area_sq_km".to_string(),
        "pct_developed".to_string(),
        "pct_agricultural".to_string(),
    ]);
    header.extend(["lake_id".to_string(), "prediction".to_string()]);
    writer.write_record(&header)?;

    // Row-major grid order matches sample order by construction
    for (sample, prediction) in samples.rows().into_iter().zip(grid.iter()) {
        let mut record: Vec<String> = sample.iter().map(|v| v.to_string()).collect();
        record.push(raster.tags.lake_id.to_string());
        record.push(prediction.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;

    log::debug!("Sample dump saved to {}", csv_path.display());
    Ok(())
}
