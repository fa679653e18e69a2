use crate::types::{
    AugmentedRaster, Band, BandStack, NoDataMask, PipelineError, PipelineResult, PredictionGrid,
    NAN_SUBSTITUTE,
};
use ndarray::{Array1, Array2, ArrayView2, Zip};

/// Pointwise regression model over per-pixel feature vectors.
///
/// `predict` receives a (samples x features) matrix of finite values and must
/// return one scalar per sample, in sample order. Implementations are expected
/// to be deterministic and side-effect free.
pub trait Estimator: Send + Sync {
    fn predict(&self, samples: ArrayView2<f32>) -> PipelineResult<Array1<f32>>;
}

/// Summary statistics over the valid pixels of a prediction grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub std: f32,
    pub valid_pixels: usize,
}

/// Runs a pointwise estimator over every pixel of an augmented raster.
///
/// The engine owns the numeric contract with the model: the sample matrix it
/// hands over contains only finite values, and every pixel that was invalid in
/// the original imagery comes back as NaN no matter what the model produced.
pub struct InferenceEngine {
    nan_substitute: f32,
}

impl InferenceEngine {
    pub fn new() -> Self {
        Self {
            nan_substitute: NAN_SUBSTITUTE,
        }
    }

    pub fn with_substitute(nan_substitute: f32) -> Self {
        Self { nan_substitute }
    }

    /// Mark every pixel whose pre-augmentation first-band value is non-finite.
    ///
    /// Must be computed from the unmodified source band: augmentation has
    /// already replaced non-finite entries with sentinels, so the information
    /// is unrecoverable afterwards.
    pub fn no_data_mask(first_band: &Band) -> NoDataMask {
        first_band.mapv(|v| !v.is_finite())
    }

    /// Reshape (bands x rows x cols) into (rows*cols samples x bands features).
    ///
    /// Samples iterate rows outer, cols inner; the inverse reshape in `infer`
    /// relies on exactly this order to recover spatial position.
    pub fn sample_matrix(&self, bands: &BandStack) -> PipelineResult<Array2<f32>> {
        let (n_bands, n_rows, n_cols) = bands.dim();
        let n_samples = n_rows * n_cols;

        let transposed = bands.view().permuted_axes([1, 2, 0]);
        transposed
            .as_standard_layout()
            .into_owned()
            .into_shape((n_samples, n_bands))
            .map_err(|e| {
                PipelineError::Inference(format!("Failed to reshape raster into samples: {}", e))
            })
    }

    /// Replace every non-finite entry with the shared substitute.
    ///
    /// Intentionally lossy: the substitute is a stand-in, not an inferred
    /// value, and masked-out pixels discard whatever the model makes of it.
    pub fn sanitize(&self, samples: &mut Array2<f32>) {
        let substitute = self.nan_substitute;
        samples.mapv_inplace(|v| if v.is_finite() { v } else { substitute });
    }

    /// Predict a concentration value for every pixel of the augmented raster.
    ///
    /// `original_first_band` is the first band of the source raster before
    /// augmentation; its non-finite pixels define the output no-data mask.
    pub fn infer(
        &self,
        estimator: &dyn Estimator,
        augmented: &AugmentedRaster,
        original_first_band: &Band,
    ) -> PipelineResult<PredictionGrid> {
        let (n_bands, n_rows, n_cols) = augmented.bands.dim();
        let n_samples = n_rows * n_cols;

        if original_first_band.dim() != (n_rows, n_cols) {
            return Err(PipelineError::Inference(format!(
                "Mask band is {}x{} but augmented raster is {}x{}",
                original_first_band.dim().0,
                original_first_band.dim().1,
                n_rows,
                n_cols
            )));
        }

        log::debug!(
            "Running inference on {} samples x {} features",
            n_samples,
            n_bands
        );

        let mask = Self::no_data_mask(original_first_band);

        let mut samples = self.sample_matrix(&augmented.bands)?;
        self.sanitize(&mut samples);

        // One batched call for the whole grid
        let predictions = estimator.predict(samples.view())?;
        if predictions.len() != n_samples {
            return Err(PipelineError::Inference(format!(
                "Estimator returned {} predictions for {} samples",
                predictions.len(),
                n_samples
            )));
        }

        let mut grid = predictions.into_shape((n_rows, n_cols)).map_err(|e| {
            PipelineError::Inference(format!("Failed to reshape predictions: {}", e))
        })?;

        // The model's output at originally-invalid pixels is never trusted,
        // even when it looks plausible.
        Zip::from(&mut grid).and(&mask).for_each(|value, &masked| {
            if masked {
                *value = f32::NAN;
            }
        });

        if let Some(stats) = Self::prediction_stats(&grid) {
            log::info!(
                "Predictions: min {:.3}, max {:.3}, mean {:.3}, std {:.3} over {} valid pixels",
                stats.min,
                stats.max,
                stats.mean,
                stats.std,
                stats.valid_pixels
            );
        } else {
            log::warn!("Prediction grid contains no valid pixels");
        }

        Ok(grid)
    }

    /// Summary statistics over finite prediction values, NaN-aware
    pub fn prediction_stats(grid: &PredictionGrid) -> Option<PredictionStats> {
        let values: Vec<f32> = grid.iter().cloned().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return None;
        }

        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        for &v in &values {
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
        }
        let mean = sum / values.len() as f64;
        let variance = values
            .iter()
            .map(|&v| (v as f64 - mean) * (v as f64 - mean))
            .sum::<f64>()
            / values.len() as f64;

        Some(PredictionStats {
            min,
            max,
            mean: mean as f32,
            std: variance.sqrt() as f32,
            valid_pixels: values.len(),
        })
    }
}

impl Default for InferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FailureKind, GeoTransform};
    use approx::assert_relative_eq;
    use ndarray::{Array2, Array3, Axis};

    /// Returns the mean of each sample's features
    struct MeanEstimator;

    impl Estimator for MeanEstimator {
        fn predict(&self, samples: ArrayView2<f32>) -> PipelineResult<Array1<f32>> {
            assert!(
                samples.iter().all(|v| v.is_finite()),
                "estimator received non-finite input"
            );
            Ok(samples.map_axis(Axis(1), |row| row.sum() / row.len() as f32))
        }
    }

    /// Always predicts the same finite value, even for garbage samples
    struct ConstantEstimator(f32);

    impl Estimator for ConstantEstimator {
        fn predict(&self, samples: ArrayView2<f32>) -> PipelineResult<Array1<f32>> {
            Ok(Array1::from_elem(samples.nrows(), self.0))
        }
    }

    /// Returns one prediction fewer than asked for
    struct ShortEstimator;

    impl Estimator for ShortEstimator {
        fn predict(&self, samples: ArrayView2<f32>) -> PipelineResult<Array1<f32>> {
            Ok(Array1::zeros(samples.nrows().saturating_sub(1)))
        }
    }

    fn augmented(bands: Array3<f32>) -> AugmentedRaster {
        AugmentedRaster {
            bands,
            geo_transform: GeoTransform::from_gdal([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]),
            projection: String::new(),
        }
    }

    #[test]
    fn test_sample_matrix_row_major_order() {
        // 2 bands of 2x3: band 0 counts pixels row-major, band 1 is its negative
        let mut bands = Array3::<f32>::zeros((2, 2, 3));
        for r in 0..2 {
            for c in 0..3 {
                bands[[0, r, c]] = (r * 3 + c) as f32;
                bands[[1, r, c]] = -((r * 3 + c) as f32);
            }
        }

        let engine = InferenceEngine::new();
        let matrix = engine.sample_matrix(&bands).unwrap();

        assert_eq!(matrix.dim(), (6, 2));
        for sample in 0..6 {
            assert_eq!(matrix[[sample, 0]], sample as f32);
            assert_eq!(matrix[[sample, 1]], -(sample as f32));
        }
    }

    #[test]
    fn test_reshape_round_trip_recovers_grid() {
        // Band 0 holds a unique value per pixel; an estimator that echoes
        // feature 0 must reproduce the band exactly.
        struct EchoFirstFeature;
        impl Estimator for EchoFirstFeature {
            fn predict(&self, samples: ArrayView2<f32>) -> PipelineResult<Array1<f32>> {
                Ok(samples.column(0).to_owned())
            }
        }

        let mut bands = Array3::<f32>::zeros((3, 4, 5));
        for r in 0..4 {
            for c in 0..5 {
                bands[[0, r, c]] = (r * 100 + c) as f32;
            }
        }
        let raster = augmented(bands.clone());
        let first = bands.index_axis(Axis(0), 0).to_owned();

        let grid = InferenceEngine::new()
            .infer(&EchoFirstFeature, &raster, &first)
            .unwrap();

        assert_eq!(grid.dim(), (4, 5));
        for r in 0..4 {
            for c in 0..5 {
                assert_eq!(grid[[r, c]], (r * 100 + c) as f32);
            }
        }
    }

    #[test]
    fn test_sanitize_guarantees_finite_input() {
        let mut bands = Array3::<f32>::from_elem((2, 3, 3), 1.0);
        bands[[0, 1, 1]] = f32::NAN;
        bands[[1, 0, 2]] = f32::INFINITY;
        bands[[1, 2, 0]] = f32::NEG_INFINITY;
        let raster = augmented(bands.clone());
        let first = bands.index_axis(Axis(0), 0).to_owned();

        // MeanEstimator asserts every sample is finite
        let grid = InferenceEngine::new()
            .infer(&MeanEstimator, &raster, &first)
            .unwrap();
        assert_eq!(grid.dim(), (3, 3));
    }

    #[test]
    fn test_mask_overrides_estimator_output() {
        let mut bands = Array3::<f32>::from_elem((2, 3, 3), 1.0);
        bands[[0, 1, 2]] = f32::NAN;
        let raster = augmented(bands.clone());
        let first = bands.index_axis(Axis(0), 0).to_owned();

        // Adversarial case: estimator yields a plausible finite value everywhere
        let grid = InferenceEngine::new()
            .infer(&ConstantEstimator(42.0), &raster, &first)
            .unwrap();

        assert!(grid[[1, 2]].is_nan());
        for r in 0..3 {
            for c in 0..3 {
                if (r, c) != (1, 2) {
                    assert_eq!(grid[[r, c]], 42.0);
                }
            }
        }
    }

    #[test]
    fn test_mask_from_original_band_not_augmented() {
        // Augmented band 0 is fully finite (sentinel already substituted), but
        // the original first band still knows which pixel was invalid.
        let bands = Array3::<f32>::from_elem((2, 2, 2), NAN_SUBSTITUTE);
        let raster = augmented(bands);
        let mut first = Array2::<f32>::from_elem((2, 2), 1.0);
        first[[0, 1]] = f32::INFINITY;

        let grid = InferenceEngine::new()
            .infer(&ConstantEstimator(5.0), &raster, &first)
            .unwrap();

        assert!(grid[[0, 1]].is_nan());
        assert_eq!(grid[[0, 0]], 5.0);
    }

    #[test]
    fn test_inference_is_idempotent() {
        let mut bands = Array3::<f32>::from_elem((3, 4, 4), 2.0);
        bands[[0, 2, 2]] = f32::NAN;
        bands[[1, 0, 0]] = 7.5;
        let raster = augmented(bands.clone());
        let first = bands.index_axis(Axis(0), 0).to_owned();

        let engine = InferenceEngine::new();
        let first_run = engine.infer(&MeanEstimator, &raster, &first).unwrap();
        let second_run = engine.infer(&MeanEstimator, &raster, &first).unwrap();

        for (a, b) in first_run.iter().zip(second_run.iter()) {
            assert!((a.is_nan() && b.is_nan()) || a == b);
        }
    }

    #[test]
    fn test_estimator_length_mismatch_fails() {
        let bands = Array3::<f32>::from_elem((2, 2, 2), 1.0);
        let raster = augmented(bands.clone());
        let first = bands.index_axis(Axis(0), 0).to_owned();

        let err = InferenceEngine::new()
            .infer(&ShortEstimator, &raster, &first)
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Inference);
    }

    #[test]
    fn test_mask_band_shape_mismatch_fails() {
        let bands = Array3::<f32>::from_elem((2, 2, 2), 1.0);
        let raster = augmented(bands);
        let first = Array2::<f32>::zeros((3, 3));

        let err = InferenceEngine::new()
            .infer(&ConstantEstimator(1.0), &raster, &first)
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Inference);
    }

    #[test]
    fn test_prediction_stats_ignore_nan() {
        let mut grid = Array2::<f32>::zeros((2, 2));
        grid[[0, 0]] = 10.0;
        grid[[0, 1]] = 20.0;
        grid[[1, 0]] = f32::NAN;
        grid[[1, 1]] = 30.0;

        let stats = InferenceEngine::prediction_stats(&grid).unwrap();
        assert_eq!(stats.valid_pixels, 3);
        assert_relative_eq!(stats.min, 10.0);
        assert_relative_eq!(stats.max, 30.0);
        assert_relative_eq!(stats.mean, 20.0);
        assert_relative_eq!(stats.std, 8.164966, epsilon = 1e-4);
    }

    #[test]
    fn test_prediction_stats_all_masked() {
        let grid = Array2::<f32>::from_elem((2, 2), f32::NAN);
        assert!(InferenceEngine::prediction_stats(&grid).is_none());
    }
}
