use crate::types::{
    AugmentedRaster, LakeConstants, PipelineError, PipelineResult, SensorFamily, SourceRaster,
    NAN_SUBSTITUTE,
};
use ndarray::{Array3, Axis};

/// Number of constant-valued bands appended after the spectral bands
pub const CONSTANT_BAND_COUNT: usize = 3;

/// Band augmentation parameters
#[derive(Debug, Clone)]
pub struct AugmentParams {
    /// Canonical spectral band count every sensor is normalized to
    pub canonical_band_count: usize,
    /// Value written into back-filled band slots
    pub fill_value: f32,
}

impl Default for AugmentParams {
    fn default() -> Self {
        Self {
            canonical_band_count: 9,
            fill_value: NAN_SUBSTITUTE,
        }
    }
}

/// Normalizes heterogeneous sensor rasters to the model's fixed input shape.
///
/// Native bands are copied unchanged into the leading slots, missing sensor
/// bands are back-filled with the shared sentinel, and the three lake
/// constants are appended as uniform bands.
pub struct BandAugmentor {
    params: AugmentParams,
}

impl BandAugmentor {
    /// Create an augmentor with the reference 12-band target shape
    pub fn new() -> Self {
        Self {
            params: AugmentParams::default(),
        }
    }

    /// Create an augmentor with custom parameters
    pub fn with_params(params: AugmentParams) -> Self {
        Self { params }
    }

    /// Total band count of every augmented raster
    pub fn target_band_count(&self) -> usize {
        self.params.canonical_band_count + CONSTANT_BAND_COUNT
    }

    /// Augment a source raster to the fixed target band count
    pub fn augment(
        &self,
        raster: &SourceRaster,
        constants: &LakeConstants,
    ) -> PipelineResult<AugmentedRaster> {
        let family = SensorFamily::from_tag(&raster.tags.satellite)?;
        let (native_bands, rows, cols) = raster.bands.dim();

        if native_bands != family.native_band_count() {
            return Err(PipelineError::Configuration(format!(
                "{} raster carries {} bands, expected {}",
                family,
                native_bands,
                family.native_band_count()
            )));
        }

        // Back-fill count is a per-family property, not a fixed literal:
        // canonical sensors fill zero slots, reduced sensors fill the gap.
        let bands_to_fill = self
            .params
            .canonical_band_count
            .checked_sub(family.native_band_count())
            .ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "Canonical band count {} is below the {} native band count",
                    self.params.canonical_band_count, family
                ))
            })?;

        log::debug!(
            "Augmenting {} raster ({}x{}): {} native + {} back-filled + {} constant bands",
            family,
            rows,
            cols,
            native_bands,
            bands_to_fill,
            CONSTANT_BAND_COUNT
        );

        let mut bands = Array3::<f32>::zeros((self.target_band_count(), rows, cols));

        for i in 0..native_bands {
            bands
                .index_axis_mut(Axis(0), i)
                .assign(&raster.bands.index_axis(Axis(0), i));
        }

        for i in native_bands..native_bands + bands_to_fill {
            bands.index_axis_mut(Axis(0), i).fill(self.params.fill_value);
        }

        let constant_values = [
            constants.area_sq_km,
            constants.pct_developed,
            constants.pct_agricultural,
        ];
        for (offset, value) in constant_values.iter().enumerate() {
            bands
                .index_axis_mut(Axis(0), self.params.canonical_band_count + offset)
                .fill(*value);
        }

        Ok(AugmentedRaster {
            bands,
            geo_transform: raster.geo_transform,
            projection: raster.projection.clone(),
        })
    }
}

impl Default for BandAugmentor {
    fn default() -> Self {
        Self::new()
    }
}
