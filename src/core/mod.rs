//! Core processing modules: band augmentation and pixelwise inference

pub mod augment;
pub mod inference;

// Re-export main types
pub use augment::{AugmentParams, BandAugmentor, CONSTANT_BAND_COUNT};
pub use inference::{Estimator, InferenceEngine, PredictionStats};
