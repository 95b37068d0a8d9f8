//! Signal descriptor extraction
//!
//! Turns a decoded [`Recording`](crate::audio_file::Recording) into a
//! [`FeatureVector`] with the fixed field order of [`FEATURE_FIELDS`]:
//! chroma, energy, spectral shape, zero-crossing rate, harmonic/percussive
//! waveform statistics, a global tempo and 20 MFCC bands.
//!
//! All analysis parameters are compile-time constants in [`crate::types`],
//! so a vector computed at training time and one computed at serving time
//! for the same audio are bit-identical.

mod error;
mod extraction;
pub mod hpss;
mod schema;
pub mod spectral;
pub mod stats;
pub mod stft;
pub mod tempo;

pub use error::ExtractionError;
pub use extraction::{extract_features, extract_file};
pub use schema::{
    table_header, FeatureVector, DURATION_FIELD, FEATURE_FIELDS, FEATURE_WIDTH, IDENTITY_FIELD,
    LABEL_FIELD,
};
