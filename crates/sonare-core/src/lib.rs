//! Sonare Core - Genre classification pipeline shared by the CLI and services
//!
//! Leaves first:
//!
//! 1. **Feature extraction** ([`features`]): decoded audio → fixed-order
//!    58-field descriptor vector.
//! 2. **Corpus building** ([`corpus`]): labeled directory tree → append-only
//!    CSV feature table, checkpointed per batch.
//! 3. **Preprocessing** ([`preprocessing`]): standardization (+ optional PCA)
//!    fitted on the table, replayed identically at inference time.
//! 4. **Inference** ([`inference`]): recording → features → transform →
//!    classifier → genre name.

pub mod artifacts;
pub mod audio_file;
pub mod config;
pub mod corpus;
pub mod features;
pub mod inference;
pub mod model;
pub mod preprocessing;
pub mod types;

pub use types::*;
