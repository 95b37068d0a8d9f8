//! Common types and analysis constants for Sonare
//!
//! The analysis constants are deliberately not part of [`crate::config`]:
//! features computed at training time and at inference time must come from
//! identical frame parameters, and a feature table carries no record of them.

/// Audio sample type used for decoded waveforms and spectral processing
pub type Sample = f32;

/// FFT size for every frame-based analysis
pub const N_FFT: usize = 2048;

/// Hop between successive analysis frames (in samples)
pub const HOP_LENGTH: usize = 512;

/// Mel bands used for MFCC and onset strength
pub const N_MELS: usize = 128;

/// Number of cepstral coefficients summarized per recording
pub const N_MFCC: usize = 20;

/// Pitch classes in the chroma representation
pub const N_CHROMA: usize = 12;

/// Spectral energy fraction that defines the roll-off frequency
pub const ROLL_PERCENT: f64 = 0.85;

/// Median filter length (frames / bins) for harmonic-percussive separation
pub const HPSS_KERNEL: usize = 31;

/// Dynamic range floor below the peak when converting power to decibels
pub const TOP_DB: f64 = 80.0;

/// Smallest power value before taking a logarithm
pub const AMIN: f64 = 1e-10;

/// Tempo prior center (BPM) for the tempo estimator
pub const START_BPM: f64 = 120.0;

/// Upper bound for tempo candidates (BPM)
pub const MAX_TEMPO: f64 = 320.0;

/// Autocorrelation window for tempo estimation (seconds)
pub const TEMPO_AC_SECONDS: f64 = 8.0;

/// Audio container extensions accepted when no configuration overrides them
pub const DEFAULT_AUDIO_EXTENSIONS: &[&str] = &["wav"];

/// Check whether a path has one of the given extensions (case-insensitive)
pub fn has_audio_extension<S: AsRef<str>>(path: &std::path::Path, extensions: &[S]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            extensions
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed.as_ref()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_has_audio_extension_case_insensitive() {
        assert!(has_audio_extension(Path::new("a/blues.00001.wav"), DEFAULT_AUDIO_EXTENSIONS));
        assert!(has_audio_extension(Path::new("a/blues.00001.WAV"), DEFAULT_AUDIO_EXTENSIONS));
        assert!(!has_audio_extension(Path::new("a/blues.00001.mp3"), DEFAULT_AUDIO_EXTENSIONS));
        assert!(!has_audio_extension(Path::new("a/README"), DEFAULT_AUDIO_EXTENSIONS));
    }

    #[test]
    fn test_has_audio_extension_custom_list() {
        let exts = vec!["flac".to_string(), "ogg".to_string()];
        assert!(has_audio_extension(Path::new("x.flac"), &exts));
        assert!(!has_audio_extension(Path::new("x.wav"), &exts));
    }
}
