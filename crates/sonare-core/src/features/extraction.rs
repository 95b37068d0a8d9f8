//! Descriptor extraction: one recording in, one fixed-schema vector out

use std::path::Path;

use super::error::ExtractionError;
use super::hpss::hpss_from_stft;
use super::schema::{FeatureVector, FEATURE_FIELDS, FEATURE_WIDTH};
use super::spectral::{
    apply_filterbank, chroma, chroma_filterbank, mel_filterbank, mfcc_from_log_mel, power_to_db,
    rms, spectral_bandwidth, spectral_centroid, spectral_rolloff, zero_crossing_rate,
};
use super::stats::{band_mean_var, matrix_mean_var, mean_var};
use super::stft::{fft_frequencies, frames_edge_padded, frames_zero_padded, stft};
use super::tempo::{estimate_tempo, onset_strength};
use crate::audio_file::{decode_recording, Recording};
use crate::types::N_MFCC;

/// Compute the full descriptor vector of a decoded recording.
///
/// A single STFT is shared by the spectral descriptors, the mel/MFCC path
/// and the harmonic/percussive split. The result is a pure function of the
/// samples and sample rate.
pub fn extract_features(recording: &Recording) -> Result<FeatureVector, ExtractionError> {
    let source_id = recording.source.as_str();

    if recording.samples.is_empty() {
        return Err(ExtractionError::EmptyAudio {
            source_id: source_id.to_string(),
        });
    }
    if recording.sample_rate == 0 {
        return Err(ExtractionError::analysis(source_id, "sample rate is zero"));
    }

    let sr = recording.sample_rate;
    let signal = recording.samples.as_slice();

    let spectrogram = stft(signal).map_err(|e| ExtractionError::analysis(source_id, e))?;
    let magnitude = spectrogram.magnitude();
    let power = spectrogram.power();
    let freqs = fft_frequencies(sr);

    // Spectral shape
    let chroma_frames = chroma(&power, &chroma_filterbank(sr));
    let centroid = spectral_centroid(&magnitude, &freqs);
    let bandwidth = spectral_bandwidth(&magnitude, &freqs, &centroid);
    let rolloff = spectral_rolloff(&magnitude, &freqs);

    // Time domain
    let rms_frames = rms(&frames_zero_padded(signal));
    let zcr_frames = zero_crossing_rate(&frames_edge_padded(signal));

    // Harmonic / percussive waveforms
    let separated =
        hpss_from_stft(&spectrogram).map_err(|e| ExtractionError::analysis(source_id, e))?;

    // Mel path: MFCC and onset envelope share the log-mel spectrogram
    let log_mel = power_to_db(&apply_filterbank(&power, &mel_filterbank(sr)));
    let tempo = estimate_tempo(&onset_strength(&log_mel), sr);
    let mfcc = mfcc_from_log_mel(&log_mel);

    let mut values = Vec::with_capacity(FEATURE_WIDTH);
    values.push(recording.duration_secs());

    let (m, v) = matrix_mean_var(&chroma_frames);
    values.extend([m, v]);
    for series in [&rms_frames, &centroid, &bandwidth, &rolloff, &zcr_frames] {
        let (m, v) = mean_var(series.iter().copied());
        values.extend([m, v]);
    }
    for waveform in [&separated.harmonic, &separated.percussive] {
        let (m, v) = mean_var(waveform.iter().map(|&s| s as f64));
        values.extend([m, v]);
    }
    values.push(tempo);
    for (m, v) in band_mean_var(&mfcc, N_MFCC) {
        values.extend([m, v]);
    }

    if values.len() != FEATURE_WIDTH {
        return Err(ExtractionError::analysis(
            source_id,
            format!("produced {} values, schema has {}", values.len(), FEATURE_WIDTH),
        ));
    }
    if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
        return Err(ExtractionError::analysis(
            source_id,
            format!("non-finite value for {}", FEATURE_FIELDS[idx]),
        ));
    }

    log::trace!(
        "extract_features: {} ({} frames, tempo {:.1} BPM)",
        source_id,
        spectrogram.n_frames(),
        tempo
    );

    Ok(FeatureVector {
        source: source_id.to_string(),
        values,
    })
}

/// Decode and analyze one audio file; the vector's source is the path string
pub fn extract_file(path: &Path) -> Result<FeatureVector, ExtractionError> {
    let recording = decode_recording(path)?;
    extract_features(&recording)
}
