//! Onset strength envelope and global tempo estimation
//!
//! The onset envelope is the band-averaged positive spectral flux of the
//! log-mel spectrogram. Tempo is the autocorrelation lag of that envelope
//! that maximizes `log1p(1e6 * ac) + log-normal prior(120 BPM)`; the prior
//! alone decides for silent input, so the estimate is always finite.

use crate::types::{HOP_LENGTH, MAX_TEMPO, N_FFT, START_BPM, TEMPO_AC_SECONDS};

/// Frames of delay introduced by centering and the flux lag
const ONSET_PAD: usize = 1 + N_FFT / (2 * HOP_LENGTH);

/// Onset strength per STFT frame from a log-mel spectrogram (`[frame][band]`)
pub fn onset_strength(log_mel: &[Vec<f64>]) -> Vec<f64> {
    let n_frames = log_mel.len();
    let mut envelope = vec![0.0f64; n_frames];

    for (i, slot) in envelope.iter_mut().enumerate().skip(ONSET_PAD) {
        let t = i - ONSET_PAD + 1;
        if t >= n_frames {
            break;
        }
        let (prev, cur) = (&log_mel[t - 1], &log_mel[t]);
        let n_bands = cur.len().max(1);
        *slot = cur
            .iter()
            .zip(prev.iter())
            .map(|(&c, &p)| (c - p).max(0.0))
            .sum::<f64>()
            / n_bands as f64;
    }

    envelope
}

/// Autocorrelation of the envelope for lags `0..max_lag`, scaled so lag 0 is 1
fn autocorrelation(envelope: &[f64], max_lag: usize) -> Vec<f64> {
    let n = envelope.len();
    let mut ac: Vec<f64> = (0..max_lag)
        .map(|lag| {
            if lag >= n {
                return 0.0;
            }
            envelope[..n - lag]
                .iter()
                .zip(envelope[lag..].iter())
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect();

    let zero_lag = ac.first().copied().unwrap_or(0.0);
    if zero_lag > 0.0 {
        for value in ac.iter_mut() {
            *value /= zero_lag;
        }
    }
    ac
}

/// Estimate a single global tempo (BPM) from an onset envelope
pub fn estimate_tempo(envelope: &[f64], sample_rate: u32) -> f64 {
    let frame_rate = sample_rate as f64 / HOP_LENGTH as f64;
    let window = ((TEMPO_AC_SECONDS * frame_rate).round() as usize).max(2);
    let ac = autocorrelation(envelope, window);

    let mut best: Option<(f64, f64)> = None;
    for (lag, &value) in ac.iter().enumerate().skip(1) {
        let bpm = 60.0 * frame_rate / lag as f64;
        if bpm > MAX_TEMPO {
            continue;
        }
        let log_prior = -0.5 * (bpm.log2() - START_BPM.log2()).powi(2);
        let score = (1e6 * value.max(0.0)).ln_1p() + log_prior;
        match best {
            Some((best_score, _)) if score <= best_score => {}
            _ => best = Some((score, bpm)),
        }
    }

    best.map(|(_, bpm)| bpm).unwrap_or(START_BPM)
}
