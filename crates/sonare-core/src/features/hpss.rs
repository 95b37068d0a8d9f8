//! Harmonic/percussive source separation by median filtering
//!
//! Harmonic content is smooth along time, percussive content is smooth along
//! frequency. Median-filtering the magnitude spectrogram in each direction
//! gives two enhanced spectrograms; Wiener-style soft masks derived from them
//! split the complex STFT, and the inverse STFT returns two waveforms that sum
//! to (approximately) the input.

use super::stft::{istft, stft, Spectrogram};
use crate::types::{Sample, HPSS_KERNEL};

/// Harmonic and percussive waveforms, same length as the input
#[derive(Debug, Clone)]
pub struct HpssResult {
    pub harmonic: Vec<Sample>,
    pub percussive: Vec<Sample>,
}

/// Mirror an out-of-range index back into `0..n` (edge sample repeated)
fn reflect_index(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let m = i.rem_euclid(period);
    if m < n {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Median of `window` (odd length), reorders the buffer
fn median_in_place(window: &mut [Sample]) -> Sample {
    let mid = window.len() / 2;
    let (_, median, _) = window.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *median
}

/// Median filter across frames for every bin (time direction)
fn median_filter_time(magnitude: &[Vec<Sample>], kernel: usize) -> Vec<Vec<Sample>> {
    let n_frames = magnitude.len();
    let n_bins = magnitude.first().map_or(0, |f| f.len());
    let half = (kernel / 2) as isize;
    let mut out = vec![vec![0.0; n_bins]; n_frames];
    let mut window = vec![0.0; kernel];

    for bin in 0..n_bins {
        for t in 0..n_frames {
            for (w, offset) in window.iter_mut().zip(-half..=half) {
                *w = magnitude[reflect_index(t as isize + offset, n_frames)][bin];
            }
            out[t][bin] = median_in_place(&mut window);
        }
    }
    out
}

/// Median filter across bins within every frame (frequency direction)
fn median_filter_freq(magnitude: &[Vec<Sample>], kernel: usize) -> Vec<Vec<Sample>> {
    let half = (kernel / 2) as isize;
    let mut window = vec![0.0; kernel];

    magnitude
        .iter()
        .map(|frame| {
            let n_bins = frame.len();
            (0..n_bins)
                .map(|bin| {
                    for (w, offset) in window.iter_mut().zip(-half..=half) {
                        *w = frame[reflect_index(bin as isize + offset, n_bins)];
                    }
                    median_in_place(&mut window)
                })
                .collect()
        })
        .collect()
}

/// Soft mask `x^2 / (x^2 + y^2)`; zero where both inputs are zero
fn soft_mask(x: Sample, y: Sample) -> Sample {
    let z = x.max(y);
    if z < f32::MIN_POSITIVE {
        return 0.0;
    }
    let xs = (x / z).powi(2);
    let ys = (y / z).powi(2);
    xs / (xs + ys)
}

/// Split a complex spectrogram into harmonic and percussive spectrograms
pub fn decompose(spec: &Spectrogram) -> (Spectrogram, Spectrogram) {
    let magnitude = spec.magnitude();
    let harmonic_enh = median_filter_time(&magnitude, HPSS_KERNEL);
    let percussive_enh = median_filter_freq(&magnitude, HPSS_KERNEL);

    let mut harmonic_frames = Vec::with_capacity(spec.n_frames());
    let mut percussive_frames = Vec::with_capacity(spec.n_frames());

    for (t, frame) in spec.frames.iter().enumerate() {
        let mut h_frame = Vec::with_capacity(frame.len());
        let mut p_frame = Vec::with_capacity(frame.len());
        for (k, &value) in frame.iter().enumerate() {
            let h = harmonic_enh[t][k];
            let p = percussive_enh[t][k];
            h_frame.push(value * soft_mask(h, p));
            p_frame.push(value * soft_mask(p, h));
        }
        harmonic_frames.push(h_frame);
        percussive_frames.push(p_frame);
    }

    (
        Spectrogram {
            frames: harmonic_frames,
            signal_len: spec.signal_len,
        },
        Spectrogram {
            frames: percussive_frames,
            signal_len: spec.signal_len,
        },
    )
}

/// Harmonic/percussive waveforms from a precomputed STFT of the signal
pub fn hpss_from_stft(spec: &Spectrogram) -> Result<HpssResult, String> {
    let (harmonic_spec, percussive_spec) = decompose(spec);
    Ok(HpssResult {
        harmonic: istft(&harmonic_spec)?,
        percussive: istft(&percussive_spec)?,
    })
}

/// Harmonic/percussive waveforms of a mono signal
pub fn hpss(signal: &[Sample]) -> Result<HpssResult, String> {
    let spec = stft(signal)?;
    hpss_from_stft(&spec)
}
