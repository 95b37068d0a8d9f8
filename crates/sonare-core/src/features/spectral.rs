//! Frame-wise spectral and temporal descriptors
//!
//! Every function here returns one value (or one band stack) per STFT frame.
//! Silent frames produce zeros rather than NaN: normalizations are skipped
//! when the frame carries no energy.

use crate::types::{Sample, AMIN, N_CHROMA, N_FFT, N_MELS, N_MFCC, ROLL_PERCENT, TOP_DB};

/// Frame energy below which a frame is treated as silent
const SILENCE_FLOOR: f64 = 1e-20;

/// Slaney mel scale: linear below 1 kHz, logarithmic above
fn hz_to_mel(hz: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
    let logstep = (6.4f64).ln() / 27.0;

    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / logstep
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    const F_SP: f64 = 200.0 / 3.0;
    const MIN_LOG_HZ: f64 = 1000.0;
    const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
    let logstep = (6.4f64).ln() / 27.0;

    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (logstep * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Area-normalized triangular mel filterbank, `N_MELS` rows of `N_FFT/2+1` weights
pub fn mel_filterbank(sample_rate: u32) -> Vec<Vec<f64>> {
    let n_bins = N_FFT / 2 + 1;
    let f_max = sample_rate as f64 / 2.0;
    let fft_freqs = super::stft::fft_frequencies(sample_rate);

    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(f_max);
    let n_points = N_MELS + 2;
    let hz_points: Vec<f64> = (0..n_points)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_points - 1) as f64))
        .collect();

    let mut filterbank = Vec::with_capacity(N_MELS);
    for band in 0..N_MELS {
        let left = hz_points[band];
        let center = hz_points[band + 1];
        let right = hz_points[band + 2];
        let enorm = 2.0 / (right - left);

        let filter: Vec<f64> = (0..n_bins)
            .map(|bin| {
                let f = fft_freqs[bin];
                let lower = (f - left) / (center - left);
                let upper = (right - f) / (right - center);
                lower.min(upper).max(0.0) * enorm
            })
            .collect();
        filterbank.push(filter);
    }

    filterbank
}

/// Apply a filterbank to power frames: `out[t][band]`
pub fn apply_filterbank(power: &[Vec<Sample>], filterbank: &[Vec<f64>]) -> Vec<Vec<f64>> {
    power
        .iter()
        .map(|frame| {
            filterbank
                .iter()
                .map(|filter| {
                    filter
                        .iter()
                        .zip(frame.iter())
                        .map(|(&w, &p)| w * p as f64)
                        .sum()
                })
                .collect()
        })
        .collect()
}

/// Convert power to decibels with an `TOP_DB` floor below the global peak
pub fn power_to_db(power: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut db: Vec<Vec<f64>> = power
        .iter()
        .map(|frame| frame.iter().map(|&p| 10.0 * p.max(AMIN).log10()).collect())
        .collect();

    let peak = db
        .iter()
        .flat_map(|frame| frame.iter().copied())
        .fold(f64::NEG_INFINITY, f64::max);
    if peak.is_finite() {
        let floor = peak - TOP_DB;
        for value in db.iter_mut().flat_map(|frame| frame.iter_mut()) {
            *value = value.max(floor);
        }
    }
    db
}

/// Orthonormal DCT-II of one frame, first `n_out` coefficients
fn dct_ortho(input: &[f64], n_out: usize) -> Vec<f64> {
    let n = input.len() as f64;
    (0..n_out)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| {
                    x * (std::f64::consts::PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos()
                })
                .sum();
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            sum * scale
        })
        .collect()
}

/// MFCCs from a log-mel spectrogram: `out[t][coefficient]`
pub fn mfcc_from_log_mel(log_mel: &[Vec<f64>]) -> Vec<Vec<f64>> {
    log_mel.iter().map(|frame| dct_ortho(frame, N_MFCC)).collect()
}

/// Pitch-class filterbank: `N_CHROMA` rows of `N_FFT/2+1` weights.
///
/// Each FFT bin spreads its energy over the two nearest pitch classes
/// (triangular in semitones) and is weighted by a Gaussian over octaves
/// centered on A5 so sub-bass and air frequencies contribute little.
pub fn chroma_filterbank(sample_rate: u32) -> Vec<Vec<f64>> {
    const CENTER_OCTAVE: f64 = 5.0;
    const OCTAVE_WIDTH: f64 = 2.0;
    const A0_HZ: f64 = 27.5;

    let fft_freqs = super::stft::fft_frequencies(sample_rate);
    let mut filterbank = vec![vec![0.0f64; fft_freqs.len()]; N_CHROMA];

    // Bin 0 (DC) has no pitch
    for (bin, &freq) in fft_freqs.iter().enumerate().skip(1) {
        let midi = 69.0 + 12.0 * (freq / 440.0).log2();
        let pitch_class = midi.rem_euclid(N_CHROMA as f64);
        let octave = (freq / A0_HZ).log2();
        let octave_weight = (-0.5 * ((octave - CENTER_OCTAVE) / OCTAVE_WIDTH).powi(2)).exp();

        for (chroma, row) in filterbank.iter_mut().enumerate() {
            let mut distance = (pitch_class - chroma as f64).abs();
            if distance > N_CHROMA as f64 / 2.0 {
                distance = N_CHROMA as f64 - distance;
            }
            let weight = (1.0 - distance).max(0.0);
            row[bin] = weight * octave_weight;
        }
    }

    filterbank
}

/// Chroma energy per frame, each frame scaled so its strongest class is 1.0
pub fn chroma(power: &[Vec<Sample>], filterbank: &[Vec<f64>]) -> Vec<Vec<f64>> {
    apply_filterbank(power, filterbank)
        .into_iter()
        .map(|mut frame| {
            let peak = frame.iter().copied().fold(0.0f64, f64::max);
            if peak > SILENCE_FLOOR {
                for value in frame.iter_mut() {
                    *value /= peak;
                }
            } else {
                frame.iter_mut().for_each(|v| *v = 0.0);
            }
            frame
        })
        .collect()
}

/// Magnitude-weighted mean frequency per frame
pub fn spectral_centroid(magnitude: &[Vec<Sample>], freqs: &[f64]) -> Vec<f64> {
    magnitude
        .iter()
        .map(|frame| {
            let total: f64 = frame.iter().map(|&m| m as f64).sum();
            if total <= SILENCE_FLOOR {
                return 0.0;
            }
            frame
                .iter()
                .zip(freqs.iter())
                .map(|(&m, &f)| m as f64 * f)
                .sum::<f64>()
                / total
        })
        .collect()
}

/// Second-order spectral spread around the centroid per frame
pub fn spectral_bandwidth(magnitude: &[Vec<Sample>], freqs: &[f64], centroid: &[f64]) -> Vec<f64> {
    magnitude
        .iter()
        .zip(centroid.iter())
        .map(|(frame, &c)| {
            let total: f64 = frame.iter().map(|&m| m as f64).sum();
            if total <= SILENCE_FLOOR {
                return 0.0;
            }
            let spread: f64 = frame
                .iter()
                .zip(freqs.iter())
                .map(|(&m, &f)| (m as f64 / total) * (f - c).powi(2))
                .sum();
            spread.sqrt()
        })
        .collect()
}

/// Lowest frequency below which `ROLL_PERCENT` of the frame's magnitude lies
pub fn spectral_rolloff(magnitude: &[Vec<Sample>], freqs: &[f64]) -> Vec<f64> {
    magnitude
        .iter()
        .map(|frame| {
            let total: f64 = frame.iter().map(|&m| m as f64).sum();
            let threshold = ROLL_PERCENT * total;
            let mut cumulative = 0.0f64;
            for (&m, &f) in frame.iter().zip(freqs.iter()) {
                cumulative += m as f64;
                if cumulative >= threshold {
                    return f;
                }
            }
            freqs.last().copied().unwrap_or(0.0)
        })
        .collect()
}

/// Root-mean-square energy of each time-domain frame
pub fn rms(frames: &[Vec<Sample>]) -> Vec<f64> {
    frames
        .iter()
        .map(|frame| {
            let sum_sq: f64 = frame.iter().map(|&x| (x as f64) * (x as f64)).sum();
            (sum_sq / frame.len().max(1) as f64).sqrt()
        })
        .collect()
}

/// Fraction of adjacent sample pairs that change sign, per frame.
///
/// Values with magnitude below 1e-10 count as zero and zero counts as
/// positive, so digital silence has no crossings.
pub fn zero_crossing_rate(frames: &[Vec<Sample>]) -> Vec<f64> {
    const THRESHOLD: f32 = 1e-10;
    frames
        .iter()
        .map(|frame| {
            let negative = |x: f32| x < 0.0 && x.abs() > THRESHOLD;
            let crossings = frame
                .windows(2)
                .filter(|pair| negative(pair[0]) != negative(pair[1]))
                .count();
            crossings as f64 / frame.len().max(1) as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::stft::{fft_frequencies, stft};

    fn sine(freq: f32, sr: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_mel_hz_roundtrip() {
        for hz in [0.0, 440.0, 1000.0, 4000.0, 11025.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((back - hz).abs() < 1e-6, "Roundtrip: {} -> {}", hz, back);
        }
    }

    #[test]
    fn test_mel_filterbank_shape_and_nonnegative() {
        let fb = mel_filterbank(22050);
        assert_eq!(fb.len(), N_MELS);
        assert!(fb.iter().all(|row| row.len() == N_FFT / 2 + 1));
        assert!(fb.iter().flatten().all(|&w| w >= 0.0 && w.is_finite()));
        assert!(fb.iter().all(|row| row.iter().any(|&w| w > 0.0)), "empty mel band");
    }

    #[test]
    fn test_dct_of_constant_only_has_dc() {
        let coeffs = dct_ortho(&[2.0; 16], 5);
        assert!((coeffs[0] - 2.0 * 4.0).abs() < 1e-9);
        assert!(coeffs[1..].iter().all(|c| c.abs() < 1e-9));
    }

    #[test]
    fn test_power_to_db_floors_silence_without_nan() {
        let db = power_to_db(&[vec![0.0; 4], vec![0.0; 4]]);
        assert!(db.iter().flatten().all(|v| v.is_finite()));
        assert!(db.iter().flatten().all(|&v| (v + 100.0).abs() < 1e-9));
    }

    #[test]
    fn test_centroid_tracks_tone() {
        let sr = 22050;
        let spec = stft(&sine(2000.0, sr, 22050)).unwrap();
        let freqs = fft_frequencies(sr);
        let centroid = spectral_centroid(&spec.magnitude(), &freqs);
        let mid = centroid[centroid.len() / 2];
        assert!((mid - 2000.0).abs() < 100.0, "centroid {}", mid);
    }

    #[test]
    fn test_silent_frames_are_zero() {
        let spec = stft(&vec![0.0f32; 4096]).unwrap();
        let mag = spec.magnitude();
        let freqs = fft_frequencies(22050);
        let centroid = spectral_centroid(&mag, &freqs);
        assert!(centroid.iter().all(|&c| c == 0.0));
        assert!(spectral_bandwidth(&mag, &freqs, &centroid).iter().all(|&b| b == 0.0));
        assert!(spectral_rolloff(&mag, &freqs).iter().all(|&r| r == 0.0));
        let chroma = chroma(&spec.power(), &chroma_filterbank(22050));
        assert!(chroma.iter().flatten().all(|&c| c == 0.0));
    }

    #[test]
    fn test_chroma_a440_peaks_at_pitch_class_a() {
        let sr = 22050;
        let spec = stft(&sine(440.0, sr, 22050)).unwrap();
        let chroma = chroma(&spec.power(), &chroma_filterbank(sr));
        let mid = &chroma[chroma.len() / 2];
        let peak = mid
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 9, "A is pitch class 9 with C = 0");
    }

    #[test]
    fn test_zero_crossing_rate() {
        let alternating: Vec<f32> = (0..100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let zcr = zero_crossing_rate(&[alternating, vec![0.0; 100]]);
        assert!((zcr[0] - 0.99).abs() < 1e-9);
        assert_eq!(zcr[1], 0.0);
    }

    #[test]
    fn test_rms_of_constant() {
        let values = rms(&[vec![0.5; 64]]);
        assert!((values[0] - 0.5).abs() < 1e-9);
    }
}
