//! Short-time Fourier transform on centered, zero-padded frames
//!
//! Frames are centered on `t * HOP_LENGTH` by padding `N_FFT / 2` zeros on
//! both sides, so even a signal shorter than one FFT window yields at least
//! one frame. The inverse reconstructs the unpadded signal length exactly.

use realfft::num_complex::Complex;
use realfft::RealFftPlanner;

use crate::types::{Sample, HOP_LENGTH, N_FFT};

/// Complex spectrogram, frame-major: `frames[t][k]` for bin `k` of frame `t`
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub frames: Vec<Vec<Complex<Sample>>>,
    /// Length of the time-domain signal the spectrogram was computed from
    pub signal_len: usize,
}

impl Spectrogram {
    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn n_bins(&self) -> usize {
        N_FFT / 2 + 1
    }

    /// |X| per frame
    pub fn magnitude(&self) -> Vec<Vec<Sample>> {
        self.frames
            .iter()
            .map(|frame| frame.iter().map(|c| c.norm()).collect())
            .collect()
    }

    /// |X|^2 per frame
    pub fn power(&self) -> Vec<Vec<Sample>> {
        self.frames
            .iter()
            .map(|frame| frame.iter().map(|c| c.norm_sqr()).collect())
            .collect()
    }
}

/// Number of centered frames for a signal of `len` samples
pub fn frame_count(len: usize) -> usize {
    1 + len / HOP_LENGTH
}

/// Center frequency (Hz) of each FFT bin
pub fn fft_frequencies(sample_rate: u32) -> Vec<f64> {
    let n_bins = N_FFT / 2 + 1;
    (0..n_bins)
        .map(|k| k as f64 * sample_rate as f64 / N_FFT as f64)
        .collect()
}

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<Sample> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Pad `N_FFT / 2` zeros on both sides
pub fn center_pad(signal: &[Sample]) -> Vec<Sample> {
    let pad = N_FFT / 2;
    let mut padded = vec![0.0; signal.len() + 2 * pad];
    padded[pad..pad + signal.len()].copy_from_slice(signal);
    padded
}

/// Forward STFT of a mono signal
pub fn stft(signal: &[Sample]) -> Result<Spectrogram, String> {
    let padded = center_pad(signal);
    let num_frames = frame_count(signal.len());

    let mut planner = RealFftPlanner::<Sample>::new();
    let fft = planner.plan_fft_forward(N_FFT);
    let window = hann_window(N_FFT);

    let mut frames = Vec::with_capacity(num_frames);
    let mut scratch = fft.make_scratch_vec();
    let mut frame_buf = vec![0.0; N_FFT];

    for frame_idx in 0..num_frames {
        let start = frame_idx * HOP_LENGTH;
        for (i, slot) in frame_buf.iter_mut().enumerate() {
            *slot = padded[start + i] * window[i];
        }

        let mut spectrum = fft.make_output_vec();
        fft.process_with_scratch(&mut frame_buf, &mut spectrum, &mut scratch)
            .map_err(|e| format!("FFT failed: {:?}", e))?;
        frames.push(spectrum);
    }

    Ok(Spectrogram {
        frames,
        signal_len: signal.len(),
    })
}

/// Inverse STFT by weighted overlap-add, trimmed to the original length
pub fn istft(spec: &Spectrogram) -> Result<Vec<Sample>, String> {
    let num_frames = spec.n_frames();
    if num_frames == 0 {
        return Ok(vec![0.0; spec.signal_len]);
    }

    let mut planner = RealFftPlanner::<Sample>::new();
    let ifft = planner.plan_fft_inverse(N_FFT);
    let window = hann_window(N_FFT);
    let n_bins = spec.n_bins();

    let output_len = (num_frames - 1) * HOP_LENGTH + N_FFT;
    let mut output = vec![0.0f32; output_len];
    let mut window_sum = vec![0.0f32; output_len];

    let mut scratch = ifft.make_scratch_vec();
    let mut time_frame = vec![0.0f32; N_FFT];
    let norm = 1.0 / N_FFT as f32;

    for (frame_idx, frame) in spec.frames.iter().enumerate() {
        let mut spectrum = ifft.make_input_vec();
        spectrum.copy_from_slice(&frame[..n_bins]);
        // DC and Nyquist bins of a real signal carry no imaginary part
        spectrum[0].im = 0.0;
        spectrum[n_bins - 1].im = 0.0;

        ifft.process_with_scratch(&mut spectrum, &mut time_frame, &mut scratch)
            .map_err(|e| format!("IFFT failed: {:?}", e))?;

        let start = frame_idx * HOP_LENGTH;
        for i in 0..N_FFT {
            output[start + i] += time_frame[i] * norm * window[i];
            window_sum[start + i] += window[i] * window[i];
        }
    }

    for (sample, &wsum) in output.iter_mut().zip(window_sum.iter()) {
        if wsum > f32::MIN_POSITIVE {
            *sample /= wsum;
        }
    }

    let pad = N_FFT / 2;
    let end = (pad + spec.signal_len).min(output_len);
    let mut signal = output[pad..end].to_vec();
    signal.resize(spec.signal_len, 0.0);
    Ok(signal)
}

/// Slice `signal` into centered frames of `N_FFT` samples using edge padding.
///
/// Used by time-domain descriptors (zero-crossing rate) that must see the
/// same frame grid as the STFT.
pub fn frames_edge_padded(signal: &[Sample]) -> Vec<Vec<Sample>> {
    let pad = N_FFT / 2;
    let first = signal.first().copied().unwrap_or(0.0);
    let last = signal.last().copied().unwrap_or(0.0);

    let mut padded = Vec::with_capacity(signal.len() + 2 * pad);
    padded.extend(std::iter::repeat(first).take(pad));
    padded.extend_from_slice(signal);
    padded.extend(std::iter::repeat(last).take(pad));

    (0..frame_count(signal.len()))
        .map(|t| padded[t * HOP_LENGTH..t * HOP_LENGTH + N_FFT].to_vec())
        .collect()
}

/// Slice `signal` into centered frames of `N_FFT` samples using zero padding
pub fn frames_zero_padded(signal: &[Sample]) -> Vec<Vec<Sample>> {
    let padded = center_pad(signal);
    (0..frame_count(signal.len()))
        .map(|t| padded[t * HOP_LENGTH..t * HOP_LENGTH + N_FFT].to_vec())
        .collect()
}
