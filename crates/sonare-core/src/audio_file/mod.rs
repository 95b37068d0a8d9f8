//! Audio file decoding
//!
//! Decodes any container/codec Symphonia understands into a mono
//! [`Recording`] at the file's native sample rate. Multi-channel audio is
//! downmixed by averaging channels; nothing is resampled, so the analysis
//! frame grid depends only on the file itself.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::features::ExtractionError;
use crate::types::Sample;

/// One decoded audio file. Read once per extraction and never mutated.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Source identifier (path or upload name)
    pub source: String,
    /// Native sample rate in Hz
    pub sample_rate: u32,
    /// Mono samples
    pub samples: Vec<Sample>,
}

impl Recording {
    pub fn new(source: impl Into<String>, sample_rate: u32, samples: Vec<Sample>) -> Self {
        Self {
            source: source.into(),
            sample_rate,
            samples,
        }
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Average interleaved frames down to one channel
fn downmix_into(interleaved: &[Sample], channels: usize, out: &mut Vec<Sample>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as Sample;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<Sample>() * scale),
    );
}

/// Decode an audio file to a mono recording using Symphonia
pub fn decode_recording(path: &Path) -> Result<Recording, ExtractionError> {
    let source_id = path.display().to_string();

    let file = File::open(path).map_err(|e| ExtractionError::io(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Create a hint with the file extension
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| ExtractionError::UnsupportedFormat {
            source_id: source_id.clone(),
            reason: e.to_string(),
        })?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ExtractionError::UnsupportedFormat {
            source_id: source_id.clone(),
            reason: "No audio track found".to_string(),
        })?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| ExtractionError::UnsupportedFormat {
            source_id: source_id.clone(),
            reason: "Unknown sample rate".to_string(),
        })?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| ExtractionError::UnsupportedFormat {
            source_id: source_id.clone(),
            reason: e.to_string(),
        })?;

    let mut samples: Vec<Sample> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<Sample>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                return Err(ExtractionError::Decode {
                    source_id,
                    reason: format!("Error reading packet: {}", e),
                });
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A single malformed packet is recoverable; skip it
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("decode_recording: Skipping bad packet in {}: {}", source_id, e);
                continue;
            }
            Err(e) => {
                return Err(ExtractionError::Decode {
                    source_id,
                    reason: e.to_string(),
                });
            }
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let needed = decoded.capacity() * channels;

        // (Re)allocate when a packet is larger than anything seen so far
        if sample_buf.as_ref().map_or(true, |buf| buf.capacity() < needed) {
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            downmix_into(buf.samples(), channels, &mut samples);
        }
    }

    if samples.is_empty() {
        return Err(ExtractionError::EmptyAudio { source_id });
    }

    if samples.iter().any(|s| !s.is_finite()) {
        return Err(ExtractionError::Decode {
            source_id,
            reason: "Decoded samples contain non-finite values".to_string(),
        });
    }

    log::debug!(
        "decode_recording: {} decoded ({} samples at {} Hz)",
        source_id,
        samples.len(),
        sample_rate
    );

    Ok(Recording {
        source: source_id,
        sample_rate,
        samples,
    })
}
