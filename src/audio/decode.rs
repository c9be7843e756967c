//! # Audio Decoding
//!
//! Turns a stored upload (MP3, WAV, FLAC, AAC, M4A or OGG) into a mono
//! [`Waveform`] at a fixed target rate.
//!
//! ## Steps:
//! 1. **Probe**: symphonia picks the container from the file extension hint and content
//! 2. **Decode**: every packet of the first audio track is decoded to interleaved `f32`
//! 3. **Downmix**: frames are averaged across channels into one mono stream
//! 4. **Resample**: rubato's FFT resampler converts to the target rate

use crate::audio::waveform::Waveform;
use anyhow::{Context, Result};
use rubato::{FftFixedInOut, Resampler};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace, warn};

/// Frames per resampler chunk.
const RESAMPLE_CHUNK_SIZE: usize = 1024;

/// A decoded upload, downmixed and resampled.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub waveform: Waveform,
    /// Channel count of the source track before downmixing
    pub source_channels: usize,
    /// Sample rate of the source track before resampling
    pub source_sample_rate: u32,
}

/// Decode an audio file into a mono waveform at `target_sample_rate`.
///
/// ## Errors:
/// Fails when the file cannot be opened, the container is not recognised,
/// there is no audio track, or a packet cannot be read. Individually corrupt
/// frames are skipped.
pub fn decode_file(path: &Path, target_sample_rate: u32) -> Result<DecodedAudio> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to probe audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_sample_rate = codec_params.sample_rate.context("Unknown sample rate")?;
    let channels = codec_params.channels.map_or(1, |c| c.count());

    debug!(
        path = %path.display(),
        sample_rate = source_sample_rate,
        channels,
        "Decoding audio"
    );

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e).context("Failed to read audio packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                trace!("Skipping corrupted frame: {}", e);
                continue;
            }
            Err(e) => return Err(e).context("Failed to decode audio packet"),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        mono.extend(downmix(sample_buf.samples(), spec.channels.count()));
    }

    let samples = resample(&mono, source_sample_rate, target_sample_rate)?;

    debug!(
        samples = samples.len(),
        sample_rate = target_sample_rate,
        duration_seconds = samples.len() as f64 / target_sample_rate as f64,
        "Decoded audio"
    );

    Ok(DecodedAudio {
        waveform: Waveform::new(samples, target_sample_rate),
        source_channels: channels,
        source_sample_rate,
    })
}

/// Average interleaved frames down to one channel.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample a mono signal with rubato's FFT resampler.
///
/// The resampler's own delay is trimmed from the front and the result is cut
/// to `round(len * to / from)` samples so durations survive the conversion.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = match FftFixedInOut::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        RESAMPLE_CHUNK_SIZE,
        1,
    ) {
        Ok(r) => r,
        Err(e) => {
            warn!("Resampler initialization failed ({}), using linear interpolation", e);
            return Ok(resample_linear(samples, from_rate, to_rate));
        }
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay + resampler.output_frames_max());
    let mut chunk: Vec<f32> = Vec::with_capacity(resampler.input_frames_max());
    let mut pos = 0;

    // Keep feeding (zero padding past the end) until the delayed tail is flushed.
    while output.len() < expected + delay {
        let frames_in = resampler.input_frames_next();
        chunk.clear();
        if pos < samples.len() {
            let end = (pos + frames_in).min(samples.len());
            chunk.extend_from_slice(&samples[pos..end]);
        }
        chunk.resize(frames_in, 0.0);

        let resampled = resampler
            .process(&[chunk.as_slice()], None)
            .context("Resampling failed")?;
        if let Some(channel) = resampled.first() {
            output.extend_from_slice(channel);
        }
        pos += frames_in;
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

/// Linear interpolation, used only when the FFT resampler cannot be built.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let step = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / step).round() as usize;

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 * step;
            let idx = src_pos as usize;
            let frac = (src_pos - idx as f64) as f32;
            if idx + 1 < samples.len() {
                samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
            } else {
                samples[idx.min(samples.len() - 1)]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encode::write_wav_file;
    use std::f32::consts::PI;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("harmonia-decode-{}-{}", uuid::Uuid::new_v4(), name))
    }

    #[test]
    fn test_downmix_averages_frames() {
        let stereo = vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(downmix(&stereo, 2), vec![0.5, 0.5, 0.0]);
        assert_eq!(downmix(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn test_resample_preserves_duration() {
        let samples: Vec<f32> = (0..22_050).map(|i| (2.0 * PI * 220.0 * i as f32 / 22_050.0).sin()).collect();
        let resampled = resample(&samples, 22_050, 44_100).unwrap();
        assert_eq!(resampled.len(), 44_100);
        assert!(resampled.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_linear_fallback_length() {
        let samples = vec![0.0f32; 48_000];
        assert_eq!(resample_linear(&samples, 48_000, 44_100).len(), 44_100);
    }

    #[test]
    fn test_decode_wav_file() {
        let path = temp_path("tone.wav");
        let samples: Vec<f32> = (0..44_100).map(|i| 0.5 * (2.0 * PI * 440.0 * i as f32 / 44_100.0).sin()).collect();
        write_wav_file(&path, &Waveform::new(samples, 44_100)).unwrap();

        let decoded = decode_file(&path, 44_100).unwrap();
        assert_eq!(decoded.source_channels, 1);
        assert_eq!(decoded.source_sample_rate, 44_100);
        assert_eq!(decoded.waveform.len(), 44_100);
        assert!((decoded.waveform.peak() - 0.5).abs() < 0.01);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let path = temp_path("noise.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(decode_file(&path, 44_100).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_decode_missing_file() {
        assert!(decode_file(Path::new("/nonexistent/harmonia/input.wav"), 44_100).is_err());
    }
}
