//! # WAV Encoding
//!
//! Lossless output for processed jobs. Samples are clipped to [-1.0, 1.0] and
//! quantized to signed integer PCM at 16 bits (pipeline output) or 24 bits
//! (high-quality export).

use crate::audio::waveform::Waveform;
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Integer PCM depth of an encoded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmDepth {
    Sixteen,
    TwentyFour,
}

impl PcmDepth {
    pub fn bits(self) -> u16 {
        match self {
            PcmDepth::Sixteen => 16,
            PcmDepth::TwentyFour => 24,
        }
    }

    fn full_scale(self) -> f32 {
        match self {
            PcmDepth::Sixteen => i16::MAX as f32,
            PcmDepth::TwentyFour => 8_388_607.0,
        }
    }
}

/// Write a mono waveform as 16-bit PCM WAV.
pub fn write_wav_file(path: &Path, waveform: &Waveform) -> Result<()> {
    write_wav_file_with_depth(path, waveform, PcmDepth::Sixteen)
}

/// Write a mono waveform as PCM WAV at the given depth.
pub fn write_wav_file_with_depth(path: &Path, waveform: &Waveform, depth: PcmDepth) -> Result<()> {
    if waveform.sample_rate == 0 {
        bail!("Cannot encode audio with a sample rate of 0");
    }

    let header = wav::Header::new(
        wav::header::WAV_FORMAT_PCM,
        waveform.channels(),
        waveform.sample_rate,
        depth.bits(),
    );
    let track = quantize(&waveform.samples, depth);

    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    wav::write(header, &track, &mut writer)
        .with_context(|| format!("Failed to write WAV data: {}", path.display()))?;
    writer.flush().context("Failed to flush WAV file")?;
    Ok(())
}

/// Read a PCM or float WAV file back into a mono waveform.
///
/// Used by export to re-encode an already processed output. Multi-channel
/// files are averaged down to mono.
pub fn read_wav_file(path: &Path) -> Result<Waveform> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
    let (header, data) = wav::read(&mut file)
        .with_context(|| format!("Failed to read WAV data: {}", path.display()))?;

    let interleaved: Vec<f32> = match data {
        wav::BitDepth::Eight(samples) => samples.iter().map(|&s| (s as f32 - 128.0) / 128.0).collect(),
        wav::BitDepth::Sixteen(samples) => samples.iter().map(|&s| s as f32 / 32_768.0).collect(),
        wav::BitDepth::TwentyFour(samples) => samples.iter().map(|&s| s as f32 / 8_388_608.0).collect(),
        wav::BitDepth::ThirtyTwoFloat(samples) => samples,
        wav::BitDepth::Empty => Vec::new(),
    };

    let channels = header.channel_count.max(1) as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(Waveform::new(samples, header.sampling_rate))
}

fn quantize(samples: &[f32], depth: PcmDepth) -> wav::BitDepth {
    let scale = depth.full_scale();
    let scaled = samples.iter().map(move |&s| (s.clamp(-1.0, 1.0) * scale).round());
    match depth {
        PcmDepth::Sixteen => wav::BitDepth::Sixteen(scaled.map(|s| s as i16).collect()),
        PcmDepth::TwentyFour => wav::BitDepth::TwentyFour(scaled.map(|s| s as i32).collect()),
    }
}
