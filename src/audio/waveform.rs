//! # Waveform
//!
//! The in-memory buffer every analysis and processing stage works on: mono
//! `f32` samples plus the rate they were sampled at.

/// A mono audio buffer.
///
/// ## Invariant:
/// `samples.len() / sample_rate` is the duration in seconds. Amplitudes are
/// nominally in [-1.0, 1.0] but mixing stages may push them past that until
/// they are normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Largest absolute sample value, 0.0 for an empty buffer.
    pub fn peak(&self) -> f32 {
        peak_amplitude(&self.samples)
    }

    /// Only ever one channel: multi-channel sources are downmixed at decode.
    pub fn channels(&self) -> u16 {
        1
    }
}

/// Largest absolute value in a slice of samples.
pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

/// Evenly spaced sample times for `len` samples spanning `duration` seconds.
///
/// With `include_end` the last sample sits exactly on `duration`
/// (closed interval); otherwise the grid covers `[0, duration)`.
pub fn time_axis(len: usize, duration: f64, include_end: bool) -> Vec<f64> {
    let steps = if include_end { len.saturating_sub(1) } else { len };
    if steps == 0 {
        return vec![0.0; len];
    }
    let step = duration / steps as f64;
    (0..len).map(|i| i as f64 * step).collect()
}
