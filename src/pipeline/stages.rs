//! Individual signal stages of the transformation pipeline.
//!
//! Every function here is pure and synchronous; progress reporting and
//! ordering live in the parent module.

use super::BinauralBeatSettings;
use crate::audio::waveform::{peak_amplitude, time_axis, Waveform};
use crate::synthesis::generate_binaural_beat;
use std::f64::consts::PI;

/// Tuning reference the input is assumed to be pitched at (Hz).
pub const REFERENCE_TUNING_HZ: f64 = 440.0;

/// Amplitude of the therapeutic sine before it drives the tremolo.
pub const THERAPEUTIC_WAVE_AMPLITUDE: f64 = 0.1;

/// Modulation depth applied to the therapeutic sine.
pub const THERAPEUTIC_MODULATION_DEPTH: f64 = 0.05;

/// Pitch ratio between the requested tuning and the reference.
pub fn tuning_ratio(tuning: f64) -> f64 {
    tuning / REFERENCE_TUNING_HZ
}

/// Tuning adjustment.
///
/// Only the ratio is computed; the waveform is returned untouched. No
/// pitch-shifting is performed.
pub fn apply_tuning(waveform: Waveform, tuning: f64) -> (Waveform, f64) {
    (waveform, tuning_ratio(tuning))
}

/// Overlay a binaural beat and normalize if the mix clips.
///
/// Both buffers are cut to the shorter length (never padded) before
/// `y + volume * beat` is formed.
pub fn mix_binaural(waveform: Waveform, settings: &BinauralBeatSettings) -> Waveform {
    let beat = generate_binaural_beat(settings.band, waveform.duration_seconds(), waveform.sample_rate);
    let len = waveform.len().min(beat.len());
    let volume = settings.volume;

    let mut mixed: Vec<f32> = waveform.samples[..len]
        .iter()
        .zip(&beat.samples[..len])
        .map(|(&y, &b)| y + volume * b)
        .collect();
    normalize_peak(&mut mixed);

    Waveform::new(mixed, waveform.sample_rate)
}

/// Scale the buffer so its peak is exactly 1.0, but only if it exceeds 1.0.
///
/// Returns the pre-normalization peak when scaling happened. Quieter buffers
/// are left exactly as they are.
pub fn normalize_peak(samples: &mut [f32]) -> Option<f32> {
    let peak = peak_amplitude(samples);
    if peak <= 1.0 {
        return None;
    }
    samples.iter_mut().for_each(|s| *s /= peak);
    Some(peak)
}

/// Gain applied to each of `len` samples for a therapeutic frequency.
///
/// `wave = 0.1 * sin(2π f t)` with `t` spanning `[0, duration]` inclusive,
/// and the gain is `1 + 0.05 * wave`.
pub fn therapeutic_gains(len: usize, duration: f64, frequency: f64) -> Vec<f64> {
    time_axis(len, duration, true)
        .into_iter()
        .map(|t| {
            let wave = THERAPEUTIC_WAVE_AMPLITUDE * (2.0 * PI * frequency * t).sin();
            1.0 + THERAPEUTIC_MODULATION_DEPTH * wave
        })
        .collect()
}

/// Amplitude-modulate the buffer with the therapeutic tremolo.
pub fn apply_therapeutic_modulation(waveform: &mut Waveform, frequency: f64) {
    let gains = therapeutic_gains(waveform.len(), waveform.duration_seconds(), frequency);
    for (sample, gain) in waveform.samples.iter_mut().zip(gains) {
        *sample = (*sample as f64 * gain) as f32;
    }
}
