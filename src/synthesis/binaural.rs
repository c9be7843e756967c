//! # Binaural Beat Synthesis
//!
//! Two sine tones, a fixed 200 Hz carrier on the left and carrier + beat on
//! the right, folded into one mono stream by averaging. A linear fade at both
//! ends keeps the overlay from clicking.

use crate::audio::waveform::{time_axis, Waveform};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Left-ear tone (Hz); the right ear gets carrier + beat.
pub const CARRIER_FREQUENCY_HZ: f64 = 200.0;

/// Length of each fade (seconds).
pub const FADE_SECONDS: f64 = 0.1;

/// Beat frequency (Hz) per brainwave band.
pub const BAND_FREQUENCIES: &[(BrainwaveBand, f64)] = &[
    (BrainwaveBand::Delta, 2.0),
    (BrainwaveBand::Theta, 6.0),
    (BrainwaveBand::Alpha, 10.0),
    (BrainwaveBand::Beta, 20.0),
    (BrainwaveBand::Gamma, 40.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrainwaveBand {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}

impl BrainwaveBand {
    pub fn beat_frequency(self) -> f64 {
        BAND_FREQUENCIES
            .iter()
            .find(|(band, _)| *band == self)
            .map(|(_, hz)| *hz)
            .unwrap_or(0.0)
    }
}

/// Generate `round(duration * sample_rate)` samples of the folded beat.
///
/// The fade-in ramps 0 → 1 across the first `FADE_SECONDS` and the fade-out
/// 1 → 0 across the last, both endpoints inclusive. Buffers no longer than two
/// fades get no envelope at all.
pub fn generate_binaural_beat(band: BrainwaveBand, duration: f64, sample_rate: u32) -> Waveform {
    let len = (duration.max(0.0) * sample_rate as f64).round() as usize;
    let times = time_axis(len, duration, false);

    let left_hz = CARRIER_FREQUENCY_HZ;
    let right_hz = CARRIER_FREQUENCY_HZ + band.beat_frequency();
    let envelope = fade_envelope(len, (FADE_SECONDS * sample_rate as f64) as usize);

    let samples = times
        .iter()
        .zip(envelope)
        .map(|(&t, gain)| {
            let left = (2.0 * PI * left_hz * t).sin() * gain;
            let right = (2.0 * PI * right_hz * t).sin() * gain;
            ((left + right) / 2.0) as f32
        })
        .collect();

    Waveform::new(samples, sample_rate)
}

fn fade_envelope(len: usize, fade: usize) -> Vec<f64> {
    let mut envelope = vec![1.0f64; len];
    if fade == 0 || len <= 2 * fade {
        return envelope;
    }

    let ramp = ramp_up(fade);
    for (i, gain) in ramp.iter().enumerate() {
        envelope[i] = *gain;
        envelope[len - 1 - i] = *gain;
    }
    envelope
}

/// `fade` points from 0.0 to 1.0 inclusive.
fn ramp_up(fade: usize) -> Vec<f64> {
    if fade == 1 {
        return vec![0.0];
    }
    (0..fade).map(|i| i as f64 / (fade - 1) as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_table() {
        assert_eq!(BrainwaveBand::Delta.beat_frequency(), 2.0);
        assert_eq!(BrainwaveBand::Theta.beat_frequency(), 6.0);
        assert_eq!(BrainwaveBand::Alpha.beat_frequency(), 10.0);
        assert_eq!(BrainwaveBand::Beta.beat_frequency(), 20.0);
        assert_eq!(BrainwaveBand::Gamma.beat_frequency(), 40.0);
        assert_eq!(serde_json::from_str::<BrainwaveBand>("\"theta\"").unwrap(), BrainwaveBand::Theta);
    }

    #[test]
    fn test_output_length_rounds() {
        assert_eq!(generate_binaural_beat(BrainwaveBand::Alpha, 1.0, 44_100).len(), 44_100);
        assert_eq!(generate_binaural_beat(BrainwaveBand::Alpha, 0.50001, 1_000).len(), 500);
        assert_eq!(generate_binaural_beat(BrainwaveBand::Alpha, 0.0106, 1_000).len(), 11);
        assert!(generate_binaural_beat(BrainwaveBand::Alpha, 0.0, 44_100).is_empty());
    }

    #[test]
    fn test_values_stay_in_range() {
        let beat = generate_binaural_beat(BrainwaveBand::Gamma, 2.0, 8_000);
        assert!(beat.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_envelope_shape() {
        let sample_rate = 10_000;
        let fade = (FADE_SECONDS * sample_rate as f64) as usize;
        let envelope = fade_envelope(5_000, fade);

        assert_eq!(envelope[0], 0.0);
        assert_eq!(envelope[4_999], 0.0);
        assert_eq!(envelope[fade - 1], 1.0);
        assert!(envelope[..fade].windows(2).all(|w| w[1] >= w[0]));
        assert!(envelope[5_000 - fade..].windows(2).all(|w| w[1] <= w[0]));
        assert!(envelope[fade..5_000 - fade].iter().all(|&g| g == 1.0));
    }

    #[test]
    fn test_generated_endpoints_are_silent() {
        let beat = generate_binaural_beat(BrainwaveBand::Delta, 1.0, 8_000);
        assert_eq!(beat.samples[0], 0.0);
        assert_eq!(*beat.samples.last().unwrap(), 0.0);
    }

    #[test]
    fn test_short_buffers_get_no_envelope() {
        let envelope = fade_envelope(1_000, 500);
        assert!(envelope.iter().all(|&g| g == 1.0));

        // 0.15s at 1kHz: shorter than two fades, so the folded tone is untouched
        let beat = generate_binaural_beat(BrainwaveBand::Beta, 0.15, 1_000);
        let t = 0.1;
        let expected = (((2.0 * PI * 200.0 * t).sin() + (2.0 * PI * 220.0 * t).sin()) / 2.0) as f32;
        assert!((beat.samples[100] - expected).abs() < 1e-6);
    }
}
