//! # Tempo Estimation
//!
//! Beat tracking sits behind [`BeatTracker`] so the extractor can be handed a
//! different backend. The bundled tracker detects onsets from spectral flux
//! and turns the median inter-onset interval into a BPM value.

use crate::analysis::spectrum::{magnitude_frames, HOP_SIZE};
use crate::audio::Waveform;

/// Used when a non-silent signal yields too few usable onsets.
pub const DEFAULT_TEMPO_BPM: f32 = 120.0;

/// Inter-onset intervals outside 60–200 BPM are ignored.
const MIN_BEAT_INTERVAL_SECONDS: f32 = 0.3;
const MAX_BEAT_INTERVAL_SECONDS: f32 = 1.0;

/// Onsets closer than this are merged.
const MIN_ONSET_GAP_SECONDS: f32 = 0.1;

/// Below this peak amplitude a buffer counts as silence.
const SILENCE_THRESHOLD: f32 = 1e-6;

/// Beat-tracking backend.
pub trait BeatTracker: Send + Sync {
    /// Single tempo estimate in BPM, `None` when the signal carries no rhythm at all.
    fn estimate_bpm(&self, waveform: &Waveform) -> Option<f32>;

    /// Name of this tracker (for logging)
    fn name(&self) -> &'static str;
}

/// Spectral-flux onset detector with median-interval tempo.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpectralFluxTracker;

impl SpectralFluxTracker {
    pub fn new() -> Self {
        Self
    }

    /// Onset times in seconds.
    pub fn onsets(&self, waveform: &Waveform) -> Vec<f32> {
        let frames = magnitude_frames(&waveform.samples);
        let mut flux_values: Vec<(f32, f32)> = Vec::with_capacity(frames.len());
        let mut previous: Option<&Vec<f32>> = None;

        for (index, magnitudes) in frames.iter().enumerate() {
            let flux = match previous {
                Some(prev) => magnitudes
                    .iter()
                    .zip(prev.iter())
                    .map(|(cur, prev)| (cur - prev).max(0.0))
                    .sum(),
                None => 0.0,
            };
            let time = (index * HOP_SIZE) as f32 / waveform.sample_rate as f32;
            flux_values.push((time, flux));
            previous = Some(magnitudes);
        }

        pick_peaks(&flux_values)
    }
}

impl BeatTracker for SpectralFluxTracker {
    fn estimate_bpm(&self, waveform: &Waveform) -> Option<f32> {
        if waveform.is_empty() || waveform.sample_rate == 0 || waveform.peak() < SILENCE_THRESHOLD {
            return None;
        }
        Some(tempo_from_onsets(&self.onsets(waveform)))
    }

    fn name(&self) -> &'static str {
        "spectral-flux"
    }
}

/// Local peaks above an adaptive threshold, at least `MIN_ONSET_GAP_SECONDS` apart.
fn pick_peaks(flux_values: &[(f32, f32)]) -> Vec<f32> {
    let window = 20;
    let mut onsets: Vec<f32> = Vec::new();

    for i in 0..flux_values.len() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(flux_values.len());
        let local_mean = flux_values[start..end].iter().map(|(_, f)| f).sum::<f32>() / (end - start) as f32;
        let threshold = local_mean * 1.5 + 0.01;

        let (time, flux) = flux_values[i];
        if flux <= threshold {
            continue;
        }

        let is_peak = (i == 0 || flux >= flux_values[i - 1].1)
            && (i + 1 == flux_values.len() || flux >= flux_values[i + 1].1);
        let far_enough = onsets.last().map_or(true, |&last| time - last > MIN_ONSET_GAP_SECONDS);

        if is_peak && far_enough {
            onsets.push(time);
        }
    }

    onsets
}

fn tempo_from_onsets(onsets: &[f32]) -> f32 {
    let mut intervals: Vec<f32> = onsets
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&i| (MIN_BEAT_INTERVAL_SECONDS..=MAX_BEAT_INTERVAL_SECONDS).contains(&i))
        .collect();

    if intervals.is_empty() {
        return DEFAULT_TEMPO_BPM;
    }

    intervals.sort_by(|a, b| a.total_cmp(b));
    60.0 / intervals[intervals.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_track(bpm: f32, seconds: f32, sample_rate: u32) -> Waveform {
        let len = (seconds * sample_rate as f32) as usize;
        let period = (60.0 / bpm * sample_rate as f32) as usize;
        let mut samples = vec![0.0f32; len];
        for start in (0..len).step_by(period) {
            for (offset, slot) in samples[start..(start + 64).min(len)].iter_mut().enumerate() {
                *slot = if offset % 2 == 0 { 0.9 } else { -0.9 };
            }
        }
        Waveform::new(samples, sample_rate)
    }

    #[test]
    fn test_click_track_tempo() {
        let tracker = SpectralFluxTracker::new();
        let bpm = tracker.estimate_bpm(&click_track(120.0, 8.0, 44_100)).unwrap();
        assert!((110.0..=130.0).contains(&bpm), "estimated {}", bpm);
    }

    #[test]
    fn test_silence_has_no_tempo() {
        let tracker = SpectralFluxTracker::new();
        assert_eq!(tracker.estimate_bpm(&Waveform::new(vec![0.0; 44_100], 44_100)), None);
        assert_eq!(tracker.estimate_bpm(&Waveform::new(Vec::new(), 44_100)), None);
    }

    #[test]
    fn test_tempo_fallback_and_median() {
        assert_eq!(tempo_from_onsets(&[]), DEFAULT_TEMPO_BPM);
        assert_eq!(tempo_from_onsets(&[0.0, 5.0]), DEFAULT_TEMPO_BPM);
        assert_eq!(tempo_from_onsets(&[0.0, 0.5, 1.0, 1.5]), 120.0);
    }
}
