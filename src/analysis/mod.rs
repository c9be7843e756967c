//! # Feature Extraction
//!
//! Computes the descriptors returned for every upload: duration, sample rate,
//! channel count, tempo and musical key. Extraction is a pure function of the
//! decoded waveform; decoding itself happens before this module is reached,
//! so a decode failure means no analysis result at all.

pub mod key;
pub mod spectrum;
pub mod tempo;

use crate::audio::Waveform;
use key::{chroma_profile, estimate_key, MusicalKey};
use serde::Serialize;
use tempo::{BeatTracker, SpectralFluxTracker};
use tracing::debug;

/// Descriptors of a decoded waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFeatures {
    pub duration: f64,
    /// Absent only when the beat tracker finds nothing (silence)
    pub bpm: Option<f32>,
    /// Absent only when the chroma profile is flat (silence)
    pub key: Option<MusicalKey>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Response body of `POST /api/upload`. Created once per upload and never updated.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub file_id: String,
    pub filename: String,
    pub duration: f64,
    pub bpm: Option<f32>,
    pub key: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AnalysisResult {
    pub fn new(file_id: String, filename: String, features: AudioFeatures) -> Self {
        Self {
            file_id,
            filename,
            duration: features.duration,
            bpm: features.bpm,
            key: features.key.map(|k| k.to_string()),
            sample_rate: features.sample_rate,
            channels: features.channels,
        }
    }
}

/// Runs tempo and key estimation over a waveform.
pub struct FeatureExtractor {
    beat_tracker: Box<dyn BeatTracker>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(Box::new(SpectralFluxTracker::new()))
    }
}

impl FeatureExtractor {
    pub fn new(beat_tracker: Box<dyn BeatTracker>) -> Self {
        Self { beat_tracker }
    }

    pub fn extract(&self, waveform: &Waveform) -> AudioFeatures {
        let bpm = self.beat_tracker.estimate_bpm(waveform);
        let chroma = chroma_profile(waveform);
        let key = estimate_key(&chroma);

        debug!(
            tracker = self.beat_tracker.name(),
            bpm = ?bpm,
            key = ?key.map(|k| k.to_string()),
            "Extracted features"
        );

        AudioFeatures {
            duration: waveform.duration_seconds(),
            bpm,
            key,
            sample_rate: waveform.sample_rate,
            channels: waveform.channels(),
        }
    }
}
