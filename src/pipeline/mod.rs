//! # Transformation Pipeline
//!
//! Turns a stored upload into a processed WAV by running a fixed chain of
//! stages. Each stage reports a checkpoint through a [`ProgressSink`] before
//! doing its work, so a failing stage leaves progress at the last checkpoint
//! that was reached.
//!
//! ## Stage order:
//! 1. **Loading** (10): decode and resample the input
//! 2. **Transforming** (30): start of the signal chain
//! 3. **Tuning** (50): pitch ratio against A4 = 440 Hz, audio untouched
//! 4. **Binaural** (70): optional binaural beat overlay
//! 5. **Therapeutic** (90): low-depth tremolo at the therapeutic frequency
//! 6. **Completed** (100): reported by the runner once the WAV is on disk

pub mod stages;

use crate::audio::decode::decode_file;
use crate::audio::encode::write_wav_file;
use crate::audio::Waveform;
use crate::synthesis::BrainwaveBand;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Checkpoints reported by the pipeline, in order.
pub const STAGE_CHECKPOINTS: &[(Stage, u8, &str)] = &[
    (Stage::Loading, 10, "Loading audio file..."),
    (Stage::Transforming, 30, "Applying transformations..."),
    (Stage::Tuning, 50, "Adjusting tuning..."),
    (Stage::Binaural, 70, "Adding binaural beats..."),
    (Stage::Therapeutic, 90, "Applying therapeutic frequency..."),
    (Stage::Completed, 100, "Transformation completed successfully!"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loading,
    Transforming,
    Tuning,
    Binaural,
    Therapeutic,
    Completed,
}

impl Stage {
    fn checkpoint(self) -> (u8, &'static str) {
        STAGE_CHECKPOINTS
            .iter()
            .find(|(stage, _, _)| *stage == self)
            .map(|(_, progress, message)| (*progress, *message))
            .unwrap_or((0, ""))
    }

    pub fn progress(self) -> u8 {
        self.checkpoint().0
    }

    pub fn message(self) -> &'static str {
        self.checkpoint().1
    }
}

/// Receives stage checkpoints as the pipeline runs.
pub trait ProgressSink: Send + Sync {
    fn checkpoint(&self, stage: Stage);
}

/// Binaural beat settings of a transformation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinauralBeatSettings {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub band: BrainwaveBand,
    pub volume: f32,
}

/// Parameters of one transformation job.
///
/// ## JSON Example:
/// ```json
/// {
///   "tuning": 432.0,
///   "bpm_adjustment": 0.0,
///   "binaural_beat": { "enabled": true, "type": "alpha", "volume": 0.3 },
///   "therapeutic_frequency": 7.83,
///   "intention": "calm focus"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationSpec {
    #[serde(default = "default_tuning")]
    pub tuning: f64,
    /// Accepted and stored, never applied
    #[serde(default)]
    pub bpm_adjustment: f64,
    pub binaural_beat: BinauralBeatSettings,
    pub therapeutic_frequency: f64,
    /// Free text carried along with the job, not interpreted
    #[serde(default)]
    pub intention: String,
}

fn default_tuning() -> f64 {
    stages::REFERENCE_TUNING_HZ
}

impl TransformationSpec {
    /// Range checks applied before a job is scheduled.
    pub fn validate(&self) -> Result<(), String> {
        if !self.tuning.is_finite() || self.tuning <= 0.0 {
            return Err(format!("tuning must be a positive frequency, got {}", self.tuning));
        }
        if !self.bpm_adjustment.is_finite() {
            return Err("bpm_adjustment must be a finite number".to_string());
        }
        if !self.binaural_beat.volume.is_finite() || !(0.0..=1.0).contains(&self.binaural_beat.volume) {
            return Err(format!(
                "binaural_beat.volume must be between 0 and 1, got {}",
                self.binaural_beat.volume
            ));
        }
        if !self.therapeutic_frequency.is_finite() || self.therapeutic_frequency < 0.0 {
            return Err(format!(
                "therapeutic_frequency must be a non-negative frequency, got {}",
                self.therapeutic_frequency
            ));
        }
        Ok(())
    }
}

/// Run the in-memory part of the chain (checkpoints 30 through 90).
pub fn transform(waveform: Waveform, spec: &TransformationSpec, sink: &dyn ProgressSink) -> Result<Waveform> {
    if waveform.sample_rate == 0 {
        anyhow::bail!("Cannot transform audio with a sample rate of 0");
    }

    sink.checkpoint(Stage::Transforming);

    sink.checkpoint(Stage::Tuning);
    let (waveform, pitch_ratio) = stages::apply_tuning(waveform, spec.tuning);
    debug!(tuning = spec.tuning, pitch_ratio, "Computed tuning ratio");

    sink.checkpoint(Stage::Binaural);
    let mut waveform = if spec.binaural_beat.enabled {
        let mixed = stages::mix_binaural(waveform, &spec.binaural_beat);
        debug!(
            band = ?spec.binaural_beat.band,
            volume = spec.binaural_beat.volume,
            samples = mixed.len(),
            "Mixed binaural beat"
        );
        mixed
    } else {
        waveform
    };

    sink.checkpoint(Stage::Therapeutic);
    stages::apply_therapeutic_modulation(&mut waveform, spec.therapeutic_frequency);

    Ok(waveform)
}

/// Full pipeline from a stored input to a WAV at `output`.
pub struct TransformationPipeline {
    target_sample_rate: u32,
}

impl TransformationPipeline {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    /// Decode, transform and persist.
    ///
    /// The whole chain runs as one task on the blocking pool, so a long
    /// input never occupies the async worker that scheduled it. The final
    /// `Completed` checkpoint is left to the caller, which owns the job's
    /// terminal state.
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        spec: &TransformationSpec,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<PathBuf> {
        let input_path = input.to_path_buf();
        let output_path = output.to_path_buf();
        let spec = spec.clone();
        let target_rate = self.target_sample_rate;

        tokio::task::spawn_blocking(move || {
            process_file(&input_path, &output_path, &spec, sink.as_ref(), target_rate)
        })
        .await
        .context("Transformation task panicked")??;

        Ok(output.to_path_buf())
    }
}

/// Synchronous body of [`TransformationPipeline::run`] (checkpoints 10 through 90).
fn process_file(
    input: &Path,
    output: &Path,
    spec: &TransformationSpec,
    sink: &dyn ProgressSink,
    target_sample_rate: u32,
) -> Result<()> {
    sink.checkpoint(Stage::Loading);
    let decoded = decode_file(input, target_sample_rate)?;

    info!(
        input = %input.display(),
        samples = decoded.waveform.len(),
        source_rate = decoded.source_sample_rate,
        source_channels = decoded.source_channels,
        "Loaded audio for transformation"
    );

    let waveform = transform(decoded.waveform, spec, sink)?;

    write_wav_file(output, &waveform)
        .with_context(|| format!("Failed to write output {}", output.display()))
}
