//! # Export
//!
//! Re-encodes a completed job's WAV output into the format a client asks for.
//!
//! ## Format/quality matrix:
//! | format | standard                  | high                 |
//! |--------|---------------------------|----------------------|
//! | mp3    | 192 kbps via ffmpeg       | 320 kbps via ffmpeg  |
//! | wav    | verbatim copy of output   | re-encoded at 24-bit |
//!
//! MP3 encoding is delegated to an external `ffmpeg` process (libmp3lame).

use crate::audio::encode::{read_wav_file, write_wav_file_with_depth, PcmDepth};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// MP3 bitrate per quality level.
pub const MP3_BITRATES: &[(ExportQuality, &str)] = &[
    (ExportQuality::Standard, "192k"),
    (ExportQuality::High, "320k"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Mp3,
    #[default]
    Wav,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Mp3 => "mp3",
            ExportFormat::Wav => "wav",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Mp3 => "audio/mp3",
            ExportFormat::Wav => "audio/wav",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportQuality {
    #[default]
    Standard,
    High,
}

/// Requested export settings (`POST /api/export/{task_id}` body).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default)]
    pub quality: ExportQuality,
}

pub fn mp3_bitrate(quality: ExportQuality) -> &'static str {
    MP3_BITRATES
        .iter()
        .find(|(q, _)| *q == quality)
        .map(|(_, bitrate)| *bitrate)
        .unwrap_or("192k")
}

/// Where the export of `output` lands: `<stem>_export.<ext>` next to it.
pub fn export_path(output: &Path, format: ExportFormat) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    output.with_file_name(format!("{}_export.{}", stem, format.extension()))
}

/// Produce the export file for a completed output and return its path.
pub async fn export_output(input: &Path, request: ExportRequest, ffmpeg_path: &str) -> Result<PathBuf> {
    let target = export_path(input, request.format);

    match (request.format, request.quality) {
        (ExportFormat::Mp3, quality) => {
            encode_mp3(ffmpeg_path, input, &target, mp3_bitrate(quality)).await?;
        }
        (ExportFormat::Wav, ExportQuality::High) => {
            let (src, dst) = (input.to_path_buf(), target.clone());
            tokio::task::spawn_blocking(move || -> Result<()> {
                let waveform = read_wav_file(&src)?;
                write_wav_file_with_depth(&dst, &waveform, PcmDepth::TwentyFour)
            })
            .await
            .context("24-bit export task failed")??;
        }
        (ExportFormat::Wav, ExportQuality::Standard) => {
            tokio::fs::copy(input, &target)
                .await
                .with_context(|| format!("Failed to copy {} to {}", input.display(), target.display()))?;
        }
    }

    info!(
        input = %input.display(),
        output = %target.display(),
        format = request.format.extension(),
        quality = ?request.quality,
        "Export written"
    );
    Ok(target)
}

async fn encode_mp3(ffmpeg_path: &str, input: &Path, output: &Path, bitrate: &str) -> Result<()> {
    debug!(ffmpeg = ffmpeg_path, bitrate, "Spawning MP3 encoder");

    let result = Command::new(ffmpeg_path)
        .arg("-y")
        .arg("-i")
        .arg(input)
        .args(["-codec:a", "libmp3lame", "-b:a", bitrate])
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("Failed to spawn {}. Is ffmpeg installed?", ffmpeg_path))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        bail!("ffmpeg exited with {}:\n{}", result.status, stderr.trim());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encode::write_wav_file;
    use crate::audio::Waveform;

    #[test]
    fn test_export_request_defaults() {
        let request: ExportRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.format, ExportFormat::Wav);
        assert_eq!(request.quality, ExportQuality::Standard);

        let request: ExportRequest = serde_json::from_str(r#"{"format":"mp3","quality":"high"}"#).unwrap();
        assert_eq!(request.format, ExportFormat::Mp3);
        assert_eq!(request.quality, ExportQuality::High);

        assert!(serde_json::from_str::<ExportRequest>(r#"{"format":"ogg"}"#).is_err());
    }

    #[test]
    fn test_mp3_bitrates() {
        assert_eq!(mp3_bitrate(ExportQuality::Standard), "192k");
        assert_eq!(mp3_bitrate(ExportQuality::High), "320k");
    }

    #[test]
    fn test_export_path() {
        let path = export_path(Path::new("processed/processed_abc.wav"), ExportFormat::Mp3);
        assert_eq!(path, PathBuf::from("processed/processed_abc_export.mp3"));
    }

    #[tokio::test]
    async fn test_wav_exports() {
        let dir = std::env::temp_dir().join(format!("harmonia-export-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("processed_job.wav");
        write_wav_file(&input, &Waveform::new(vec![0.0, 0.5, -0.5, 0.25], 44_100)).unwrap();

        let standard = ExportRequest { format: ExportFormat::Wav, quality: ExportQuality::Standard };
        let copied = export_output(&input, standard, "ffmpeg").await.unwrap();
        assert_eq!(std::fs::read(&copied).unwrap(), std::fs::read(&input).unwrap());

        let high = ExportRequest { format: ExportFormat::Wav, quality: ExportQuality::High };
        let reencoded = export_output(&input, high, "ffmpeg").await.unwrap();
        let mut file = std::fs::File::open(&reencoded).unwrap();
        let (header, _) = wav::read(&mut file).unwrap();
        assert_eq!(header.bits_per_sample, 24);
        assert_eq!(header.sampling_rate, 44_100);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_encoder_is_an_error() {
        let dir = std::env::temp_dir().join(format!("harmonia-export-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("processed_job.wav");
        write_wav_file(&input, &Waveform::new(vec![0.0; 16], 44_100)).unwrap();

        let request = ExportRequest { format: ExportFormat::Mp3, quality: ExportQuality::High };
        assert!(export_output(&input, request, "/nonexistent/ffmpeg-harmonia").await.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
