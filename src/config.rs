//! # Configuration Management
//!
//! Loads the service configuration from several sources, highest priority last:
//! 1. Built-in defaults (the `Default` impl below)
//! 2. `config.toml` in the working directory (optional)
//! 3. Environment variables prefixed with `APP__` (e.g. `APP__STORAGE__UPLOAD_DIR`)
//! 4. The bare `HOST` / `PORT` variables set by most deployment platforms
//!
//! ## Sections:
//! - **server**: where the HTTP listener binds
//! - **storage**: upload/output directories, sweep age and upload size cap
//! - **audio**: the fixed rate every input is resampled to before processing
//! - **export**: location of the external encoder used for MP3 export

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub audio: AudioConfig,
    pub export: ExportConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// On-disk storage for uploaded assets and processed outputs.
///
/// ## Fields:
/// - `upload_dir`: where raw uploads are written as `<asset id>_<filename>`
/// - `processed_dir`: where pipeline outputs and exports are written
/// - `max_file_age_hours`: files older than this are removed at startup
/// - `max_upload_mb`: uploads larger than this are rejected while streaming
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub max_file_age_hours: u64,
    pub max_upload_mb: usize,
}

/// Audio decoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Every decoded input is resampled to this rate (Hz) before analysis or processing
    pub target_sample_rate: u32,
}

/// External encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Path or name of the `ffmpeg` binary used for MP3 export
    pub ffmpeg_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from("uploads"),
                processed_dir: PathBuf::from("processed"),
                max_file_age_hours: 24,
                max_upload_mb: 100,
            },
            audio: AudioConfig {
                target_sample_rate: 44_100,
            },
            export: ExportConfig {
                ffmpeg_path: "ffmpeg".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP__SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP__STORAGE__MAX_UPLOAD_MB=250`: Raise the upload cap
    /// - `APP__EXPORT__FFMPEG_PATH=/usr/local/bin/ffmpeg`: Pin the encoder
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    ///
    /// A double underscore separates nesting levels because several field
    /// names contain single underscores.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Storage directories are not empty paths
    /// - Upload cap and target sample rate are greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.storage.upload_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Upload directory cannot be empty"));
        }

        if self.storage.processed_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Processed directory cannot be empty"));
        }

        if self.storage.max_upload_mb == 0 {
            return Err(anyhow::anyhow!("Maximum upload size must be greater than 0"));
        }

        if self.audio.target_sample_rate == 0 {
            return Err(anyhow::anyhow!("Target sample rate must be greater than 0"));
        }

        if self.export.ffmpeg_path.trim().is_empty() {
            return Err(anyhow::anyhow!("ffmpeg path cannot be empty"));
        }

        Ok(())
    }

    /// Upload cap in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.storage.max_upload_mb * 1024 * 1024
    }
}
