//! # Audio Module
//!
//! Everything that touches encoded audio bytes or raw sample buffers:
//!
//! - **waveform**: the mono sample buffer shared by every stage
//! - **format**: upload MIME/extension allow-list
//! - **decode**: symphonia decoding, downmix and resampling to the target rate
//! - **encode**: PCM WAV writing and reading
//! - **export**: re-encoding a finished output to MP3 or high-depth WAV

pub mod decode;
pub mod encode;
pub mod export;
pub mod format;
pub mod waveform;

pub use waveform::Waveform;
