//! # Upload and Processing Handlers
//!
//! ## Available Endpoints:
//! - `POST /api/upload` - Store an audio file and return its analysis
//! - `POST /api/process/{file_id}` - Start a transformation job for an upload

use crate::analysis::{AnalysisResult, AudioFeatures};
use crate::audio::decode::decode_file;
use crate::audio::format::validate_upload;
use crate::pipeline::TransformationSpec;
use crate::{error::AppError, state::AppState};
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

/// Field of the multipart form that carries the audio file.
const UPLOAD_FIELD: &str = "file";

/// Upload and analyze an audio file.
///
/// ## Endpoint: `POST /api/upload`
///
/// ## Request:
/// Multipart form data with the audio file in a field named "file". The
/// part's content type must be on the allow-list and the filename extension,
/// if any, must match it.
///
/// ## Response:
/// ```json
/// {
///   "file_id": "0b0f8b7e-33f1-4b7a-9a3c-2f4f3f6f8a10",
///   "filename": "track.wav",
///   "duration": 5.0,
///   "bpm": 120.0,
///   "key": "A Minor",
///   "sample_rate": 44100,
///   "channels": 1
/// }
/// ```
pub async fn upload_audio(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let max_bytes = state.config.max_upload_bytes();

    while let Some(item) = payload.next().await {
        let mut field: Field = item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let content_disposition = field
            .content_disposition()
            .ok_or_else(|| AppError::BadRequest("Missing content disposition".to_string()))?;

        if content_disposition.get_name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = content_disposition.get_filename().map(|s| s.to_string());
        let content_type = field.content_type().map(|m| m.essence_str().to_string());
        let extension = validate_upload(content_type.as_deref(), filename.as_deref())?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(AppError::ValidationError(format!(
                    "File too large (max: {} MB)",
                    state.config.storage.max_upload_mb
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        let file_id = Uuid::new_v4().to_string();
        let filename = filename.unwrap_or_else(|| format!("upload{}", extension));
        let path = state.storage.save_upload(&file_id, &filename, &bytes).await?;

        let extractor = state.extractor.clone();
        let target_rate = state.config.audio.target_sample_rate;
        let decode_path = path.clone();
        let features = web::block(move || -> anyhow::Result<AudioFeatures> {
            let decoded = decode_file(&decode_path, target_rate)?;
            Ok(extractor.extract(&decoded.waveform))
        })
        .await?
        .map_err(|e| {
            warn!(file_id = %file_id, error = %format!("{:#}", e), "Uploaded audio could not be analyzed");
            AppError::BadRequest(format!("Could not decode audio file: {:#}", e))
        })?;

        info!(
            file_id = %file_id,
            filename = %filename,
            bytes = bytes.len(),
            duration = features.duration,
            "Upload analyzed"
        );

        return Ok(HttpResponse::Ok().json(AnalysisResult::new(file_id, filename, features)));
    }

    Err(AppError::BadRequest(format!(
        "Multipart field '{}' is required",
        UPLOAD_FIELD
    )))
}

/// Start a transformation job.
///
/// ## Endpoint: `POST /api/process/{file_id}`
///
/// ## Response:
/// ```json
/// { "task_id": "5d1c...", "status": "processing" }
/// ```
pub async fn process_audio(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<TransformationSpec>,
) -> Result<HttpResponse, AppError> {
    let file_id = path.into_inner();
    let spec = body.into_inner();
    spec.validate().map_err(AppError::ValidationError)?;

    let input = state
        .storage
        .find_upload(&file_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {} not found", file_id)))?;

    let task_id = state.runner.schedule(&file_id, input, spec);

    Ok(HttpResponse::Ok().json(json!({
        "task_id": task_id,
        "status": "processing"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encode::write_wav_file;
    use crate::audio::Waveform;
    use crate::config::AppConfig;
    use actix_web::{test, App};

    fn test_state() -> web::Data<AppState> {
        let root = std::env::temp_dir().join(format!("harmonia-handlers-{}", Uuid::new_v4()));
        let mut config = AppConfig::default();
        config.storage.upload_dir = root.join("uploads");
        config.storage.processed_dir = root.join("processed");
        let state = AppState::new(config);
        state.storage.ensure_dirs().unwrap();
        web::Data::new(state)
    }

    fn multipart_body(boundary: &str, content_type: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: {ct}\r\n\r\n",
            b = boundary,
            f = filename,
            ct = content_type
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        body
    }

    #[actix_web::test]
    async fn test_upload_analyzes_wav() {
        let state = test_state();
        let wav_path = state.storage.upload_dir().join("fixture.wav");
        let samples: Vec<f32> = (0..44_100 * 5)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44_100.0).sin() * 0.5)
            .collect();
        write_wav_file(&wav_path, &Waveform::new(samples, 44_100)).unwrap();
        let data = std::fs::read(&wav_path).unwrap();
        std::fs::remove_file(&wav_path).unwrap();

        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/api/upload", web::post().to(upload_audio)),
        )
        .await;

        let boundary = "harmonia-boundary";
        let req = test::TestRequest::post()
            .uri("/api/upload")
            .insert_header(("content-type", format!("multipart/form-data; boundary={}", boundary)))
            .set_payload(multipart_body(boundary, "audio/wav", "tone.wav", &data))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["filename"], "tone.wav");
        assert_eq!(body["sample_rate"], 44_100);
        assert_eq!(body["channels"], 1);
        assert!((body["duration"].as_f64().unwrap() - 5.0).abs() < 0.01);
        assert!(body["key"].as_str().unwrap().starts_with("A "));

        let file_id = body["file_id"].as_str().unwrap();
        assert!(state.storage.find_upload(file_id).await.unwrap().is_some());
    }

    #[actix_web::test]
    async fn test_upload_rejects_mismatched_extension() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/api/upload", web::post().to(upload_audio)),
        )
        .await;

        let boundary = "harmonia-boundary";
        let req = test::TestRequest::post()
            .uri("/api/upload")
            .insert_header(("content-type", format!("multipart/form-data; boundary={}", boundary)))
            .set_payload(multipart_body(boundary, "audio/mpeg", "tone.wav", b"not audio"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "validation_error");
    }

    #[actix_web::test]
    async fn test_process_unknown_file_is_not_found() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/api/process/{file_id}", web::post().to(process_audio)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/process/{}", Uuid::new_v4()))
            .set_json(json!({
                "binaural_beat": { "enabled": false, "type": "alpha", "volume": 0.3 },
                "therapeutic_frequency": 7.83
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_process_rejects_out_of_range_volume() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .route("/api/process/{file_id}", web::post().to(process_audio)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/process/anything")
            .set_json(json!({
                "binaural_beat": { "enabled": true, "type": "alpha", "volume": 2.0 },
                "therapeutic_frequency": 7.83
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }
}
