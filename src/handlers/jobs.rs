//! # Job Handlers
//!
//! ## Available Endpoints:
//! - `GET /api/status/{task_id}` - Poll a transformation job
//! - `GET /api/download/{task_id}` - Fetch the processed WAV
//! - `POST /api/export/{task_id}` - Re-encode the processed output

use crate::audio::export::{export_output, ExportRequest};
use crate::jobs::{Job, JobStatus};
use crate::{error::AppError, state::AppState};
use actix_web::{http::header, web, HttpResponse};
use serde_json::json;
use std::path::{Path, PathBuf};

fn find_job(state: &AppState, task_id: &str) -> Result<Job, AppError> {
    state
        .jobs
        .get(task_id)
        .ok_or_else(|| AppError::NotFound(format!("Task {} not found", task_id)))
}

/// Output of a completed job that still exists on disk.
async fn completed_output(job: &Job) -> Result<PathBuf, AppError> {
    if job.status != JobStatus::Completed {
        return Err(AppError::StateError(format!(
            "Task {} is {}, not completed",
            job.job_id,
            job.status.as_str()
        )));
    }

    let output = job
        .output_path
        .clone()
        .ok_or_else(|| AppError::NotFound(format!("Processed file for task {} not found", job.job_id)))?;

    if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
        return Err(AppError::NotFound(format!(
            "Processed file for task {} not found",
            job.job_id
        )));
    }

    Ok(output)
}

async fn file_response(path: &Path, content_type: &str, filename: String) -> Result<HttpResponse, AppError> {
    let bytes = tokio::fs::read(path).await?;
    Ok(HttpResponse::Ok()
        .content_type(content_type)
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(bytes))
}

/// Poll a job.
///
/// ## Endpoint: `GET /api/status/{task_id}`
///
/// ## Response:
/// ```json
/// {
///   "task_id": "5d1c...",
///   "file_id": "0b0f...",
///   "status": "processing",
///   "progress": 70,
///   "message": "Adding binaural beats...",
///   "error": null,
///   "created_at": "2025-01-01T12:00:00+00:00",
///   "updated_at": "2025-01-01T12:00:03+00:00"
/// }
/// ```
pub async fn get_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let job = find_job(&state, &path.into_inner())?;

    Ok(HttpResponse::Ok().json(json!({
        "task_id": job.job_id,
        "file_id": job.asset_id,
        "status": job.status,
        "progress": job.progress,
        "message": job.message,
        "error": job.error,
        "created_at": job.created_at.to_rfc3339(),
        "updated_at": job.updated_at.to_rfc3339()
    })))
}

/// Download the processed WAV of a completed job.
///
/// ## Endpoint: `GET /api/download/{task_id}`
pub async fn download_output(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let task_id = path.into_inner();
    let job = find_job(&state, &task_id)?;
    let output = completed_output(&job).await?;

    file_response(&output, "audio/wav", format!("harmonia_transformed_{}.wav", task_id)).await
}

/// Export a completed job to MP3 or WAV.
///
/// ## Endpoint: `POST /api/export/{task_id}`
///
/// ## Request:
/// ```json
/// { "format": "mp3", "quality": "high" }
/// ```
/// Both fields are optional and default to `wav` / `standard`.
pub async fn export_audio(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ExportRequest>,
) -> Result<HttpResponse, AppError> {
    let task_id = path.into_inner();
    let request = body.into_inner();
    let job = find_job(&state, &task_id)?;
    let output = completed_output(&job).await?;

    let exported = export_output(&output, request, &state.config.export.ffmpeg_path).await?;

    file_response(
        &exported,
        request.format.mime_type(),
        format!("harmonia_export_{}.{}", task_id, request.format.extension()),
    )
    .await
}
