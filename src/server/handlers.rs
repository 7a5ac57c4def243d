use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::AppState;
use crate::audio::{supported_extension, SUPPORTED_FORMATS};
use crate::error::{ServiceError, ServiceResult};
use crate::synthesis::SynthesisJob;
use crate::validate::ValidationMetadata;

const DEFAULT_OUTPUT_FORMAT: &str = "wav";
const DEFAULT_LANGUAGE: &str = "en";

fn log_failure(operation: &str, err: &ServiceError) {
    if err.status().is_server_error() {
        error!("{operation} error: {err}");
    } else {
        warn!("{operation} rejected ({}): {err}", err.status());
    }
}

fn json_error(rejection: JsonRejection) -> ServiceError {
    ServiceError::bad_request(rejection.body_text())
}

fn multipart_error(e: MultipartError) -> ServiceError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge(e.body_text())
    } else {
        ServiceError::bad_request(format!("invalid multipart: {e}"))
    }
}

#[derive(Debug, Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
    tts_model_loaded: bool,
    model: Option<String>,
    timestamp: String,
}

pub(super) async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        tts_model_loaded: state.synthesis.is_loaded(),
        model: state.synthesis.model_name().map(str::to_string),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    })
}

#[derive(Debug, Serialize)]
pub(super) struct ValidateResponse {
    valid: bool,
    metadata: ValidationMetadata,
    temp_path: String,
    upload_id: String,
}

/// `multipart/form-data` with an `audio` file field.
pub(super) async fn validate_audio(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ValidateResponse>, ServiceError> {
    validate_upload(state, multipart)
        .await
        .inspect_err(|e| log_failure("Audio validation", e))
        .map(Json)
}

async fn validate_upload(
    state: Arc<AppState>,
    mut multipart: Multipart,
) -> ServiceResult<ValidateResponse> {
    let max_size = state.config.max_file_size;
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("audio") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let mut data = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if (data.len() + chunk.len()) as u64 > max_size {
                return Err(ServiceError::PayloadTooLarge(format!(
                    "File too large. Maximum {max_size} bytes allowed."
                )));
            }
            data.extend_from_slice(&chunk);
        }
        upload = Some((filename, data));
    }

    let (filename, data) =
        upload.ok_or_else(|| ServiceError::bad_request("No audio file provided"))?;
    if filename.is_empty() {
        return Err(ServiceError::bad_request("Empty filename"));
    }
    let ext = supported_extension(&filename).ok_or_else(|| {
        ServiceError::bad_request(format!(
            "Unsupported format. Supported: {}",
            SUPPORTED_FORMATS.join(", ")
        ))
    })?;

    let (upload_id, temp_path) = state.workspace.new_upload(&ext);
    tokio::fs::write(&temp_path, &data).await?;

    let validator = state.validator.clone();
    let path = temp_path.clone();
    let validated = tokio::task::spawn_blocking(move || validator.validate(&path)).await?;

    match validated {
        Ok(metadata) => {
            info!(
                "Validated upload {upload_id}: {:.2}s, {} Hz, {} ch",
                metadata.duration, metadata.sample_rate, metadata.channels
            );
            Ok(ValidateResponse {
                valid: true,
                metadata,
                temp_path: temp_path.display().to_string(),
                upload_id,
            })
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            Err(e)
        }
    }
}

/// Either `file_path` (a managed path) or `upload_id` names the input.
#[derive(Debug, Deserialize)]
pub(super) struct ProcessRequest {
    file_path: Option<String>,
    upload_id: Option<String>,
    sample_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProcessResponse {
    success: bool,
    processed_path: String,
    sample_id: String,
    message: &'static str,
}

pub(super) async fn process_voice_sample(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<ProcessResponse>, ServiceError> {
    process_sample(state, payload)
        .await
        .inspect_err(|e| log_failure("Voice sample processing", e))
        .map(Json)
}

async fn process_sample(
    state: Arc<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> ServiceResult<ProcessResponse> {
    let Json(req) = payload.map_err(json_error)?;
    let required = || ServiceError::bad_request("file_path and sample_id required");

    let sample_id = req
        .sample_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(required)?;
    let input = match (req.upload_id, req.file_path) {
        (Some(upload_id), _) => state.workspace.upload_path(&upload_id)?,
        (None, Some(file_path)) => state.workspace.resolve(&file_path)?,
        (None, None) => return Err(required()),
    };
    if !input.is_file() {
        return Err(ServiceError::not_found("File not found"));
    }
    let output = state.workspace.sample_path(&sample_id)?;

    let worker = state.clone();
    let processed =
        tokio::task::spawn_blocking(move || worker.preprocessor.process(&input, &output))
            .await??;
    info!("Processed voice sample {sample_id} -> {}", processed.display());

    Ok(ProcessResponse {
        success: true,
        processed_path: processed.display().to_string(),
        sample_id,
        message: "Voice sample processed successfully",
    })
}

/// Either `voice_sample_path` (a managed path) or `sample_id` names the
/// reference recording.
#[derive(Debug, Deserialize)]
pub(super) struct SynthesizeRequest {
    text: Option<String>,
    voice_sample_path: Option<String>,
    sample_id: Option<String>,
    output_format: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct SynthesizeResponse {
    success: bool,
    output_path: String,
    duration: f64,
    format: String,
}

pub(super) async fn synthesize(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SynthesizeRequest>, JsonRejection>,
) -> Result<Json<SynthesizeResponse>, ServiceError> {
    synthesize_speech(state, payload)
        .await
        .inspect_err(|e| log_failure("Speech synthesis", e))
        .map(Json)
}

async fn synthesize_speech(
    state: Arc<AppState>,
    payload: Result<Json<SynthesizeRequest>, JsonRejection>,
) -> ServiceResult<SynthesizeResponse> {
    let Json(req) = payload.map_err(json_error)?;
    let required = || ServiceError::bad_request("text and voice_sample_path required");

    let text = req.text.ok_or_else(required)?;
    let voice_sample = match (req.sample_id, req.voice_sample_path) {
        (Some(sample_id), _) => state.workspace.sample_path(sample_id.trim())?,
        (None, Some(path)) => state.workspace.resolve(&path)?,
        (None, None) => return Err(required()),
    };

    let result = state
        .synthesis
        .synthesize(SynthesisJob {
            text,
            voice_sample,
            language: req.language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            output_format: req
                .output_format
                .unwrap_or_else(|| DEFAULT_OUTPUT_FORMAT.to_string()),
        })
        .await?;

    Ok(SynthesizeResponse {
        success: true,
        output_path: result.output_path.display().to_string(),
        duration: result.duration,
        format: result.format,
    })
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

pub(super) async fn download(
    State(state): State<Arc<AppState>>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Response, ServiceError> {
    send_output(&state, &filename)
        .await
        .inspect_err(|e| log_failure("File download", e))
}

async fn send_output(state: &AppState, filename: &str) -> ServiceResult<Response> {
    let path = state.workspace.output_file(filename)?;
    if !path.is_file() {
        return Err(ServiceError::not_found("File not found"));
    }
    let bytes = tokio::fs::read(&path).await?;

    let headers = [
        (header::CONTENT_TYPE, content_type(&path).to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename.replace('"', "_")),
        ),
    ];
    Ok((StatusCode::OK, headers, bytes).into_response())
}

#[derive(Debug, Deserialize)]
pub(super) struct CleanupRequest {
    files: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub(super) struct CleanupFailure {
    file: String,
    error: String,
}

#[derive(Debug, Serialize)]
pub(super) struct CleanupResponse {
    deleted: Vec<String>,
    errors: Vec<CleanupFailure>,
}

/// Delete each listed file independently; missing files are skipped.
pub(super) async fn cleanup(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CleanupRequest>, JsonRejection>,
) -> Result<Json<CleanupResponse>, ServiceError> {
    cleanup_files(&state, payload)
        .await
        .inspect_err(|e| log_failure("Cleanup", e))
        .map(Json)
}

async fn cleanup_files(
    state: &AppState,
    payload: Result<Json<CleanupRequest>, JsonRejection>,
) -> ServiceResult<CleanupResponse> {
    let Json(req) = payload.map_err(json_error)?;
    let files = req
        .files
        .ok_or_else(|| ServiceError::bad_request("files list required"))?;

    let mut deleted = Vec::new();
    let mut errors = Vec::new();
    for file in files {
        let path = match state.workspace.resolve(&file) {
            Ok(path) => path,
            Err(e) => {
                errors.push(CleanupFailure {
                    file,
                    error: e.to_string(),
                });
                continue;
            }
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => deleted.push(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => errors.push(CleanupFailure {
                file,
                error: e.to_string(),
            }),
        }
    }

    if !errors.is_empty() {
        warn!("Cleanup finished with {} error(s)", errors.len());
    }
    Ok(CleanupResponse { deleted, errors })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type() {
        assert_eq!(content_type(Path::new("a.WAV")), "audio/wav");
        assert_eq!(content_type(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(content_type(Path::new("a")), "application/octet-stream");
    }
}
