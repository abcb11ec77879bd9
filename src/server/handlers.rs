//! Route handlers.
//!
//! Submission handlers only parse the request and create a job; the work
//! itself runs on the [`JobRunner`](crate::job::JobRunner).

use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

use super::AppState;
use super::auth::{api_key_from_headers, require_api_key};
use super::response::{ApiError, JobActionResponse, SubmitResponse};
use super::upload::{Upload, WebRequest};
use crate::error::ServiceError;
use crate::job::{JobId, JobSnapshot, JobWork};
use crate::model::{ConversionOptions, RequestType};

type Accepted = (StatusCode, Json<SubmitResponse>);

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// `POST /document/file`
#[instrument(skip_all)]
pub async fn convert_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Accepted, ApiError> {
    let mut upload = Upload::read(multipart).await?;
    let options = with_header_key(upload.options.clone(), &headers)?;
    let file = upload.single_file()?;
    Ok(submit(&state, JobWork::Single(file.into_request(RequestType::File, options))))
}

/// `POST /multimedia/audio`
#[instrument(skip_all)]
pub async fn convert_audio(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Accepted, ApiError> {
    convert_media(state, &headers, multipart, RequestType::Audio).await
}

/// `POST /multimedia/video`
#[instrument(skip_all)]
pub async fn convert_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Accepted, ApiError> {
    convert_media(state, &headers, multipart, RequestType::Video).await
}

async fn convert_media(
    state: AppState,
    headers: &HeaderMap,
    multipart: Multipart,
    request_type: RequestType,
) -> Result<Accepted, ApiError> {
    let key = require_api_key(headers, &format!("{request_type} conversion"))?;
    let mut upload = Upload::read(multipart).await?;
    let mut options = upload.options.clone();
    options.api_key = Some(key);
    let file = upload.single_file()?;
    Ok(submit(&state, JobWork::Single(file.into_request(request_type, options))))
}

/// `POST /web/url`
#[instrument(skip_all)]
pub async fn convert_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<WebRequest>,
) -> Result<Accepted, ApiError> {
    convert_web(&state, &headers, body, RequestType::Url)
}

/// `POST /web/parent-url`
#[instrument(skip_all)]
pub async fn convert_parent_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<WebRequest>,
) -> Result<Accepted, ApiError> {
    convert_web(&state, &headers, body, RequestType::ParentUrl)
}

/// `POST /web/youtube`
#[instrument(skip_all)]
pub async fn convert_youtube(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<WebRequest>,
) -> Result<Accepted, ApiError> {
    convert_web(&state, &headers, body, RequestType::Youtube)
}

fn convert_web(
    state: &AppState,
    headers: &HeaderMap,
    mut body: WebRequest,
    request_type: RequestType,
) -> Result<Accepted, ApiError> {
    body.options = with_header_key(body.options, headers)?;
    Ok(submit(state, JobWork::Single(body.into_request(request_type))))
}

/// `POST /batch`
///
/// File parts become `file` items, unless their MIME type says audio or
/// video. Web entries come from the `items` JSON field.
#[instrument(skip_all)]
pub async fn convert_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Accepted, ApiError> {
    let upload = Upload::read(multipart).await?;
    let options = with_header_key(upload.options, &headers)?;

    let mut requests = Vec::with_capacity(upload.files.len() + upload.items.len());
    for file in upload.files {
        let request_type = match file.content_type.as_deref() {
            Some(mime) if mime.starts_with("audio/") => RequestType::Audio,
            Some(mime) if mime.starts_with("video/") => RequestType::Video,
            _ => RequestType::File,
        };
        requests.push(file.into_request(request_type, options.clone()));
    }
    for item in upload.items {
        let mut request = item.into_request(&options)?;
        if request.options.api_key.is_none() {
            request.options.api_key.clone_from(&options.api_key);
        }
        requests.push(request);
    }
    if requests.is_empty() {
        return Err(ServiceError::validation("batch contains no items").into());
    }
    debug!(items = requests.len(), "batch accepted");
    Ok(submit(&state, JobWork::Batch(requests)))
}

/// `GET /job/:job_id/status`
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    let id = parse_job_id(&job_id)?;
    state
        .runner
        .manager()
        .get_job(id)
        .map(Json)
        .ok_or_else(|| crate::job::JobError::not_found(id).into())
}

/// `DELETE /job/:job_id`
///
/// Cancels a live job; evicts a finished one together with its archive.
#[instrument(skip(state))]
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<(StatusCode, Json<JobActionResponse>), ApiError> {
    let id = parse_job_id(&job_id)?;
    let manager = state.runner.manager();
    if manager.cancel_job(id)? {
        return Ok((
            StatusCode::ACCEPTED,
            Json(JobActionResponse {
                job_id: id,
                action: "cancelled",
            }),
        ));
    }
    manager.evict_job(id).await?;
    Ok((
        StatusCode::OK,
        Json(JobActionResponse {
            job_id: id,
            action: "evicted",
        }),
    ))
}

/// `GET /download/:job_id/:filename`
#[instrument(skip(state))]
pub async fn download(
    State(state): State<AppState>,
    Path((job_id, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let id = parse_job_id(&job_id)?;
    let path = state.runner.manager().get_job_result_path(id, &filename)?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|source| ApiError::Io { id, source })?;
    let length = file
        .metadata()
        .await
        .map_err(|source| ApiError::Io { id, source })?
        .len();

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&filename)) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name.
pub(crate) fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn submit(state: &AppState, work: JobWork) -> Accepted {
    let id = state.runner.submit(work);
    let status_url = state.runner.manager().status_url(id);
    (
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: id,
            status_url,
        }),
    )
}

fn with_header_key(
    mut options: ConversionOptions,
    headers: &HeaderMap,
) -> Result<ConversionOptions, ServiceError> {
    if let Some(key) = api_key_from_headers(headers)? {
        options.api_key = Some(key);
    }
    Ok(options)
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse().map_err(|_| ApiError::InvalidJobId(raw.to_string()))
}
