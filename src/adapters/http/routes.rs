use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::{prelude::BASE64_STANDARD, Engine};
use std::collections::HashMap;
use uuid::Uuid;

use crate::adapters::http::error::{ApiError, ApiResult};
use crate::adapters::http::state::HttpState;
use crate::application::dto::{
    ConfidenceRequest, ConfigResponse, ImageResultResponse, PredictJsonResponse, SelectModeRequest,
    StatusResponse, VideoResultResponse,
};
use crate::application::services::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use crate::domain::{detection::summarize_detections, errors::DomainError, session::SessionId};

/// Multipart form: the `file` part plus any plain text fields.
struct Upload {
    bytes: Vec<u8>,
    filename: String,
    fields: HashMap<String, String>,
}

impl Upload {
    fn flag(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes"))
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, DomainError> {
    let bad = |e: axum::extract::multipart::MultipartError| DomainError::InvalidInput(format!("bad multipart body: {e}"));

    let mut file: Option<(Vec<u8>, String)> = None;
    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let bytes = field.bytes().await.map_err(bad)?;
            file = Some((bytes.to_vec(), filename));
        } else {
            let value = field.text().await.map_err(bad)?;
            fields.insert(name, value);
        }
    }

    let (bytes, filename) = file.ok_or_else(|| DomainError::InvalidInput("missing 'file' field".into()))?;
    Ok(Upload { bytes, filename, fields })
}

fn parse_session_id(raw: &str) -> Result<SessionId, DomainError> {
    Uuid::parse_str(raw).map_err(|_| DomainError::InvalidInput(format!("invalid session id '{raw}'")))
}

pub async fn status(State(st): State<HttpState>) -> impl IntoResponse {
    Json(StatusResponse {
        model_loaded: st.detection.model_loaded(),
        model_name: st.detection.model_name(),
        classes: st.detection.class_names(),
        backend_configured: st.detection.backend_configured(),
    })
}

pub async fn get_config(State(st): State<HttpState>) -> impl IntoResponse {
    Json(ConfigResponse {
        model_path: st.detection.model_path().to_string(),
        yolo: st.detection.params().clone(),
        image_types: IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        video_types: VIDEO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
    })
}

pub async fn predict_json(State(st): State<HttpState>, multipart: Multipart) -> ApiResult<impl IntoResponse> {
    let upload = read_upload(multipart).await?;
    let out = st.detection.predict_json(upload.bytes).await?;
    Ok(Json(PredictJsonResponse {
        detection_count: out.detections.len(),
        processing_time_secs: out.elapsed.as_secs_f64(),
        detections: out.detections,
    }))
}

pub async fn predict_image(State(st): State<HttpState>, multipart: Multipart) -> ApiResult<impl IntoResponse> {
    let upload = read_upload(multipart).await?;
    let png = st.detection.predict_image(upload.bytes).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

pub async fn create_session(State(st): State<HttpState>) -> ApiResult<impl IntoResponse> {
    Ok((StatusCode::CREATED, Json(st.sessions.create()?)))
}

pub async fn get_session(State(st): State<HttpState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_session_id(&id)?;
    Ok(Json(st.sessions.view(id)?))
}

pub async fn close_session(State(st): State<HttpState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_session_id(&id)?;
    st.sessions.close(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn select_mode(
    State(st): State<HttpState>,
    Path(id): Path<String>,
    Json(req): Json<SelectModeRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_session_id(&id)?;
    Ok(Json(st.sessions.select_mode(id, req.input_type)?))
}

pub async fn set_confidence(
    State(st): State<HttpState>,
    Path(id): Path<String>,
    Json(req): Json<ConfidenceRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_session_id(&id)?;
    Ok(Json(st.sessions.set_confidence(id, req.confidence)?))
}

pub async fn reset_session(State(st): State<HttpState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_session_id(&id)?;
    Ok(Json(st.sessions.reset(id).await?))
}

pub async fn process_image(
    State(st): State<HttpState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let id = parse_session_id(&id)?;
    let upload = read_upload(multipart).await?;

    // Notification only when asked for and a product id is given.
    let product = if upload.flag("notify") {
        Some(upload.fields.get("product_id").cloned().unwrap_or_default())
    } else {
        None
    };

    let out = st.detection.process_image(id, upload.bytes, product).await?;
    Ok(Json(ImageResultResponse {
        session_id: id,
        detection_count: out.detections.len(),
        processing_time_secs: out.elapsed.as_secs_f64(),
        summary: summarize_detections(&out.detections),
        image_png_base64: BASE64_STANDARD.encode(&out.png),
        image_url: format!("/api/sessions/{id}/image"),
        notification: out.notification,
        detections: out.detections,
    }))
}

pub async fn processed_image(State(st): State<HttpState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_session_id(&id)?;
    let png = st.sessions.processed_image(id)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

pub async fn process_video(
    State(st): State<HttpState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let id = parse_session_id(&id)?;
    let upload = read_upload(multipart).await?;
    let out = st.detection.process_video(id, upload.bytes, &upload.filename).await?;
    Ok(Json(VideoResultResponse {
        session_id: id,
        detection_count: out.detection_count,
        total_detections: out.total_detections,
        frames: out.frames,
        fps: out.fps,
        processing_time_secs: out.elapsed.as_secs_f64(),
        video_url: format!("/api/sessions/{id}/video"),
    }))
}

pub async fn processed_video(State(st): State<HttpState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let id = parse_session_id(&id)?;
    let path = st.sessions.processed_video(id)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError(DomainError::NotFound(format!("processed video unavailable: {e}"))))?;
    Ok(([(header::CONTENT_TYPE, "video/mp4")], bytes))
}

pub async fn get_fault(State(st): State<HttpState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(st.detection.reports().fetch_fault(&id).await?))
}
