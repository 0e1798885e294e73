use serde::{Deserialize, Serialize};

use crate::domain::{
    detection::Detection,
    fault::NotifyOutcome,
    model::YoloParams,
    session::{InputMode, SessionId},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectModeRequest {
    pub input_type: InputMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceRequest {
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub model_loaded: bool,
    pub model_name: String,
    pub classes: Vec<String>,
    pub backend_configured: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub model_path: String,
    pub yolo: YoloParams,
    pub image_types: Vec<String>,
    pub video_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictJsonResponse {
    pub detections: Vec<Detection>,
    pub detection_count: usize,
    pub processing_time_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResultResponse {
    pub session_id: SessionId,
    pub detections: Vec<Detection>,
    pub detection_count: usize,
    pub processing_time_secs: f64,
    pub summary: String,
    /// Annotated image, base64 PNG.
    pub image_png_base64: String,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotifyOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoResultResponse {
    pub session_id: SessionId,
    /// Boxes on the first frame.
    pub detection_count: usize,
    pub total_detections: usize,
    pub frames: usize,
    pub fps: f32,
    pub processing_time_secs: f64,
    pub video_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
