use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use super::detection::Detection;
use super::errors::{DomainError, DomainResult};

pub type SessionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Image,
    Video,
}

impl std::fmt::Display for InputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputMode::Image => f.write_str("image"),
            InputMode::Video => f.write_str("video"),
        }
    }
}

/// Last result produced by a session.
#[derive(Debug, Clone)]
pub enum ProcessedArtifact {
    Image { png: Vec<u8> },
    Video { path: PathBuf },
}

/// Per-browser state that survives between page interactions.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: SessionId,
    pub input_mode: Option<InputMode>,
    pub confidence: f32,
    pub processed: Option<ProcessedArtifact>,
    pub detection_count: Option<usize>,
    pub processing_time: Option<Duration>,
    pub processing_complete: bool,
    pub last_detections: Vec<Detection>,
}

/// Serializable view of a session, without artifact bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionView {
    pub session_id: SessionId,
    pub input_type: Option<InputMode>,
    pub confidence: f32,
    pub processing_complete: bool,
    pub detection_count: Option<usize>,
    pub processing_time_secs: Option<f64>,
    pub has_processed_image: bool,
    pub has_processed_video: bool,
    pub summary: String,
}

impl SessionState {
    pub fn new(id: SessionId, confidence: f32) -> Self {
        Self {
            id,
            input_mode: None,
            confidence,
            processed: None,
            detection_count: None,
            processing_time: None,
            processing_complete: false,
            last_detections: Vec::new(),
        }
    }

    /// Only one input mode may be active; switching requires a reset.
    pub fn select_mode(&mut self, mode: InputMode) -> DomainResult<()> {
        match self.input_mode {
            None => {
                self.input_mode = Some(mode);
                Ok(())
            }
            Some(current) if current == mode => Ok(()),
            Some(current) => Err(DomainError::Conflict(format!(
                "session is in {current} mode; reset before selecting {mode}"
            ))),
        }
    }

    pub fn require_mode(&self, mode: InputMode) -> DomainResult<()> {
        match self.input_mode {
            Some(current) if current == mode => Ok(()),
            Some(current) => Err(DomainError::InvalidInput(format!(
                "session is in {current} mode, not {mode}"
            ))),
            None => Err(DomainError::InvalidInput(format!(
                "no input type selected; choose {mode} first"
            ))),
        }
    }

    pub fn set_confidence(&mut self, confidence: f32) -> DomainResult<()> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DomainError::InvalidInput(format!(
                "confidence must be within [0, 1], got {confidence}"
            )));
        }
        self.confidence = confidence;
        Ok(())
    }

    pub fn record_image(&mut self, png: Vec<u8>, detections: Vec<Detection>, elapsed: Duration) {
        self.detection_count = Some(detections.len());
        self.last_detections = detections;
        self.processed = Some(ProcessedArtifact::Image { png });
        self.processing_time = Some(elapsed);
        self.processing_complete = true;
    }

    pub fn record_video(
        &mut self,
        path: PathBuf,
        detection_count: usize,
        first_frame: Vec<Detection>,
        elapsed: Duration,
    ) {
        self.detection_count = Some(detection_count);
        self.last_detections = first_frame;
        self.processed = Some(ProcessedArtifact::Video { path });
        self.processing_time = Some(elapsed);
        self.processing_complete = true;
    }

    /// Clears everything but the confidence. Returns the stored video path
    /// so the caller can remove it from disk.
    pub fn reset(&mut self) -> Option<PathBuf> {
        let video = match self.processed.take() {
            Some(ProcessedArtifact::Video { path }) => Some(path),
            _ => None,
        };
        self.input_mode = None;
        self.detection_count = None;
        self.processing_time = None;
        self.processing_complete = false;
        self.last_detections.clear();
        video
    }

    pub fn processed_image(&self) -> Option<&[u8]> {
        match &self.processed {
            Some(ProcessedArtifact::Image { png }) if self.processing_complete => Some(png),
            _ => None,
        }
    }

    pub fn processed_video(&self) -> Option<&PathBuf> {
        match &self.processed {
            Some(ProcessedArtifact::Video { path }) if self.processing_complete => Some(path),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SessionView {
        SessionView {
            session_id: self.id,
            input_type: self.input_mode,
            confidence: self.confidence,
            processing_complete: self.processing_complete,
            detection_count: self.detection_count,
            processing_time_secs: self.processing_time.map(|d| d.as_secs_f64()),
            has_processed_image: self.processed_image().is_some(),
            has_processed_video: self.processed_video().is_some(),
            summary: super::detection::summarize_detections(&self.last_detections),
        }
    }
}
