use async_trait::async_trait;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{
    detection::Detection,
    errors::DomainResult,
    fault::FaultReport,
    model::{ClassNames, ModelId, YoloParams},
    session::{SessionId, SessionState},
};

#[async_trait]
pub trait ModelCatalogPort: Send + Sync {
    async fn validate_model(&self, model: &ModelId) -> DomainResult<()>;
}

/// Black-box detector: one RGB frame in, boxes out.
#[async_trait]
pub trait DetectorPort: Send + Sync {
    fn is_loaded(&self) -> bool;
    fn model_name(&self) -> String;
    fn class_names(&self) -> ClassNames;
    async fn detect(&self, image: RgbImage, params: &YoloParams) -> DomainResult<Vec<Detection>>;
}

/// Plots detections onto a copy of the frame.
pub trait AnnotatorPort: Send + Sync {
    fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    pub frame_count: Option<u64>,
}

#[async_trait]
pub trait VideoCodecPort: Send + Sync {
    async fn probe(&self, input: &Path) -> DomainResult<VideoInfo>;
    /// Extracts every frame of `input` into `frames_dir` as numbered PNGs, in order.
    async fn decode_frames(&self, input: &Path, frames_dir: &Path) -> DomainResult<Vec<PathBuf>>;
    /// Encodes the numbered PNGs of `frames_dir` into an MP4 at `output`.
    async fn encode_frames(&self, frames_dir: &Path, fps: f32, output: &Path) -> DomainResult<()>;
}

pub trait SessionStorePort: Send + Sync {
    fn create(&self, confidence: f32) -> DomainResult<SessionState>;
    fn get(&self, id: SessionId) -> DomainResult<SessionState>;
    fn update(
        &self,
        id: SessionId,
        f: &mut dyn FnMut(&mut SessionState) -> DomainResult<()>,
    ) -> DomainResult<SessionState>;
    fn remove(&self, id: SessionId) -> DomainResult<SessionState>;
    /// Sessions nobody has read or updated for at least `ttl`.
    fn idle_sessions(&self, ttl: Duration) -> DomainResult<Vec<SessionId>>;
}

#[async_trait]
pub trait FaultSinkPort: Send + Sync {
    /// Returns the HTTP status the backend answered with (201 on success).
    async fn submit(&self, report: &FaultReport) -> DomainResult<u16>;
    async fn fetch(&self, id: &str) -> DomainResult<serde_json::Value>;
}
