use std::sync::Arc;
use crate::application::services::{DetectionService, SessionService};

/// Shared state for the axum handlers: the application services (use cases).
#[derive(Clone)]
pub struct HttpState {
    /// Input type selection, confidence, reset and stored results.
    pub sessions: Arc<SessionService>,
    /// Upload → model → plot → notify.
    pub detection: Arc<DetectionService>,
    /// Request body cap for uploads.
    pub max_upload_bytes: usize,
}
