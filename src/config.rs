use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::{
    errors::{DomainError, DomainResult},
    model::{ModelId, YoloParams},
};

/// Server configuration: command-line flags with environment fallbacks.
#[derive(Debug, Clone, Parser)]
#[command(name = "fault-inspector", version, about = "YOLO fault detection web demo")]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    #[arg(long, env = "FAULT_BIND", default_value = "0.0.0.0:8090")]
    pub bind: String,

    /// ONNX export of the detection/segmentation model.
    #[arg(long, env = "FAULT_MODEL", default_value = "models/best.onnx")]
    pub model: PathBuf,

    /// Label file (one class per line), used when the model has no `names` metadata.
    #[arg(long, env = "FAULT_LABELS")]
    pub labels: Option<PathBuf>,

    /// TTF/OTF font for box labels; boxes are drawn without text if absent.
    #[arg(long, env = "FAULT_FONT")]
    pub font: Option<PathBuf>,

    #[arg(long, env = "FAULT_INPUT_SIZE", default_value_t = 640)]
    pub input_size: u32,

    /// Default confidence threshold of new sessions.
    #[arg(long, env = "FAULT_CONF", default_value_t = 0.5)]
    pub conf: f32,

    #[arg(long, env = "FAULT_IOU", default_value_t = 0.45)]
    pub iou: f32,

    #[arg(long, env = "FAULT_MAX_DET", default_value_t = 100)]
    pub max_det: usize,

    /// Where processed videos are written (defaults to the system temp dir).
    #[arg(long, env = "FAULT_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    #[arg(long, env = "FAULT_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Base URL of the fault backend, e.g. `http://localhost:8080`. Notification is off when unset.
    #[arg(long, env = "FAULT_BACKEND_URL")]
    pub backend_url: Option<String>,

    #[arg(long, env = "FAULT_BACKEND_TIMEOUT_SECS", default_value_t = 10)]
    pub backend_timeout_secs: u64,

    /// Externally reachable base URL of this server, used in `image_url`.
    #[arg(long, env = "FAULT_PUBLIC_URL", default_value = "http://localhost:8090")]
    pub public_url: String,

    #[arg(long, env = "FAULT_MAX_UPLOAD_MB", default_value_t = 200)]
    pub max_upload_mb: usize,

    /// Sessions untouched for this long are closed and their videos deleted.
    #[arg(long, env = "FAULT_SESSION_TTL_SECS", default_value_t = 3600)]
    pub session_ttl_secs: u64,

    #[arg(long, env = "FAULT_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: String,

    #[arg(long, env = "FAULT_FFPROBE", default_value = "ffprobe")]
    pub ffprobe: String,
}

impl AppConfig {
    pub fn yolo_params(&self) -> YoloParams {
        YoloParams {
            input_size: self.input_size,
            conf_threshold: self.conf,
            iou_threshold: self.iou,
            max_detections: self.max_det,
        }
    }

    pub fn model_id(&self) -> ModelId {
        let name = self
            .model
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yolo".to_string());
        ModelId { name, onnx_path: self.model.to_string_lossy().into_owned() }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("fault-inspector"))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// How often idle sessions are looked for: every minute, or sooner for short TTLs.
    pub fn sweep_interval(&self) -> Duration {
        self.session_ttl().min(Duration::from_secs(60))
    }

    /// Backend URL with blanks treated as unset.
    pub fn backend_url(&self) -> Option<&str> {
        self.backend_url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    pub fn validate(&self) -> DomainResult<()> {
        self.yolo_params().validate()?;
        if let Some(url) = self.backend_url() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(DomainError::InvalidInput(format!("backend url must be http(s): {url}")));
            }
        }
        if self.max_upload_mb == 0 {
            return Err(DomainError::InvalidInput("max upload size must be > 0".into()));
        }
        if self.session_ttl_secs == 0 {
            return Err(DomainError::InvalidInput("session ttl must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = AppConfig::parse_from(["fault-inspector"]);
        assert_eq!(cfg.bind, "0.0.0.0:8090");
        assert_eq!(cfg.model_id().name, "best");
        assert_eq!(cfg.yolo_params(), YoloParams::default());
        assert_eq!(cfg.max_upload_bytes(), 200 * 1024 * 1024);
        assert_eq!(cfg.session_ttl(), Duration::from_secs(3600));
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(60));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn flags_override_and_validate() {
        let cfg = AppConfig::parse_from([
            "fault-inspector",
            "--model",
            "weights/parts.onnx",
            "--conf",
            "0.3",
            "--backend-url",
            "http://backend:8080/",
        ]);
        assert_eq!(cfg.model_id().name, "parts");
        assert_eq!(cfg.yolo_params().conf_threshold, 0.3);
        assert_eq!(cfg.backend_url(), Some("http://backend:8080/"));
        assert!(cfg.validate().is_ok());

        let bad = AppConfig::parse_from(["fault-inspector", "--backend-url", "backend:8080"]);
        assert!(bad.validate().is_err());

        let blank = AppConfig::parse_from(["fault-inspector", "--backend-url", "  "]);
        assert_eq!(blank.backend_url(), None);

        let short = AppConfig::parse_from(["fault-inspector", "--session-ttl-secs", "20"]);
        assert_eq!(short.sweep_interval(), Duration::from_secs(20));
        let zero = AppConfig::parse_from(["fault-inspector", "--session-ttl-secs", "0"]);
        assert!(zero.validate().is_err());
    }
}
