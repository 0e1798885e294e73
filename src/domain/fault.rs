use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::detection::{best_detection, Detection};

/// Record forwarded to the fault backend (`POST /api/v1/faults`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultReport {
    pub product_id: String,
    pub fault_type: String,
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
    /// Seconds.
    pub processing_time: f64,
    pub image_url: String,
}

impl FaultReport {
    /// Builds a report from the most confident detection; `None` when nothing was detected.
    pub fn from_detections(
        product_id: &str,
        detections: &[Detection],
        elapsed: Duration,
        image_url: String,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let best = best_detection(detections)?;
        Some(Self {
            product_id: product_id.to_string(),
            fault_type: best.label.clone(),
            confidence: f64::from(best.score),
            detected_at: now,
            processing_time: elapsed.as_secs_f64(),
            image_url,
        })
    }
}

/// What the page shows after a notification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum NotifyOutcome {
    Sent { http_status: u16 },
    Skipped { reason: String },
    Failed { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn report_uses_best_detection() {
        let dets = vec![
            Detection { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0, score: 0.55, class_id: 0, label: "crack".into() },
            Detection { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0, score: 0.75, class_id: 1, label: "scratch".into() },
        ];
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let report = FaultReport::from_detections(
            "P-001",
            &dets,
            Duration::from_millis(250),
            "http://localhost:8090/api/sessions/x/image".into(),
            now,
        )
        .unwrap();

        assert_eq!(report.fault_type, "scratch");
        assert!((report.confidence - 0.75).abs() < 1e-6);
        assert_eq!(report.processing_time, 0.25);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["product_id"], "P-001");
        assert_eq!(json["detected_at"], "2024-05-01T08:30:00Z");
        for key in ["product_id", "fault_type", "confidence", "detected_at", "processing_time", "image_url"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn no_report_without_detections() {
        assert!(FaultReport::from_detections("P", &[], Duration::ZERO, String::new(), Utc::now()).is_none());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(NotifyOutcome::Sent { http_status: 201 }).unwrap();
        assert_eq!(json["status"], "sent");
        assert_eq!(json["http_status"], 201);
    }
}
