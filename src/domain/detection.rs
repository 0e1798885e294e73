use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One box reported by the model, in source-image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
    pub label: String,
}

impl Detection {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// "2 crack, 1 scratch" style summary, grouped by label.
pub fn summarize_detections(detections: &[Detection]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for det in detections {
        *counts.entry(det.label.as_str()).or_insert(0) += 1;
    }
    counts
        .iter()
        .map(|(label, count)| format!("{} {}", count, label))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn best_detection(detections: &[Detection]) -> Option<&Detection> {
    detections
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
}

/// Intersection over union of two boxes.
pub fn iou(a: &Detection, b: &Detection) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Class-aware non-maximum suppression. Output is sorted by descending score.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_unstable_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && iou(k, &det) >= iou_threshold);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: usize, label: &str) -> Detection {
        Detection { x1, y1, x2, y2, score, class_id, label: label.into() }
    }

    #[test]
    fn summary_groups_by_label() {
        let dets = vec![
            det(0.0, 0.0, 1.0, 1.0, 0.9, 0, "crack"),
            det(0.0, 0.0, 1.0, 1.0, 0.8, 1, "scratch"),
            det(0.0, 0.0, 1.0, 1.0, 0.7, 0, "crack"),
        ];
        assert_eq!(summarize_detections(&dets), "2 crack, 1 scratch");
        assert_eq!(summarize_detections(&[]), "");
    }

    #[test]
    fn best_detection_picks_highest_score() {
        let dets = vec![
            det(0.0, 0.0, 1.0, 1.0, 0.4, 0, "crack"),
            det(0.0, 0.0, 1.0, 1.0, 0.95, 1, "dent"),
            det(0.0, 0.0, 1.0, 1.0, 0.6, 2, "scratch"),
        ];
        assert_eq!(best_detection(&dets).map(|d| d.label.as_str()), Some("dent"));
        assert!(best_detection(&[]).is_none());
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = det(0.0, 0.0, 10.0, 10.0, 0.9, 0, "a");
        let b = det(20.0, 20.0, 30.0, 30.0, 0.9, 0, "a");
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &b), 0.0);

        let half = det(5.0, 0.0, 15.0, 10.0, 0.9, 0, "a");
        // 50 / 150
        assert!((iou(&a, &half) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn nms_suppresses_overlaps_within_class_only() {
        let dets = vec![
            det(0.0, 0.0, 10.0, 10.0, 0.8, 0, "crack"),
            det(1.0, 1.0, 10.0, 10.0, 0.9, 0, "crack"),
            det(0.0, 0.0, 10.0, 10.0, 0.7, 1, "scratch"),
            det(50.0, 50.0, 60.0, 60.0, 0.5, 0, "crack"),
        ];
        let kept = non_max_suppression(dets, 0.45);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].score, 0.9);
        assert!(kept.iter().any(|d| d.class_id == 1));
        assert!(kept.iter().any(|d| d.x1 == 50.0));
    }
}
