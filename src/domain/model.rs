use serde::{Deserialize, Serialize};

use super::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelId {
    pub name: String,       // logical name, e.g. "best"
    pub onnx_path: String,  // filesystem path
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YoloParams {
    pub input_size: u32,        // 640 typical
    pub conf_threshold: f32,    // 0..1
    pub iou_threshold: f32,     // 0..1
    pub max_detections: usize,  // e.g. 300
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.5,
            iou_threshold: 0.45,
            max_detections: 100,
        }
    }
}

impl YoloParams {
    pub fn validate(&self) -> DomainResult<()> {
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(DomainError::InvalidInput(format!(
                "input_size must be a positive multiple of 32, got {}",
                self.input_size
            )));
        }
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            return Err(DomainError::InvalidInput(format!(
                "conf_threshold out of range: {}",
                self.conf_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(DomainError::InvalidInput(format!(
                "iou_threshold out of range: {}",
                self.iou_threshold
            )));
        }
        if self.max_detections == 0 {
            return Err(DomainError::InvalidInput("max_detections must be > 0".into()));
        }
        Ok(())
    }

    /// Same parameters with a different confidence threshold.
    pub fn with_confidence(&self, conf: f32) -> Self {
        Self { conf_threshold: conf, ..self.clone() }
    }
}

/// Ordered label list of the loaded model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClassNames(Vec<String>);

impl ClassNames {
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    /// Parses an Ultralytics `names` metadata entry: `{0: 'crack', 1: 'scratch'}`.
    pub fn from_ultralytics_metadata(raw: &str) -> Option<Self> {
        let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
        let mut pairs: Vec<(usize, String)> = Vec::new();
        for entry in body.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (idx, name) = entry.split_once(':')?;
            let idx = idx.trim().parse::<usize>().ok()?;
            let name = name.trim().trim_matches(|c| c == '\'' || c == '"').to_string();
            pairs.push((idx, name));
        }
        if pairs.is_empty() {
            return None;
        }
        pairs.sort_by_key(|(idx, _)| *idx);
        Some(Self(pairs.into_iter().map(|(_, name)| name).collect()))
    }

    /// One label per non-empty line.
    pub fn from_lines(text: &str) -> Self {
        Self(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    pub fn label(&self, class_id: usize) -> String {
        self.0
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}
