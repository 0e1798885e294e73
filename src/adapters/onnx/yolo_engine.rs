use anyhow::{anyhow, Result};
use image::{imageops::FilterType, RgbImage};
use ndarray::{s, Array4, ArrayView2, ArrayViewD, Axis, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Value;
use std::fs;
use tracing::{debug, info, warn};

use crate::domain::detection::{non_max_suppression, Detection};
use crate::domain::model::{ClassNames, YoloParams};

/// Key Ultralytics exports write the label dictionary under.
const NAMES_METADATA_KEY: &str = "names";

/// Mask coefficients a segmentation head appends after the class scores.
const MASK_COEFFICIENTS: usize = 32;

/// Without labels every row after the box is scored as a class. Past
/// `4 + 32` rows that likely includes a segmentation head's mask coefficients.
pub fn unlabeled_mask_rows_suspected(attributes: usize, names: &ClassNames) -> bool {
    names.is_empty() && attributes > 4 + MASK_COEFFICIENTS
}

pub struct OnnxYoloEngine {
    session: Session,
    names: ClassNames,
    warned_unlabeled: bool,
}

impl OnnxYoloEngine {
    /// Loads the model; `fallback_names` is used when the file carries no `names` metadata.
    pub fn load(path: &str, fallback_names: ClassNames) -> Result<Self> {
        let model_bytes = fs::read(path)?;
        let mut builder = Session::builder()?.with_intra_threads(4)?;

        // CUDA is optional: registered when available, otherwise CPU.
        let cuda = CUDAExecutionProvider::default().build();
        if let Ok(builder_with_cuda) = builder.clone().with_execution_providers([cuda]) {
            builder = builder_with_cuda;
        }

        let session = builder.commit_from_memory(&model_bytes)?;

        let embedded = session
            .metadata()
            .ok()
            .and_then(|m| m.custom(NAMES_METADATA_KEY).ok().flatten())
            .and_then(|raw| ClassNames::from_ultralytics_metadata(&raw));
        let names = match embedded {
            Some(names) => {
                info!("Model {} declares {} classes", path, names.len());
                names
            }
            None => fallback_names,
        };

        if names.is_empty() {
            warn!("Model {} has no class names; pass --labels for readable labels", path);
        }

        Ok(Self { session, names, warned_unlabeled: false })
    }

    pub fn names(&self) -> &ClassNames {
        &self.names
    }

    pub fn infer(&mut self, rgb: &RgbImage, params: &YoloParams) -> Result<Vec<Detection>> {
        let imgsz = params.input_size as usize;
        let resized = image::imageops::resize(rgb, imgsz as u32, imgsz as u32, FilterType::Triangle);

        let mut input = Array4::<f32>::zeros((1, 3, imgsz, imgsz));
        for (x, y, pixel) in resized.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
            input[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
            input[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
        }

        let input_shape = vec![1, 3, imgsz as i64, imgsz as i64];
        let (raw, _) = input.into_raw_vec_and_offset();
        let input_tensor = Value::from_array((input_shape, raw))?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;
        let (shape_out, data_out) = outputs[0].try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = shape_out.iter().map(|&x| x as usize).collect();
        if dims.len() != 3 {
            return Err(anyhow!("unexpected output rank {:?}", dims));
        }
        let array_view = ArrayViewD::from_shape(IxDyn(&dims), data_out)?;
        let batch = array_view.index_axis(Axis(0), 0);
        let mut view = batch.into_dimensionality::<ndarray::Ix2>()?;
        // Some exports emit [N, 4+C] instead of [4+C, N].
        if view.shape()[0] > view.shape()[1] {
            view = view.reversed_axes();
        }
        debug!("Output {:?} -> attributes x candidates {:?}", dims, view.shape());
        if !self.warned_unlabeled && unlabeled_mask_rows_suspected(view.shape()[0], &self.names) {
            warn!(
                "Output has {} rows per candidate but no labels are known; mask coefficients of a \
                 segmentation export will be scored as classes. Pass --labels to fix the class count",
                view.shape()[0]
            );
            self.warned_unlabeled = true;
        }

        let scale = (
            rgb.width() as f32 / imgsz as f32,
            rgb.height() as f32 / imgsz as f32,
        );
        Ok(decode_predictions(view, &self.names, scale, params))
    }
}

/// Decodes a YOLOv8-style `[4 + C (+ mask coeffs), N]` prediction matrix.
///
/// Rows 0..4 hold `cx, cy, w, h` in network pixels; the next `C` rows hold class
/// scores. Segmentation heads append mask coefficients after the class rows, so
/// when the label count is known only that many score rows are read.
pub fn decode_predictions(
    view: ArrayView2<f32>,
    names: &ClassNames,
    scale: (f32, f32),
    params: &YoloParams,
) -> Vec<Detection> {
    let attributes = view.shape()[0];
    if attributes <= 4 {
        return Vec::new();
    }
    let num_classes = if names.is_empty() {
        attributes - 4
    } else {
        names.len().min(attributes - 4)
    };
    let (sx, sy) = scale;
    let num_candidates = view.shape()[1];

    let mut detections = Vec::new();
    for i in 0..num_candidates {
        let scores = view.slice(s![4..4 + num_classes, i]);
        let Some((class_id, &max_score)) = scores
            .indexed_iter()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
        else {
            continue;
        };

        if max_score > params.conf_threshold {
            let cx = view[[0, i]];
            let cy = view[[1, i]];
            let w = view[[2, i]];
            let h = view[[3, i]];

            detections.push(Detection {
                x1: (cx - w / 2.0) * sx,
                y1: (cy - h / 2.0) * sy,
                x2: (cx + w / 2.0) * sx,
                y2: (cy + h / 2.0) * sy,
                score: max_score,
                class_id,
                label: names.label(class_id),
            });
        }
    }

    let detections = non_max_suppression(detections, params.iou_threshold);
    detections.into_iter().take(params.max_detections).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn names() -> ClassNames {
        ClassNames::new(vec!["crack".into(), "scratch".into()])
    }

    /// Builds a `[4 + 2, N]` matrix from (cx, cy, w, h, s0, s1) columns.
    fn predictions(cols: &[[f32; 6]]) -> Array2<f32> {
        let mut m = Array2::<f32>::zeros((6, cols.len()));
        for (i, c) in cols.iter().enumerate() {
            for (r, v) in c.iter().enumerate() {
                m[[r, i]] = *v;
            }
        }
        m
    }

    #[test]
    fn filters_by_confidence_and_scales_boxes() {
        let m = predictions(&[
            [100.0, 100.0, 20.0, 40.0, 0.9, 0.1],
            [300.0, 300.0, 10.0, 10.0, 0.2, 0.3],
        ]);
        let params = YoloParams { conf_threshold: 0.5, ..YoloParams::default() };
        let dets = decode_predictions(m.view(), &names(), (2.0, 0.5), &params);

        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!(d.label, "crack");
        assert_eq!((d.x1, d.x2), (180.0, 220.0));
        assert_eq!((d.y1, d.y2), (40.0, 60.0));
    }

    #[test]
    fn applies_nms_and_max_detections() {
        let m = predictions(&[
            [50.0, 50.0, 20.0, 20.0, 0.9, 0.0],
            [51.0, 51.0, 20.0, 20.0, 0.8, 0.0],
            [200.0, 200.0, 20.0, 20.0, 0.0, 0.7],
            [400.0, 400.0, 20.0, 20.0, 0.0, 0.6],
        ]);
        let params = YoloParams { conf_threshold: 0.25, max_detections: 2, ..YoloParams::default() };
        let dets = decode_predictions(m.view(), &names(), (1.0, 1.0), &params);

        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].score, 0.9);
        assert_eq!(dets[1].label, "scratch");
    }

    #[test]
    fn flags_unlabeled_outputs_wide_enough_to_hold_masks() {
        // yolov8-seg with 2 classes: 4 + 2 + 32 rows.
        assert!(unlabeled_mask_rows_suspected(38, &ClassNames::default()));
        assert!(!unlabeled_mask_rows_suspected(38, &names()));
        // Plain detector with 2 classes.
        assert!(!unlabeled_mask_rows_suspected(6, &ClassNames::default()));
    }

    #[test]
    fn ignores_mask_coefficients_when_labels_known() {
        // 4 box rows + 2 class rows + 1 mask coefficient row.
        let mut m = Array2::<f32>::zeros((7, 1));
        m[[0, 0]] = 10.0;
        m[[1, 0]] = 10.0;
        m[[2, 0]] = 4.0;
        m[[3, 0]] = 4.0;
        m[[5, 0]] = 0.6;
        m[[6, 0]] = 5.0;
        let dets = decode_predictions(m.view(), &names(), (1.0, 1.0), &YoloParams::default());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
    }
}
