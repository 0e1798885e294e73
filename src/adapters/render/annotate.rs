use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::info;

use crate::application::ports::AnnotatorPort;
use crate::domain::detection::Detection;

const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

// Colour per class id, cycled.
const PALETTE: [[u8; 3]; 10] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
    [44, 153, 168],
    [0, 194, 255],
];

pub fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Draws boxes, and labels when a font is available.
pub struct BoxAnnotator {
    font: Option<FontVec>,
    scale: PxScale,
}

impl BoxAnnotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font, scale: PxScale::from(LABEL_FONT_SIZE) }
    }

    pub fn from_font_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
        let font = FontVec::try_from_vec(data).context("invalid font file")?;
        info!("Label font loaded from {}", path.display());
        Ok(Self::new(Some(font)))
    }

    fn draw_box(&self, image: &mut RgbImage, det: &Detection) {
        let (w, h) = (image.width() as i32, image.height() as i32);
        if w == 0 || h == 0 {
            return;
        }

        let x_min = (det.x1.floor() as i32).clamp(0, w - 1);
        let y_min = (det.y1.floor() as i32).clamp(0, h - 1);
        let x_max = (det.x2.ceil() as i32).clamp(0, w - 1);
        let y_max = (det.y2.ceil() as i32).clamp(0, h - 1);
        if x_min >= x_max || y_min >= y_max {
            return;
        }

        let color = class_color(det.class_id);
        for t in 0..BOX_THICKNESS {
            let bw = x_max - x_min - 2 * t;
            let bh = y_max - y_min - 2 * t;
            if bw <= 0 || bh <= 0 {
                break;
            }
            let rect = Rect::at(x_min + t, y_min + t).of_size(bw as u32 + 1, bh as u32 + 1);
            draw_hollow_rect_mut(image, rect, color);
        }

        let Some(font) = &self.font else {
            return;
        };

        let label = format!("{} {:.2}", det.label, det.score);
        let (text_w, text_h) = text_size(self.scale, font, &label);
        let label_w = text_w as i32 + 2 * LABEL_PADDING;
        let label_h = text_h as i32 + 2 * LABEL_PADDING;

        // Above the box, or inside it when there is no room.
        let label_x = x_min;
        let label_y = if y_min - label_h >= 0 { y_min - label_h } else { y_min };
        let label_w = label_w.min(w - label_x);
        if label_w <= 0 || label_h <= 0 {
            return;
        }

        let bg = Rect::at(label_x, label_y).of_size(label_w as u32, label_h as u32);
        draw_filled_rect_mut(image, bg, color);
        draw_text_mut(
            image,
            Rgb([255u8, 255u8, 255u8]),
            label_x + LABEL_PADDING,
            label_y + LABEL_PADDING,
            self.scale,
            font,
            &label,
        );
    }
}

impl AnnotatorPort for BoxAnnotator {
    fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut out = image.clone();
        for det in detections {
            self.draw_box(&mut out, det);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32, class_id: usize) -> Detection {
        Detection { x1, y1, x2, y2, score: 0.9, class_id, label: "crack".into() }
    }

    #[test]
    fn draws_outline_in_class_colour() {
        let img = RgbImage::from_pixel(50, 50, Rgb([0, 0, 0]));
        let out = BoxAnnotator::new(None).annotate(&img, &[det(10.0, 10.0, 30.0, 30.0, 1)]);

        let color = class_color(1);
        assert_eq!(*out.get_pixel(10, 10), color);
        assert_eq!(*out.get_pixel(30, 20), color);
        assert_eq!(*out.get_pixel(11, 20), color);
        // Interior and outside stay untouched.
        assert_eq!(*out.get_pixel(20, 20), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(40, 40), Rgb([0, 0, 0]));
        // Source frame is not modified.
        assert_eq!(*img.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn clamps_and_skips_degenerate_boxes() {
        let img = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        let annotator = BoxAnnotator::new(None);

        let out = annotator.annotate(&img, &[det(-5.0, -5.0, 100.0, 100.0, 0)]);
        assert_eq!(*out.get_pixel(0, 0), class_color(0));
        assert_eq!(*out.get_pixel(19, 19), class_color(0));

        let out = annotator.annotate(&img, &[det(5.0, 5.0, 5.0, 12.0, 0)]);
        assert_eq!(out, img);
    }

    #[test]
    fn palette_cycles() {
        assert_eq!(class_color(0), class_color(PALETTE.len()));
    }
}
