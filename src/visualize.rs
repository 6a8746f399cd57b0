//! Box overlays for annotated output images.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::{BoundingBox, Detection};
use crate::eval::Annotation;

pub const DETECTION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const GROUND_TRUTH_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const BOX_THICKNESS: u32 = 2;
const TEXT_SCALE: f32 = 14.0;

/// Draws boxes, and their labels when a TrueType font is available.
pub struct Visualizer {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Default for Visualizer {
    fn default() -> Self {
        Self {
            font: None,
            scale: PxScale::from(TEXT_SCALE),
        }
    }
}

impl Visualizer {
    pub fn new(font_path: Option<&Path>) -> Result<Self> {
        let Some(path) = font_path else {
            return Ok(Self::default());
        };
        let bytes =
            std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))?;
        Ok(Self {
            font: Some(font),
            ..Self::default()
        })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn draw_box(&self, canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, text: &str) {
        for inset in 0..BOX_THICKNESS {
            let (w, h) = (
                bbox.width.saturating_sub(2 * inset),
                bbox.height.saturating_sub(2 * inset),
            );
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at(bbox.x + inset as i32, bbox.y + inset as i32).of_size(w, h);
            draw_hollow_rect_mut(canvas, rect, color);
        }
        if let Some(font) = &self.font {
            let top = bbox.y - self.scale.y as i32 - 2;
            draw_text_mut(canvas, color, bbox.x, top.max(0), self.scale, font, text);
        }
    }

    /// Detections in green, labelled with their class.
    pub fn draw_detections(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = image.clone();
        for d in detections {
            self.draw_box(&mut canvas, &d.bbox, DETECTION_COLOR, &d.label);
        }
        canvas
    }

    /// Ground truth in blue (`GT: label`) under detections in green (`DET: label`).
    pub fn draw_evaluation(
        &self,
        image: &RgbImage,
        detections: &[Detection],
        ground_truth: &[Annotation],
    ) -> RgbImage {
        let mut canvas = image.clone();
        for gt in ground_truth {
            let text = format!("GT: {}", gt.label);
            self.draw_box(&mut canvas, &gt.bbox, GROUND_TRUTH_COLOR, &text);
        }
        for d in detections {
            let text = format!("DET: {}", d.label);
            self.draw_box(&mut canvas, &d.bbox, DETECTION_COLOR, &text);
        }
        canvas
    }
}

/// Encode as JPEG (by extension) after creating the parent directory.
pub fn save_image(image: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    image
        .save(path)
        .with_context(|| format!("write image {}", path.display()))
}
