use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in integer pixel coordinates.
///
/// Covers columns `x .. x + width` and rows `y .. y + height`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box spanning `[xmin, xmax) x [ymin, ymax)`. `None` when either side is empty.
    pub fn from_corners(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Option<Self> {
        let width = xmax.checked_sub(xmin)?;
        let height = ymax.checked_sub(ymin)?;
        if width <= 0 || height <= 0 {
            return None;
        }
        Some(Self::new(xmin, ymin, width as u32, height as u32))
    }

    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> u64 {
        let left = (self.x as i64).max(other.x as i64);
        let top = (self.y as i64).max(other.y as i64);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return 0;
        }
        ((right - left) * (bottom - top)) as u64
    }

    /// Intersection over union. Zero when the boxes do not overlap.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let intersection = self.intersection_area(other);
        if intersection == 0 {
            return 0.0;
        }
        let union = self.area() + other.area() - intersection;
        intersection as f64 / union as f64
    }
}

/// Detection confidence for the classical pipeline: accept/reject only.
pub const FIXED_CONFIDENCE: f64 = 1.0;

/// A labelled box produced by a detector (or read back from a result record).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub bbox: BoundingBox,
    pub confidence: f64,
}

impl Detection {
    pub fn new(label: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            bbox,
            confidence: FIXED_CONFIDENCE,
        }
    }
}

/// Intermediate images of one detection call, kept for debug output.
#[derive(Clone, Debug)]
pub struct DebugStages {
    /// Grayscale input frame.
    pub gray: GrayImage,
    /// Tri-state model output rendered as 0 / 127 / 255.
    pub raw_mask: GrayImage,
    /// Binary mask after shadow removal and closing.
    pub cleaned: GrayImage,
}

/// Result of running the detection pipeline on one frame.
#[derive(Clone, Debug)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    /// Number of external contours considered by the geometric filter.
    pub candidates: usize,
    pub stages: DebugStages,
}

impl DetectionResult {
    pub fn boxes(&self) -> impl Iterator<Item = &BoundingBox> {
        self.detections.iter().map(|d| &d.bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BoundingBox::new(3, 4, 10, 20);
        assert_eq!(b.iou(&b), 1.0);
    }

    #[test]
    fn iou_of_disjoint_and_touching_boxes_is_zero() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let far = BoundingBox::new(50, 50, 5, 5);
        let touching = BoundingBox::new(10, 0, 10, 10);
        assert_eq!(a.iou(&far), 0.0);
        assert_eq!(a.iou(&touching), 0.0);
    }

    #[test]
    fn iou_is_symmetric() {
        let boxes = [
            BoundingBox::new(0, 0, 10, 10),
            BoundingBox::new(5, 5, 10, 10),
            BoundingBox::new(-3, 2, 7, 30),
            BoundingBox::new(8, -4, 1, 1),
        ];
        for a in &boxes {
            for b in &boxes {
                assert_eq!(a.iou(b), b.iou(a));
            }
        }
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(5, 0, 10, 10);
        // 50 / (100 + 100 - 50)
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-12);
    }

    #[test]
    fn from_corners_rejects_empty_boxes() {
        assert_eq!(
            BoundingBox::from_corners(1, 2, 11, 22),
            Some(BoundingBox::new(1, 2, 10, 20))
        );
        assert!(BoundingBox::from_corners(5, 5, 5, 9).is_none());
        assert!(BoundingBox::from_corners(5, 9, 8, 2).is_none());
    }
}
