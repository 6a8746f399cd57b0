//! Tri-state foreground masks and their binarization.

use image::{GrayImage, Luma};

/// Per-pixel classification produced by a background model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PixelLabel {
    #[default]
    Background,
    Shadow,
    Foreground,
}

impl PixelLabel {
    /// Intensity used when the label is rendered to an image.
    pub const fn value(self) -> u8 {
        match self {
            PixelLabel::Background => 0,
            PixelLabel::Shadow => 127,
            PixelLabel::Foreground => 255,
        }
    }
}

/// Grid of pixel labels with the same dimensions as the frame it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct ForegroundMask {
    width: u32,
    height: u32,
    labels: Vec<PixelLabel>,
}

impl ForegroundMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            labels: vec![PixelLabel::Background; width as usize * height as usize],
        }
    }

    /// Build from row-major labels. Panics if the length does not match.
    pub fn from_labels(width: u32, height: u32, labels: Vec<PixelLabel>) -> Self {
        assert_eq!(
            labels.len(),
            width as usize * height as usize,
            "label count must equal width * height"
        );
        Self {
            width,
            height,
            labels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> PixelLabel {
        self.labels[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, label: PixelLabel) {
        self.labels[y as usize * self.width as usize + x as usize] = label;
    }

    pub fn labels(&self) -> &[PixelLabel] {
        &self.labels
    }

    pub(crate) fn labels_mut(&mut self) -> &mut [PixelLabel] {
        &mut self.labels
    }

    pub fn count(&self, label: PixelLabel) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }

    /// Render as 0 / 127 / 255.
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| Luma([self.get(x, y).value()]))
    }
}

/// Threshold the rendered labels: values above `threshold` become `max_value`,
/// the rest 0. With a threshold between 127 and 254 shadows are dropped.
pub fn binarize(mask: &ForegroundMask, threshold: u8, max_value: u8) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.get(x, y).value() > threshold {
            Luma([max_value])
        } else {
            Luma([0])
        }
    })
}
