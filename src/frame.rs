//! Grayscale frames fed to the detection pipeline.
//!
//! A `Frame` is immutable once built. Colour input is reduced to a single luma
//! channel with the ITU-R BT.601 weights (0.299 R + 0.587 G + 0.114 B).

use image::{DynamicImage, GrayImage, Luma, RgbImage};

/// Single-channel 8-bit frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pixels: GrayImage,
}

impl Frame {
    /// Wrap an existing grayscale buffer.
    pub fn from_gray(pixels: GrayImage) -> Self {
        Self { pixels }
    }

    /// Convert an RGB buffer with BT.601 luma weights.
    pub fn from_rgb(rgb: &RgbImage) -> Self {
        let (width, height) = rgb.dimensions();
        let pixels = GrayImage::from_fn(width, height, |x, y| {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            Luma([bt601_luma(r, g, b)])
        });
        Self { pixels }
    }

    /// Convert any decoded image. Grayscale input is used as-is.
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(gray) => Self::from_gray(gray.clone()),
            other => Self::from_rgb(&other.to_rgb8()),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Row-major intensities.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.pixels
    }
}

fn bt601_luma(r: u8, g: u8, b: u8) -> u8 {
    // Fixed point with 14 fractional bits, rounded.
    const R: u32 = 4899; // 0.299
    const G: u32 = 9617; // 0.587
    const B: u32 = 1868; // 0.114
    let y = R * r as u32 + G * g as u32 + B * b as u32;
    ((y + (1 << 13)) >> 14).min(255) as u8
}
