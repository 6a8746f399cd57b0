//! Binary morphology on `GrayImage` masks (non-zero = foreground).
//!
//! The structuring element is anchored at its centre (`size / 2`). Pixels
//! outside the image take no part: they never switch a dilated pixel on and
//! never switch an eroded pixel off.

use image::{GrayImage, Luma};
use serde::Deserialize;

/// Structuring element shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelShape {
    /// Full `size x size` square.
    #[default]
    Rect,
    /// Centre row and centre column of the square.
    Cross,
}

impl std::str::FromStr for KernelShape {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rect" | "square" => Ok(KernelShape::Rect),
            "cross" => Ok(KernelShape::Cross),
            other => Err(anyhow::anyhow!("unknown kernel shape '{}'", other)),
        }
    }
}

/// Offsets `(dx, dy)` of the active cells relative to the anchor.
fn kernel_offsets(shape: KernelShape, size: u32) -> Vec<(i64, i64)> {
    let size = size.max(1) as i64;
    let anchor = size / 2;
    let mut offsets = Vec::with_capacity((size * size) as usize);
    for ky in 0..size {
        for kx in 0..size {
            let active = match shape {
                KernelShape::Rect => true,
                KernelShape::Cross => kx == anchor || ky == anchor,
            };
            if active {
                offsets.push((kx - anchor, ky - anchor));
            }
        }
    }
    offsets
}

fn apply(mask: &GrayImage, offsets: &[(i64, i64)], dilate: bool) -> GrayImage {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as i64, height as i64);
    let raw = mask.as_raw();
    GrayImage::from_fn(width, height, |x, y| {
        let mut acc: Option<u8> = None;
        for &(dx, dy) in offsets {
            // Dilation reflects the element; erosion uses it as-is.
            let (sx, sy) = if dilate {
                (x as i64 - dx, y as i64 - dy)
            } else {
                (x as i64 + dx, y as i64 + dy)
            };
            if sx < 0 || sy < 0 || sx >= w || sy >= h {
                continue;
            }
            let v = raw[(sy * w + sx) as usize];
            acc = Some(match acc {
                None => v,
                Some(a) if dilate => a.max(v),
                Some(a) => a.min(v),
            });
        }
        Luma([acc.unwrap_or(raw[(y as i64 * w + x as i64) as usize])])
    })
}

pub fn dilate(mask: &GrayImage, shape: KernelShape, size: u32) -> GrayImage {
    apply(mask, &kernel_offsets(shape, size), true)
}

pub fn erode(mask: &GrayImage, shape: KernelShape, size: u32) -> GrayImage {
    apply(mask, &kernel_offsets(shape, size), false)
}

/// Morphological closing: dilation followed by erosion with the same element.
pub fn close(mask: &GrayImage, shape: KernelShape, size: u32) -> GrayImage {
    let offsets = kernel_offsets(shape, size);
    let dilated = apply(mask, &offsets, true);
    apply(&dilated, &offsets, false)
}
