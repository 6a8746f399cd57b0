use std::fmt;

use super::contour::Contour;
use super::geometry::ShapeDescriptors;
use super::result::BoundingBox;

pub const DEFAULT_MIN_AREA: u64 = 1200;
pub const DEFAULT_MAX_AREA: u64 = 100_000;
pub const DEFAULT_MIN_ASPECT_RATIO: f64 = 0.4;
pub const DEFAULT_MAX_ASPECT_RATIO: f64 = 4.0;
pub const DEFAULT_MIN_EXTENT: f64 = 0.35;
pub const DEFAULT_MIN_SOLIDITY: f64 = 0.6;
pub const DEFAULT_LABEL: &str = "vehicle";

/// Acceptance window for vehicle candidates. All bounds are inclusive.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterThresholds {
    pub min_area: u64,
    pub max_area: u64,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    pub min_extent: f64,
    pub min_solidity: f64,
    /// Label given to accepted boxes.
    pub label: String,
}

impl Default for FilterThresholds {
    fn default() -> Self {
        Self {
            min_area: DEFAULT_MIN_AREA,
            max_area: DEFAULT_MAX_AREA,
            min_aspect_ratio: DEFAULT_MIN_ASPECT_RATIO,
            max_aspect_ratio: DEFAULT_MAX_ASPECT_RATIO,
            min_extent: DEFAULT_MIN_EXTENT,
            min_solidity: DEFAULT_MIN_SOLIDITY,
            label: DEFAULT_LABEL.to_string(),
        }
    }
}

/// Why a contour was not accepted. Predicates are checked in declaration order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Rejection {
    EmptyContour,
    AreaOutOfRange(u64),
    AspectRatioOutOfRange(f64),
    ExtentTooLow(f64),
    DegenerateHull,
    SolidityTooLow(f64),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::EmptyContour => write!(f, "empty contour"),
            Rejection::AreaOutOfRange(area) => write!(f, "area {} out of range", area),
            Rejection::AspectRatioOutOfRange(ar) => {
                write!(f, "aspect ratio {:.3} out of range", ar)
            }
            Rejection::ExtentTooLow(extent) => write!(f, "extent {:.3} too low", extent),
            Rejection::DegenerateHull => write!(f, "convex hull has no area"),
            Rejection::SolidityTooLow(solidity) => {
                write!(f, "solidity {:.3} too low", solidity)
            }
        }
    }
}

/// Shape-based vehicle candidate filter.
#[derive(Clone, Debug, Default)]
pub struct GeometricFilter {
    thresholds: FilterThresholds,
}

impl GeometricFilter {
    pub fn new(thresholds: FilterThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &FilterThresholds {
        &self.thresholds
    }

    pub fn label(&self) -> &str {
        &self.thresholds.label
    }

    pub fn evaluate(&self, shape: &ShapeDescriptors) -> Result<(), Rejection> {
        let t = &self.thresholds;
        if shape.area < t.min_area || shape.area > t.max_area {
            return Err(Rejection::AreaOutOfRange(shape.area));
        }
        if shape.aspect_ratio < t.min_aspect_ratio || shape.aspect_ratio > t.max_aspect_ratio {
            return Err(Rejection::AspectRatioOutOfRange(shape.aspect_ratio));
        }
        if shape.extent < t.min_extent {
            return Err(Rejection::ExtentTooLow(shape.extent));
        }
        match shape.solidity {
            None => Err(Rejection::DegenerateHull),
            Some(solidity) if solidity < t.min_solidity => {
                Err(Rejection::SolidityTooLow(solidity))
            }
            Some(_) => Ok(()),
        }
    }

    pub fn check(&self, contour: &Contour) -> Result<BoundingBox, Rejection> {
        let shape = ShapeDescriptors::from_contour(contour).ok_or(Rejection::EmptyContour)?;
        self.evaluate(&shape)?;
        Ok(shape.bbox)
    }

    /// Bounding box of an accepted contour; rejections are logged at debug level.
    pub fn filter(&self, contour: &Contour) -> Option<BoundingBox> {
        match self.check(contour) {
            Ok(bbox) => Some(bbox),
            Err(reason) => {
                log::debug!("contour with {} points rejected: {}", contour.len(), reason);
                None
            }
        }
    }
}
