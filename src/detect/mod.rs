mod backend;
pub mod backends;
pub mod contour;
pub mod filter;
pub mod geometry;
pub mod mask;
pub mod morphology;
pub mod pipeline;
mod result;

pub use backend::BackgroundModel;
pub use backends::{MixtureBackground, MixtureConfig};
pub use contour::{extract_external_contours, Contour, Point};
pub use filter::{FilterThresholds, GeometricFilter, Rejection};
pub use geometry::ShapeDescriptors;
pub use mask::{binarize, ForegroundMask, PixelLabel};
pub use morphology::KernelShape;
pub use pipeline::{PipelineSettings, VehicleDetector};
pub use result::{BoundingBox, DebugStages, Detection, DetectionResult, FIXED_CONFIDENCE};
