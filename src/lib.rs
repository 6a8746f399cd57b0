//! Classical vehicle detection for static traffic-camera images.
//!
//! # Architecture
//!
//! Detection runs one frame at a time through a fixed chain:
//!
//! 1. **Background model**: per-pixel Gaussian mixture labels every pixel
//!    background, shadow or foreground (`detect::backends::mixture`).
//! 2. **Mask builder**: thresholds the labels so shadows drop out.
//! 3. **Morphology**: closing fills small gaps in vehicle blobs.
//! 4. **Contours**: outer boundaries of the external foreground components.
//! 5. **Geometric filter**: area, aspect ratio, extent and solidity gates.
//!
//! The `eval` module scores accepted boxes against Pascal VOC ground truth by
//! greedy IoU matching and reports precision, recall, F1 and count errors.
//!
//! # Module Structure
//!
//! - `frame`: grayscale frames fed to the detector
//! - `detect`: background models and the detection pipeline
//! - `eval`: ground truth, detection records, matching and reports
//! - `ingest`: sorted image directories
//! - `batch`: directory drivers used by the binaries
//! - `config`, `logging`, `ui`, `visualize`: ambient plumbing

pub mod batch;
pub mod config;
pub mod detect;
pub mod eval;
pub mod frame;
pub mod ingest;
pub mod logging;
pub mod ui;
pub mod visualize;

pub use batch::{evaluate_saved, BatchOptions, BatchRunner, BatchSummary, EvaluationOptions};
pub use config::{StreamMode, TrafficConfig};
pub use detect::{
    BackgroundModel, BoundingBox, Detection, DetectionResult, MixtureBackground, MixtureConfig,
    PipelineSettings, VehicleDetector,
};
pub use eval::{evaluate, Annotation, EvaluationMetrics};
pub use frame::Frame;
