use image::GrayImage;

use crate::frame::Frame;

use super::backend::BackgroundModel;
use super::contour::extract_external_contours;
use super::filter::{FilterThresholds, GeometricFilter};
use super::mask::binarize;
use super::morphology::{self, KernelShape};
use super::result::{DebugStages, Detection, DetectionResult};

pub const DEFAULT_MASK_THRESHOLD: u8 = 200;
pub const DEFAULT_MASK_MAX_VALUE: u8 = 255;
pub const DEFAULT_KERNEL_SIZE: u32 = 5;

/// Stage parameters downstream of the background model.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    pub mask_threshold: u8,
    pub mask_max_value: u8,
    pub kernel_shape: KernelShape,
    pub kernel_size: u32,
    pub filter: FilterThresholds,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            mask_threshold: DEFAULT_MASK_THRESHOLD,
            mask_max_value: DEFAULT_MASK_MAX_VALUE,
            kernel_shape: KernelShape::default(),
            kernel_size: DEFAULT_KERNEL_SIZE,
            filter: FilterThresholds::default(),
        }
    }
}

/// Background subtraction followed by mask cleanup and shape filtering.
///
/// The detector owns its background model, so one detector is one stream.
pub struct VehicleDetector<B: BackgroundModel> {
    model: B,
    settings: PipelineSettings,
    filter: GeometricFilter,
}

impl<B: BackgroundModel> VehicleDetector<B> {
    pub fn new(model: B, settings: PipelineSettings) -> Self {
        let filter = GeometricFilter::new(settings.filter.clone());
        Self {
            model,
            settings,
            filter,
        }
    }

    /// Frame size of the stream the model is tracking.
    pub fn stream_dimensions(&self) -> Option<(u32, u32)> {
        self.model.dimensions()
    }

    pub fn reset(&mut self) {
        self.model.reset();
    }

    /// Run every stage on `frame`. Panics if the frame size differs from the
    /// current stream; see [`BackgroundModel::apply`].
    pub fn detect(&mut self, frame: &Frame) -> DetectionResult {
        let raw = self.model.apply(frame);
        let binary = binarize(&raw, self.settings.mask_threshold, self.settings.mask_max_value);
        let cleaned = morphology::close(
            &binary,
            self.settings.kernel_shape,
            self.settings.kernel_size,
        );

        let contours = extract_external_contours(&cleaned);
        let candidates = contours.len();
        let detections: Vec<Detection> = contours
            .iter()
            .map(|c| c.simplified())
            .filter_map(|c| self.filter.filter(&c))
            .map(|bbox| Detection::new(self.filter.label(), bbox))
            .collect();
        log::debug!(
            "{}: {} candidates, {} accepted",
            self.model.name(),
            candidates,
            detections.len()
        );

        DetectionResult {
            detections,
            candidates,
            stages: DebugStages {
                gray: frame.as_image().clone(),
                raw_mask: raw.to_image(),
                cleaned,
            },
        }
    }

    /// Detect on a grayscale buffer.
    pub fn detect_gray(&mut self, gray: GrayImage) -> DetectionResult {
        self.detect(&Frame::from_gray(gray))
    }
}
