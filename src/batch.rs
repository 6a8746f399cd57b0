//! Directory-level drivers used by the binaries.
//!
//! [`BatchRunner`] detects vehicles in every image of a directory, writes the
//! per-image artifacts and optionally scores each image against its VOC
//! record. [`evaluate_saved`] scores detection records written by an earlier
//! run. Per-image failures are logged and skipped; only setup errors and the
//! final report write are fatal.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, RgbImage};

use crate::config::{StreamMode, TrafficConfig};
use crate::detect::{
    DebugStages, Detection, MixtureBackground, MixtureConfig, PipelineSettings, VehicleDetector,
};
use crate::eval::{self, Annotation, EvaluationReport, ReportPaths};
use crate::frame::Frame;
use crate::ingest::ImageDirSource;
use crate::ui::Ui;
use crate::visualize::{self, Visualizer};

/// Where and how a batch evaluates its detections.
#[derive(Clone, Debug)]
pub struct EvaluationOptions {
    pub annotations_dir: PathBuf,
    pub report_dir: PathBuf,
    pub iou_threshold: f64,
    /// Write `<report_dir>/visualizations/<stem>.jpg` overlays.
    pub visualize: bool,
}

impl EvaluationOptions {
    pub fn from_config(cfg: &TrafficConfig) -> Self {
        Self {
            annotations_dir: cfg.paths.annotations_dir.clone(),
            report_dir: cfg.paths.report_dir(),
            iou_threshold: cfg.iou_threshold,
            visualize: true,
        }
    }

    fn visualization_path(&self, stem: &str) -> PathBuf {
        self.report_dir
            .join("visualizations")
            .join(format!("{}.jpg", stem))
    }
}

#[derive(Clone, Debug)]
pub struct BatchOptions {
    pub stream_mode: StreamMode,
    pub background: MixtureConfig,
    pub pipeline: PipelineSettings,
    pub results_dir: PathBuf,
    pub images_out_dir: Option<PathBuf>,
    pub debug_dir: Option<PathBuf>,
    pub evaluation: Option<EvaluationOptions>,
}

impl BatchOptions {
    pub fn from_config(cfg: &TrafficConfig) -> Self {
        Self {
            stream_mode: cfg.stream_mode,
            background: cfg.background.clone(),
            pipeline: cfg.pipeline.clone(),
            results_dir: cfg.paths.results_dir(),
            images_out_dir: Some(cfg.paths.images_out_dir()),
            debug_dir: cfg.paths.save_debug.then(|| cfg.paths.debug_dir()),
            evaluation: None,
        }
    }
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub images_listed: usize,
    pub images_processed: usize,
    pub images_failed: usize,
    pub detections: usize,
    /// Stopped early on an abort request.
    pub aborted: bool,
    pub report: Option<EvaluationReport>,
    pub report_paths: Option<ReportPaths>,
}

pub struct BatchRunner {
    options: BatchOptions,
    visualizer: Visualizer,
    abort: Arc<AtomicBool>,
}

impl BatchRunner {
    pub fn new(options: BatchOptions, visualizer: Visualizer) -> Self {
        Self {
            options,
            visualizer,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an abort flag (set from a Ctrl-C handler); checked between images.
    pub fn with_abort_flag(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    pub fn run(&self, source: ImageDirSource, ui: &Ui) -> Result<BatchSummary> {
        let mut summary = BatchSummary {
            images_listed: source.len(),
            ..BatchSummary::default()
        };
        let mut report = self
            .options
            .evaluation
            .as_ref()
            .map(|e| EvaluationReport::new(e.iou_threshold));
        let mut detector = VehicleDetector::new(
            MixtureBackground::new(self.options.background.clone()),
            self.options.pipeline.clone(),
        );

        {
            let _stage = ui.stage("Detect vehicles");
            let progress = ui.progress(source.len());
            for entry in source {
                if self.abort.load(Ordering::SeqCst) {
                    log::warn!("abort requested, stopping before {}", entry.path.display());
                    summary.aborted = true;
                    break;
                }
                progress.advance(&entry.stem);
                let image = match entry.image {
                    Ok(image) => image,
                    Err(err) => {
                        log::warn!("skipping {}: {:#}", entry.path.display(), err);
                        summary.images_failed += 1;
                        continue;
                    }
                };

                let frame = Frame::from_dynamic(&image);
                self.prepare_stream(&mut detector, &frame, &entry.stem);
                let result = detector.detect(&frame);
                log::info!(
                    "{}: {} vehicles ({} candidates)",
                    entry.stem,
                    result.detections.len(),
                    result.candidates
                );
                summary.images_processed += 1;
                summary.detections += result.detections.len();

                self.write_artifacts(&entry.stem, &image, &result.detections, &result.stages);

                if let (Some(opts), Some(report)) = (&self.options.evaluation, report.as_mut()) {
                    self.evaluate_image(opts, report, &entry.stem, &image, &result.detections);
                }
            }
        }

        if let (Some(opts), Some(report)) = (&self.options.evaluation, &report) {
            let _stage = ui.stage("Write evaluation report");
            summary.report_paths = Some(report.write(&opts.report_dir)?);
            log_overall(report);
        }
        summary.report = report;
        Ok(summary)
    }

    fn prepare_stream(
        &self,
        detector: &mut VehicleDetector<MixtureBackground>,
        frame: &Frame,
        stem: &str,
    ) {
        match self.options.stream_mode {
            StreamMode::PerImage => detector.reset(),
            StreamMode::Sequence => {
                if let Some(dims) = detector.stream_dimensions() {
                    if dims != frame.dimensions() {
                        log::warn!(
                            "{}: size {}x{} differs from stream {}x{}, starting a new stream",
                            stem,
                            frame.width(),
                            frame.height(),
                            dims.0,
                            dims.1
                        );
                        detector.reset();
                    }
                }
            }
        }
    }

    fn write_artifacts(
        &self,
        stem: &str,
        image: &DynamicImage,
        detections: &[Detection],
        stages: &DebugStages,
    ) {
        let record = self.options.results_dir.join(format!("{}.txt", stem));
        if let Err(err) = eval::write_detections(&record, detections) {
            log::warn!("{}: {:#}", stem, err);
        }

        if let Some(dir) = &self.options.images_out_dir {
            let annotated = self.visualizer.draw_detections(&image.to_rgb8(), detections);
            let path = dir.join(format!("{}.jpg", stem));
            if let Err(err) = visualize::save_image(&annotated, &path) {
                log::warn!("{}: {:#}", stem, err);
            }
        }

        if let Some(dir) = &self.options.debug_dir {
            for (kind, img) in [
                ("gray", &stages.gray),
                ("mask", &stages.raw_mask),
                ("morph", &stages.cleaned),
            ] {
                if let Err(err) = save_debug(&dir.join(kind), stem, img) {
                    log::warn!("{}: {:#}", stem, err);
                }
            }
        }
    }

    fn evaluate_image(
        &self,
        opts: &EvaluationOptions,
        report: &mut EvaluationReport,
        stem: &str,
        image: &DynamicImage,
        detections: &[Detection],
    ) {
        let Some(ground_truth) = ground_truth_for(&opts.annotations_dir, stem) else {
            return;
        };
        let metrics = eval::evaluate(detections, &ground_truth, opts.iou_threshold);
        log::debug!(
            "{}: precision {:.3} recall {:.3} f1 {:.3}",
            stem,
            metrics.precision,
            metrics.recall,
            metrics.f1
        );
        report.insert(stem, metrics);

        if opts.visualize {
            let overlay =
                self.visualizer
                    .draw_evaluation(&image.to_rgb8(), detections, &ground_truth);
            if let Err(err) = visualize::save_image(&overlay, &opts.visualization_path(stem)) {
                log::warn!("{}: {:#}", stem, err);
            }
        }
    }
}

fn save_debug(dir: &Path, stem: &str, image: &GrayImage) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(format!("{}.png", stem));
    image
        .save(&path)
        .with_context(|| format!("write debug image {}", path.display()))
}

/// Ground truth for `stem`, or `None` (logged) when there is no usable record.
fn ground_truth_for(annotations_dir: &Path, stem: &str) -> Option<Vec<Annotation>> {
    let path = eval::annotation_path(annotations_dir, stem);
    match eval::load_annotations(&path) {
        Ok(Some(ground_truth)) => Some(ground_truth),
        Ok(None) => {
            log::info!("{}: no ground truth at {}, not evaluated", stem, path.display());
            None
        }
        Err(err) => {
            log::warn!("{}: {:#}", stem, err);
            None
        }
    }
}

fn log_overall(report: &EvaluationReport) {
    let overall = report.overall();
    log::info!(
        "evaluated {} images: precision {:.4} recall {:.4} f1 {:.4} count error {} ({:.4})",
        report.len(),
        overall.precision,
        overall.recall,
        overall.f1,
        overall.count_error,
        overall.relative_count_error
    );
}

/// Score saved detection records against ground truth.
///
/// Images in `source` name the records: `<results_dir>/<stem>.txt` is
/// compared with `<annotations_dir>/<stem>.xml`. Images lacking either file
/// are skipped. The source image is only decoded for the overlay.
pub fn evaluate_saved(
    source: ImageDirSource,
    results_dir: &Path,
    opts: &EvaluationOptions,
    visualizer: &Visualizer,
    abort: &AtomicBool,
    ui: &Ui,
) -> Result<(EvaluationReport, ReportPaths)> {
    let mut report = EvaluationReport::new(opts.iou_threshold);
    {
        let _stage = ui.stage("Evaluate detections");
        let progress = ui.progress(source.len());
        for path in source.paths() {
            if abort.load(Ordering::SeqCst) {
                log::warn!("abort requested, stopping before {}", path.display());
                break;
            }
            let stem = crate::ingest::images::file_stem(path);
            progress.advance(&stem);

            let record = results_dir.join(format!("{}.txt", stem));
            let detections = match eval::read_detections(&record) {
                Ok(detections) => detections,
                Err(err) => {
                    log::warn!("{}: {:#}", stem, err);
                    continue;
                }
            };
            let Some(ground_truth) = ground_truth_for(&opts.annotations_dir, &stem) else {
                continue;
            };
            let metrics = eval::evaluate(&detections, &ground_truth, opts.iou_threshold);
            report.insert(stem.clone(), metrics);

            if opts.visualize {
                match image::open(path) {
                    Ok(image) => {
                        let rgb: RgbImage = image.to_rgb8();
                        let overlay = visualizer.draw_evaluation(&rgb, &detections, &ground_truth);
                        if let Err(err) =
                            visualize::save_image(&overlay, &opts.visualization_path(&stem))
                        {
                            log::warn!("{}: {:#}", stem, err);
                        }
                    }
                    Err(err) => log::warn!("{}: cannot decode for overlay: {}", stem, err),
                }
            }
        }
    }

    let _stage = ui.stage("Write evaluation report");
    let paths = report.write(&opts.report_dir)?;
    log_overall(&report);
    Ok((report, paths))
}
