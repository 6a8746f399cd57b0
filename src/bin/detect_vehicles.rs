//! detect_vehicles - find vehicles in a directory of still images

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use traffic_cv::batch::{BatchOptions, BatchRunner, EvaluationOptions};
use traffic_cv::config::{StreamMode, TrafficConfig};
use traffic_cv::ingest::ImageDirSource;
use traffic_cv::logging;
use traffic_cv::ui::Ui;
use traffic_cv::visualize::Visualizer;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory of input images (overrides config).
    #[arg(long)]
    image_dir: Option<PathBuf>,
    /// Root of the output tree (overrides config).
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Directory of VOC ground-truth files (overrides config).
    #[arg(long)]
    annotations_dir: Option<PathBuf>,
    /// Score each image against its ground truth as it is processed.
    #[arg(long)]
    evaluate: bool,
    /// Minimum IoU for a detection to match a ground-truth box.
    #[arg(long)]
    iou_threshold: Option<f64>,
    /// Background stream mode (per_image|sequence).
    #[arg(long, value_name = "MODE")]
    stream_mode: Option<StreamMode>,
    /// TrueType font used for box labels.
    #[arg(long)]
    font: Option<PathBuf>,
    /// Skip the gray/mask/morph debug images.
    #[arg(long)]
    no_debug: bool,
    /// Skip the annotated output images.
    #[arg(long)]
    no_images: bool,
    /// Append log lines to this file as well as stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = TrafficConfig::load()?;
    apply_args(&mut cfg, &args);
    cfg.validate()?;
    logging::init(&cfg.logging)?;

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let abort = Arc::new(AtomicBool::new(false));
    {
        let abort = abort.clone();
        ctrlc::set_handler(move || {
            abort.store(true, Ordering::SeqCst);
        })
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    }

    let visualizer = {
        let _stage = ui.stage("Load font");
        match Visualizer::new(cfg.paths.font_path.as_deref()) {
            Ok(v) => v,
            Err(err) => {
                log::warn!("{:#}; drawing boxes without labels", err);
                Visualizer::default()
            }
        }
    };

    let source = {
        let _stage = ui.stage("List images");
        ImageDirSource::open(&cfg.paths.image_dir)?
    };
    if source.is_empty() {
        log::warn!("no images found in {}", cfg.paths.image_dir.display());
    }

    let mut options = BatchOptions::from_config(&cfg);
    if args.no_images {
        options.images_out_dir = None;
    }
    if args.evaluate {
        options.evaluation = Some(EvaluationOptions::from_config(&cfg));
    }
    log::info!(
        "detect_vehicles: {} images from {}, stream mode {:?}",
        source.len(),
        cfg.paths.image_dir.display(),
        options.stream_mode
    );

    let runner = BatchRunner::new(options, visualizer).with_abort_flag(abort);
    let summary = runner.run(source, &ui)?;

    println!(
        "processed {}/{} images ({} failed), {} vehicles detected",
        summary.images_processed, summary.images_listed, summary.images_failed, summary.detections
    );
    println!("results: {}", cfg.paths.results_dir().display());
    if let (Some(report), Some(paths)) = (&summary.report, &summary.report_paths) {
        let overall = report.overall();
        println!(
            "evaluated {} images: precision {:.4} recall {:.4} f1 {:.4}",
            report.len(),
            overall.precision,
            overall.recall,
            overall.f1
        );
        println!("report: {}", paths.csv.display());
    }
    if summary.aborted {
        return Err(anyhow!("interrupted"));
    }
    Ok(())
}

fn apply_args(cfg: &mut TrafficConfig, args: &Args) {
    if let Some(dir) = &args.image_dir {
        cfg.paths.image_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        cfg.paths.output_dir = dir.clone();
    }
    if let Some(dir) = &args.annotations_dir {
        cfg.paths.annotations_dir = dir.clone();
    }
    if let Some(iou) = args.iou_threshold {
        cfg.iou_threshold = iou;
    }
    if let Some(mode) = args.stream_mode {
        cfg.stream_mode = mode;
    }
    if let Some(font) = &args.font {
        cfg.paths.font_path = Some(font.clone());
    }
    if args.no_debug {
        cfg.paths.save_debug = false;
    }
    if let Some(path) = &args.log_file {
        cfg.logging.file = Some(path.clone());
    }
}
