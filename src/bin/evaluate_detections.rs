//! evaluate_detections - score saved detection records against VOC ground truth

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use traffic_cv::batch::{self, EvaluationOptions};
use traffic_cv::config::TrafficConfig;
use traffic_cv::ingest::ImageDirSource;
use traffic_cv::logging;
use traffic_cv::ui::Ui;
use traffic_cv::visualize::Visualizer;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory of the images the records were produced from.
    #[arg(long)]
    image_dir: Option<PathBuf>,
    /// Output tree of a previous detect_vehicles run.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Directory of VOC ground-truth files.
    #[arg(long)]
    annotations_dir: Option<PathBuf>,
    /// Minimum IoU for a detection to match a ground-truth box.
    #[arg(long)]
    iou_threshold: Option<f64>,
    /// TrueType font used for overlay labels.
    #[arg(long)]
    font: Option<PathBuf>,
    /// Skip the per-image overlay images.
    #[arg(long)]
    no_visualize: bool,
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
    if let Some(dir) = args.image_dir {
        cfg.paths.image_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        cfg.paths.output_dir = dir;
    }
    if let Some(dir) = args.annotations_dir {
        cfg.paths.annotations_dir = dir;
    }
    if let Some(iou) = args.iou_threshold {
        cfg.iou_threshold = iou;
    }
    if let Some(font) = args.font {
        cfg.paths.font_path = Some(font);
    }
    if let Some(path) = args.log_file {
        cfg.logging.file = Some(path);
    }
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

    let mut options = EvaluationOptions::from_config(&cfg);
    options.visualize = !args.no_visualize;
    let visualizer = if options.visualize {
        Visualizer::new(cfg.paths.font_path.as_deref()).unwrap_or_else(|err| {
            log::warn!("{:#}; drawing boxes without labels", err);
            Visualizer::default()
        })
    } else {
        Visualizer::default()
    };

    let source = {
        let _stage = ui.stage("List images");
        ImageDirSource::open(&cfg.paths.image_dir)?
    };
    let results_dir = cfg.paths.results_dir();
    let (report, paths) =
        batch::evaluate_saved(source, &results_dir, &options, &visualizer, &abort, &ui)?;

    let overall = report.overall();
    println!(
        "evaluated {} images at IoU {:.2}: precision {:.4} recall {:.4} f1 {:.4}",
        report.len(),
        options.iou_threshold,
        overall.precision,
        overall.recall,
        overall.f1
    );
    println!(
        "tp {} fp {} fn {} count error {} ({:.4})",
        overall.true_positives,
        overall.false_positives,
        overall.false_negatives,
        overall.count_error,
        overall.relative_count_error
    );
    println!("summary: {}", paths.summary_txt.display());
    if abort.load(Ordering::SeqCst) {
        return Err(anyhow!("interrupted"));
    }
    Ok(())
}
