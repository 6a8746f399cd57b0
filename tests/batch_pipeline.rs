use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use image::{GrayImage, Luma};

use traffic_cv::batch::{evaluate_saved, BatchOptions, BatchRunner, EvaluationOptions};
use traffic_cv::config::{StreamMode, TrafficConfig};
use traffic_cv::eval::read_detections;
use traffic_cv::ingest::ImageDirSource;
use traffic_cv::ui::Ui;
use traffic_cv::visualize::Visualizer;
use traffic_cv::BoundingBox;

fn write_gray(path: &Path, image: &GrayImage) {
    image.save(path).expect("write test image");
}

fn voc(filename: &str, objects: &[(&str, i32, i32, i32, i32)]) -> String {
    let mut xml = format!("<annotation>\n  <filename>{}</filename>\n", filename);
    for (name, xmin, ymin, xmax, ymax) in objects {
        xml.push_str(&format!(
            "  <object>\n    <name>{}</name>\n    <bndbox>\n      <xmin>{}</xmin>\n      \
             <ymin>{}</ymin>\n      <xmax>{}</xmax>\n      <ymax>{}</ymax>\n    </bndbox>\n  </object>\n",
            name, xmin, ymin, xmax, ymax
        ));
    }
    xml.push_str("</annotation>\n");
    xml
}

fn config_for(root: &Path) -> TrafficConfig {
    let mut cfg = TrafficConfig::default();
    cfg.paths.image_dir = root.join("images");
    cfg.paths.annotations_dir = root.join("annotations");
    cfg.paths.output_dir = root.join("out");
    cfg
}

#[test]
fn per_image_batch_writes_records_images_debug_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_for(dir.path());
    std::fs::create_dir_all(&cfg.paths.image_dir).unwrap();
    std::fs::create_dir_all(&cfg.paths.annotations_dir).unwrap();

    let frame = GrayImage::from_pixel(60, 40, Luma([80]));
    write_gray(&cfg.paths.image_dir.join("cam_a.png"), &frame);
    write_gray(&cfg.paths.image_dir.join("cam_b.png"), &frame);
    std::fs::write(cfg.paths.image_dir.join("cam_c.jpg"), b"not a jpeg").unwrap();
    std::fs::write(cfg.paths.image_dir.join("notes.txt"), b"ignored").unwrap();
    std::fs::write(
        cfg.paths.annotations_dir.join("cam_a.xml"),
        voc("cam_a.png", &[("vehicle", 0, 0, 60, 40)]),
    )
    .unwrap();

    let mut options = BatchOptions::from_config(&cfg);
    options.evaluation = Some(EvaluationOptions::from_config(&cfg));
    let runner = BatchRunner::new(options, Visualizer::default());
    let source = ImageDirSource::open(&cfg.paths.image_dir).unwrap();
    let summary = runner.run(source, &Ui::plain()).unwrap();

    assert_eq!(summary.images_listed, 3);
    assert_eq!(summary.images_processed, 2);
    assert_eq!(summary.images_failed, 1);
    assert_eq!(summary.detections, 2);
    assert!(!summary.aborted);

    // Each image is a fresh stream, so its first frame is one full-frame blob.
    let records = cfg.paths.results_dir();
    for stem in ["cam_a", "cam_b"] {
        let dets = read_detections(&records.join(format!("{}.txt", stem))).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox, BoundingBox::new(0, 0, 60, 40));
        assert!(cfg.paths.images_out_dir().join(format!("{}.jpg", stem)).exists());
        for kind in ["gray", "mask", "morph"] {
            let debug = cfg.paths.debug_dir().join(kind).join(format!("{}.png", stem));
            assert!(debug.exists(), "missing {}", debug.display());
        }
    }
    assert!(!records.join("cam_c.txt").exists());

    let report = summary.report.expect("report");
    assert_eq!(report.len(), 1);
    let overall = report.overall();
    assert_eq!(overall.true_positives, 1);
    assert_eq!(overall.false_positives, 0);
    assert_eq!(overall.precision, 1.0);
    assert_eq!(overall.recall, 1.0);

    let paths = summary.report_paths.expect("report paths");
    let csv = std::fs::read_to_string(&paths.csv).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.lines().nth(1).unwrap().starts_with("cam_a,1.000000,1.000000,1.000000,1,0,0,0,"));
    let summary_txt = std::fs::read_to_string(&paths.summary_txt).unwrap();
    assert!(summary_txt.starts_with("=== OVERALL EVALUATION SUMMARY ==="));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&paths.summary_json).unwrap()).unwrap();
    assert_eq!(json["images_evaluated"], 1);
    assert!(cfg
        .paths
        .report_dir()
        .join("visualizations")
        .join("cam_a.jpg")
        .exists());
}

#[test]
fn sequence_mode_learns_background_across_images() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config_for(dir.path());
    cfg.stream_mode = StreamMode::Sequence;
    cfg.paths.save_debug = false;
    std::fs::create_dir_all(&cfg.paths.image_dir).unwrap();

    let background = GrayImage::from_pixel(160, 100, Luma([60]));
    let mut car = background.clone();
    for y in 40..80 {
        for x in 50..110 {
            car.put_pixel(x, y, Luma([230]));
        }
    }
    write_gray(&cfg.paths.image_dir.join("frame_000.png"), &background);
    write_gray(&cfg.paths.image_dir.join("frame_001.png"), &background);
    write_gray(&cfg.paths.image_dir.join("frame_002.png"), &car);

    let mut options = BatchOptions::from_config(&cfg);
    options.images_out_dir = None;
    let runner = BatchRunner::new(options, Visualizer::default());
    let source = ImageDirSource::open(&cfg.paths.image_dir).unwrap();
    let summary = runner.run(source, &Ui::plain()).unwrap();

    assert_eq!(summary.images_processed, 3);
    assert!(summary.report.is_none());
    assert!(!cfg.paths.debug_dir().exists());
    assert!(!cfg.paths.images_out_dir().exists());

    let records = cfg.paths.results_dir();
    let boxes = |stem: &str| -> Vec<BoundingBox> {
        read_detections(&records.join(format!("{}.txt", stem)))
            .unwrap()
            .into_iter()
            .map(|d| d.bbox)
            .collect()
    };
    assert_eq!(boxes("frame_000"), vec![BoundingBox::new(0, 0, 160, 100)]);
    assert!(boxes("frame_001").is_empty());
    assert_eq!(boxes("frame_002"), vec![BoundingBox::new(50, 40, 60, 40)]);
}

#[test]
fn sequence_mode_restarts_stream_on_size_change() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config_for(dir.path());
    cfg.stream_mode = StreamMode::Sequence;
    cfg.paths.save_debug = false;
    std::fs::create_dir_all(&cfg.paths.image_dir).unwrap();

    write_gray(
        &cfg.paths.image_dir.join("frame_000.png"),
        &GrayImage::from_pixel(60, 40, Luma([80])),
    );
    write_gray(
        &cfg.paths.image_dir.join("frame_001.png"),
        &GrayImage::from_pixel(50, 40, Luma([80])),
    );

    let mut options = BatchOptions::from_config(&cfg);
    options.images_out_dir = None;
    let runner = BatchRunner::new(options, Visualizer::default());
    assert_eq!(runner.options().stream_mode, StreamMode::Sequence);
    let source = ImageDirSource::open(&cfg.paths.image_dir).unwrap();
    let summary = runner.run(source, &Ui::plain()).unwrap();

    assert_eq!(summary.images_processed, 2);
    assert_eq!(summary.images_failed, 0);

    // The narrower frame opens a fresh stream, so it is all foreground again.
    let records = cfg.paths.results_dir();
    let first = read_detections(&records.join("frame_000.txt")).unwrap();
    let second = read_detections(&records.join("frame_001.txt")).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].bbox, BoundingBox::new(0, 0, 60, 40));
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].bbox, BoundingBox::new(0, 0, 50, 40));
}

#[test]
fn abort_flag_stops_before_the_first_image() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_for(dir.path());
    std::fs::create_dir_all(&cfg.paths.image_dir).unwrap();
    write_gray(
        &cfg.paths.image_dir.join("a.png"),
        &GrayImage::from_pixel(60, 40, Luma([10])),
    );

    let abort = Arc::new(AtomicBool::new(true));
    let runner = BatchRunner::new(BatchOptions::from_config(&cfg), Visualizer::default())
        .with_abort_flag(abort);
    let source = ImageDirSource::open(&cfg.paths.image_dir).unwrap();
    let summary = runner.run(source, &Ui::plain()).unwrap();
    assert!(summary.aborted);
    assert_eq!(summary.images_processed, 0);
}

#[test]
fn saved_records_are_scored_against_ground_truth() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_for(dir.path());
    std::fs::create_dir_all(&cfg.paths.image_dir).unwrap();
    std::fs::create_dir_all(&cfg.paths.annotations_dir).unwrap();
    let results = cfg.paths.results_dir();
    std::fs::create_dir_all(&results).unwrap();

    let blank = GrayImage::new(200, 150);
    for stem in ["img1", "img2", "img3"] {
        write_gray(&cfg.paths.image_dir.join(format!("{}.png", stem)), &blank);
    }
    // img1: one hit, one miss. img2: one hit, one false alarm. img3: no ground truth.
    std::fs::write(
        results.join("img1.txt"),
        "vehicle 10 10 50 40\n",
    )
    .unwrap();
    std::fs::write(
        cfg.paths.annotations_dir.join("img1.xml"),
        voc("img1.png", &[("vehicle", 10, 10, 60, 50), ("vehicle", 120, 80, 180, 130)]),
    )
    .unwrap();
    std::fs::write(
        results.join("img2.txt"),
        "vehicle 20 20 40 30\nvehicle 150 100 30 30\n",
    )
    .unwrap();
    std::fs::write(
        cfg.paths.annotations_dir.join("img2.xml"),
        voc("img2.png", &[("vehicle", 20, 20, 60, 50)]),
    )
    .unwrap();
    std::fs::write(results.join("img3.txt"), "vehicle 0 0 40 40\n").unwrap();

    let mut options = EvaluationOptions::from_config(&cfg);
    options.visualize = false;
    let abort = AtomicBool::new(false);
    let (report, paths) = evaluate_saved(
        ImageDirSource::open(&cfg.paths.image_dir).unwrap(),
        &results,
        &options,
        &Visualizer::default(),
        &abort,
        &Ui::plain(),
    )
    .unwrap();

    assert_eq!(report.len(), 2);
    let overall = report.overall();
    assert_eq!(overall.true_positives, 2);
    assert_eq!(overall.false_positives, 1);
    assert_eq!(overall.false_negatives, 1);
    assert!((overall.precision - 2.0 / 3.0).abs() < 1e-9);
    assert!((overall.recall - 2.0 / 3.0).abs() < 1e-9);
    assert!(paths.csv.exists());
    assert!(!options.report_dir.join("visualizations").exists());
}
