use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::matcher::{EvaluationMetrics, MetricsAccumulator};

pub const CSV_FILE: &str = "per_image_metrics.csv";
pub const SUMMARY_TXT_FILE: &str = "overall_summary.txt";
pub const SUMMARY_JSON_FILE: &str = "overall_summary.json";

const CSV_HEADER: &str = "image,precision,recall,f1,true_positives,false_positives,\
false_negatives,count_error,relative_count_error";

/// Per-image metrics keyed by image name, plus the pooled batch figures.
#[derive(Clone, Debug, Default)]
pub struct EvaluationReport {
    iou_threshold: f64,
    per_image: BTreeMap<String, EvaluationMetrics>,
    accumulator: MetricsAccumulator,
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    iou_threshold: f64,
    images_evaluated: usize,
    overall: EvaluationMetrics,
    per_image: &'a BTreeMap<String, EvaluationMetrics>,
}

/// Files produced by [`EvaluationReport::write`].
#[derive(Clone, Debug)]
pub struct ReportPaths {
    pub csv: PathBuf,
    pub summary_txt: PathBuf,
    pub summary_json: PathBuf,
}

impl EvaluationReport {
    pub fn new(iou_threshold: f64) -> Self {
        Self {
            iou_threshold,
            ..Self::default()
        }
    }

    /// Record one image's metrics.
    pub fn insert(&mut self, image: impl Into<String>, metrics: EvaluationMetrics) {
        self.accumulator.add(&metrics);
        self.per_image.insert(image.into(), metrics);
    }

    pub fn is_empty(&self) -> bool {
        self.per_image.is_empty()
    }

    pub fn len(&self) -> usize {
        self.per_image.len()
    }

    pub fn per_image(&self) -> &BTreeMap<String, EvaluationMetrics> {
        &self.per_image
    }

    pub fn overall(&self) -> EvaluationMetrics {
        self.accumulator.overall()
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::from(CSV_HEADER);
        out.push('\n');
        for (image, m) in &self.per_image {
            let _ = writeln!(
                out,
                "{},{:.6},{:.6},{:.6},{},{},{},{},{:.6}",
                image,
                m.precision,
                m.recall,
                m.f1,
                m.true_positives,
                m.false_positives,
                m.false_negatives,
                m.count_error,
                m.relative_count_error
            );
        }
        out
    }

    pub fn to_summary_text(&self) -> String {
        let m = self.overall();
        let mut out = String::new();
        let _ = writeln!(out, "=== OVERALL EVALUATION SUMMARY ===");
        let _ = writeln!(out);
        let _ = writeln!(out, "Images evaluated: {}", self.accumulator.images());
        let _ = writeln!(out, "IoU threshold: {:.2}", self.iou_threshold);
        let _ = writeln!(out, "Precision: {:.4}", m.precision);
        let _ = writeln!(out, "Recall: {:.4}", m.recall);
        let _ = writeln!(out, "F1-Score: {:.4}", m.f1);
        let _ = writeln!(out, "True Positives: {}", m.true_positives);
        let _ = writeln!(out, "False Positives: {}", m.false_positives);
        let _ = writeln!(out, "False Negatives: {}", m.false_negatives);
        let _ = writeln!(out, "Absolute Count Error: {}", m.count_error);
        let _ = writeln!(out, "Relative Count Error: {:.4}", m.relative_count_error);
        out
    }

    pub fn to_json(&self) -> Result<String> {
        let summary = JsonSummary {
            iou_threshold: self.iou_threshold,
            images_evaluated: self.accumulator.images(),
            overall: self.overall(),
            per_image: &self.per_image,
        };
        serde_json::to_string_pretty(&summary).context("serialize evaluation summary")
    }

    /// Write the CSV table and both summaries into `dir`.
    pub fn write(&self, dir: &Path) -> Result<ReportPaths> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create report directory {}", dir.display()))?;
        let paths = ReportPaths {
            csv: dir.join(CSV_FILE),
            summary_txt: dir.join(SUMMARY_TXT_FILE),
            summary_json: dir.join(SUMMARY_JSON_FILE),
        };
        std::fs::write(&paths.csv, self.to_csv())
            .with_context(|| format!("write {}", paths.csv.display()))?;
        std::fs::write(&paths.summary_txt, self.to_summary_text())
            .with_context(|| format!("write {}", paths.summary_txt.display()))?;
        std::fs::write(&paths.summary_json, self.to_json()?)
            .with_context(|| format!("write {}", paths.summary_json.display()))?;
        Ok(paths)
    }
}
