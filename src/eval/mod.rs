//! Scoring detections against hand-labelled ground truth.

pub mod matcher;
pub mod records;
pub mod report;
pub mod voc;

pub use matcher::{
    evaluate, match_boxes, EvaluationMetrics, MatchOutcome, MatchPair, MetricsAccumulator,
    DEFAULT_IOU_THRESHOLD,
};
pub use records::{read_detections, write_detections};
pub use report::{EvaluationReport, ReportPaths};
pub use voc::{annotation_path, load_annotations, parse_voc_str, Annotation};
