use serde::{Deserialize, Serialize};

use crate::detect::Detection;

use super::voc::Annotation;

pub const DEFAULT_IOU_THRESHOLD: f64 = 0.5;

/// Detection quality of one image, or of a whole batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub count_error: usize,
    pub relative_count_error: f64,
}

impl EvaluationMetrics {
    /// Ratios from match counts. Ground truth size is `tp + fn`, detection
    /// count is `tp + fp`; count errors are left at zero.
    pub fn from_counts(
        true_positives: usize,
        false_positives: usize,
        false_negatives: usize,
    ) -> Self {
        let gt = true_positives + false_negatives;
        let det = true_positives + false_positives;
        let (precision, recall) = match (gt, det) {
            (0, 0) => (1.0, 1.0),
            (0, _) => (0.0, 1.0),
            (_, 0) => (1.0, 0.0),
            _ => (
                true_positives as f64 / det as f64,
                true_positives as f64 / gt as f64,
            ),
        };
        let f1 = if gt == 0 && det == 0 {
            1.0
        } else if gt == 0 || det == 0 || precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self {
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            count_error: 0,
            relative_count_error: 0.0,
        }
    }

    pub fn ground_truth_count(&self) -> usize {
        self.true_positives + self.false_negatives
    }

    pub fn detection_count(&self) -> usize {
        self.true_positives + self.false_positives
    }
}

/// A ground-truth box paired with the detection assigned to it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchPair {
    pub ground_truth: usize,
    pub detection: usize,
    pub iou: f64,
}

/// Assignment of detections to ground truth, by index into the inputs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchOutcome {
    pub pairs: Vec<MatchPair>,
    pub unmatched_ground_truth: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Greedy one-to-one matching.
///
/// Ground truth is visited in order; each takes the unmatched detection of
/// the same label with the highest IoU, provided it reaches `iou_threshold`.
/// Ties go to the earlier detection.
pub fn match_boxes(
    detections: &[Detection],
    ground_truth: &[Annotation],
    iou_threshold: f64,
) -> MatchOutcome {
    let mut taken = vec![false; detections.len()];
    let mut outcome = MatchOutcome::default();

    for (gi, gt) in ground_truth.iter().enumerate() {
        let mut best: Option<(usize, f64)> = None;
        for (di, det) in detections.iter().enumerate() {
            if taken[di] || det.label != gt.label {
                continue;
            }
            let iou = det.bbox.iou(&gt.bbox);
            if iou < iou_threshold {
                continue;
            }
            if best.map_or(true, |(_, b)| iou > b) {
                best = Some((di, iou));
            }
        }
        match best {
            Some((di, iou)) => {
                taken[di] = true;
                outcome.pairs.push(MatchPair {
                    ground_truth: gi,
                    detection: di,
                    iou,
                });
            }
            None => outcome.unmatched_ground_truth.push(gi),
        }
    }
    outcome.unmatched_detections = (0..detections.len()).filter(|&i| !taken[i]).collect();
    outcome
}

pub fn evaluate(
    detections: &[Detection],
    ground_truth: &[Annotation],
    iou_threshold: f64,
) -> EvaluationMetrics {
    let outcome = match_boxes(detections, ground_truth, iou_threshold);
    let mut metrics = EvaluationMetrics::from_counts(
        outcome.pairs.len(),
        outcome.unmatched_detections.len(),
        outcome.unmatched_ground_truth.len(),
    );
    metrics.count_error = ground_truth.len().abs_diff(detections.len());
    metrics.relative_count_error = if ground_truth.is_empty() {
        0.0
    } else {
        metrics.count_error as f64 / ground_truth.len() as f64
    };
    metrics
}

/// Pools per-image metrics into batch totals.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricsAccumulator {
    true_positives: usize,
    false_positives: usize,
    false_negatives: usize,
    count_error: usize,
    ground_truth: usize,
    images: usize,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, metrics: &EvaluationMetrics) {
        self.true_positives += metrics.true_positives;
        self.false_positives += metrics.false_positives;
        self.false_negatives += metrics.false_negatives;
        self.count_error += metrics.count_error;
        self.ground_truth += metrics.ground_truth_count();
        self.images += 1;
    }

    pub fn images(&self) -> usize {
        self.images
    }

    /// Ratios recomputed from the summed counts.
    pub fn overall(&self) -> EvaluationMetrics {
        let mut metrics = EvaluationMetrics::from_counts(
            self.true_positives,
            self.false_positives,
            self.false_negatives,
        );
        metrics.count_error = self.count_error;
        metrics.relative_count_error = if self.ground_truth == 0 {
            0.0
        } else {
            self.count_error as f64 / self.ground_truth as f64
        };
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(x: i32, y: i32, w: u32, h: u32) -> Detection {
        Detection::new("vehicle", BoundingBox::new(x, y, w, h))
    }

    fn gt(x: i32, y: i32, w: u32, h: u32) -> Annotation {
        Annotation::new("vehicle", BoundingBox::new(x, y, w, h), "img")
    }

    fn assert_invariants(m: &EvaluationMetrics, dets: usize, gts: usize) {
        assert_eq!(m.true_positives + m.false_negatives, gts);
        assert_eq!(m.true_positives + m.false_positives, dets);
        for v in [m.precision, m.recall, m.f1] {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn both_empty_is_perfect() {
        let m = evaluate(&[], &[], 0.5);
        assert_eq!((m.precision, m.recall, m.f1), (1.0, 1.0, 1.0));
        assert_eq!(m.count_error, 0);
        assert_eq!(m.relative_count_error, 0.0);
    }

    #[test]
    fn detections_without_ground_truth_are_false_positives() {
        let m = evaluate(&[det(0, 0, 10, 10)], &[], 0.5);
        assert_eq!(m.false_positives, 1);
        assert_eq!((m.precision, m.recall, m.f1), (0.0, 1.0, 0.0));
        assert_eq!(m.count_error, 1);
        assert_eq!(m.relative_count_error, 0.0);
    }

    #[test]
    fn ground_truth_without_detections_is_missed() {
        let m = evaluate(&[], &[gt(0, 0, 10, 10)], 0.5);
        assert_eq!(m.false_negatives, 1);
        assert_eq!((m.precision, m.recall, m.f1), (1.0, 0.0, 0.0));
        assert_eq!(m.count_error, 1);
        assert_eq!(m.relative_count_error, 1.0);
    }

    #[test]
    fn overlapping_pairs_match_by_best_iou() {
        let gts = [gt(0, 0, 90, 100), gt(40, 0, 60, 100)];
        let dets = [det(0, 0, 100, 100), det(40, 0, 60, 55)];

        let outcome = match_boxes(&dets, &gts, 0.5);
        assert_eq!(outcome.pairs.len(), 2);
        assert_eq!(outcome.pairs[0].ground_truth, 0);
        assert_eq!(outcome.pairs[0].detection, 0);
        assert!((outcome.pairs[0].iou - 0.9).abs() < 1e-12);
        assert_eq!(outcome.pairs[1].detection, 1);
        assert!((outcome.pairs[1].iou - 0.55).abs() < 1e-12);

        let m = evaluate(&dets, &gts, 0.5);
        assert_eq!((m.true_positives, m.false_positives, m.false_negatives), (2, 0, 0));
        assert_eq!((m.precision, m.recall, m.f1), (1.0, 1.0, 1.0));
    }

    #[test]
    fn below_threshold_and_other_labels_do_not_match() {
        let gts = [gt(0, 0, 10, 10)];
        let shifted = det(5, 0, 10, 10);
        let mut relabelled = det(0, 0, 10, 10);
        relabelled.label = "truck".into();

        let m = evaluate(&[shifted, relabelled], &gts, 0.5);
        assert_eq!((m.true_positives, m.false_positives, m.false_negatives), (0, 2, 1));
        assert_eq!((m.precision, m.recall, m.f1), (0.0, 0.0, 0.0));
        assert_invariants(&m, 2, 1);
    }

    #[test]
    fn threshold_is_inclusive_and_ties_pick_earliest() {
        let gts = [gt(0, 0, 10, 10)];
        // Both have IoU 50 / 100 = 0.5 exactly.
        let dets = [det(0, 0, 10, 5), det(0, 5, 10, 5)];
        let outcome = match_boxes(&dets, &gts, 0.5);
        assert_eq!(outcome.pairs[0].detection, 0);
        assert_eq!(outcome.unmatched_detections, vec![1]);
    }

    #[test]
    fn each_detection_is_used_once() {
        let gts = [gt(0, 0, 10, 10), gt(0, 0, 10, 10)];
        let dets = [det(0, 0, 10, 10)];
        let m = evaluate(&dets, &gts, 0.5);
        assert_eq!((m.true_positives, m.false_negatives), (1, 1));
        assert_invariants(&m, 1, 2);
    }

    #[test]
    fn count_error_of_five_versus_three() {
        let gts: Vec<Annotation> = (0..5).map(|i| gt(i * 100, 0, 20, 20)).collect();
        let dets: Vec<Detection> = (0..3).map(|i| det(i * 100, 500, 20, 20)).collect();
        let m = evaluate(&dets, &gts, 0.5);
        assert_eq!(m.count_error, 2);
        assert!((m.relative_count_error - 0.4).abs() < 1e-12);
        assert_invariants(&m, 3, 5);
    }

    #[test]
    fn accumulator_recomputes_ratios_from_sums() {
        let mut acc = MetricsAccumulator::new();
        acc.add(&evaluate(&[det(0, 0, 10, 10)], &[gt(0, 0, 10, 10)], 0.5));
        acc.add(&evaluate(&[], &[gt(0, 0, 10, 10), gt(50, 50, 10, 10)], 0.5));
        acc.add(&evaluate(&[det(0, 0, 10, 10)], &[], 0.5));

        let overall = acc.overall();
        assert_eq!(acc.images(), 3);
        assert_eq!(
            (overall.true_positives, overall.false_positives, overall.false_negatives),
            (1, 1, 2)
        );
        assert_eq!(overall.precision, 0.5);
        assert!((overall.recall - 1.0 / 3.0).abs() < 1e-12);
        assert!((overall.f1 - 0.4).abs() < 1e-12);
        assert_eq!(overall.count_error, 3);
        assert_eq!(overall.relative_count_error, 1.0);
    }

    #[test]
    fn empty_accumulator_is_perfect() {
        let overall = MetricsAccumulator::new().overall();
        assert_eq!((overall.precision, overall.recall, overall.f1), (1.0, 1.0, 1.0));
    }
}
