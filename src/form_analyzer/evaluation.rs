//! Precision and recall of detected positions against annotated frames.

use super::SwingPhase;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One annotated frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub frame_index: u32,
    pub position: SwingPhase,
    #[serde(default)]
    pub notes: String,
}

/// A detection or annotation that found no match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionError {
    FalsePositive(u32),
    FalseNegative(u32),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionMetrics {
    pub true_positives: u32,
    pub false_positives: u32,
    pub false_negatives: u32,
    pub errors: Vec<DetectionError>,
}

impl DetectionMetrics {
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        f64::from(numerator) / f64::from(denominator)
    }
}

/// Match detected frames to ground truth within `tolerance_frames`
///
/// Duplicated frame indices count once. A detection is a true positive when
/// any annotation lies within tolerance; an annotation with no detection in
/// tolerance is a false negative.
#[must_use]
pub fn evaluate_detections(detected: &[u32], ground_truth: &[u32], tolerance_frames: u32) -> DetectionMetrics {
    let detected: BTreeSet<u32> = detected.iter().copied().collect();
    let truth: BTreeSet<u32> = ground_truth.iter().copied().collect();
    let near = |a: u32, b: u32| a.abs_diff(b) <= tolerance_frames;

    let mut metrics = DetectionMetrics::default();
    for &frame in &detected {
        if truth.iter().any(|&gt| near(frame, gt)) {
            metrics.true_positives += 1;
        } else {
            metrics.false_positives += 1;
            metrics.errors.push(DetectionError::FalsePositive(frame));
        }
    }
    for &gt in &truth {
        if !detected.iter().any(|&frame| near(frame, gt)) {
            metrics.false_negatives += 1;
            metrics.errors.push(DetectionError::FalseNegative(gt));
        }
    }
    metrics
}

/// Evaluate one phase from `(frame_index, phase)` detections and annotations
pub fn evaluate_phase(
    detections: &[(u32, SwingPhase)],
    annotations: &[Annotation],
    phase: SwingPhase,
    tolerance_frames: u32,
) -> DetectionMetrics {
    let detected: Vec<u32> = detections
        .iter()
        .filter(|(_, p)| *p == phase)
        .map(|(frame, _)| *frame)
        .collect();
    let truth: Vec<u32> = annotations
        .iter()
        .filter(|a| a.position == phase)
        .map(|a| a.frame_index)
        .collect();
    evaluate_detections(&detected, &truth, tolerance_frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tolerance_matching() {
        let metrics = evaluate_detections(&[10, 31, 60], &[12, 30, 90], 2);
        assert_eq!(metrics.true_positives, 2);
        assert_eq!(metrics.false_positives, 1);
        assert_eq!(metrics.false_negatives, 1);
        assert_relative_eq!(metrics.precision(), 2.0 / 3.0);
        assert_relative_eq!(metrics.recall(), 2.0 / 3.0);
        assert_relative_eq!(metrics.f1(), 2.0 / 3.0);
        assert!(metrics.errors.contains(&DetectionError::FalsePositive(60)));
        assert!(metrics.errors.contains(&DetectionError::FalseNegative(90)));
    }

    #[test]
    fn test_empty_inputs() {
        let metrics = evaluate_detections(&[], &[], 2);
        assert_eq!(metrics.precision(), 0.0);
        assert_eq!(metrics.f1(), 0.0);
    }

    #[test]
    fn test_evaluate_phase_filters_by_position() {
        let annotations: Vec<Annotation> = serde_json::from_str(
            r#"[{"frame_index": 10, "position": "top"}, {"frame_index": 20, "position": "bottom", "notes": "deep"}]"#,
        )
        .unwrap();
        let detections = [(11, SwingPhase::Top), (20, SwingPhase::Top), (21, SwingPhase::Bottom)];
        let top = evaluate_phase(&detections, &annotations, SwingPhase::Top, 2);
        assert_eq!((top.true_positives, top.false_positives), (1, 1));
        let bottom = evaluate_phase(&detections, &annotations, SwingPhase::Bottom, 2);
        assert_eq!(bottom.true_positives, 1);
        assert_eq!(bottom.false_negatives, 0);
    }
}
