//! Rep quality from min/max angle statistics across one rep.

use super::QualityMetrics;
use crate::constants::{
    HINGE_DEPTH_IDEAL_MAX, HINGE_DEPTH_IDEAL_MIN, KNEE_FLEXION_IDEAL_MAX, KNEE_FLEXION_IDEAL_MIN, LOCKOUT_IDEAL_MIN,
};
use crate::utils::safe_cast::f64_to_u32_clamp;

/// Points lost per degree outside the hinge and lockout bands
const HIP_PENALTY_PER_DEGREE: f64 = 4.0;

/// Points lost per degree outside the knee band
const KNEE_PENALTY_PER_DEGREE: f64 = 3.0;

/// Distance of `value` outside `[min, max]`, zero inside
pub fn band_distance(value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        min - value
    } else if value > max {
        value - max
    } else {
        0.0
    }
}

/// Running extremes of one rep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepStats {
    pub max_spine: f64,
    pub max_hip: f64,
    pub min_knee: f64,
    pub frames: u32,
}

impl Default for RepStats {
    fn default() -> Self {
        Self {
            max_spine: f64::NEG_INFINITY,
            max_hip: f64::NEG_INFINITY,
            min_knee: f64::INFINITY,
            frames: 0,
        }
    }
}

impl RepStats {
    pub fn update(&mut self, spine: f64, hip: f64, knee: f64) {
        self.max_spine = self.max_spine.max(spine);
        self.max_hip = self.max_hip.max(hip);
        self.min_knee = self.min_knee.min(knee);
        self.frames += 1;
    }

    /// Metrics of the rep; zeros when no frame was seen
    pub fn metrics(&self) -> QualityMetrics {
        if self.frames == 0 {
            return QualityMetrics::default();
        }
        QualityMetrics {
            hinge_depth: self.max_spine,
            lockout_angle: self.max_hip,
            knee_flexion: 180.0 - self.min_knee,
        }
    }
}

/// Score 0-100 and feedback for one rep
pub fn score_rep(metrics: &QualityMetrics) -> (u32, Vec<String>) {
    let mut feedback = Vec::new();

    if metrics.hinge_depth < HINGE_DEPTH_IDEAL_MIN {
        feedback.push("Hinge deeper: push the hips back further".to_string());
    } else if metrics.hinge_depth > HINGE_DEPTH_IDEAL_MAX {
        feedback.push("Too much forward lean at the bottom".to_string());
    }
    if metrics.lockout_angle < LOCKOUT_IDEAL_MIN {
        feedback.push("Finish tall: fully extend the hips at the top".to_string());
    }
    if metrics.knee_flexion < KNEE_FLEXION_IDEAL_MIN {
        feedback.push("Soften the knees slightly".to_string());
    } else if metrics.knee_flexion > KNEE_FLEXION_IDEAL_MAX {
        feedback.push("Too much knee bend: hinge, don't squat".to_string());
    }

    let hinge = 100.0
        - band_distance(metrics.hinge_depth, HINGE_DEPTH_IDEAL_MIN, HINGE_DEPTH_IDEAL_MAX) * HIP_PENALTY_PER_DEGREE;
    let lockout = 100.0 - (LOCKOUT_IDEAL_MIN - metrics.lockout_angle).max(0.0) * HIP_PENALTY_PER_DEGREE;
    let knee = 100.0
        - band_distance(metrics.knee_flexion, KNEE_FLEXION_IDEAL_MIN, KNEE_FLEXION_IDEAL_MAX) * KNEE_PENALTY_PER_DEGREE;

    let score = (hinge.clamp(0.0, 100.0) + lockout.clamp(0.0, 100.0) + knee.clamp(0.0, 100.0)) / 3.0;
    (f64_to_u32_clamp(score, 0, 100), feedback)
}
