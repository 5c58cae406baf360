//! Biomechanics analysis over a short rolling window of frames.
//!
//! Joint angles are smoothed per channel, differentiated with a central
//! difference to get angular velocity, and summarised per rep into a composite
//! quality (power, consistency, lockout, depth).

use crate::config::BiomechanicsConfig;
use crate::constants::{
    HINGE_DEPTH_IDEAL_MAX, HINGE_DEPTH_IDEAL_MIN, LOCKOUT_IDEAL_MIN, POWER_REFERENCE_VELOCITY,
};
use crate::filters::{create_filter, SignalFilter};
use crate::form_analyzer::quality::band_distance;
use crate::form_analyzer::{QualityMetrics, SwingPhase};
use crate::skeleton::{hinge_score_from, AngleSnapshot, Skeleton};
use crate::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One buffered frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiomechanicsFrame {
    pub timestamp_ms: f64,
    pub raw: AngleSnapshot,
    pub smoothed: AngleSnapshot,
}

/// Angular velocity of the smoothed angles, in degrees per second
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AngularVelocity {
    pub spine: f64,
    pub hip: f64,
    pub knee: f64,
    pub arm: f64,
}

/// Movement pattern of a flexed posture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MovementPattern {
    /// Too little flexion to classify
    Standing,
    Hinge,
    Squat,
    Mixed,
}

/// Reference angles captured while the subject stands tall
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingCalibration {
    pub spine: f64,
    pub hip: f64,
    pub knee: f64,
}

/// Composite quality scores, each 0-100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeQuality {
    pub power: f64,
    pub consistency: f64,
    pub lockout: f64,
    pub depth: f64,
    pub overall: f64,
}

/// Statistical summary of a data window
#[derive(Debug, Clone, Copy)]
pub struct Statistics {
    /// Mean value of the data
    pub mean: f64,
    /// Standard deviation of the data
    pub std_dev: f64,
    /// Minimum value in the window
    pub min: f64,
    /// Maximum value in the window
    pub max: f64,
    /// Range (max - min) of the data
    pub range: f64,
}

impl Statistics {
    /// Population statistics, `None` for an empty slice
    pub fn from_values(data: &[f64]) -> Option<Self> {
        if data.is_empty() {
            return None;
        }
        let n = data.len() as f64;
        let mean = data.iter().sum::<f64>() / n;

        let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        let std_dev = variance.sqrt();

        let min = data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            mean,
            std_dev,
            min,
            max,
            range: max - min,
        })
    }
}

/// Hinge score above which a posture counts as a hinge (and below minus which a squat)
const PATTERN_THRESHOLD: f64 = 0.3;

/// Flexion below this total is treated as standing
const STANDING_FLEXION: f64 = 10.0;

/// Per-channel smoothing filters
struct ChannelFilters {
    spine: Box<dyn SignalFilter>,
    hip: Box<dyn SignalFilter>,
    knee: Box<dyn SignalFilter>,
    arm_to_spine: Box<dyn SignalFilter>,
    arm_to_vertical: Box<dyn SignalFilter>,
    wrist_height: Box<dyn SignalFilter>,
}

impl ChannelFilters {
    fn new(config: &BiomechanicsConfig) -> Result<Self> {
        let make = || create_filter(&config.filter, config.smoothing_alpha);
        Ok(Self {
            spine: make()?,
            hip: make()?,
            knee: make()?,
            arm_to_spine: make()?,
            arm_to_vertical: make()?,
            wrist_height: make()?,
        })
    }

    fn apply(&mut self, raw: &AngleSnapshot) -> AngleSnapshot {
        AngleSnapshot {
            spine: self.spine.apply(raw.spine),
            hip: self.hip.apply(raw.hip),
            knee: self.knee.apply(raw.knee),
            arm_to_spine: self.arm_to_spine.apply(raw.arm_to_spine),
            arm_to_vertical: self.arm_to_vertical.apply(raw.arm_to_vertical),
            wrist_height: self.wrist_height.apply(raw.wrist_height),
        }
    }

    fn reset(&mut self) {
        self.spine.reset();
        self.hip.reset();
        self.knee.reset();
        self.arm_to_spine.reset();
        self.arm_to_vertical.reset();
        self.wrist_height.reset();
    }
}

/// Rolling-window biomechanics analyzer
pub struct BiomechanicsAnalyzer {
    buffer_size: usize,
    buffer: VecDeque<BiomechanicsFrame>,
    filters: ChannelFilters,
    calibration: Option<StandingCalibration>,
    current_rep_peak_velocity: f64,
    rep_peak_velocities: Vec<f64>,
}

impl BiomechanicsAnalyzer {
    /// Create an analyzer; the buffer holds at least three frames
    pub fn new(config: &BiomechanicsConfig) -> Result<Self> {
        let buffer_size = config.buffer_size.max(3);
        Ok(Self {
            buffer_size,
            buffer: VecDeque::with_capacity(buffer_size),
            filters: ChannelFilters::new(config)?,
            calibration: None,
            current_rep_peak_velocity: 0.0,
            rep_peak_velocities: Vec::new(),
        })
    }

    /// Smooth and buffer one frame; returns `None` when a required joint is missing
    pub fn add_frame(&mut self, skeleton: &Skeleton, timestamp_ms: f64) -> Option<BiomechanicsFrame> {
        let raw = skeleton.angles()?;
        Some(self.add_angles(raw, timestamp_ms))
    }

    /// Smooth and buffer precomputed angles
    pub fn add_angles(&mut self, raw: AngleSnapshot, timestamp_ms: f64) -> BiomechanicsFrame {
        let frame = BiomechanicsFrame {
            timestamp_ms,
            raw,
            smoothed: self.filters.apply(&raw),
        };
        if self.buffer.len() >= self.buffer_size {
            self.buffer.pop_front();
        }
        self.buffer.push_back(frame);

        if let Some(velocity) = self.velocity() {
            self.current_rep_peak_velocity = self.current_rep_peak_velocity.max(velocity.hip.abs());
        }
        frame
    }

    /// Latest smoothed angles
    pub fn smoothed(&self) -> Option<AngleSnapshot> {
        self.buffer.back().map(|frame| frame.smoothed)
    }

    /// Number of buffered frames
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Central-difference velocity at the second-newest frame
    ///
    /// Needs three frames with increasing timestamps.
    pub fn velocity(&self) -> Option<AngularVelocity> {
        let n = self.buffer.len();
        if n < 3 {
            return None;
        }
        let newer = &self.buffer[n - 1];
        let older = &self.buffer[n - 3];
        let dt = (newer.timestamp_ms - older.timestamp_ms) / 1000.0;
        if dt <= 0.0 {
            return None;
        }
        let rate = |a: f64, b: f64| (a - b) / dt;
        Some(AngularVelocity {
            spine: rate(newer.smoothed.spine, older.smoothed.spine),
            hip: rate(newer.smoothed.hip, older.smoothed.hip),
            knee: rate(newer.smoothed.knee, older.smoothed.knee),
            arm: rate(newer.smoothed.arm_to_vertical, older.smoothed.arm_to_vertical),
        })
    }

    /// Capture standing reference angles
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the skeleton lacks a visible torso or leg joints
    pub fn calibrate_standing(&mut self, skeleton: &Skeleton) -> Result<StandingCalibration> {
        if !skeleton.has_visible_pose() {
            return Err(Error::InvalidInput("Calibration needs a visible torso".to_string()));
        }
        let angles = skeleton
            .angles()
            .ok_or_else(|| Error::InvalidInput("Calibration needs hip, knee and wrist joints".to_string()))?;
        let calibration = StandingCalibration {
            spine: angles.spine,
            hip: angles.hip,
            knee: angles.knee,
        };
        debug!(
            "Standing calibration: spine {:.1}, hip {:.1}, knee {:.1}",
            calibration.spine, calibration.hip, calibration.knee
        );
        self.calibration = Some(calibration);
        Ok(calibration)
    }

    pub fn calibration(&self) -> Option<StandingCalibration> {
        self.calibration
    }

    /// Classify a posture as hinge, squat or mixed
    ///
    /// Flexion is measured from the calibrated standing angles when present,
    /// otherwise from a straight 180 degrees.
    pub fn classify_pattern(&self, angles: &AngleSnapshot) -> MovementPattern {
        let (hip_ref, knee_ref) = self.calibration.map_or((180.0, 180.0), |c| (c.hip, c.knee));
        let hip_flexion = (hip_ref - angles.hip).max(0.0);
        let knee_flexion = (knee_ref - angles.knee).max(0.0);
        if hip_flexion + knee_flexion < STANDING_FLEXION {
            return MovementPattern::Standing;
        }
        let score = hinge_score_from(hip_flexion, knee_flexion);
        if score > PATTERN_THRESHOLD {
            MovementPattern::Hinge
        } else if score < -PATTERN_THRESHOLD {
            MovementPattern::Squat
        } else {
            MovementPattern::Mixed
        }
    }

    /// Score a rep and start tracking the next one
    pub fn complete_rep(&mut self, metrics: &QualityMetrics) -> CompositeQuality {
        let peak = self.current_rep_peak_velocity;
        self.rep_peak_velocities.push(peak);
        self.current_rep_peak_velocity = 0.0;

        let power = (peak / POWER_REFERENCE_VELOCITY * 100.0).clamp(0.0, 100.0);

        let consistency = match Statistics::from_values(&self.rep_peak_velocities) {
            Some(stats) if self.rep_peak_velocities.len() >= 2 && stats.mean > 0.0 => {
                (100.0 - stats.std_dev / stats.mean * 100.0).clamp(0.0, 100.0)
            }
            _ => 100.0,
        };

        let lockout = (100.0 - (LOCKOUT_IDEAL_MIN - metrics.lockout_angle).max(0.0) * 4.0).clamp(0.0, 100.0);
        let depth = (100.0
            - band_distance(metrics.hinge_depth, HINGE_DEPTH_IDEAL_MIN, HINGE_DEPTH_IDEAL_MAX) * 4.0)
            .clamp(0.0, 100.0);

        CompositeQuality {
            power,
            consistency,
            lockout,
            depth,
            overall: (power + consistency + lockout + depth) / 4.0,
        }
    }

    /// Clear buffers, filters and rep history; calibration is kept
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.filters.reset();
        self.current_rep_peak_velocity = 0.0;
        self.rep_peak_velocities.clear();
    }
}

/// Selection score of a frame as a candidate for a phase
///
/// Top ranks by arm elevation and Bottom by forward lean. Connect and Release
/// are timing positions: every candidate scores 0 and the first one is kept.
pub fn candidate_score(phase: SwingPhase, angles: &AngleSnapshot) -> f64 {
    match phase {
        SwingPhase::Top => angles.arm_to_vertical,
        SwingPhase::Bottom => angles.spine,
        SwingPhase::Connect | SwingPhase::Release => 0.0,
    }
}

/// Whether `candidate` should replace the current best for `phase`
pub fn prefers_candidate(phase: SwingPhase, current: Option<f64>, candidate: f64) -> bool {
    match current {
        None => true,
        Some(best) => match phase {
            SwingPhase::Top | SwingPhase::Bottom => candidate > best,
            SwingPhase::Connect | SwingPhase::Release => false,
        },
    }
}
