//! Exercise form analysis: phase classification, rep counting and quality scoring.
//!
//! Analyzers consume one [`Skeleton`] per frame and report the current phase,
//! whether a repetition just completed, and the representative positions and
//! quality of that repetition.

/// Offline precision/recall of detected positions against annotations
pub mod evaluation;

/// Peak-based kettlebell swing state machine
pub mod kettlebell_swing;

/// Wrist-height apex confirmation and offline peak finding
pub mod peak_detector;

/// Per-rep quality bands and feedback
pub mod quality;

use crate::biomechanics::{AngularVelocity, CompositeQuality};
use crate::config::Config;
use crate::skeleton::{AngleSnapshot, Skeleton};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use kettlebell_swing::KettlebellSwingAnalyzer;

/// Swing phases in cycle order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SwingPhase {
    Top,
    Connect,
    Bottom,
    Release,
}

impl SwingPhase {
    pub const ALL: [Self; 4] = [Self::Top, Self::Connect, Self::Bottom, Self::Release];

    pub fn name(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Connect => "connect",
            Self::Bottom => "bottom",
            Self::Release => "release",
        }
    }

    /// Phase that follows this one in a clean cycle
    pub fn next(self) -> Self {
        match self {
            Self::Top => Self::Connect,
            Self::Connect => Self::Bottom,
            Self::Bottom => Self::Release,
            Self::Release => Self::Top,
        }
    }

    /// Index within [`Self::ALL`]
    pub fn index(self) -> usize {
        match self {
            Self::Top => 0,
            Self::Connect => 1,
            Self::Bottom => 2,
            Self::Release => 3,
        }
    }
}

impl fmt::Display for SwingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Best frame seen so far for one phase of the current rep
#[derive(Debug, Clone)]
pub struct PhasePeak {
    pub phase: SwingPhase,
    pub skeleton: Skeleton,
    pub timestamp_ms: f64,
    pub video_time: Option<f64>,
    /// Selection score; higher wins for extremal phases
    pub score: f64,
    pub angles: AngleSnapshot,
}

/// Representative frame of one phase of a completed rep
#[derive(Debug, Clone)]
pub struct RepPosition {
    pub phase: SwingPhase,
    pub skeleton: Skeleton,
    pub timestamp_ms: f64,
    pub video_time: Option<f64>,
    pub score: f64,
    pub angles: AngleSnapshot,
}

impl From<PhasePeak> for RepPosition {
    fn from(peak: PhasePeak) -> Self {
        Self {
            phase: peak.phase,
            skeleton: peak.skeleton,
            timestamp_ms: peak.timestamp_ms,
            video_time: peak.video_time,
            score: peak.score,
            angles: peak.angles,
        }
    }
}

/// Named metrics of one rep, in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    /// Deepest forward lean of the spine
    pub hinge_depth: f64,
    /// Most extended hip angle at the top
    pub lockout_angle: f64,
    /// Deepest knee bend (180 minus the smallest knee angle)
    pub knee_flexion: f64,
}

/// Quality of one completed rep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepQuality {
    /// 0-100
    pub score: u32,
    pub metrics: QualityMetrics,
    pub feedback: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite: Option<CompositeQuality>,
}

/// Outcome of processing one frame
#[derive(Debug, Clone)]
pub struct FormResult {
    pub phase: SwingPhase,
    pub rep_completed: bool,
    pub rep_count: u32,
    /// Filled only on the frame that completes a rep
    pub rep_positions: Vec<RepPosition>,
    /// Filled only on the frame that completes a rep
    pub quality: Option<RepQuality>,
    pub angles: Option<AngleSnapshot>,
    pub velocity: Option<AngularVelocity>,
    /// The frame was ignored (no visible torso or stale timestamp)
    pub skipped: bool,
}

impl FormResult {
    pub(crate) fn skipped(phase: SwingPhase, rep_count: u32) -> Self {
        Self {
            phase,
            rep_completed: false,
            rep_count,
            rep_positions: Vec::new(),
            quality: None,
            angles: None,
            velocity: None,
            skipped: true,
        }
    }
}

/// Exercise-specific frame-by-frame analyzer
pub trait FormAnalyzer: Send {
    /// Feed one frame; frames must come from one subject in capture order
    ///
    /// Frames with no visible torso, or whose analyzed joints give non-finite
    /// angles, come back with `skipped` set instead of failing.
    ///
    /// # Errors
    ///
    /// Implementations may fail on internal errors; the swing analyzer never does
    fn process_frame(&mut self, skeleton: &Skeleton, timestamp_ms: f64, video_time: Option<f64>) -> Result<FormResult>;

    /// Forget all state including the rep count
    fn reset(&mut self);

    fn rep_count(&self) -> u32;

    fn phase(&self) -> SwingPhase;

    fn last_quality(&self) -> Option<&RepQuality>;

    fn name(&self) -> &str;
}

/// Create a form analyzer by exercise name
pub fn create_analyzer(exercise: &str, config: &Config) -> Result<Box<dyn FormAnalyzer>> {
    match exercise.to_lowercase().as_str() {
        "kettlebell-swing" | "kettlebell_swing" | "swing" => Ok(Box::new(KettlebellSwingAnalyzer::new(
            config.analyzer.clone(),
            config.biomechanics.clone(),
        )?)),
        _ => Err(Error::ConfigError(format!("Unknown exercise: {exercise}"))),
    }
}
