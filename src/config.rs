//! Configuration management for the swing analyzer

use crate::constants::{
    DEFAULT_BIOMECHANICS_BUFFER, DEFAULT_BOTTOM_ARM_BEHIND_MAX, DEFAULT_BOTTOM_ARM_BEHIND_MIN, DEFAULT_BOTTOM_HIP_MAX,
    DEFAULT_BOTTOM_SPINE_MIN, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONNECT_ARM_BAND, DEFAULT_CONNECT_SPINE_MAX,
    DEFAULT_LOOKUP_TOLERANCE_FRAMES, DEFAULT_METADATA_TIMEOUT_SECS, DEFAULT_MIN_DWELL_FRAMES, DEFAULT_PEAK_DROP_RATIO,
    DEFAULT_PROGRESS_EVERY_FRAMES, DEFAULT_RELEASE_ARM_MIN, DEFAULT_RELEASE_SPINE_MAX, DEFAULT_SMOOTHING_ALPHA,
    DEFAULT_TOP_ARM_MIN, DEFAULT_TOP_FALLBACK_FRAMES, DEFAULT_TOP_HIP_MIN, DEFAULT_TOP_SPINE_MAX,
    DEFAULT_WRIST_SMOOTHING_WINDOW, DEFAULT_WRIST_WINDOW,
};
use crate::source::FacingMode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Swing phase state machine thresholds
    pub analyzer: AnalyzerConfig,

    /// Angle smoothing and velocity estimation
    pub biomechanics: BiomechanicsConfig,

    /// Pose cache lookup and persistence
    pub cache: CacheConfig,

    /// Video-file extraction behaviour
    pub extraction: ExtractionConfig,

    /// Live camera defaults
    pub camera: CameraConfig,
}

/// Swing phase thresholds, in degrees unless noted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Frames a guard must hold, and a phase must last, before a transition
    pub min_dwell_frames: u32,

    /// Top -> Connect: arm within this band of vertical
    pub connect_arm_band: f64,
    /// Top -> Connect: spine at most this far from upright
    pub connect_spine_max: f64,

    /// Connect -> Bottom: arm at least this far behind vertical
    pub bottom_arm_behind_min: f64,
    /// Connect -> Bottom: arm at most this far from vertical
    pub bottom_arm_behind_max: f64,
    /// Connect -> Bottom: minimum forward lean
    pub bottom_spine_min: f64,
    /// Connect -> Bottom: hip angle at most this (flexed)
    pub bottom_hip_max: f64,

    /// Bottom -> Release: arm back through vertical
    pub release_arm_min: f64,
    /// Bottom -> Release: spine back under this lean
    pub release_spine_max: f64,

    /// Release -> Top: upright spine
    pub top_spine_max: f64,
    /// Release -> Top: extended hip
    pub top_hip_min: f64,
    /// Release -> Top: arm near horizontal or above
    pub top_arm_min: f64,
    /// Horizontal frames that confirm Top when no wrist peak is seen
    pub top_fallback_frames: u32,

    /// Rolling window of smoothed wrist heights used for peak confirmation
    pub wrist_window: usize,
    /// Moving average length applied to raw wrist height
    pub wrist_smoothing_window: usize,
    /// Drop below the apex confirming a peak, as a fraction of torso length
    pub peak_drop_ratio: f64,
}

/// Biomechanics settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiomechanicsConfig {
    /// Rolling frame buffer length
    pub buffer_size: usize,

    /// Angle filter type (exponential, moving_average, none)
    pub filter: String,

    /// EMA smoothing factor (0.0-1.0]
    pub smoothing_alpha: f64,
}

/// Pose cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Nearest-frame lookup tolerance, in frame intervals
    pub lookup_tolerance_frames: f64,

    /// Directory holding `<hash>.posetrack.json` files
    pub store_dir: PathBuf,
}

/// Extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Bounded wait for video metadata
    pub metadata_timeout_secs: u64,

    /// Progress state is published every N frames
    pub progress_every_frames: u32,

    /// Capacity of skeleton and pipeline event channels
    pub channel_capacity: usize,
}

/// Camera settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Facing mode used by a fresh camera session
    pub facing_mode: FacingMode,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_dwell_frames: DEFAULT_MIN_DWELL_FRAMES,
            connect_arm_band: DEFAULT_CONNECT_ARM_BAND,
            connect_spine_max: DEFAULT_CONNECT_SPINE_MAX,
            bottom_arm_behind_min: DEFAULT_BOTTOM_ARM_BEHIND_MIN,
            bottom_arm_behind_max: DEFAULT_BOTTOM_ARM_BEHIND_MAX,
            bottom_spine_min: DEFAULT_BOTTOM_SPINE_MIN,
            bottom_hip_max: DEFAULT_BOTTOM_HIP_MAX,
            release_arm_min: DEFAULT_RELEASE_ARM_MIN,
            release_spine_max: DEFAULT_RELEASE_SPINE_MAX,
            top_spine_max: DEFAULT_TOP_SPINE_MAX,
            top_hip_min: DEFAULT_TOP_HIP_MIN,
            top_arm_min: DEFAULT_TOP_ARM_MIN,
            top_fallback_frames: DEFAULT_TOP_FALLBACK_FRAMES,
            wrist_window: DEFAULT_WRIST_WINDOW,
            wrist_smoothing_window: DEFAULT_WRIST_SMOOTHING_WINDOW,
            peak_drop_ratio: DEFAULT_PEAK_DROP_RATIO,
        }
    }
}

impl Default for BiomechanicsConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BIOMECHANICS_BUFFER,
            filter: "exponential".to_string(),
            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lookup_tolerance_frames: DEFAULT_LOOKUP_TOLERANCE_FRAMES,
            store_dir: PathBuf::from("posetracks"),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            metadata_timeout_secs: DEFAULT_METADATA_TIMEOUT_SECS,
            progress_every_frames: DEFAULT_PROGRESS_EVERY_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::User,
        }
    }
}

impl ExtractionConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_yaml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let a = &self.analyzer;

        if a.min_dwell_frames == 0 {
            return Err(Error::ConfigError("min_dwell_frames must be greater than 0".to_string()));
        }
        if a.top_fallback_frames == 0 {
            return Err(Error::ConfigError("top_fallback_frames must be greater than 0".to_string()));
        }
        if a.wrist_window < 3 {
            return Err(Error::ConfigError("wrist_window must be at least 3".to_string()));
        }
        if a.wrist_smoothing_window == 0 {
            return Err(Error::ConfigError("wrist_smoothing_window must be greater than 0".to_string()));
        }
        if a.bottom_arm_behind_min > a.bottom_arm_behind_max {
            return Err(Error::ConfigError(
                "bottom_arm_behind_min must not exceed bottom_arm_behind_max".to_string(),
            ));
        }
        let angles = [
            ("connect_arm_band", a.connect_arm_band),
            ("connect_spine_max", a.connect_spine_max),
            ("bottom_spine_min", a.bottom_spine_min),
            ("bottom_hip_max", a.bottom_hip_max),
            ("release_spine_max", a.release_spine_max),
            ("top_spine_max", a.top_spine_max),
            ("top_hip_min", a.top_hip_min),
        ];
        for (name, value) in angles {
            if !(0.0..=180.0).contains(&value) {
                return Err(Error::ConfigError(format!("{name} must be between 0 and 180 degrees")));
            }
        }
        if !(0.0..=1.0).contains(&a.peak_drop_ratio) {
            return Err(Error::ConfigError("peak_drop_ratio must be between 0.0 and 1.0".to_string()));
        }

        if self.biomechanics.buffer_size < 3 {
            return Err(Error::ConfigError("Biomechanics buffer must hold at least 3 frames".to_string()));
        }
        if !(self.biomechanics.smoothing_alpha > 0.0 && self.biomechanics.smoothing_alpha <= 1.0) {
            return Err(Error::ConfigError("Smoothing alpha must be in (0.0, 1.0]".to_string()));
        }
        crate::filters::create_filter(&self.biomechanics.filter, self.biomechanics.smoothing_alpha)?;

        if !(self.cache.lookup_tolerance_frames > 0.0) {
            return Err(Error::ConfigError(
                "Lookup tolerance must be greater than 0 frames".to_string(),
            ));
        }

        if self.extraction.metadata_timeout_secs == 0 {
            return Err(Error::ConfigError("Metadata timeout must be greater than 0".to_string()));
        }
        if self.extraction.progress_every_frames == 0 {
            return Err(Error::ConfigError("Progress interval must be greater than 0".to_string()));
        }
        if self.extraction.channel_capacity == 0 {
            return Err(Error::ConfigError("Channel capacity must be greater than 0".to_string()));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Swing Analyzer Configuration

# Swing phase thresholds (degrees; arm angle is signed, 0 = hanging, +90 = horizontal in front)
analyzer:
  min_dwell_frames: 2
  connect_arm_band: 25.0
  connect_spine_max: 30.0
  bottom_arm_behind_min: 5.0
  bottom_arm_behind_max: 120.0
  bottom_spine_min: 40.0
  bottom_hip_max: 140.0
  release_arm_min: 0.0
  release_spine_max: 40.0
  top_spine_max: 25.0
  top_hip_min: 150.0
  top_arm_min: 70.0
  top_fallback_frames: 3
  wrist_window: 5
  wrist_smoothing_window: 3
  peak_drop_ratio: 0.02

# Angle smoothing
biomechanics:
  buffer_size: 10
  filter: "exponential"
  smoothing_alpha: 0.3

# Pose cache
cache:
  lookup_tolerance_frames: 1.5
  store_dir: "posetracks"

# Video extraction
extraction:
  metadata_timeout_secs: 10
  progress_every_frames: 5
  channel_capacity: 1024

# Camera
camera:
  facing_mode: "user"
"#;
