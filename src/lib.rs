//! Kettlebell swing analysis from pose keypoint streams.
//!
//! This library turns per-frame body keypoints into a live rep count, swing
//! phase and per-rep form score:
//! - Skeleton sources for live camera input and video files, with extracted
//!   poses cached per video content hash
//! - An input session that owns exactly one active source at a time
//! - A processing pipeline chaining acquisition, skeleton construction and
//!   form analysis
//! - A peak-based swing phase state machine with hysteresis
//!
//! # Examples
//!
//! ## Counting reps from skeletons
//!
//! ```no_run
//! use swing_analyzer::form_analyzer::{FormAnalyzer, KettlebellSwingAnalyzer};
//! use swing_analyzer::pose_track::PoseTrackFile;
//!
//! # async fn run() -> swing_analyzer::Result<()> {
//! let track = PoseTrackFile::load("swing.posetrack.json").await?;
//! let mut analyzer = KettlebellSwingAnalyzer::with_defaults()?;
//!
//! for frame in track.detected_frames() {
//!     let result = analyzer.process_frame(&frame.skeleton(), frame.timestamp, Some(frame.video_time))?;
//!     if let Some(quality) = result.quality {
//!         println!("Rep {}: score {}", result.rep_count, quality.score);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Seeking in a cached track
//!
//! ```no_run
//! use swing_analyzer::pose_cache::PoseCache;
//! use swing_analyzer::pose_track::PoseTrackFile;
//!
//! # async fn run() -> swing_analyzer::Result<()> {
//! let cache = PoseCache::default();
//! cache.load_track(PoseTrackFile::load("swing.posetrack.json").await?);
//!
//! if let Some(skeleton) = cache.skeleton_at(2.5) {
//!     println!("Spine angle at 2.5s: {:.1}°", skeleton.spine_angle());
//! }
//! # Ok(())
//! # }
//! ```

/// Angle smoothing, angular velocity and composite rep quality
pub mod biomechanics;

/// Configuration management
pub mod config;

/// Constants used throughout the library
pub mod constants;

/// Error types and result handling
pub mod error;

/// Signal filters for smoothing joint angles
pub mod filters;

/// Swing phase detection, rep counting and quality scoring
pub mod form_analyzer;

/// Frame processing pipeline
pub mod pipeline;

/// Time-indexed cache of extracted pose frames
pub mod pose_cache;

/// Persisted pose track format
pub mod pose_track;

/// Input session owning the active skeleton source
pub mod session;

/// Keypoints and derived joint angles
pub mod skeleton;

/// Camera and video-file skeleton sources
pub mod source;

/// Pose track persistence
pub mod store;

/// Geometry helpers, safe casts and content hashing
pub mod utils;

pub use error::{Error, Result};
