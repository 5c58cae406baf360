//! Skeleton sources: live camera inference and cached video-file extraction.
//!
//! A source publishes skeletons on a broadcast channel and its lifecycle on a
//! watch channel. Subscribe to both before calling [`SkeletonSource::start`]
//! so no early event is missed.

/// Live camera source
pub mod camera;

/// Pose model, camera and decoder boundary traits
pub mod device;

/// Video file source with pose track caching
pub mod video_file;

/// Cancellable background task handle
pub mod worker;

use crate::config::Config;
use crate::error::SourceFailure;
use crate::skeleton::Skeleton;
use crate::store::PoseTrackStore;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

pub use camera::CameraSource;
pub use device::{CameraProvider, FrameReader, ModelIdentity, PoseModel, VideoDecoder, VideoFile, VideoFrame, VideoMetadata};
pub use video_file::VideoFileSource;
pub use worker::Worker;

/// Which camera to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, facing the user
    User,
    /// Rear camera
    Environment,
}

impl FacingMode {
    pub fn opposite(self) -> Self {
        match self {
            Self::User => Self::Environment,
            Self::Environment => Self::User,
        }
    }
}

/// One skeleton published by a source
#[derive(Debug, Clone)]
pub struct SkeletonEvent {
    pub skeleton: Skeleton,
    /// Milliseconds since the source started (camera) or since video start (file)
    pub timestamp_ms: f64,
    /// Seconds into the video; `None` for live input
    pub video_time: Option<f64>,
    pub frame_index: Option<u32>,
}

/// Extraction progress of a video file
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionProgress {
    pub current_frame: u32,
    pub total_frames: u32,
    pub percentage: f64,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_ms: Option<u64>,
    /// Extraction rate, frames per second
    pub fps: f64,
}

impl ExtractionProgress {
    pub fn new(current_frame: u32, total_frames: u32, elapsed_ms: u64) -> Self {
        use crate::utils::safe_cast::f64_to_u64_clamp;

        let percentage = if total_frames > 0 {
            (f64::from(current_frame) / f64::from(total_frames) * 100.0).min(100.0)
        } else {
            0.0
        };
        let fps = if elapsed_ms > 0 {
            f64::from(current_frame) / (elapsed_ms as f64 / 1000.0)
        } else {
            0.0
        };
        let estimated_remaining_ms = (fps > 0.0 && total_frames >= current_frame)
            .then(|| f64_to_u64_clamp(f64::from(total_frames - current_frame) / fps * 1000.0));
        Self {
            current_frame,
            total_frames,
            percentage,
            elapsed_ms,
            estimated_remaining_ms,
            fps,
        }
    }
}

/// Details of an active source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveInfo {
    /// Skeletons came from a stored pose track
    pub from_cache: bool,
    /// Every frame of the input has been processed
    pub batch_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_processed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
}

/// Lifecycle of one source
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "camelCase")]
pub enum SourceState {
    #[default]
    Idle,
    CheckingCache,
    Extracting(ExtractionProgress),
    Active(ActiveInfo),
    Error(SourceFailure),
}

impl SourceState {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Common contract of camera and video-file sources
#[async_trait]
pub trait SkeletonSource: Send + Sync {
    /// Begin producing skeletons; a second call while running is a no-op
    ///
    /// # Errors
    ///
    /// Device, decode, timeout and storage failures. The state stream moves to
    /// `SourceState::Error` as well.
    async fn start(&self) -> Result<()>;

    /// Halt production, keeping any cached frames
    async fn stop(&self);

    /// Release everything; idempotent
    async fn dispose(&self);

    fn skeletons(&self) -> broadcast::Receiver<SkeletonEvent>;

    fn state(&self) -> watch::Receiver<SourceState>;

    /// Cached skeleton nearest to `video_time`; always `None` for live input
    fn skeleton_at_time(&self, video_time: f64) -> Option<SkeletonEvent>;

    fn has_skeleton_at_time(&self, video_time: f64) -> bool {
        self.skeleton_at_time(video_time).is_some()
    }
}

/// Constructs sources for an input session
pub trait SourceFactory: Send + Sync {
    fn camera(&self, facing: FacingMode) -> Result<Arc<dyn SkeletonSource>>;

    fn video_file(&self, file: VideoFile) -> Result<Arc<dyn SkeletonSource>>;
}

/// Factory wiring the real sources to shared collaborators
pub struct DefaultSourceFactory {
    model: Arc<dyn PoseModel>,
    camera: Arc<dyn CameraProvider>,
    decoder: Arc<dyn VideoDecoder>,
    store: Arc<dyn PoseTrackStore>,
    config: Config,
}

impl DefaultSourceFactory {
    pub fn new(
        model: Arc<dyn PoseModel>,
        camera: Arc<dyn CameraProvider>,
        decoder: Arc<dyn VideoDecoder>,
        store: Arc<dyn PoseTrackStore>,
        config: Config,
    ) -> Self {
        Self {
            model,
            camera,
            decoder,
            store,
            config,
        }
    }
}

impl SourceFactory for DefaultSourceFactory {
    fn camera(&self, facing: FacingMode) -> Result<Arc<dyn SkeletonSource>> {
        Ok(Arc::new(CameraSource::new(
            facing,
            self.model.clone(),
            self.camera.clone(),
            self.config.extraction.channel_capacity,
        )))
    }

    fn video_file(&self, file: VideoFile) -> Result<Arc<dyn SkeletonSource>> {
        Ok(Arc::new(VideoFileSource::new(
            file,
            self.model.clone(),
            self.decoder.clone(),
            self.store.clone(),
            &self.config,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facing_mode_opposite() {
        assert_eq!(FacingMode::User.opposite(), FacingMode::Environment);
        assert_eq!(FacingMode::Environment.opposite().opposite(), FacingMode::Environment);
    }

    #[test]
    fn test_progress_estimates() {
        let progress = ExtractionProgress::new(30, 120, 1000);
        assert_eq!(progress.percentage, 25.0);
        assert_eq!(progress.fps, 30.0);
        assert_eq!(progress.estimated_remaining_ms, Some(3000));

        let unknown = ExtractionProgress::new(0, 0, 0);
        assert_eq!(unknown.percentage, 0.0);
        assert_eq!(unknown.estimated_remaining_ms, None);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&SourceState::Active(ActiveInfo {
            from_cache: true,
            batch_complete: true,
            ..ActiveInfo::default()
        }))
        .unwrap();
        assert!(json.contains("\"status\":\"active\""));
        assert!(json.contains("\"fromCache\":true"));
    }
}
