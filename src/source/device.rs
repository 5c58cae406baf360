//! Boundary traits for the pose model, camera devices and video decoding.
//!
//! Implementations live outside this crate (native camera APIs, a video
//! decoder, an inference runtime); the sources only talk to these traits.

use super::FacingMode;
use crate::skeleton::{Keypoint, KeypointFormat};
use crate::utils::content_hash::quick_video_hash;
use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// One decoded image
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Position in the source, counted from 0
    pub index: u32,
    /// Presentation time for decoded video; capture time for cameras
    pub timestamp_ms: f64,
    pub width: u32,
    pub height: u32,
    /// Pixel data in whatever layout the model expects
    pub data: Arc<[u8]>,
}

/// A video chosen by the user, held in memory
#[derive(Debug, Clone)]
pub struct VideoFile {
    pub name: String,
    pub data: Arc<[u8]>,
}

impl VideoFile {
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Read a video file from disk
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::new(name, data))
    }

    /// Quick content hash identifying this video in the pose track store
    pub fn content_hash(&self) -> String {
        quick_video_hash(&self.data)
    }
}

/// Container-level facts about a video
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    pub duration_secs: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Exact count when the container declares one
    pub frame_count: Option<u32>,
}

impl VideoMetadata {
    /// Declared frame count, or an estimate from duration and rate
    pub fn estimated_frames(&self) -> u32 {
        self.frame_count
            .unwrap_or_else(|| crate::utils::safe_cast::f64_to_u32_clamp(self.duration_secs * self.fps, 0, u32::MAX))
    }
}

/// Identity of a pose model, recorded in pose tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelIdentity {
    pub name: String,
    pub version: String,
    pub keypoint_format: KeypointFormat,
}

/// Image to keypoints inference
#[async_trait]
pub trait PoseModel: Send + Sync {
    /// Load weights and run a first inference so later calls are fast
    async fn warm_up(&self) -> Result<()>;

    /// Keypoints of the most prominent person; empty when nobody is detected
    async fn infer(&self, frame: &VideoFrame) -> Result<Vec<Keypoint>>;

    fn identity(&self) -> ModelIdentity;
}

/// Sequential frame producer
#[async_trait]
pub trait FrameReader: Send {
    /// Next frame, `None` at end of stream
    async fn next_frame(&mut self) -> Result<Option<VideoFrame>>;

    /// Release the underlying device or decoder
    async fn close(&mut self);
}

/// Live camera access
#[async_trait]
pub trait CameraProvider: Send + Sync {
    /// Open the camera facing `facing`
    ///
    /// # Errors
    ///
    /// `Error::Camera` for permission, missing-device and in-use failures
    async fn acquire(&self, facing: FacingMode) -> Result<Box<dyn FrameReader>>;
}

/// Video container probing and decoding
#[async_trait]
pub trait VideoDecoder: Send + Sync {
    async fn probe(&self, file: &VideoFile) -> Result<VideoMetadata>;

    async fn open(&self, file: &VideoFile) -> Result<Box<dyn FrameReader>>;
}
