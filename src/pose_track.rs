//! Persisted pose track: extracted keypoints for every frame of one video.
//!
//! The JSON layout is camelCase and keyed by the source video's quick content
//! hash, so a second load of the same video skips inference entirely.

use crate::constants::{DEFAULT_FPS, POSE_TRACK_VERSION};
use crate::skeleton::{AngleSnapshot, Keypoint, KeypointFormat, Skeleton};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Angles stored alongside a frame at extraction time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecomputedAngles {
    pub spine_angle: f64,
    pub arm_to_spine_angle: f64,
    pub arm_to_vertical_angle: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hip_angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knee_angle: Option<f64>,
}

impl From<&AngleSnapshot> for PrecomputedAngles {
    fn from(angles: &AngleSnapshot) -> Self {
        Self {
            spine_angle: angles.spine,
            arm_to_spine_angle: angles.arm_to_spine,
            arm_to_vertical_angle: angles.arm_to_vertical,
            hip_angle: Some(angles.hip),
            knee_angle: Some(angles.knee),
        }
    }
}

/// One extracted frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseTrackFrame {
    pub frame_index: u32,
    /// Milliseconds since the start of the video
    pub timestamp: f64,
    /// Seconds since the start of the video
    pub video_time: f64,
    pub keypoints: Vec<Keypoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angles: Option<PrecomputedAngles>,
}

impl PoseTrackFrame {
    /// Frame for a detected pose, with mean score and angles filled in
    pub fn from_skeleton(frame_index: u32, video_time: f64, skeleton: &Skeleton) -> Self {
        Self {
            frame_index,
            timestamp: video_time * 1000.0,
            video_time,
            keypoints: skeleton.keypoints().to_vec(),
            score: Some(skeleton.average_score()),
            angles: skeleton.angles().as_ref().map(PrecomputedAngles::from),
        }
    }

    /// Placeholder for a frame where no pose was detected
    pub fn empty(frame_index: u32, video_time: f64, format: KeypointFormat) -> Self {
        let keypoints = format
            .names()
            .iter()
            .map(|name| Keypoint {
                z: Some(0.0),
                ..Keypoint::new(0.0, 0.0, 0.0).named(name)
            })
            .collect();
        Self {
            frame_index,
            timestamp: video_time * 1000.0,
            video_time,
            keypoints,
            score: Some(0.0),
            angles: None,
        }
    }

    /// Whether a pose was detected in this frame
    pub fn has_pose(&self) -> bool {
        self.score.map_or(true, |s| s > 0.0) && self.keypoints.iter().any(|kp| kp.score > 0.0)
    }

    /// Rebuild the skeleton for this frame
    pub fn skeleton(&self) -> Skeleton {
        Skeleton::new(self.keypoints.clone())
    }
}

/// Track metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseTrackMetadata {
    pub version: String,
    pub model: String,
    pub model_version: String,
    pub keypoint_format: KeypointFormat,
    pub keypoint_count: usize,
    pub source_video_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_video_name: Option<String>,
    /// Seconds
    pub source_video_duration: f64,
    pub extracted_at: DateTime<Utc>,
    pub frame_count: usize,
    pub fps: f64,
    pub video_width: u32,
    pub video_height: u32,
}

impl PoseTrackMetadata {
    /// Seconds between frames, falling back to the default frame rate
    pub fn frame_interval(&self) -> f64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            1.0 / self.fps
        } else {
            1.0 / DEFAULT_FPS
        }
    }
}

/// A complete pose track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseTrackFile {
    pub metadata: PoseTrackMetadata,
    pub frames: Vec<PoseTrackFrame>,
}

impl PoseTrackFile {
    /// Check schema version, frame ordering and counts
    ///
    /// # Errors
    ///
    /// Returns `Error::PoseTrack` describing the first violation
    pub fn validate(&self) -> Result<()> {
        let meta = &self.metadata;
        if meta.version != POSE_TRACK_VERSION {
            return Err(Error::PoseTrack(format!(
                "Unsupported pose track version {} (expected {POSE_TRACK_VERSION})",
                meta.version
            )));
        }
        if meta.source_video_hash.is_empty() {
            return Err(Error::PoseTrack("Missing source video hash".to_string()));
        }
        if meta.frame_count != self.frames.len() {
            return Err(Error::PoseTrack(format!(
                "Metadata declares {} frames but track holds {}",
                meta.frame_count,
                self.frames.len()
            )));
        }
        if !(meta.fps.is_finite() && meta.fps > 0.0) {
            return Err(Error::PoseTrack(format!("Invalid fps {}", meta.fps)));
        }
        for pair in self.frames.windows(2) {
            if pair[1].video_time < pair[0].video_time {
                return Err(Error::PoseTrack(format!(
                    "Frames out of order at frame {} ({:.4}s after {:.4}s)",
                    pair[1].frame_index, pair[1].video_time, pair[0].video_time
                )));
            }
        }
        if let Some(frame) = self
            .frames
            .iter()
            .find(|f| f.keypoints.len() != meta.keypoint_count)
        {
            return Err(Error::PoseTrack(format!(
                "Frame {} has {} keypoints, expected {}",
                frame.frame_index,
                frame.keypoints.len(),
                meta.keypoint_count
            )));
        }
        Ok(())
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a track
    pub fn from_json(json: &str) -> Result<Self> {
        let track: Self = serde_json::from_str(json)?;
        track.validate()?;
        Ok(track)
    }

    /// Write the track to a file
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = self.to_json()?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Read and validate a track from a file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    /// Frames in which a pose was detected
    pub fn detected_frames(&self) -> impl Iterator<Item = &PoseTrackFrame> {
        self.frames.iter().filter(|f| f.has_pose())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COCO_KEYPOINT_COUNT;

    fn metadata(frame_count: usize) -> PoseTrackMetadata {
        PoseTrackMetadata {
            version: POSE_TRACK_VERSION.to_string(),
            model: "test-model".to_string(),
            model_version: "1".to_string(),
            keypoint_format: KeypointFormat::Coco17,
            keypoint_count: COCO_KEYPOINT_COUNT,
            source_video_hash: "abc123".to_string(),
            source_video_name: Some("swing.mp4".to_string()),
            source_video_duration: 1.0,
            extracted_at: Utc::now(),
            frame_count,
            fps: 30.0,
            video_width: 640,
            video_height: 480,
        }
    }

    fn track(times: &[f64]) -> PoseTrackFile {
        let frames: Vec<PoseTrackFrame> = times
            .iter()
            .enumerate()
            .map(|(i, &t)| PoseTrackFrame::empty(i as u32, t, KeypointFormat::Coco17))
            .collect();
        PoseTrackFile {
            metadata: metadata(frames.len()),
            frames,
        }
    }

    #[test]
    fn test_json_uses_camel_case() {
        let json = track(&[0.0]).to_json().unwrap();
        assert!(json.contains("\"frameIndex\""));
        assert!(json.contains("\"videoTime\""));
        assert!(json.contains("\"sourceVideoHash\""));
        assert!(json.contains("\"keypointFormat\": \"coco-17\""));
    }

    #[test]
    fn test_json_round_trip_preserves_order_and_metadata() {
        let original = track(&[0.0, 1.0 / 30.0, 2.0 / 30.0]);
        let parsed = PoseTrackFile::from_json(&original.to_json().unwrap()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_validate_rejects_unsorted_frames() {
        let mut bad = track(&[0.0, 0.1]);
        bad.frames.swap(0, 1);
        assert!(matches!(bad.validate(), Err(Error::PoseTrack(_))));
    }

    #[test]
    fn test_validate_rejects_wrong_count_and_version() {
        let mut bad = track(&[0.0]);
        bad.metadata.frame_count = 3;
        assert!(bad.validate().is_err());

        let mut bad = track(&[0.0]);
        bad.metadata.version = "2.0".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_empty_frame_has_no_pose() {
        let frame = PoseTrackFrame::empty(0, 0.0, KeypointFormat::BlazePose33);
        assert_eq!(frame.keypoints.len(), 33);
        assert_eq!(frame.keypoints[15].name.as_deref(), Some("left_wrist"));
        assert!(!frame.has_pose());
        assert!(!frame.skeleton().has_visible_pose());
    }

    #[test]
    fn test_from_skeleton_fills_angles() {
        let mut keypoints = vec![Keypoint::new(100.0, 100.0, 0.8); 17];
        for (i, y) in [(11, 250.0), (12, 250.0), (13, 350.0), (14, 350.0), (15, 450.0), (16, 450.0)] {
            keypoints[i].y = y;
        }
        let frame = PoseTrackFrame::from_skeleton(4, 0.5, &Skeleton::new(keypoints));
        assert_eq!(frame.timestamp, 500.0);
        assert!(frame.has_pose());
        assert!((frame.score.unwrap() - 0.8).abs() < 1e-12);
        assert!(frame.angles.is_some());
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("swing-track-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("track.posetrack.json");

        let original = track(&[0.0, 0.5]);
        original.save(&path).await.unwrap();
        assert_eq!(PoseTrackFile::load(&path).await.unwrap(), original);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
