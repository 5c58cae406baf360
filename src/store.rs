//! Pose track persistence keyed by video content hash.

use crate::constants::POSE_TRACK_SUFFIX;
use crate::pose_track::PoseTrackFile;
use crate::{Error, Result};
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Storage for extracted pose tracks
#[async_trait]
pub trait PoseTrackStore: Send + Sync {
    /// Track for a video hash, `None` on a miss
    async fn load(&self, hash: &str) -> Result<Option<PoseTrackFile>>;

    /// Store a track under its `source_video_hash`
    async fn save(&self, track: &PoseTrackFile) -> Result<()>;
}

fn check_hash(hash: &str) -> Result<()> {
    if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidInput(format!("Not a content hash: {hash:?}")));
    }
    Ok(())
}

/// Directory of `<hash>.posetrack.json` files
pub struct FsPoseTrackStore {
    dir: PathBuf,
}

impl FsPoseTrackStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}{POSE_TRACK_SUFFIX}"))
    }
}

#[async_trait]
impl PoseTrackStore for FsPoseTrackStore {
    async fn load(&self, hash: &str) -> Result<Option<PoseTrackFile>> {
        check_hash(hash)?;
        let path = self.path_for(hash);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::Storage(format!("Failed to read {}: {err}", path.display()))),
        };
        let track = PoseTrackFile::from_json(&json)?;
        if track.metadata.source_video_hash != hash {
            warn!(
                "Pose track {} belongs to video {}, ignoring",
                path.display(),
                track.metadata.source_video_hash
            );
            return Ok(None);
        }
        debug!("Loaded pose track {} ({} frames)", path.display(), track.frames.len());
        Ok(Some(track))
    }

    async fn save(&self, track: &PoseTrackFile) -> Result<()> {
        let hash = &track.metadata.source_video_hash;
        check_hash(hash)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Storage(format!("Failed to create {}: {e}", self.dir.display())))?;

        // Write then rename so readers never see a half-written track
        let path = self.path_for(hash);
        let tmp = path.with_extension("json.tmp");
        track.save(&tmp).await?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to store {}: {e}", path.display())))?;
        debug!("Saved pose track {}", path.display());
        Ok(())
    }
}

/// In-memory store, for tests and single-run tools
#[derive(Default)]
pub struct MemoryPoseTrackStore {
    tracks: Mutex<HashMap<String, PoseTrackFile>>,
}

impl MemoryPoseTrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.lock().map_or(0, |tracks| tracks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PoseTrackStore for MemoryPoseTrackStore {
    async fn load(&self, hash: &str) -> Result<Option<PoseTrackFile>> {
        let tracks = self
            .tracks
            .lock()
            .map_err(|_| Error::Storage("Pose track store lock poisoned".to_string()))?;
        Ok(tracks.get(hash).cloned())
    }

    async fn save(&self, track: &PoseTrackFile) -> Result<()> {
        let mut tracks = self
            .tracks
            .lock()
            .map_err(|_| Error::Storage("Pose track store lock poisoned".to_string()))?;
        tracks.insert(track.metadata.source_video_hash.clone(), track.clone());
        Ok(())
    }
}
