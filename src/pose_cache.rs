//! Time-indexed store of extracted pose frames.
//!
//! Frames are kept sorted by video time. Playback queries mostly move forward
//! by a frame at a time, so lookups first try to advance a shared cursor a few
//! steps and only fall back to binary search on seeks. One extraction task
//! writes while any number of readers query concurrently.

use crate::constants::{CURSOR_MAX_ADVANCE, DEFAULT_FPS, DEFAULT_LOOKUP_TOLERANCE_FRAMES, TIME_EPSILON};
use crate::pose_track::{PoseTrackFile, PoseTrackFrame, PoseTrackMetadata};
use crate::skeleton::Skeleton;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Deltas sampled when estimating the frame interval without metadata
const INTERVAL_SAMPLE: usize = 32;

#[derive(Default)]
struct CacheInner {
    frames: Vec<PoseTrackFrame>,
    metadata: Option<PoseTrackMetadata>,
}

impl CacheInner {
    /// Seconds between frames: metadata fps, else the observed median delta, else the default rate
    fn frame_interval(&self) -> f64 {
        if let Some(meta) = &self.metadata {
            if meta.fps.is_finite() && meta.fps > 0.0 {
                return 1.0 / meta.fps;
            }
        }
        let mut deltas: Vec<f64> = self
            .frames
            .windows(2)
            .take(INTERVAL_SAMPLE)
            .map(|w| w[1].video_time - w[0].video_time)
            .filter(|d| *d > TIME_EPSILON)
            .collect();
        if deltas.is_empty() {
            return 1.0 / DEFAULT_FPS;
        }
        deltas.sort_by(f64::total_cmp);
        deltas[deltas.len() / 2]
    }

    /// Index of the last frame at or before `time`
    fn floor_index(&self, time: f64) -> Option<usize> {
        self.frames
            .partition_point(|f| f.video_time <= time + TIME_EPSILON)
            .checked_sub(1)
    }
}

/// Sorted pose frame cache with nearest-frame lookup
pub struct PoseCache {
    inner: RwLock<CacheInner>,
    cursor: AtomicUsize,
    complete: AtomicBool,
    tolerance_frames: f64,
}

impl Default for PoseCache {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKUP_TOLERANCE_FRAMES)
    }
}

impl PoseCache {
    /// Create an empty cache; lookups accept frames within `tolerance_frames` frame intervals
    pub fn new(tolerance_frames: f64) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            cursor: AtomicUsize::new(0),
            complete: AtomicBool::new(false),
            tolerance_frames,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_metadata(&self, metadata: PoseTrackMetadata) {
        self.write().metadata = Some(metadata);
    }

    pub fn metadata(&self) -> Option<PoseTrackMetadata> {
        self.read().metadata.clone()
    }

    /// Insert a frame in time order; a frame at the same video time is replaced
    pub fn add_frame(&self, frame: PoseTrackFrame) {
        let mut inner = self.write();
        let time = frame.video_time;

        match inner.frames.last() {
            None => {
                inner.frames.push(frame);
                return;
            }
            Some(last) if last.video_time < time - TIME_EPSILON => {
                inner.frames.push(frame);
                return;
            }
            _ => {}
        }

        let index = inner.frames.partition_point(|f| f.video_time < time - TIME_EPSILON);
        if index < inner.frames.len() && (inner.frames[index].video_time - time).abs() < TIME_EPSILON {
            inner.frames[index] = frame;
        } else {
            inner.frames.insert(index, frame);
        }
    }

    /// Frame nearest to `video_time`, if one lies within the lookup tolerance
    pub fn get_frame(&self, video_time: f64) -> Option<PoseTrackFrame> {
        if !video_time.is_finite() {
            return None;
        }
        let inner = self.read();
        let frames = &inner.frames;
        if frames.is_empty() {
            return None;
        }

        let floor = self.advance_cursor(&inner, video_time);
        if let Some(index) = floor {
            self.cursor.store(index, Ordering::Relaxed);
        }

        let before = floor.map(|i| &frames[i]);
        let after = frames.get(floor.map_or(0, |i| i + 1));
        let nearest = match (before, after) {
            (Some(b), Some(a)) => {
                if (a.video_time - video_time).abs() < (video_time - b.video_time).abs() {
                    a
                } else {
                    b
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        let tolerance = self.tolerance_frames * inner.frame_interval();
        ((nearest.video_time - video_time).abs() <= tolerance + TIME_EPSILON).then(|| nearest.clone())
    }

    /// Floor index for `time`, walking forward from the cursor when the jump is short
    fn advance_cursor(&self, inner: &CacheInner, time: f64) -> Option<usize> {
        let frames = &inner.frames;
        let limit = time + TIME_EPSILON;
        let mut index = self.cursor.load(Ordering::Relaxed);

        if index >= frames.len() || frames[index].video_time > limit {
            return inner.floor_index(time);
        }
        for _ in 0..CURSOR_MAX_ADVANCE {
            match frames.get(index + 1) {
                Some(next) if next.video_time <= limit => index += 1,
                _ => return Some(index),
            }
        }
        match frames.get(index + 1) {
            Some(next) if next.video_time <= limit => inner.floor_index(time),
            _ => Some(index),
        }
    }

    /// Skeleton for the frame nearest to `video_time`
    pub fn skeleton_at(&self, video_time: f64) -> Option<Skeleton> {
        self.get_frame(video_time).map(|frame| frame.skeleton())
    }

    pub fn has_frame(&self, video_time: f64) -> bool {
        self.get_frame(video_time).is_some()
    }

    /// All frames in video-time order
    pub fn get_all_frames(&self) -> Vec<PoseTrackFrame> {
        self.read().frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.read().frames.len()
    }

    pub fn is_extraction_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn set_extraction_complete(&self, complete: bool) {
        self.complete.store(complete, Ordering::Release);
    }

    /// Replace the contents with a loaded track, marking extraction complete
    pub fn load_track(&self, track: PoseTrackFile) {
        let mut inner = self.write();
        let mut frames = track.frames;
        frames.sort_by(|a, b| a.video_time.total_cmp(&b.video_time));
        inner.frames = frames;
        inner.metadata = Some(track.metadata);
        self.cursor.store(0, Ordering::Relaxed);
        self.set_extraction_complete(true);
    }

    /// Snapshot as a pose track; `None` until metadata is known
    pub fn to_track(&self) -> Option<PoseTrackFile> {
        let inner = self.read();
        let mut metadata = inner.metadata.clone()?;
        metadata.frame_count = inner.frames.len();
        Some(PoseTrackFile {
            metadata,
            frames: inner.frames.clone(),
        })
    }

    /// Drop all frames and metadata
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.frames.clear();
        inner.metadata = None;
        self.cursor.store(0, Ordering::Relaxed);
        self.set_extraction_complete(false);
    }
}
