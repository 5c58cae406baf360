//! Video file source: extract poses once, then serve them from the cache.
//!
//! On start the file's quick content hash is looked up in the pose track
//! store. A hit loads the stored track and replays it; a miss decodes the
//! video, runs the model on every frame and stores the result when the whole
//! file has been processed.

use super::device::{FrameReader, PoseModel, VideoDecoder, VideoFile, VideoMetadata};
use super::worker::Worker;
use super::{ActiveInfo, ExtractionProgress, SkeletonEvent, SkeletonSource, SourceState};
use crate::config::{Config, ExtractionConfig};
use crate::constants::POSE_TRACK_VERSION;
use crate::pose_cache::PoseCache;
use crate::pose_track::{PoseTrackFrame, PoseTrackMetadata};
use crate::skeleton::Skeleton;
use crate::store::PoseTrackStore;
use crate::utils::content_hash::quick_video_hash;
use crate::utils::safe_cast::f64_to_u64_clamp;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Outcome of the store lookup at start
enum Lookup {
    Hit,
    Miss(VideoMetadata),
}

/// Skeleton source backed by a video file and a pose track cache
pub struct VideoFileSource {
    file: VideoFile,
    model: Arc<dyn PoseModel>,
    decoder: Arc<dyn VideoDecoder>,
    store: Arc<dyn PoseTrackStore>,
    cache: Arc<PoseCache>,
    extraction: ExtractionConfig,
    skeleton_tx: broadcast::Sender<SkeletonEvent>,
    state_tx: Arc<watch::Sender<SourceState>>,
    worker: Mutex<Option<Worker>>,
    disposed: AtomicBool,
}

impl VideoFileSource {
    pub fn new(
        file: VideoFile,
        model: Arc<dyn PoseModel>,
        decoder: Arc<dyn VideoDecoder>,
        store: Arc<dyn PoseTrackStore>,
        config: &Config,
    ) -> Self {
        let (skeleton_tx, _) = broadcast::channel(config.extraction.channel_capacity.max(1));
        let (state_tx, _) = watch::channel(SourceState::Idle);
        Self {
            file,
            model,
            decoder,
            store,
            cache: Arc::new(PoseCache::new(config.cache.lookup_tolerance_frames)),
            extraction: config.extraction.clone(),
            skeleton_tx,
            state_tx: Arc::new(state_tx),
            worker: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file.name
    }

    /// The frame cache, shared with the extraction task
    pub fn cache(&self) -> &Arc<PoseCache> {
        &self.cache
    }

    fn fail(&self, err: &Error) {
        error!("Video source for {} failed: {err}", self.file.name);
        self.state_tx.send_replace(SourceState::Error(err.failure()));
    }

    fn spawn_replay(&self) -> Worker {
        let cache = self.cache.clone();
        let skeleton_tx = self.skeleton_tx.clone();
        Worker::spawn("replay", move |token| replay_cached(cache, skeleton_tx, token))
    }

    /// Look up a stored track for this file; store failures count as a miss
    async fn lookup_stored(&self) -> Result<Lookup> {
        let data = self.file.data.clone();
        let hash = tokio::task::spawn_blocking(move || quick_video_hash(&data))
            .await
            .map_err(|e| Error::Storage(format!("Hash task failed: {e}")))?;
        debug!("Video {} hashed to {hash}", self.file.name);

        match self.store.load(&hash).await {
            Ok(Some(track)) => {
                info!(
                    "Pose track cache hit for {} ({} frames)",
                    self.file.name,
                    track.frames.len()
                );
                self.cache.load_track(track);
                Ok(Lookup::Hit)
            }
            Ok(None) => {
                info!("No stored pose track for {}, extracting", self.file.name);
                self.begin_extraction(hash).await.map(Lookup::Miss)
            }
            Err(err) => {
                warn!("Pose track store lookup failed, extracting instead: {err}");
                self.begin_extraction(hash).await.map(Lookup::Miss)
            }
        }
    }

    /// Probe the video within the metadata timeout and seed the cache metadata
    async fn begin_extraction(&self, hash: String) -> Result<VideoMetadata> {
        let timeout = self.extraction.metadata_timeout();
        let meta = tokio::time::timeout(timeout, self.decoder.probe(&self.file))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "metadata for {} not available after {}s",
                    self.file.name,
                    timeout.as_secs()
                ))
            })??;
        if !(meta.fps.is_finite() && meta.fps > 0.0) {
            return Err(Error::Decode(format!("invalid frame rate {}", meta.fps)));
        }

        let identity = self.model.identity();
        self.cache.clear();
        self.cache.set_metadata(PoseTrackMetadata {
            version: POSE_TRACK_VERSION.to_string(),
            model: identity.name,
            model_version: identity.version,
            keypoint_format: identity.keypoint_format,
            keypoint_count: identity.keypoint_format.keypoint_count(),
            source_video_hash: hash,
            source_video_name: Some(self.file.name.clone()),
            source_video_duration: meta.duration_secs,
            extracted_at: Utc::now(),
            frame_count: 0,
            fps: meta.fps,
            video_width: meta.width,
            video_height: meta.height,
        });
        Ok(meta)
    }
}

async fn replay_cached(cache: Arc<PoseCache>, skeleton_tx: broadcast::Sender<SkeletonEvent>, token: CancellationToken) {
    let frames = cache.get_all_frames();
    let mut emitted = 0usize;
    for frame in frames.iter().filter(|f| f.has_pose()) {
        if token.is_cancelled() {
            return;
        }
        let _ = skeleton_tx.send(SkeletonEvent {
            skeleton: frame.skeleton(),
            timestamp_ms: frame.timestamp,
            video_time: Some(frame.video_time),
            frame_index: Some(frame.frame_index),
        });
        emitted += 1;
        tokio::task::yield_now().await;
    }
    debug!("Replayed {emitted} cached skeletons");
}

struct Extraction {
    reader: Box<dyn FrameReader>,
    model: Arc<dyn PoseModel>,
    cache: Arc<PoseCache>,
    store: Arc<dyn PoseTrackStore>,
    skeleton_tx: broadcast::Sender<SkeletonEvent>,
    state_tx: Arc<watch::Sender<SourceState>>,
    total_frames: u32,
    progress_every: u32,
}

impl Extraction {
    async fn run(mut self, token: CancellationToken) {
        let started = Instant::now();
        let format = self.model.identity().keypoint_format;
        let mut processed = 0u32;

        let finished = loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => break false,
                next = self.reader.next_frame() => next,
            };
            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => break true,
                Err(err) => {
                    self.fail(&token, &err);
                    break false;
                }
            };

            let inferred = tokio::select! {
                biased;
                () = token.cancelled() => break false,
                inferred = self.model.infer(&frame) => inferred,
            };
            let keypoints = match inferred {
                Ok(keypoints) => keypoints,
                Err(err) => {
                    self.fail(&token, &err);
                    break false;
                }
            };
            if token.is_cancelled() {
                break false;
            }

            let video_time = frame.timestamp_ms / 1000.0;
            if keypoints.is_empty() {
                self.cache.add_frame(PoseTrackFrame::empty(frame.index, video_time, format));
            } else {
                let skeleton = Skeleton::new(keypoints);
                self.cache
                    .add_frame(PoseTrackFrame::from_skeleton(frame.index, video_time, &skeleton));
                let _ = self.skeleton_tx.send(SkeletonEvent {
                    skeleton,
                    timestamp_ms: frame.timestamp_ms,
                    video_time: Some(video_time),
                    frame_index: Some(frame.index),
                });
            }

            processed += 1;
            if processed % self.progress_every == 0 {
                let elapsed = elapsed_ms(started);
                self.state_tx.send_replace(SourceState::Extracting(ExtractionProgress::new(
                    processed,
                    self.total_frames.max(processed),
                    elapsed,
                )));
            }
            tokio::task::yield_now().await;
        };

        self.reader.close().await;
        if !finished || token.is_cancelled() {
            debug!("Extraction stopped after {processed} frames");
            return;
        }

        self.cache.set_extraction_complete(true);
        let processing_time_ms = elapsed_ms(started);
        info!("Extracted {processed} frames in {processing_time_ms} ms");
        self.state_tx.send_replace(SourceState::Active(ActiveInfo {
            from_cache: false,
            batch_complete: true,
            frames_processed: Some(processed),
            processing_time_ms: Some(processing_time_ms),
        }));

        if let Some(track) = self.cache.to_track() {
            if let Err(err) = self.store.save(&track).await {
                warn!("Failed to store pose track: {err}");
            }
        }
    }

    fn fail(&self, token: &CancellationToken, err: &Error) {
        error!("Extraction failed: {err}");
        if !token.is_cancelled() {
            self.state_tx.send_replace(SourceState::Error(err.failure()));
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    f64_to_u64_clamp(started.elapsed().as_secs_f64() * 1000.0)
}

#[async_trait]
impl SkeletonSource for VideoFileSource {
    async fn start(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed);
        }
        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(|w| !w.is_finished()) {
            return Ok(());
        }

        if !self.cache.is_extraction_complete() {
            self.state_tx.send_replace(SourceState::CheckingCache);
            match self.lookup_stored().await {
                Ok(Lookup::Hit) => {}
                Ok(Lookup::Miss(meta)) => {
                    let reader = match self.decoder.open(&self.file).await {
                        Ok(reader) => reader,
                        Err(err) => {
                            self.fail(&err);
                            return Err(err);
                        }
                    };
                    let total_frames = meta.estimated_frames();
                    self.state_tx
                        .send_replace(SourceState::Extracting(ExtractionProgress::new(0, total_frames, 0)));
                    let extraction = Extraction {
                        reader,
                        model: self.model.clone(),
                        cache: self.cache.clone(),
                        store: self.store.clone(),
                        skeleton_tx: self.skeleton_tx.clone(),
                        state_tx: self.state_tx.clone(),
                        total_frames,
                        progress_every: self.extraction.progress_every_frames.max(1),
                    };
                    *worker = Some(Worker::spawn("extraction", move |token| extraction.run(token)));
                    return Ok(());
                }
                Err(err) => {
                    self.fail(&err);
                    return Err(err);
                }
            }
        }

        let frames_processed = u32::try_from(self.cache.frame_count()).unwrap_or(u32::MAX);
        self.state_tx.send_replace(SourceState::Active(ActiveInfo {
            from_cache: true,
            batch_complete: true,
            frames_processed: Some(frames_processed),
            processing_time_ms: None,
        }));
        *worker = Some(self.spawn_replay());
        Ok(())
    }

    async fn stop(&self) {
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            worker.shutdown().await;
        }
        self.state_tx.send_replace(SourceState::Idle);
    }

    async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop().await;
        self.cache.clear();
        debug!("Video source for {} disposed", self.file.name);
    }

    fn skeletons(&self) -> broadcast::Receiver<SkeletonEvent> {
        self.skeleton_tx.subscribe()
    }

    fn state(&self) -> watch::Receiver<SourceState> {
        self.state_tx.subscribe()
    }

    fn skeleton_at_time(&self, video_time: f64) -> Option<SkeletonEvent> {
        self.cache
            .get_frame(video_time)
            .filter(PoseTrackFrame::has_pose)
            .map(|frame| SkeletonEvent {
                skeleton: frame.skeleton(),
                timestamp_ms: frame.timestamp,
                video_time: Some(frame.video_time),
                frame_index: Some(frame.frame_index),
            })
    }
}
