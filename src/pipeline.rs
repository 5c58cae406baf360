//! Frame processing pipeline.
//!
//! Frames flow acquisition -> skeleton construction -> form analysis -> rep
//! counting. Each processed frame is published as a [`PipelineEvent`], and
//! every representative position of a completed rep as a [`CheckpointEvent`].
//! A stage failure is published as [`PipelineEvent::Error`] and ends the run;
//! call [`Pipeline::reset`] and [`Pipeline::start`] to go again.

use crate::form_analyzer::{FormAnalyzer, FormResult, RepQuality, SwingPhase};
use crate::skeleton::{AngleSnapshot, Skeleton};
use crate::source::{PoseModel, SkeletonEvent, VideoFrame, Worker};
use crate::{Error, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Input to the pipeline: a raw image or a skeleton built upstream
#[derive(Debug, Clone)]
pub enum FrameEvent {
    Image(VideoFrame),
    Skeleton(SkeletonEvent),
}

/// Where frames come from
#[async_trait]
pub trait FrameAcquisition: Send {
    /// Next frame, `None` once the input is exhausted
    async fn next_frame(&mut self) -> Result<Option<FrameEvent>>;

    /// Stop pulling from upstream; the input stays attached for a later [`resume`](Self::resume)
    async fn stop(&mut self);

    /// Re-arm after a stop, dropping whatever queued up meanwhile
    fn resume(&mut self);
}

/// Acquisition from an input session's skeleton stream
pub struct SessionFrames {
    rx: broadcast::Receiver<SkeletonEvent>,
    stopped: bool,
}

impl SessionFrames {
    pub fn new(rx: broadcast::Receiver<SkeletonEvent>) -> Self {
        Self { rx, stopped: false }
    }
}

#[async_trait]
impl FrameAcquisition for SessionFrames {
    async fn next_frame(&mut self) -> Result<Option<FrameEvent>> {
        if self.stopped {
            return Ok(None);
        }
        loop {
            match self.rx.recv().await {
                Ok(event) => return Ok(Some(FrameEvent::Skeleton(event))),
                Err(RecvError::Lagged(skipped)) => warn!("Pipeline lagged behind the session, dropped {skipped} skeletons"),
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }

    async fn stop(&mut self) {
        self.stopped = true;
    }

    fn resume(&mut self) {
        if self.stopped {
            // A fresh receiver starts at the live edge
            self.rx = self.rx.resubscribe();
            self.stopped = false;
        }
    }
}

/// Acquisition from an mpsc channel, for replaying stored frames
pub struct ChannelFrames {
    rx: mpsc::Receiver<FrameEvent>,
    stopped: bool,
}

impl ChannelFrames {
    pub fn new(rx: mpsc::Receiver<FrameEvent>) -> Self {
        Self { rx, stopped: false }
    }
}

#[async_trait]
impl FrameAcquisition for ChannelFrames {
    async fn next_frame(&mut self) -> Result<Option<FrameEvent>> {
        if self.stopped {
            return Ok(None);
        }
        Ok(self.rx.recv().await)
    }

    async fn stop(&mut self) {
        self.stopped = true;
    }

    fn resume(&mut self) {
        if self.stopped {
            let mut dropped = 0usize;
            while self.rx.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!("Dropped {dropped} frames queued while stopped");
            }
            self.stopped = false;
        }
    }
}

/// Turns frame events into skeletons
#[async_trait]
pub trait SkeletonTransformer: Send + Sync {
    /// Prepare for the first frame
    async fn initialize(&self) -> Result<()>;

    /// Skeleton for the frame, `None` when nobody is in view
    async fn transform(&self, event: FrameEvent) -> Result<Option<SkeletonEvent>>;
}

/// Runs the pose model on images; skeleton events pass through unchanged
pub struct PoseModelTransformer {
    model: Arc<dyn PoseModel>,
}

impl PoseModelTransformer {
    pub fn new(model: Arc<dyn PoseModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl SkeletonTransformer for PoseModelTransformer {
    async fn initialize(&self) -> Result<()> {
        self.model.warm_up().await
    }

    async fn transform(&self, event: FrameEvent) -> Result<Option<SkeletonEvent>> {
        match event {
            FrameEvent::Skeleton(event) => Ok(Some(event)),
            FrameEvent::Image(frame) => {
                let keypoints = self.model.infer(&frame).await?;
                if keypoints.is_empty() {
                    return Ok(None);
                }
                Ok(Some(SkeletonEvent {
                    skeleton: Skeleton::new(keypoints),
                    timestamp_ms: frame.timestamp_ms,
                    video_time: None,
                    frame_index: Some(frame.index),
                }))
            }
        }
    }
}

/// Accepts only skeleton events, for inputs that never carry images
pub struct SkeletonPassthrough;

#[async_trait]
impl SkeletonTransformer for SkeletonPassthrough {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn transform(&self, event: FrameEvent) -> Result<Option<SkeletonEvent>> {
        match event {
            FrameEvent::Skeleton(event) => Ok(Some(event)),
            FrameEvent::Image(frame) => Err(Error::InvalidInput(format!(
                "image frame {} reached a skeleton-only pipeline",
                frame.index
            ))),
        }
    }
}

/// Stage that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineStage {
    Acquisition,
    Skeleton,
    Analysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineFailure {
    pub stage: PipelineStage,
    pub message: String,
}

/// One processed frame
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub skeleton: Skeleton,
    pub timestamp_ms: f64,
    pub video_time: Option<f64>,
    pub frame_index: Option<u32>,
    pub form: FormResult,
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Frame(PipelineResult),
    Error(PipelineFailure),
    /// Input exhausted
    Completed,
}

/// Representative position of a completed rep
#[derive(Debug, Clone)]
pub struct CheckpointEvent {
    /// 1-based
    pub rep_number: u32,
    pub position: SwingPhase,
    pub skeleton: Skeleton,
    pub timestamp_ms: f64,
    pub video_time: Option<f64>,
    pub angles: AngleSnapshot,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the pipeline handle and its processing task
struct Shared {
    analyzer: Mutex<Box<dyn FormAnalyzer>>,
    latest_skeleton: Mutex<Option<Skeleton>>,
    last_quality: Mutex<Option<RepQuality>>,
    rep_count: AtomicU32,
    active: AtomicBool,
    events: broadcast::Sender<PipelineEvent>,
    checkpoints: broadcast::Sender<CheckpointEvent>,
}

impl Shared {
    fn fail(&self, stage: PipelineStage, err: &Error) {
        error!("Pipeline {stage:?} stage failed: {err}");
        self.active.store(false, Ordering::Release);
        let _ = self.events.send(PipelineEvent::Error(PipelineFailure {
            stage,
            message: err.to_string(),
        }));
    }

    /// Analyze one skeleton and publish the outcome
    fn process(&self, event: SkeletonEvent) -> Result<()> {
        let form = lock(&self.analyzer).process_frame(&event.skeleton, event.timestamp_ms, event.video_time)?;
        if form.skipped {
            return Ok(());
        }

        *lock(&self.latest_skeleton) = Some(event.skeleton.clone());
        self.rep_count.store(form.rep_count, Ordering::Release);
        if form.rep_completed {
            if let Some(quality) = &form.quality {
                *lock(&self.last_quality) = Some(quality.clone());
            }
            for position in &form.rep_positions {
                let _ = self.checkpoints.send(CheckpointEvent {
                    rep_number: form.rep_count,
                    position: position.phase,
                    skeleton: position.skeleton.clone(),
                    timestamp_ms: position.timestamp_ms,
                    video_time: position.video_time,
                    angles: position.angles,
                });
            }
        }

        let _ = self.events.send(PipelineEvent::Frame(PipelineResult {
            skeleton: event.skeleton,
            timestamp_ms: event.timestamp_ms,
            video_time: event.video_time,
            frame_index: event.frame_index,
            form,
        }));
        Ok(())
    }
}

async fn run(
    acquisition: Arc<tokio::sync::Mutex<Box<dyn FrameAcquisition>>>,
    transformer: Arc<dyn SkeletonTransformer>,
    shared: Arc<Shared>,
    token: CancellationToken,
) {
    let mut acquisition = acquisition.lock().await;
    let mut frames = 0u64;
    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => break,
            next = acquisition.next_frame() => next,
        };
        let event = match next {
            Ok(Some(event)) => event,
            Ok(None) => {
                if !token.is_cancelled() {
                    info!("Pipeline input complete after {frames} frames");
                    shared.active.store(false, Ordering::Release);
                    let _ = shared.events.send(PipelineEvent::Completed);
                }
                break;
            }
            Err(err) => {
                if !token.is_cancelled() {
                    shared.fail(PipelineStage::Acquisition, &err);
                }
                break;
            }
        };

        let transformed = tokio::select! {
            biased;
            () = token.cancelled() => break,
            transformed = transformer.transform(event) => transformed,
        };
        let skeleton_event = match transformed {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(err) => {
                if !token.is_cancelled() {
                    shared.fail(PipelineStage::Skeleton, &err);
                }
                break;
            }
        };

        if token.is_cancelled() {
            break;
        }
        if let Err(err) = shared.process(skeleton_event) {
            shared.fail(PipelineStage::Analysis, &err);
            break;
        }
        frames += 1;
    }
    debug!("Pipeline task exited");
}

/// Frame -> skeleton -> phase -> rep orchestrator
pub struct Pipeline {
    acquisition: Arc<tokio::sync::Mutex<Box<dyn FrameAcquisition>>>,
    transformer: Arc<dyn SkeletonTransformer>,
    shared: Arc<Shared>,
    initialized: bool,
    worker: Option<Worker>,
}

impl Pipeline {
    pub fn new(
        acquisition: Box<dyn FrameAcquisition>,
        transformer: Arc<dyn SkeletonTransformer>,
        analyzer: Box<dyn FormAnalyzer>,
        channel_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(channel_capacity.max(1));
        let (checkpoints, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            acquisition: Arc::new(tokio::sync::Mutex::new(acquisition)),
            transformer,
            shared: Arc::new(Shared {
                analyzer: Mutex::new(analyzer),
                latest_skeleton: Mutex::new(None),
                last_quality: Mutex::new(None),
                rep_count: AtomicU32::new(0),
                active: AtomicBool::new(false),
                events,
                checkpoints,
            }),
            initialized: false,
            worker: None,
        }
    }

    /// Warm up skeleton construction; required before [`Pipeline::start`]
    ///
    /// # Errors
    ///
    /// Whatever the transformer reports, typically a model load failure
    pub async fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.transformer.initialize().await?;
        self.initialized = true;
        debug!("Pipeline initialized");
        Ok(())
    }

    /// Begin processing; the returned receiver sees every event of this run
    ///
    /// Calling start while running hands out another receiver without
    /// spawning a second task.
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` before [`Pipeline::initialize`]
    pub fn start(&mut self) -> Result<broadcast::Receiver<PipelineEvent>> {
        if !self.initialized {
            return Err(Error::InvalidState("Pipeline started before initialize".to_string()));
        }
        let events = self.shared.events.subscribe();
        if self.worker.as_ref().is_some_and(|w| !w.is_finished()) {
            return Ok(events);
        }

        // Re-armed here rather than in the task so frames sent right after start are kept
        match self.acquisition.try_lock() {
            Ok(mut acquisition) => acquisition.resume(),
            Err(_) => warn!("Pipeline acquisition still held by a finishing run"),
        }
        self.shared.active.store(true, Ordering::Release);
        let acquisition = self.acquisition.clone();
        let transformer = self.transformer.clone();
        let shared = self.shared.clone();
        self.worker = Some(Worker::spawn("pipeline", move |token| {
            run(acquisition, transformer, shared, token)
        }));
        info!("Pipeline started");
        Ok(events)
    }

    /// Halt processing and upstream acquisition; a no-op when stopped
    ///
    /// The acquisition stays attached, so [`Pipeline::reset`] followed by
    /// [`Pipeline::start`] runs again on frames that arrive after the restart.
    pub async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown().await;
        }
        self.shared.active.store(false, Ordering::Release);
        self.acquisition.lock().await.stop().await;
    }

    /// Clear the rep count and analyzer state; subscriptions are kept
    pub fn reset(&self) {
        lock(&self.shared.analyzer).reset();
        self.shared.rep_count.store(0, Ordering::Release);
        *lock(&self.shared.latest_skeleton) = None;
        *lock(&self.shared.last_quality) = None;
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Pipeline events without starting a run
    pub fn events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.shared.events.subscribe()
    }

    pub fn checkpoints(&self) -> broadcast::Receiver<CheckpointEvent> {
        self.shared.checkpoints.subscribe()
    }

    pub fn latest_skeleton(&self) -> Option<Skeleton> {
        lock(&self.shared.latest_skeleton).clone()
    }

    pub fn rep_count(&self) -> u32 {
        self.shared.rep_count.load(Ordering::Acquire)
    }

    pub fn current_phase(&self) -> SwingPhase {
        lock(&self.shared.analyzer).phase()
    }

    pub fn last_quality(&self) -> Option<RepQuality> {
        lock(&self.shared.last_quality).clone()
    }
}
