//! Live camera source: every captured frame goes through the pose model.

use super::device::{CameraProvider, FrameReader, PoseModel};
use super::worker::Worker;
use super::{ActiveInfo, FacingMode, SkeletonEvent, SkeletonSource, SourceState};
use crate::skeleton::Skeleton;
use crate::{Error, Result};
use async_trait::async_trait;
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Skeleton source backed by a live camera
pub struct CameraSource {
    facing: FacingMode,
    model: Arc<dyn PoseModel>,
    provider: Arc<dyn CameraProvider>,
    skeleton_tx: broadcast::Sender<SkeletonEvent>,
    state_tx: Arc<watch::Sender<SourceState>>,
    worker: Mutex<Option<Worker>>,
    disposed: AtomicBool,
}

impl CameraSource {
    pub fn new(
        facing: FacingMode,
        model: Arc<dyn PoseModel>,
        provider: Arc<dyn CameraProvider>,
        channel_capacity: usize,
    ) -> Self {
        let (skeleton_tx, _) = broadcast::channel(channel_capacity.max(1));
        let (state_tx, _) = watch::channel(SourceState::Idle);
        Self {
            facing,
            model,
            provider,
            skeleton_tx,
            state_tx: Arc::new(state_tx),
            worker: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn facing_mode(&self) -> FacingMode {
        self.facing
    }
}

async fn capture_loop(
    mut reader: Box<dyn FrameReader>,
    model: Arc<dyn PoseModel>,
    skeleton_tx: broadcast::Sender<SkeletonEvent>,
    state_tx: Arc<watch::Sender<SourceState>>,
    token: CancellationToken,
) {
    let started = Instant::now();
    loop {
        let next = tokio::select! {
            biased;
            () = token.cancelled() => break,
            next = reader.next_frame() => next,
        };
        let frame = match next {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Camera stream ended");
                break;
            }
            Err(err) => {
                error!("Camera read failed: {err}");
                if !token.is_cancelled() {
                    state_tx.send_replace(SourceState::Error(err.failure()));
                }
                break;
            }
        };

        let inferred = tokio::select! {
            biased;
            () = token.cancelled() => break,
            inferred = model.infer(&frame) => inferred,
        };
        match inferred {
            Ok(keypoints) if keypoints.is_empty() => {}
            Ok(keypoints) => {
                if token.is_cancelled() {
                    break;
                }
                let event = SkeletonEvent {
                    skeleton: Skeleton::new(keypoints),
                    timestamp_ms: started.elapsed().as_secs_f64() * 1000.0,
                    video_time: None,
                    frame_index: Some(frame.index),
                };
                // No subscribers is not an error for a live feed
                let _ = skeleton_tx.send(event);
            }
            Err(err) => {
                error!("Pose inference failed on camera frame {}: {err}", frame.index);
                if !token.is_cancelled() {
                    state_tx.send_replace(SourceState::Error(err.failure()));
                }
                break;
            }
        }
    }
    reader.close().await;
    debug!("Camera capture loop exited");
}

#[async_trait]
impl SkeletonSource for CameraSource {
    async fn start(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed);
        }
        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(|w| !w.is_finished()) {
            return Ok(());
        }

        info!("Acquiring {:?} camera", self.facing);
        let reader = match self.provider.acquire(self.facing).await {
            Ok(reader) => reader,
            Err(err) => {
                error!("Camera acquisition failed: {err}");
                self.state_tx.send_replace(SourceState::Error(err.failure()));
                return Err(err);
            }
        };

        self.state_tx.send_replace(SourceState::Active(ActiveInfo::default()));
        let model = self.model.clone();
        let skeleton_tx = self.skeleton_tx.clone();
        let state_tx = self.state_tx.clone();
        *worker = Some(Worker::spawn("camera", move |token| {
            capture_loop(reader, model, skeleton_tx, state_tx, token)
        }));
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
        debug!("Camera source disposed");
    }

    fn skeletons(&self) -> broadcast::Receiver<SkeletonEvent> {
        self.skeleton_tx.subscribe()
    }

    fn state(&self) -> watch::Receiver<SourceState> {
        self.state_tx.subscribe()
    }

    fn skeleton_at_time(&self, _video_time: f64) -> Option<SkeletonEvent> {
        None
    }
}
