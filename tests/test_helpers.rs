//! Helper functions and fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swing_analyzer::error::CameraError;
use swing_analyzer::skeleton::{Keypoint, KeypointFormat, Skeleton};
use swing_analyzer::source::{
    ActiveInfo, CameraProvider, FacingMode, FrameReader, ModelIdentity, PoseModel, SkeletonEvent, SkeletonSource,
    SourceFactory, SourceState, VideoDecoder, VideoFile, VideoFrame, VideoMetadata,
};
use swing_analyzer::{Error, Result};
use tokio::sync::{broadcast, watch};

/// COCO keypoints with spine lean `s`, arm angle `a` and thigh angle `t` (degrees)
///
/// Hip angle comes out as 180 - (s + t), knee angle as 180 - t.
pub fn pose_keypoints(s: f64, a: f64, t: f64) -> Vec<Keypoint> {
    let (s, a, t) = (s.to_radians(), a.to_radians(), t.to_radians());
    let hip = (300.0, 400.0);
    let shoulder = (hip.0 + 150.0 * s.sin(), hip.1 - 150.0 * s.cos());
    let wrist = (shoulder.0 + 130.0 * a.sin(), shoulder.1 + 130.0 * a.cos());
    let elbow = ((shoulder.0 + wrist.0) / 2.0, (shoulder.1 + wrist.1) / 2.0);
    let knee = (hip.0 + 120.0 * t.sin(), hip.1 + 120.0 * t.cos());
    let ankle = (knee.0, knee.1 + 120.0);

    let mut keypoints = vec![Keypoint::new(shoulder.0, shoulder.1 - 40.0, 0.9); 17];
    for (indices, point) in [
        ([5, 6], shoulder),
        ([7, 8], elbow),
        ([9, 10], wrist),
        ([11, 12], hip),
        ([13, 14], knee),
        ([15, 16], ankle),
    ] {
        for i in indices {
            keypoints[i] = Keypoint::new(point.0, point.1, 0.9);
        }
    }
    keypoints
}

pub fn pose(s: f64, a: f64, t: f64) -> Skeleton {
    Skeleton::new(pose_keypoints(s, a, t))
}

pub fn top() -> Vec<Keypoint> {
    pose_keypoints(3.0, 85.0, 0.0)
}

pub fn connect() -> Vec<Keypoint> {
    pose_keypoints(8.0, 5.0, 5.0)
}

pub fn bottom() -> Vec<Keypoint> {
    pose_keypoints(60.0, -30.0, 20.0)
}

pub fn release() -> Vec<Keypoint> {
    pose_keypoints(28.0, 10.0, 10.0)
}

/// `reps` clean swing cycles, each phase held three frames, closed by a top
pub fn swing_frames(reps: usize) -> Vec<Vec<Keypoint>> {
    let mut frames = Vec::new();
    for _ in 0..reps {
        for phase in [top(), connect(), bottom(), release()] {
            frames.extend(std::iter::repeat(phase).take(3));
        }
    }
    frames.extend(std::iter::repeat(top()).take(3));
    frames
}

/// Skeleton events at 30 fps
pub fn skeleton_events(frames: &[Vec<Keypoint>]) -> Vec<SkeletonEvent> {
    frames
        .iter()
        .enumerate()
        .map(|(i, keypoints)| {
            let video_time = i as f64 / 30.0;
            SkeletonEvent {
                skeleton: Skeleton::new(keypoints.clone()),
                timestamp_ms: video_time * 1000.0,
                video_time: Some(video_time),
                frame_index: Some(i as u32),
            }
        })
        .collect()
}

pub fn test_video(name: &str) -> VideoFile {
    VideoFile::new(name, format!("fake video bytes of {name}").into_bytes())
}

pub fn test_metadata(frames: u32) -> VideoMetadata {
    VideoMetadata {
        duration_secs: f64::from(frames) / 30.0,
        fps: 30.0,
        width: 640,
        height: 480,
        frame_count: Some(frames),
    }
}

/// Pose model returning scripted keypoints by frame index
pub struct ScriptedModel {
    script: Vec<Vec<Keypoint>>,
    fail_at: Option<u32>,
    pub calls: AtomicUsize,
    pub warmed_up: AtomicBool,
}

impl ScriptedModel {
    pub fn new(script: Vec<Vec<Keypoint>>) -> Self {
        Self {
            script,
            fail_at: None,
            calls: AtomicUsize::new(0),
            warmed_up: AtomicBool::new(false),
        }
    }

    pub fn failing_at(mut self, index: u32) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoseModel for ScriptedModel {
    async fn warm_up(&self) -> Result<()> {
        self.warmed_up.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn infer(&self, frame: &VideoFrame) -> Result<Vec<Keypoint>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(frame.index) {
            return Err(Error::Model(format!("inference failed on frame {}", frame.index)));
        }
        Ok(self.script.get(frame.index as usize).cloned().unwrap_or_default())
    }

    fn identity(&self) -> ModelIdentity {
        ModelIdentity {
            name: "scripted".to_string(),
            version: "1".to_string(),
            keypoint_format: KeypointFormat::Coco17,
        }
    }
}

/// Frame reader producing `frames` blank frames at 30 fps
pub struct FakeReader {
    frames: u32,
    next: u32,
    delay: Option<Duration>,
    fail_at: Option<u32>,
    closed: Arc<AtomicBool>,
}

impl FakeReader {
    pub fn new(frames: u32) -> Self {
        Self {
            frames,
            next: 0,
            delay: None,
            fail_at: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl FrameReader for FakeReader {
    async fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_at == Some(self.next) {
            return Err(Error::Decode(format!("corrupt frame {}", self.next)));
        }
        if self.next >= self.frames {
            return Ok(None);
        }
        let index = self.next;
        self.next += 1;
        Ok(Some(VideoFrame {
            index,
            timestamp_ms: f64::from(index) * 1000.0 / 30.0,
            width: 640,
            height: 480,
            data: Arc::from(vec![0u8; 4]),
        }))
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Decoder serving fake readers
pub struct FakeDecoder {
    pub metadata: VideoMetadata,
    pub frame_delay: Option<Duration>,
    pub fail_at: Option<u32>,
    /// Probe never completes
    pub hang_probe: bool,
    pub probes: AtomicUsize,
    pub opens: AtomicUsize,
    pub closed: Arc<AtomicBool>,
}

impl FakeDecoder {
    pub fn new(frames: u32) -> Self {
        Self {
            metadata: test_metadata(frames),
            frame_delay: None,
            fail_at: None,
            hang_probe: false,
            probes: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoDecoder for FakeDecoder {
    async fn probe(&self, _file: &VideoFile) -> Result<VideoMetadata> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.hang_probe {
            std::future::pending::<()>().await;
        }
        Ok(self.metadata)
    }

    async fn open(&self, _file: &VideoFile) -> Result<Box<dyn FrameReader>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let mut reader = FakeReader::new(self.metadata.frame_count.unwrap_or(0));
        reader.delay = self.frame_delay;
        reader.fail_at = self.fail_at;
        reader.closed = self.closed.clone();
        Ok(Box::new(reader))
    }
}

/// Camera provider handing out endless fake readers, or a fixed failure
pub struct FakeCamera {
    pub failure: Option<CameraError>,
    pub acquired: Mutex<Vec<FacingMode>>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self {
            failure: None,
            acquired: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(failure: CameraError) -> Self {
        Self {
            failure: Some(failure),
            acquired: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CameraProvider for FakeCamera {
    async fn acquire(&self, facing: FacingMode) -> Result<Box<dyn FrameReader>> {
        if let Some(failure) = &self.failure {
            return Err(Error::Camera(failure.clone()));
        }
        self.acquired.lock().unwrap().push(facing);
        let mut reader = FakeReader::new(u32::MAX);
        reader.delay = Some(Duration::from_millis(2));
        Ok(Box::new(reader))
    }
}

/// Shared event log of mock sources
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// Source recording its lifecycle calls
pub struct MockSource {
    pub id: String,
    log: EventLog,
    start_delay: Duration,
    fail_start: bool,
    skeleton_tx: broadcast::Sender<SkeletonEvent>,
    state_tx: watch::Sender<SourceState>,
}

impl MockSource {
    pub fn emit(&self, event: SkeletonEvent) {
        let _ = self.skeleton_tx.send(event);
    }

    pub fn set_state(&self, state: SourceState) {
        self.state_tx.send_replace(state);
    }
}

#[async_trait]
impl SkeletonSource for MockSource {
    async fn start(&self) -> Result<()> {
        self.log.push(format!("start:{}", self.id));
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if self.fail_start {
            let err = Error::Camera(CameraError::PermissionDenied);
            self.state_tx.send_replace(SourceState::Error(err.failure()));
            return Err(err);
        }
        self.state_tx.send_replace(SourceState::Active(ActiveInfo::default()));
        Ok(())
    }

    async fn stop(&self) {
        self.log.push(format!("stop:{}", self.id));
        self.state_tx.send_replace(SourceState::Idle);
    }

    async fn dispose(&self) {
        self.log.push(format!("dispose:{}", self.id));
    }

    fn skeletons(&self) -> broadcast::Receiver<SkeletonEvent> {
        self.log.push(format!("subscribe:{}", self.id));
        self.skeleton_tx.subscribe()
    }

    fn state(&self) -> watch::Receiver<SourceState> {
        self.state_tx.subscribe()
    }

    fn skeleton_at_time(&self, video_time: f64) -> Option<SkeletonEvent> {
        (video_time >= 0.0).then(|| SkeletonEvent {
            skeleton: Skeleton::new(top()),
            timestamp_ms: video_time * 1000.0,
            video_time: Some(video_time),
            frame_index: None,
        })
    }
}

/// Factory building mock sources named `camera-<n>` and `video-<n>`
#[derive(Default)]
pub struct MockFactory {
    pub log: EventLog,
    next_id: AtomicUsize,
    /// Start delays handed to sources in creation order
    pub start_delays: Mutex<VecDeque<Duration>>,
    pub fail_start: AtomicBool,
    pub sources: Mutex<Vec<Arc<MockSource>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delays(delays: &[Duration]) -> Self {
        let factory = Self::default();
        factory.start_delays.lock().unwrap().extend(delays.iter().copied());
        factory
    }

    pub fn source(&self, index: usize) -> Arc<MockSource> {
        self.sources.lock().unwrap()[index].clone()
    }

    fn build(&self, kind: &str) -> Arc<MockSource> {
        let id = format!("{kind}-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.log.push(format!("create:{id}"));
        let (skeleton_tx, _) = broadcast::channel(64);
        let (state_tx, _) = watch::channel(SourceState::Idle);
        let source = Arc::new(MockSource {
            id,
            log: self.log.clone(),
            start_delay: self.start_delays.lock().unwrap().pop_front().unwrap_or_default(),
            fail_start: self.fail_start.load(Ordering::SeqCst),
            skeleton_tx,
            state_tx,
        });
        self.sources.lock().unwrap().push(source.clone());
        source
    }
}

impl SourceFactory for MockFactory {
    fn camera(&self, _facing: FacingMode) -> Result<Arc<dyn SkeletonSource>> {
        Ok(self.build("camera"))
    }

    fn video_file(&self, _file: VideoFile) -> Result<Arc<dyn SkeletonSource>> {
        Ok(self.build("video"))
    }
}

/// Wait until `predicate` holds for the watched value, failing after a second
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, mut predicate: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            {
                let value = rx.borrow_and_update();
                if predicate(&value) {
                    return value.clone();
                }
            }
            rx.changed().await.expect("state stream closed");
        }
    })
    .await
    .expect("timed out waiting for state")
}
