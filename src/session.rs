//! Input session: the single owner of the active skeleton source.
//!
//! Every start, stop and dispose is serialized by a transition lock. The
//! previous source's relay is shut down and the source disposed before a
//! replacement is built, so at most one source ever feeds the session
//! streams. A newer `start_*` call cancels one still in flight; the
//! superseded call returns [`Error::Cancelled`] without touching session state.

use crate::source::{
    FacingMode, SkeletonEvent, SkeletonSource, SourceFactory, SourceState, VideoFile, Worker,
};
use crate::{Error, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

/// What the session is doing, as seen by the UI
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InputSessionState {
    #[default]
    Idle,
    Camera {
        facing_mode: FacingMode,
        source_state: SourceState,
    },
    VideoFile {
        file_name: String,
        source_state: SourceState,
    },
    Error {
        message: String,
    },
}

impl InputSessionState {
    /// State of the underlying source, when one is active
    pub fn source_state(&self) -> Option<&SourceState> {
        match self {
            Self::Camera { source_state, .. } | Self::VideoFile { source_state, .. } => Some(source_state),
            Self::Idle | Self::Error { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Which kind of input a source provides
#[derive(Debug, Clone, PartialEq)]
enum SourceKind {
    Camera(FacingMode),
    VideoFile(String),
}

impl SourceKind {
    /// Session state for a source in `source_state`
    fn tag(&self, source_state: SourceState) -> InputSessionState {
        if let SourceState::Error(failure) = source_state {
            return InputSessionState::Error {
                message: failure.message,
            };
        }
        match self {
            Self::Camera(facing_mode) => InputSessionState::Camera {
                facing_mode: *facing_mode,
                source_state,
            },
            Self::VideoFile(file_name) => InputSessionState::VideoFile {
                file_name: file_name.clone(),
                source_state,
            },
        }
    }
}

struct ActiveSource {
    source: Arc<dyn SkeletonSource>,
    relay: Option<Worker>,
    kind: SourceKind,
}

#[derive(Clone)]
struct Streams {
    state_tx: Arc<watch::Sender<InputSessionState>>,
    skeleton_tx: broadcast::Sender<SkeletonEvent>,
}

struct SessionInner {
    factory: Arc<dyn SourceFactory>,
    transition: tokio::sync::Mutex<()>,
    active: Mutex<Option<ActiveSource>>,
    load_token: Mutex<CancellationToken>,
    streams: Mutex<Option<Streams>>,
    disposed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionInner {
    fn streams(&self) -> Option<Streams> {
        lock(&self.streams).clone()
    }

    fn publish(&self, state: InputSessionState) {
        if let Some(streams) = self.streams() {
            streams.state_tx.send_replace(state);
        }
    }

    /// Cancel any in-flight start and hand out the token for a new one
    fn begin_load(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = std::mem::replace(&mut *lock(&self.load_token), token.clone());
        previous.cancel();
        token
    }

    /// Shut down the relay and dispose the active source
    async fn teardown(&self) {
        let active = lock(&self.active).take();
        if let Some(active) = active {
            if let Some(relay) = active.relay {
                relay.shutdown().await;
            }
            active.source.dispose().await;
            debug!("Disposed {:?} source", active.kind);
        }
    }
}

/// Relay source events into the session streams until cancelled
async fn relay_loop(
    kind: SourceKind,
    mut skeleton_rx: broadcast::Receiver<SkeletonEvent>,
    mut state_rx: watch::Receiver<SourceState>,
    streams: Streams,
    token: CancellationToken,
) {
    let mut skeletons_open = true;
    let mut state_open = true;
    while skeletons_open || state_open {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            // Skeletons first so a state change never overtakes the frames before it
            received = skeleton_rx.recv(), if skeletons_open => match received {
                Ok(event) => {
                    if token.is_cancelled() {
                        break;
                    }
                    let _ = streams.skeleton_tx.send(event);
                }
                Err(RecvError::Lagged(skipped)) => warn!("Session relay lagged, dropped {skipped} skeletons"),
                Err(RecvError::Closed) => skeletons_open = false,
            },
            changed = state_rx.changed(), if state_open => {
                if changed.is_err() {
                    state_open = false;
                    continue;
                }
                let source_state = state_rx.borrow_and_update().clone();
                if token.is_cancelled() {
                    break;
                }
                streams.state_tx.send_replace(kind.tag(source_state));
            }
        }
    }
    debug!("Relay for {kind:?} exited");
}

/// Owner of the active camera or video-file source
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct InputSession {
    inner: Arc<SessionInner>,
}

impl InputSession {
    pub fn new(factory: Arc<dyn SourceFactory>, channel_capacity: usize) -> Self {
        let (state_tx, _) = watch::channel(InputSessionState::Idle);
        let (skeleton_tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            inner: Arc::new(SessionInner {
                factory,
                transition: tokio::sync::Mutex::new(()),
                active: Mutex::new(None),
                load_token: Mutex::new(CancellationToken::new()),
                streams: Mutex::new(Some(Streams {
                    state_tx: Arc::new(state_tx),
                    skeleton_tx,
                })),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> InputSessionState {
        self.inner
            .streams()
            .map_or(InputSessionState::Idle, |s| s.state_tx.borrow().clone())
    }

    /// State stream; closed once the session is disposed
    pub fn subscribe_state(&self) -> watch::Receiver<InputSessionState> {
        match self.inner.streams() {
            Some(streams) => streams.state_tx.subscribe(),
            None => watch::channel(InputSessionState::Idle).1,
        }
    }

    /// Skeletons of whichever source is active; closed once the session is disposed
    pub fn skeletons(&self) -> broadcast::Receiver<SkeletonEvent> {
        match self.inner.streams() {
            Some(streams) => streams.skeleton_tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Start live camera input
    ///
    /// # Errors
    ///
    /// `Error::Cancelled` if a newer start superseded this one, `Error::Disposed`
    /// after dispose, otherwise the source's start failure.
    pub async fn start_camera(&self, facing: FacingMode) -> Result<()> {
        info!("Starting {facing:?} camera input");
        self.start(SourceKind::Camera(facing), |factory| factory.camera(facing)).await
    }

    /// Start video file input
    ///
    /// # Errors
    ///
    /// Same as [`InputSession::start_camera`].
    pub async fn start_video_file(&self, file: VideoFile) -> Result<()> {
        info!("Starting video file input {}", file.name);
        let kind = SourceKind::VideoFile(file.name.clone());
        self.start(kind, move |factory| factory.video_file(file)).await
    }

    /// Restart the camera facing the other way
    ///
    /// # Errors
    ///
    /// `Error::InvalidState` unless camera input is active.
    pub async fn switch_camera(&self) -> Result<()> {
        let facing = match self.state() {
            InputSessionState::Camera { facing_mode, .. } => facing_mode,
            other => {
                return Err(Error::InvalidState(format!(
                    "switch_camera needs camera input, session is {other:?}"
                )))
            }
        };
        self.start_camera(facing.opposite()).await
    }

    async fn start<F>(&self, kind: SourceKind, create: F) -> Result<()>
    where
        F: FnOnce(&dyn SourceFactory) -> Result<Arc<dyn SkeletonSource>>,
    {
        let inner = &self.inner;
        let token = inner.begin_load();
        let _transition = tokio::select! {
            biased;
            () = token.cancelled() => return Err(Error::Cancelled),
            guard = inner.transition.lock() => guard,
        };
        if self.is_disposed() {
            return Err(Error::Disposed);
        }

        inner.teardown().await;
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let source = match create(inner.factory.as_ref()) {
            Ok(source) => source,
            Err(err) => {
                warn!("Could not create {kind:?} source: {err}");
                inner.publish(InputSessionState::Error {
                    message: err.user_message(),
                });
                return Err(err);
            }
        };

        let Some(streams) = inner.streams() else {
            source.dispose().await;
            return Err(Error::Disposed);
        };
        let skeleton_rx = source.skeletons();
        let mut state_rx = source.state();
        let initial = state_rx.borrow_and_update().clone();
        streams.state_tx.send_replace(kind.tag(initial));

        let relay_kind = kind.clone();
        let relay = Worker::spawn("relay", move |relay_token| {
            relay_loop(relay_kind, skeleton_rx, state_rx, streams, relay_token)
        });
        *lock(&inner.active) = Some(ActiveSource {
            source: source.clone(),
            relay: Some(relay),
            kind: kind.clone(),
        });

        let started = tokio::select! {
            biased;
            () = token.cancelled() => None,
            started = source.start() => Some(started),
        };
        match started {
            None => {
                debug!("Start of {kind:?} superseded");
                Err(Error::Cancelled)
            }
            Some(Ok(())) => Ok(()),
            Some(Err(_)) if token.is_cancelled() => Err(Error::Cancelled),
            Some(Err(err)) => {
                warn!("{kind:?} source failed to start: {err}");
                inner.publish(InputSessionState::Error {
                    message: err.user_message(),
                });
                Err(err)
            }
        }
    }

    /// Stop producing skeletons but keep the source for cached lookups
    pub async fn stop(&self) {
        let inner = &self.inner;
        inner.begin_load();
        let _transition = inner.transition.lock().await;

        let (relay, source) = {
            let mut active = lock(&inner.active);
            match active.as_mut() {
                Some(active) => (active.relay.take(), Some(active.source.clone())),
                None => (None, None),
            }
        };
        if let Some(relay) = relay {
            relay.shutdown().await;
        }
        if let Some(source) = source {
            source.stop().await;
        }
        if !self.is_disposed() {
            inner.publish(InputSessionState::Idle);
        }
        debug!("Input session stopped");
    }

    /// Release the source and close both streams; later starts fail with `Error::Disposed`
    pub async fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        inner.begin_load();
        let _transition = inner.transition.lock().await;
        inner.teardown().await;
        lock(&inner.streams).take();
        info!("Input session disposed");
    }

    /// Cached skeleton nearest to `video_time` from the current source
    pub fn skeleton_at_time(&self, video_time: f64) -> Option<SkeletonEvent> {
        let source = lock(&self.inner.active).as_ref().map(|a| a.source.clone())?;
        source.skeleton_at_time(video_time)
    }

    pub fn has_skeleton_at_time(&self, video_time: f64) -> bool {
        let source = lock(&self.inner.active).as_ref().map(|a| a.source.clone());
        source.is_some_and(|s| s.has_skeleton_at_time(video_time))
    }
}
