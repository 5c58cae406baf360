//! Camera and video file source lifecycle tests

mod test_helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use swing_analyzer::config::Config;
use swing_analyzer::error::{CameraError, FailureCategory};
use swing_analyzer::source::{
    CameraSource, FacingMode, SkeletonEvent, SkeletonSource, SourceState, VideoFileSource,
};
use swing_analyzer::store::{MemoryPoseTrackStore, PoseTrackStore};
use swing_analyzer::Error;
use test_helpers::{swing_frames, test_video, top, wait_for, FakeCamera, FakeDecoder, ScriptedModel};
use tokio::sync::broadcast;

fn drain(rx: &mut broadcast::Receiver<SkeletonEvent>) -> Vec<SkeletonEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn video_source(
    decoder: Arc<FakeDecoder>,
    model: Arc<ScriptedModel>,
    store: Arc<MemoryPoseTrackStore>,
) -> VideoFileSource {
    VideoFileSource::new(test_video("swing.mp4"), model, decoder, store, &Config::default())
}

fn is_complete(state: &SourceState) -> bool {
    matches!(state, SourceState::Active(info) if info.batch_complete) || state.is_error()
}

#[tokio::test]
async fn test_extraction_fills_cache_and_store() {
    let decoder = Arc::new(FakeDecoder::new(30));
    let model = Arc::new(ScriptedModel::new(swing_frames(1)));
    let store = Arc::new(MemoryPoseTrackStore::new());
    let source = video_source(decoder.clone(), model.clone(), store.clone());

    let mut skeletons = source.skeletons();
    let mut state = source.state();
    source.start().await.unwrap();
    assert!(matches!(*state.borrow(), SourceState::Extracting(_)));

    let done = wait_for(&mut state, is_complete).await;
    match done {
        SourceState::Active(info) => {
            assert!(!info.from_cache);
            assert_eq!(info.frames_processed, Some(30));
            assert!(info.processing_time_ms.is_some());
        }
        other => panic!("unexpected state {other:?}"),
    }

    let events = drain(&mut skeletons);
    assert_eq!(events.len(), 15);
    let times: Vec<f64> = events.iter().map(|e| e.video_time.unwrap()).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));

    assert_eq!(model.calls(), 30);
    assert_eq!(source.cache().frame_count(), 30);
    assert!(source.cache().is_extraction_complete());
    assert!(source.has_skeleton_at_time(5.0 / 30.0));
    assert!(source.skeleton_at_time(20.0 / 30.0).is_none());
    assert!(decoder.closed.load(Ordering::SeqCst));

    // Persisting happens right after the active state is published
    tokio::time::timeout(Duration::from_secs(1), async {
        while store.is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    let hash = test_video("swing.mp4").content_hash();
    let track = store.load(&hash).await.unwrap().unwrap();
    assert_eq!(track.frames.len(), 30);
    assert_eq!(track.metadata.frame_count, 30);
    assert!(track.validate().is_ok());
}

#[tokio::test]
async fn test_second_load_hits_store() {
    let decoder = Arc::new(FakeDecoder::new(30));
    let model = Arc::new(ScriptedModel::new(swing_frames(1)));
    let store = Arc::new(MemoryPoseTrackStore::new());

    let first = video_source(decoder.clone(), model.clone(), store.clone());
    let mut state = first.state();
    first.start().await.unwrap();
    wait_for(&mut state, is_complete).await;
    tokio::time::timeout(Duration::from_secs(1), async {
        while store.is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    first.dispose().await;

    let second = video_source(decoder.clone(), model.clone(), store.clone());
    let mut skeletons = second.skeletons();
    let mut state = second.state();
    second.start().await.unwrap();

    match state.borrow_and_update().clone() {
        SourceState::Active(info) => {
            assert!(info.from_cache);
            assert!(info.batch_complete);
            assert_eq!(info.frames_processed, Some(30));
        }
        other => panic!("expected cached active state, got {other:?}"),
    }
    // No second decode or inference pass
    assert_eq!(decoder.opens(), 1);
    assert_eq!(model.calls(), 30);

    tokio::time::timeout(Duration::from_secs(1), async {
        let mut received = 0;
        while received < 15 {
            skeletons.recv().await.unwrap();
            received += 1;
        }
    })
    .await
    .unwrap();
    assert!(second.skeleton_at_time(0.0).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_metadata_timeout_is_distinct_from_decode_error() {
    let mut decoder = FakeDecoder::new(30);
    decoder.hang_probe = true;
    let source = video_source(
        Arc::new(decoder),
        Arc::new(ScriptedModel::new(Vec::new())),
        Arc::new(MemoryPoseTrackStore::new()),
    );

    let result = source.start().await;
    assert!(matches!(result, Err(Error::Timeout(_))));
    match source.state().borrow().clone() {
        SourceState::Error(failure) => assert_eq!(failure.category, FailureCategory::Timeout),
        other => panic!("expected timeout state, got {other:?}"),
    }
}

#[tokio::test]
async fn test_decode_failure_keeps_partial_cache() {
    let mut decoder = FakeDecoder::new(30);
    decoder.fail_at = Some(10);
    let store = Arc::new(MemoryPoseTrackStore::new());
    let source = video_source(Arc::new(decoder), Arc::new(ScriptedModel::new(swing_frames(1))), store.clone());

    let mut state = source.state();
    source.start().await.unwrap();
    match wait_for(&mut state, is_complete).await {
        SourceState::Error(failure) => assert_eq!(failure.category, FailureCategory::Decode),
        other => panic!("expected decode error, got {other:?}"),
    }
    assert_eq!(source.cache().frame_count(), 10);
    assert!(!source.cache().is_extraction_complete());
    assert!(source.has_skeleton_at_time(3.0 / 30.0));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_model_failure_reports_model_category() {
    let model = Arc::new(ScriptedModel::new(swing_frames(1)).failing_at(4));
    let source = video_source(Arc::new(FakeDecoder::new(30)), model, Arc::new(MemoryPoseTrackStore::new()));

    let mut state = source.state();
    source.start().await.unwrap();
    match wait_for(&mut state, is_complete).await {
        SourceState::Error(failure) => assert_eq!(failure.category, FailureCategory::Model),
        other => panic!("expected model error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stop_mid_extraction() {
    let mut decoder = FakeDecoder::new(600);
    decoder.frame_delay = Some(Duration::from_millis(1));
    let decoder = Arc::new(decoder);
    let store = Arc::new(MemoryPoseTrackStore::new());
    let source = video_source(decoder.clone(), Arc::new(ScriptedModel::new(swing_frames(1))), store.clone());

    source.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    source.stop().await;

    assert_eq!(*source.state().borrow(), SourceState::Idle);
    assert!(decoder.closed.load(Ordering::SeqCst));
    let cached = source.cache().frame_count();
    assert!(cached < 600);

    // Nothing changes after the worker has been shut down
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(source.cache().frame_count(), cached);
    assert_eq!(*source.state().borrow(), SourceState::Idle);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_dispose_is_idempotent_and_final() {
    let source = video_source(
        Arc::new(FakeDecoder::new(5)),
        Arc::new(ScriptedModel::new(swing_frames(1))),
        Arc::new(MemoryPoseTrackStore::new()),
    );
    source.dispose().await;
    source.dispose().await;
    assert!(matches!(source.start().await, Err(Error::Disposed)));
    assert_eq!(source.cache().frame_count(), 0);
}

#[tokio::test]
async fn test_camera_emits_live_skeletons() {
    let camera = Arc::new(FakeCamera::new());
    let model = Arc::new(ScriptedModel::new(vec![top(); 50]));
    let source = CameraSource::new(FacingMode::Environment, model, camera.clone(), 256);

    let mut skeletons = source.skeletons();
    source.start().await.unwrap();
    assert!(matches!(*source.state().borrow(), SourceState::Active(_)));

    let first = tokio::time::timeout(Duration::from_secs(1), skeletons.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(first.video_time.is_none());
    assert!(first.skeleton.has_visible_pose());
    assert!(source.skeleton_at_time(0.0).is_none());
    assert_eq!(camera.acquired.lock().unwrap().as_slice(), &[FacingMode::Environment]);

    source.stop().await;
    assert_eq!(*source.state().borrow(), SourceState::Idle);
    source.dispose().await;
}

#[tokio::test]
async fn test_camera_permission_denied() {
    let camera = Arc::new(FakeCamera::failing(CameraError::PermissionDenied));
    let source = CameraSource::new(FacingMode::User, Arc::new(ScriptedModel::new(Vec::new())), camera, 16);

    let result = source.start().await;
    assert!(matches!(result, Err(Error::Camera(CameraError::PermissionDenied))));
    match source.state().borrow().clone() {
        SourceState::Error(failure) => {
            assert_eq!(failure.category, FailureCategory::Device);
            assert_eq!(failure.message, "Camera access was denied");
        }
        other => panic!("expected device error, got {other:?}"),
    }
}
