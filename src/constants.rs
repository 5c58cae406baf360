//! Constants used throughout the library

/// Number of keypoints in the COCO layout
pub const COCO_KEYPOINT_COUNT: usize = 17;

/// Number of keypoints in the BlazePose layout
pub const BLAZEPOSE_KEYPOINT_COUNT: usize = 33;

/// Minimum keypoint score for the torso joints to count as visible
pub const VISIBILITY_THRESHOLD: f64 = 0.3;

/// Default frames per second assumption
pub const DEFAULT_FPS: f64 = 30.0;

/// Pose track schema version written and accepted
pub const POSE_TRACK_VERSION: &str = "1.0";

/// File suffix used by the filesystem pose track store
pub const POSE_TRACK_SUFFIX: &str = ".posetrack.json";

/// Chunk size used by the quick video hash
pub const HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// Two timestamps closer than this are the same frame (seconds)
pub const TIME_EPSILON: f64 = 1e-6;

/// Lookup tolerance, in frame intervals
pub const DEFAULT_LOOKUP_TOLERANCE_FRAMES: f64 = 1.5;

/// Forward jumps larger than this many frames use binary search
pub const CURSOR_MAX_ADVANCE: usize = 8;

/// Default bounded wait for video metadata
pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 10;

/// Extraction progress is published every N frames
pub const DEFAULT_PROGRESS_EVERY_FRAMES: u32 = 5;

/// Capacity of skeleton and result broadcast channels
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Swing phase state machine defaults (degrees unless noted)
pub const DEFAULT_MIN_DWELL_FRAMES: u32 = 2;
pub const DEFAULT_CONNECT_ARM_BAND: f64 = 25.0;
pub const DEFAULT_CONNECT_SPINE_MAX: f64 = 30.0;
pub const DEFAULT_BOTTOM_ARM_BEHIND_MIN: f64 = 5.0;
pub const DEFAULT_BOTTOM_ARM_BEHIND_MAX: f64 = 120.0;
pub const DEFAULT_BOTTOM_SPINE_MIN: f64 = 40.0;
pub const DEFAULT_BOTTOM_HIP_MAX: f64 = 140.0;
pub const DEFAULT_RELEASE_ARM_MIN: f64 = 0.0;
pub const DEFAULT_RELEASE_SPINE_MAX: f64 = 40.0;
pub const DEFAULT_TOP_SPINE_MAX: f64 = 25.0;
pub const DEFAULT_TOP_HIP_MIN: f64 = 150.0;
pub const DEFAULT_TOP_ARM_MIN: f64 = 70.0;
pub const DEFAULT_TOP_FALLBACK_FRAMES: u32 = 3;
pub const DEFAULT_WRIST_WINDOW: usize = 5;
pub const DEFAULT_WRIST_SMOOTHING_WINDOW: usize = 3;

/// Wrist drop below the apex that confirms a peak, as a fraction of torso length
pub const DEFAULT_PEAK_DROP_RATIO: f64 = 0.02;

/// Rep quality bands
pub const HINGE_DEPTH_IDEAL_MIN: f64 = 45.0;
pub const HINGE_DEPTH_IDEAL_MAX: f64 = 85.0;
pub const LOCKOUT_IDEAL_MIN: f64 = 165.0;
pub const KNEE_FLEXION_IDEAL_MIN: f64 = 10.0;
pub const KNEE_FLEXION_IDEAL_MAX: f64 = 40.0;

/// Biomechanics defaults
pub const DEFAULT_BIOMECHANICS_BUFFER: usize = 10;
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.3;

/// Hip angular velocity that maps to a full power score (deg/s)
pub const POWER_REFERENCE_VELOCITY: f64 = 400.0;

/// Default peak spacing for offline candidate listing (frames)
pub const DEFAULT_PEAK_MIN_DISTANCE: usize = 10;

/// Default frame tolerance when matching detections to annotations
pub const DEFAULT_MATCH_TOLERANCE_FRAMES: u32 = 2;

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-6;
