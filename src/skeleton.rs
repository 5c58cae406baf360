//! Per-frame skeleton snapshot and derived joint angles.
//!
//! Coordinates are in image pixels with y growing downward. Angle accessors
//! follow one reference side ("right"); callers holding left-handed or
//! mirrored footage pre-mirror with [`Skeleton::mirrored`].

use crate::constants::{BLAZEPOSE_KEYPOINT_COUNT, VISIBILITY_THRESHOLD};
use crate::utils::{angle_at, angle_between, angle_from_up, distance, midpoint, signed_angle_from_down};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Single body keypoint as produced by the pose model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    /// Confidence score (0.0-1.0)
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Keypoint {
    pub fn new(x: f64, y: f64, score: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            score,
            visibility: None,
            name: None,
        }
    }

    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// Whether the score clears a threshold
    pub fn is_valid(&self, threshold: f64) -> bool {
        self.score > threshold
    }
}

/// Keypoint layout of a model output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeypointFormat {
    #[serde(rename = "coco-17")]
    Coco17,
    #[serde(rename = "blazepose-33")]
    BlazePose33,
}

impl KeypointFormat {
    /// Infer the layout from the number of keypoints
    pub fn from_count(count: usize) -> Self {
        if count == BLAZEPOSE_KEYPOINT_COUNT {
            Self::BlazePose33
        } else {
            Self::Coco17
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Coco17 => "coco-17",
            Self::BlazePose33 => "blazepose-33",
        }
    }

    /// Number of keypoints in this layout
    pub fn keypoint_count(self) -> usize {
        self.names().len()
    }

    /// Keypoint names in index order
    pub fn names(self) -> &'static [&'static str] {
        match self {
            Self::Coco17 => &COCO_NAMES,
            Self::BlazePose33 => &BLAZEPOSE_NAMES,
        }
    }

    /// Index of a joint within this layout
    pub fn index_of(self, joint: Joint) -> usize {
        use Joint::*;
        match self {
            Self::Coco17 => match joint {
                Nose => 0,
                LeftShoulder => 5,
                RightShoulder => 6,
                LeftElbow => 7,
                RightElbow => 8,
                LeftWrist => 9,
                RightWrist => 10,
                LeftHip => 11,
                RightHip => 12,
                LeftKnee => 13,
                RightKnee => 14,
                LeftAnkle => 15,
                RightAnkle => 16,
            },
            Self::BlazePose33 => match joint {
                Nose => 0,
                LeftShoulder => 11,
                RightShoulder => 12,
                LeftElbow => 13,
                RightElbow => 14,
                LeftWrist => 15,
                RightWrist => 16,
                LeftHip => 23,
                RightHip => 24,
                LeftKnee => 25,
                RightKnee => 26,
                LeftAnkle => 27,
                RightAnkle => 28,
            },
        }
    }

    /// Left/right index pairs swapped when mirroring
    fn mirror_pairs(self) -> &'static [(usize, usize)] {
        match self {
            Self::Coco17 => &[(1, 2), (3, 4), (5, 6), (7, 8), (9, 10), (11, 12), (13, 14), (15, 16)],
            Self::BlazePose33 => &[
                (1, 4),
                (2, 5),
                (3, 6),
                (7, 8),
                (9, 10),
                (11, 12),
                (13, 14),
                (15, 16),
                (17, 18),
                (19, 20),
                (21, 22),
                (23, 24),
                (25, 26),
                (27, 28),
                (29, 30),
                (31, 32),
            ],
        }
    }
}

const COCO_NAMES: [&str; 17] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

const BLAZEPOSE_NAMES: [&str; 33] = [
    "nose",
    "left_eye_inner",
    "left_eye",
    "left_eye_outer",
    "right_eye_inner",
    "right_eye",
    "right_eye_outer",
    "left_ear",
    "right_ear",
    "mouth_left",
    "mouth_right",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_pinky",
    "right_pinky",
    "left_index",
    "right_index",
    "left_thumb",
    "right_thumb",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
    "left_heel",
    "right_heel",
    "left_foot_index",
    "right_foot_index",
];

/// Joints used by the angle accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Joint {
    Nose,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

/// Body side selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn wrist(self) -> Joint {
        match self {
            Self::Left => Joint::LeftWrist,
            Self::Right => Joint::RightWrist,
        }
    }

    fn shoulder(self) -> Joint {
        match self {
            Self::Left => Joint::LeftShoulder,
            Self::Right => Joint::RightShoulder,
        }
    }
}

/// Angles of one instant, all in degrees except `wrist_height` (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AngleSnapshot {
    pub spine: f64,
    pub hip: f64,
    pub knee: f64,
    pub arm_to_spine: f64,
    /// Signed: 0 hanging, +90 horizontal in front, negative behind the body
    pub arm_to_vertical: f64,
    pub wrist_height: f64,
}

impl AngleSnapshot {
    /// No angle went NaN or infinite from a bad joint coordinate
    pub fn is_finite(&self) -> bool {
        [self.spine, self.hip, self.knee, self.arm_to_spine, self.arm_to_vertical, self.wrist_height]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Immutable per-frame skeleton
#[derive(Debug, Clone)]
pub struct Skeleton {
    keypoints: Arc<[Keypoint]>,
    format: KeypointFormat,
    spine_angle: f64,
    visible: bool,
}

impl Skeleton {
    /// Wrap model keypoints; spine angle and visibility are computed once here
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        let format = KeypointFormat::from_count(keypoints.len());
        let keypoints: Arc<[Keypoint]> = keypoints.into();
        let mut skeleton = Self {
            keypoints,
            format,
            spine_angle: 0.0,
            visible: false,
        };
        skeleton.spine_angle = skeleton.compute_spine_angle().unwrap_or(0.0);
        skeleton.visible = [Joint::LeftShoulder, Joint::RightShoulder, Joint::LeftHip, Joint::RightHip]
            .iter()
            .all(|&joint| skeleton.joint(joint).is_some_and(|kp| kp.is_valid(VISIBILITY_THRESHOLD)));
        skeleton
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn format(&self) -> KeypointFormat {
        self.format
    }

    pub fn joint(&self, joint: Joint) -> Option<&Keypoint> {
        self.keypoints.get(self.format.index_of(joint))
    }

    fn point(&self, joint: Joint) -> Option<(f64, f64)> {
        self.joint(joint).map(Keypoint::position)
    }

    /// All four torso joints are above the visibility threshold
    pub fn has_visible_pose(&self) -> bool {
        self.visible
    }

    /// Mean keypoint score
    pub fn average_score(&self) -> f64 {
        if self.keypoints.is_empty() {
            return 0.0;
        }
        self.keypoints.iter().map(|kp| kp.score).sum::<f64>() / self.keypoints.len() as f64
    }

    fn shoulder_mid(&self) -> Option<(f64, f64)> {
        Some(midpoint(self.point(Joint::LeftShoulder)?, self.point(Joint::RightShoulder)?))
    }

    fn hip_mid(&self) -> Option<(f64, f64)> {
        Some(midpoint(self.point(Joint::LeftHip)?, self.point(Joint::RightHip)?))
    }

    fn spine_vector(&self) -> Option<(f64, f64)> {
        let shoulder = self.shoulder_mid()?;
        let hip = self.hip_mid()?;
        Some((shoulder.0 - hip.0, shoulder.1 - hip.1))
    }

    fn compute_spine_angle(&self) -> Option<f64> {
        self.spine_vector().map(angle_from_up)
    }

    /// Spine angle from vertical: 0 upright, 90 horizontal
    pub fn spine_angle(&self) -> f64 {
        self.spine_angle
    }

    /// Knee-hip-shoulder angle on the reference side (180 fully extended)
    pub fn hip_angle(&self) -> Option<f64> {
        Some(angle_at(
            self.point(Joint::RightKnee)?,
            self.point(Joint::RightHip)?,
            self.point(Joint::RightShoulder)?,
        ))
    }

    /// Hip-knee-ankle angle on the reference side (180 straight leg)
    pub fn knee_angle(&self) -> Option<f64> {
        Some(angle_at(
            self.point(Joint::RightHip)?,
            self.point(Joint::RightKnee)?,
            self.point(Joint::RightAnkle)?,
        ))
    }

    fn arm_vector(&self, side: Side) -> Option<(f64, f64)> {
        let shoulder = self.shoulder_mid()?;
        let wrist = self.point(side.wrist())?;
        Some((wrist.0 - shoulder.0, wrist.1 - shoulder.1))
    }

    /// Angle between the reference arm and the spine
    pub fn arm_to_spine_angle(&self) -> Option<f64> {
        Some(angle_between(self.arm_vector(Side::Right)?, self.spine_vector()?))
    }

    /// Signed arm angle from hanging straight down, positive in front of the body
    pub fn arm_to_vertical_angle(&self, side: Side) -> Option<f64> {
        self.arm_vector(side).map(signed_angle_from_down)
    }

    /// Wrist height above the shoulder line, positive when the wrist is higher
    pub fn wrist_height(&self, side: Side) -> Option<f64> {
        let shoulder = self.shoulder_mid()?;
        Some(shoulder.1 - self.point(side.wrist())?.1)
    }

    /// Shoulder-mid to hip-mid distance
    pub fn torso_length(&self) -> Option<f64> {
        Some(distance(self.shoulder_mid()?, self.hip_mid()?))
    }

    /// Length of the reference arm, shoulder to wrist
    pub fn arm_length(&self, side: Side) -> Option<f64> {
        Some(distance(self.point(side.shoulder())?, self.point(side.wrist())?))
    }

    /// Continuous movement pattern score: -1 squat .. +1 hinge
    ///
    /// Compares hip flexion against knee flexion; near-standing postures score 0.
    pub fn hinge_score(&self) -> Option<f64> {
        Some(hinge_score_from(180.0 - self.hip_angle()?, 180.0 - self.knee_angle()?))
    }

    /// Derived angles of this frame, `None` when a required joint is missing
    pub fn angles(&self) -> Option<AngleSnapshot> {
        Some(AngleSnapshot {
            spine: self.spine_angle,
            hip: self.hip_angle()?,
            knee: self.knee_angle()?,
            arm_to_spine: self.arm_to_spine_angle()?,
            arm_to_vertical: self.arm_to_vertical_angle(Side::Right)?,
            wrist_height: self.wrist_height(Side::Right)?,
        })
    }

    /// Horizontally flipped copy with left/right joints swapped
    #[must_use]
    pub fn mirrored(&self, frame_width: f64) -> Self {
        let mut keypoints: Vec<Keypoint> = self
            .keypoints
            .iter()
            .map(|kp| Keypoint {
                x: frame_width - kp.x,
                ..kp.clone()
            })
            .collect();
        for &(left, right) in self.format.mirror_pairs() {
            if left < keypoints.len() && right < keypoints.len() {
                keypoints.swap(left, right);
                // Names describe the slot, not the point
                let left_name = keypoints[left].name.take();
                keypoints[left].name = keypoints[right].name.take();
                keypoints[right].name = left_name;
            }
        }
        Self::new(keypoints)
    }
}

/// Hinge score from hip and knee flexion in degrees
pub fn hinge_score_from(hip_flexion: f64, knee_flexion: f64) -> f64 {
    let hip = hip_flexion.max(0.0);
    let knee = knee_flexion.max(0.0);
    let total = hip + knee;
    if total < 10.0 {
        return 0.0;
    }
    ((hip - knee) / total).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn coco(points: &[(usize, f64, f64)]) -> Vec<Keypoint> {
        let mut keypoints = vec![Keypoint::new(0.0, 0.0, 0.0); 17];
        for &(i, x, y) in points {
            keypoints[i] = Keypoint::new(x, y, 0.9);
        }
        keypoints
    }

    fn standing() -> Skeleton {
        Skeleton::new(coco(&[
            (5, 100.0, 100.0),
            (6, 100.0, 100.0),
            (9, 100.0, 230.0),
            (10, 100.0, 230.0),
            (11, 100.0, 250.0),
            (12, 100.0, 250.0),
            (13, 100.0, 350.0),
            (14, 100.0, 350.0),
            (15, 100.0, 450.0),
            (16, 100.0, 450.0),
        ]))
    }

    #[test]
    fn test_standing_angles() {
        let skeleton = standing();
        assert!(skeleton.has_visible_pose());
        assert_relative_eq!(skeleton.spine_angle(), 0.0, epsilon = 1e-3);
        assert_relative_eq!(skeleton.hip_angle().unwrap(), 180.0, epsilon = 1e-3);
        assert_relative_eq!(skeleton.knee_angle().unwrap(), 180.0, epsilon = 1e-3);
        assert_relative_eq!(skeleton.arm_to_vertical_angle(Side::Right).unwrap(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(skeleton.wrist_height(Side::Right).unwrap(), -130.0);
        assert_eq!(skeleton.hinge_score(), Some(0.0));
    }

    #[test]
    fn test_low_confidence_torso_is_not_visible() {
        let mut keypoints = standing().keypoints().to_vec();
        keypoints[11].score = 0.2;
        assert!(!Skeleton::new(keypoints).has_visible_pose());
    }

    #[test]
    fn test_arm_in_front_is_positive() {
        let mut keypoints = standing().keypoints().to_vec();
        keypoints[10] = Keypoint::new(230.0, 100.0, 0.9);
        let skeleton = Skeleton::new(keypoints);
        assert_relative_eq!(skeleton.arm_to_vertical_angle(Side::Right).unwrap(), 90.0, epsilon = 1e-6);
        assert_relative_eq!(skeleton.wrist_height(Side::Right).unwrap(), 0.0);
    }

    #[test]
    fn test_mirrored_flips_arm_sign() {
        let mut keypoints = standing().keypoints().to_vec();
        keypoints[10] = Keypoint::new(200.0, 150.0, 0.9);
        keypoints[9] = Keypoint::new(0.0, 150.0, 0.9);
        let skeleton = Skeleton::new(keypoints);
        let right = skeleton.arm_to_vertical_angle(Side::Right).unwrap();
        assert!(right > 0.0);

        let mirrored = skeleton.mirrored(200.0);
        // Former left wrist (x=0) becomes the right wrist at x=200, still in front
        assert_relative_eq!(mirrored.arm_to_vertical_angle(Side::Right).unwrap(), right, epsilon = 1e-9);
        assert_relative_eq!(
            mirrored.arm_to_vertical_angle(Side::Left).unwrap(),
            -right,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_blazepose_layout_detected() {
        let keypoints = vec![Keypoint::new(0.0, 0.0, 0.9); 33];
        assert_eq!(Skeleton::new(keypoints).format(), KeypointFormat::BlazePose33);
    }

    #[test]
    fn test_short_keypoint_list_has_no_angles() {
        let skeleton = Skeleton::new(vec![Keypoint::new(1.0, 1.0, 0.9); 4]);
        assert!(!skeleton.has_visible_pose());
        assert!(skeleton.angles().is_none());
        assert_eq!(skeleton.spine_angle(), 0.0);
    }

    #[test]
    fn test_hinge_score_bounds() {
        assert_relative_eq!(hinge_score_from(80.0, 10.0), 70.0 / 90.0);
        assert!(hinge_score_from(10.0, 90.0) < -0.5);
        assert_eq!(hinge_score_from(2.0, 3.0), 0.0);
    }
}
