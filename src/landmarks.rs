//! Body measurements from pose landmarks.
//!
//! Landmarks follow the 33-point BlazePose topology with coordinates
//! normalized to [0, 1] over the image. Measurements come out in pixels;
//! [`crate::normalize`] takes them the rest of the way.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Measurements, Point, ARM_LENGTH, HIP_WIDTH, SHOULDER_WIDTH, TORSO_LENGTH, WAIST_WIDTH};

/// Landmarks in a complete pose detection.
pub const NUM_POSE_LANDMARKS: usize = 33;

/// A landmark counts as visible above this score.
pub const VISIBILITY_THRESHOLD: f32 = 0.5;

/// Mean landmark displacement (normalized units) below which a pose is stable.
pub const DEFAULT_STABILITY_THRESHOLD: f32 = 0.05;

/// Waist width estimated from shoulder width.
const WAIST_TO_SHOULDER: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseLandmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    pub visibility: f32,
}

impl PoseLandmark {
    pub const fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn is_visible(&self) -> bool {
        self.visibility > VISIBILITY_THRESHOLD
    }
}

/// Landmarks used for body measurement, with their BlazePose indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyLandmark {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
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

impl KeyLandmark {
    pub const ALL: [KeyLandmark; 17] = [
        KeyLandmark::Nose,
        KeyLandmark::LeftEye,
        KeyLandmark::RightEye,
        KeyLandmark::LeftEar,
        KeyLandmark::RightEar,
        KeyLandmark::LeftShoulder,
        KeyLandmark::RightShoulder,
        KeyLandmark::LeftElbow,
        KeyLandmark::RightElbow,
        KeyLandmark::LeftWrist,
        KeyLandmark::RightWrist,
        KeyLandmark::LeftHip,
        KeyLandmark::RightHip,
        KeyLandmark::LeftKnee,
        KeyLandmark::RightKnee,
        KeyLandmark::LeftAnkle,
        KeyLandmark::RightAnkle,
    ];

    /// Position in the 33-point landmark list.
    pub const fn index(self) -> usize {
        match self {
            KeyLandmark::Nose => 0,
            KeyLandmark::LeftEye => 1,
            KeyLandmark::RightEye => 2,
            KeyLandmark::LeftEar => 7,
            KeyLandmark::RightEar => 8,
            KeyLandmark::LeftShoulder => 11,
            KeyLandmark::RightShoulder => 12,
            KeyLandmark::LeftElbow => 13,
            KeyLandmark::RightElbow => 14,
            KeyLandmark::LeftWrist => 15,
            KeyLandmark::RightWrist => 16,
            KeyLandmark::LeftHip => 23,
            KeyLandmark::RightHip => 24,
            KeyLandmark::LeftKnee => 25,
            KeyLandmark::RightKnee => 26,
            KeyLandmark::LeftAnkle => 27,
            KeyLandmark::RightAnkle => 28,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            KeyLandmark::Nose => "nose",
            KeyLandmark::LeftEye => "left_eye",
            KeyLandmark::RightEye => "right_eye",
            KeyLandmark::LeftEar => "left_ear",
            KeyLandmark::RightEar => "right_ear",
            KeyLandmark::LeftShoulder => "left_shoulder",
            KeyLandmark::RightShoulder => "right_shoulder",
            KeyLandmark::LeftElbow => "left_elbow",
            KeyLandmark::RightElbow => "right_elbow",
            KeyLandmark::LeftWrist => "left_wrist",
            KeyLandmark::RightWrist => "right_wrist",
            KeyLandmark::LeftHip => "left_hip",
            KeyLandmark::RightHip => "right_hip",
            KeyLandmark::LeftKnee => "left_knee",
            KeyLandmark::RightKnee => "right_knee",
            KeyLandmark::LeftAnkle => "left_ankle",
            KeyLandmark::RightAnkle => "right_ankle",
        }
    }
}

impl fmt::Display for KeyLandmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Visible key landmarks of one detection.
pub type KeyPoints = BTreeMap<KeyLandmark, PoseLandmark>;

/// Pick the visible key landmarks out of a full detection.
///
/// An incomplete detection yields no key points.
pub fn extract_key_points(landmarks: &[PoseLandmark]) -> KeyPoints {
    if landmarks.len() < NUM_POSE_LANDMARKS {
        return KeyPoints::new();
    }

    KeyLandmark::ALL
        .iter()
        .filter_map(|&key| {
            let lm = landmarks[key.index()];
            lm.is_visible().then_some((key, lm))
        })
        .collect()
}

/// Pixel measurements derivable from the visible key points.
///
/// Only measurements whose landmarks are all visible are reported.
pub fn calculate_body_measurements(key_points: &KeyPoints, image_width: u32, image_height: u32) -> Measurements {
    let width = f64::from(image_width);
    let height = f64::from(image_height);
    let get = |key: KeyLandmark| key_points.get(&key);
    let mut measurements = Measurements::new();

    let shoulders = get(KeyLandmark::LeftShoulder).zip(get(KeyLandmark::RightShoulder));
    let hips = get(KeyLandmark::LeftHip).zip(get(KeyLandmark::RightHip));

    if let Some((ls, rs)) = shoulders {
        measurements.insert(SHOULDER_WIDTH, f64::from((ls.x - rs.x).abs()) * width);
    }

    if let Some((lh, rh)) = hips {
        measurements.insert(HIP_WIDTH, f64::from((lh.x - rh.x).abs()) * width);
    }

    if let Some((ls, lh)) = get(KeyLandmark::LeftShoulder).zip(get(KeyLandmark::LeftHip)) {
        measurements.insert(TORSO_LENGTH, f64::from((ls.y - lh.y).abs()) * height);
    }

    if let Some((ls, lw)) = get(KeyLandmark::LeftShoulder).zip(get(KeyLandmark::LeftWrist)) {
        let shoulder = ls.point().to_pixels(image_width, image_height);
        let wrist = lw.point().to_pixels(image_width, image_height);
        measurements.insert(ARM_LENGTH, f64::from(shoulder.distance(&wrist)));
    }

    if hips.is_some() {
        if let Some(shoulder_width) = measurements.get_f64(SHOULDER_WIDTH) {
            measurements.insert(WAIST_WIDTH, shoulder_width * WAIST_TO_SHOULDER);
        }
    }

    measurements
}

/// Mean visibility of the key landmarks present in `landmarks`, hidden or not.
///
/// 0 when no landmark at all is visible. A short list is scored on the key
/// landmarks it contains.
pub fn pose_confidence(landmarks: &[PoseLandmark]) -> f32 {
    if !landmarks.iter().any(PoseLandmark::is_visible) {
        return 0.0;
    }

    let scores: Vec<f32> = KeyLandmark::ALL
        .iter()
        .filter_map(|key| landmarks.get(key.index()))
        .map(|lm| lm.visibility)
        .collect();

    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f32>() / scores.len() as f32
}

/// Whether the pose moved less than `threshold` between two frames.
///
/// Displacement is averaged over landmarks visible in both frames.
pub fn is_pose_stable(current: &[PoseLandmark], previous: &[PoseLandmark], threshold: f32) -> bool {
    if current.is_empty() || previous.is_empty() || current.len() != previous.len() {
        return false;
    }

    let displacements: Vec<f32> = current
        .iter()
        .zip(previous)
        .filter(|(c, p)| c.is_visible() && p.is_visible())
        .map(|(c, p)| c.point().distance(&p.point()))
        .collect();

    if displacements.is_empty() {
        return false;
    }

    let mean = displacements.iter().sum::<f32>() / displacements.len() as f32;
    mean < threshold
}
