use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Number of features in a size-classifier input vector.
pub const NUM_FEATURES: usize = 6;

/// Number of size classes (XS through XXL).
pub const NUM_SIZES: usize = 6;

pub const SHOULDER_WIDTH: &str = "shoulder_width";
pub const CHEST_WIDTH: &str = "chest_width";
pub const WAIST_WIDTH: &str = "waist_width";
pub const HIP_WIDTH: &str = "hip_width";
pub const TORSO_LENGTH: &str = "torso_length";
pub const ARM_LENGTH: &str = "arm_length";

/// Canonical feature order. Every feature vector follows this layout.
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    SHOULDER_WIDTH,
    CHEST_WIDTH,
    WAIST_WIDTH,
    HIP_WIDTH,
    TORSO_LENGTH,
    ARM_LENGTH,
];

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Convert a point in normalized [0,1] image coordinates to pixels.
    pub fn to_pixels(&self, width: u32, height: u32) -> Point {
        Point::new(self.x * width as f32, self.y * height as f32)
    }
}

/// Clothing size, ordered from smallest to largest.
///
/// The discriminant doubles as the classifier's class index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SizeLabel {
    XS = 0,
    S = 1,
    M = 2,
    L = 3,
    XL = 4,
    XXL = 5,
}

impl SizeLabel {
    pub const ALL: [SizeLabel; NUM_SIZES] = [
        SizeLabel::XS,
        SizeLabel::S,
        SizeLabel::M,
        SizeLabel::L,
        SizeLabel::XL,
        SizeLabel::XXL,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SizeLabel::XS => "XS",
            SizeLabel::S => "S",
            SizeLabel::M => "M",
            SizeLabel::L => "L",
            SizeLabel::XL => "XL",
            SizeLabel::XXL => "XXL",
        }
    }
}

impl fmt::Display for SizeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnknownSize(s.to_string()))
    }
}

/// A set of named body measurements.
///
/// Values are kept as JSON values so that whatever the caller sent is echoed
/// back untouched. Only finite numbers count as measurements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Measurements(BTreeMap<String, Value>);

impl Measurements {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, name: K, value: V) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Numeric value of a measurement. Non-numeric and non-finite values
    /// read as absent.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.0
            .get(name)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Measurements {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), Value::from(v)))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for Measurements {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
