//! Core types for the Handflux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw tracking frames from a provider, and the per-hand kinematic
//! state derived from them.

use chrono::{DateTime, Utc};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::geometry::DOWN;

/// Number of fingers on a hand
pub const FINGER_COUNT: usize = 5;

/// Body side of a hand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Both sides in storage order (left = 0, right = 1)
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Token used in transport parameter names
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "Left",
            Side::Right => "Right",
        }
    }

    /// -1 for the left hand, +1 for the right hand
    pub fn chirality(self) -> f32 {
        match self {
            Side::Left => -1.0,
            Side::Right => 1.0,
        }
    }
}

/// Finger identity, in fixed storage order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; FINGER_COUNT] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    pub fn index(self) -> usize {
        match self {
            Finger::Thumb => 0,
            Finger::Index => 1,
            Finger::Middle => 2,
            Finger::Ring => 3,
            Finger::Pinky => 4,
        }
    }

    /// Canonical finger name used in parameter names and titles
    pub fn name(self) -> &'static str {
        match self {
            Finger::Thumb => "Thumb",
            Finger::Index => "Index",
            Finger::Middle => "Middle",
            Finger::Ring => "Ring",
            Finger::Pinky => "Pinky",
        }
    }
}

/// Derived state of one finger
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FingerState {
    /// Curl mapped to [0, 1]; 1 at rest, falling as the finger curls
    pub flexion: f32,
    /// Side-to-side spread mapped to [-1, 1]
    pub spread: f32,
}

impl Default for FingerState {
    fn default() -> Self {
        Self {
            flexion: 1.0,
            spread: 0.0,
        }
    }
}

/// Derived kinematic state of one hand
///
/// Exactly two exist for the lifetime of a session (see [`HandStates`]). Hands
/// missing from a frame keep their last values with `tracked == false`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandState {
    pub side: Side,
    /// Whether the provider reported this hand this tick
    pub tracked: bool,
    /// Projected / full length of the shoulder → elbow vector, in [0, 1]
    pub upperarm_extension: f32,
    /// Upper arm rotation in degrees, unwrapped across ticks
    pub upperarm_rotation: f32,
    /// Projected / full length of the elbow → wrist vector, in [0, 1]
    pub forearm_extension: f32,
    /// Forearm rotation in the upper arm's frame, degrees, unwrapped across ticks
    pub forearm_rotation: f32,
    /// Wrist position relative to the neck base; lateral axis positive away from the centerline
    pub wrist_position: Vec3,
    /// Palm orientation as wrapped Euler angles in [-180, 180)
    pub wrist_rotation: Vec3,
    pub fingers: [FingerState; FINGER_COUNT],

    #[serde(skip)]
    pub(crate) prev_upperarm: Vec3,
    #[serde(skip)]
    pub(crate) prev_forearm: Vec3,
}

impl HandState {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            tracked: false,
            upperarm_extension: 0.0,
            upperarm_rotation: 0.0,
            forearm_extension: 0.0,
            forearm_rotation: 0.0,
            wrist_position: Vec3::ZERO,
            wrist_rotation: Vec3::ZERO,
            fingers: [FingerState::default(); FINGER_COUNT],
            prev_upperarm: DOWN,
            prev_forearm: DOWN,
        }
    }

    pub fn finger(&self, finger: Finger) -> &FingerState {
        &self.fingers[finger.index()]
    }

    /// Mean flexion over all five fingers
    pub fn openness(&self) -> f32 {
        self.fingers.iter().map(|f| f.flexion).sum::<f32>() / FINGER_COUNT as f32
    }

    /// Wrist position relative to the neck base with the lateral flip undone
    pub fn body_wrist_position(&self) -> Vec3 {
        match self.side {
            Side::Left => self.wrist_position * Vec3::new(-1.0, 1.0, 1.0),
            Side::Right => self.wrist_position,
        }
    }
}

/// The two hand states of a session, left at index 0 and right at index 1
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandStates {
    hands: [HandState; 2],
}

impl Default for HandStates {
    fn default() -> Self {
        Self::new()
    }
}

impl HandStates {
    pub fn new() -> Self {
        Self {
            hands: [HandState::new(Side::Left), HandState::new(Side::Right)],
        }
    }

    pub fn get(&self, side: Side) -> &HandState {
        &self.hands[side.index()]
    }

    pub fn get_mut(&mut self, side: Side) -> &mut HandState {
        &mut self.hands[side.index()]
    }

    pub fn tracked(&self) -> [bool; 2] {
        [self.hands[0].tracked, self.hands[1].tracked]
    }

    /// Distance between the two wrists
    pub fn wrist_distance(&self) -> f32 {
        self.get(Side::Left)
            .body_wrist_position()
            .distance(self.get(Side::Right).body_wrist_position())
    }

    pub fn iter(&self) -> impl Iterator<Item = &HandState> {
        self.hands.iter()
    }
}

/// Bone orientations of one finger, ordered from the palm outward
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FingerPose {
    pub bones: Vec<Quat>,
}

/// One hand as reported by a tracking provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandPose {
    pub side: Side,
    /// Elbow world position
    pub elbow: Vec3,
    /// Wrist world position
    pub wrist: Vec3,
    /// Palm orientation
    pub palm: Quat,
    /// Fingers in thumb → pinky order
    #[serde(default)]
    pub fingers: Vec<FingerPose>,
}

/// Everything a tracking provider reports for a single tick
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackingFrame {
    /// When the provider captured the frame, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    /// Zero, one or two hands
    #[serde(default)]
    pub hands: Vec<HandPose>,
}

impl TrackingFrame {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn hand(&self, side: Side) -> Option<&HandPose> {
        self.hands.iter().find(|h| h.side == side)
    }
}
