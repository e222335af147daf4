//! Kinematic extraction
//!
//! Turns one tracking frame into updated [`HandState`]s:
//! - arm extension/rotation from elbow and wrist positions projected onto the coronal plane
//! - wrist position relative to the body anchor and wrist rotation from the palm orientation
//! - finger flexion and spread from relative bone rotations
//!
//! Rotations accumulate deltas between the previous and current projected vectors,
//! so they stay continuous past ±180°.

use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{
    extension_ratio, project_on_plane, remap, rotate_about, signed_angle, wrap_degrees,
    wrap_signed, EPSILON, FORWARD, RIGHT,
};
use crate::types::{Finger, FingerPose, HandPose, HandState, HandStates, Side, TrackingFrame};

/// Average curl above this is treated as a tracking glitch
pub const FLEXION_GLITCH_DEGREES: f32 = 50.0;

/// Thumb curl input range (degrees)
pub const THUMB_FLEXION_RANGE: (f32, f32) = (0.0, 20.0);
/// Curl input range for the other fingers (degrees)
pub const FINGER_FLEXION_RANGE: (f32, f32) = (0.0, 30.0);
/// Thumb spread input range (degrees); raw angles are clamped to it first
pub const THUMB_SPREAD_RANGE: (f32, f32) = (0.0, 40.0);
/// Spread input range for the other fingers (degrees)
pub const FINGER_SPREAD_RANGE: (f32, f32) = (-15.0, 15.0);

/// Body reference points the arm vectors are measured from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyAnchor {
    /// Base of the neck, in tracking space
    pub neck_base: Vec3,
    /// Distance between the two shoulders
    pub shoulder_width: f32,
}

impl Default for BodyAnchor {
    fn default() -> Self {
        Self {
            neck_base: Vec3::ZERO,
            shoulder_width: 0.4,
        }
    }
}

impl BodyAnchor {
    /// Shoulder position for a side
    pub fn shoulder(&self, side: Side) -> Vec3 {
        self.neck_base + RIGHT * (side.chirality() * self.shoulder_width / 2.0)
    }
}

/// Derives hand states from tracking frames
#[derive(Debug, Clone, Default)]
pub struct KinematicExtractor {
    anchor: BodyAnchor,
}

impl KinematicExtractor {
    pub fn new(anchor: BodyAnchor) -> Self {
        Self { anchor }
    }

    pub fn anchor(&self) -> &BodyAnchor {
        &self.anchor
    }

    pub fn set_anchor(&mut self, anchor: BodyAnchor) {
        self.anchor = anchor;
    }

    /// Update both hand states from one frame.
    ///
    /// Hands absent from the frame keep their values and are marked untracked.
    pub fn extract(&self, frame: &TrackingFrame, hands: &mut HandStates) {
        for side in Side::ALL {
            let state = hands.get_mut(side);
            match frame.hand(side) {
                Some(pose) => {
                    if !state.tracked {
                        debug!(hand = side.as_str(), "hand tracked");
                    }
                    self.update_hand(pose, state);
                    state.tracked = true;
                }
                None => {
                    if state.tracked {
                        debug!(hand = side.as_str(), "hand lost");
                    }
                    state.tracked = false;
                }
            }
        }
    }

    fn update_hand(&self, pose: &HandPose, state: &mut HandState) {
        let side = pose.side;
        let shoulder = self.anchor.shoulder(side);

        update_arm(state, pose.elbow - shoulder, pose.wrist - pose.elbow);

        state.wrist_position = pose.wrist - self.anchor.neck_base;
        if side == Side::Left {
            state.wrist_position.x = -state.wrist_position.x;
        }
        state.wrist_rotation = wrist_rotation(pose.palm, side);

        for (finger, finger_pose) in Finger::ALL.iter().zip(pose.fingers.iter()) {
            let finger_state = &mut state.fingers[finger.index()];
            if let Some(spread) = finger_spread(finger_pose, *finger, side) {
                finger_state.spread = spread;
            }
            if let Some(flexion) = finger_flexion(finger_pose, *finger) {
                finger_state.flexion = flexion;
            }
        }
    }
}

/// Update extension and rotation of both arm segments.
///
/// `upperarm` is shoulder → elbow, `forearm` is elbow → wrist.
fn update_arm(state: &mut HandState, upperarm: Vec3, forearm: Vec3) {
    let chirality = state.side.chirality();

    let upper_proj = project_on_plane(upperarm, FORWARD);
    state.upperarm_extension = extension_ratio(upper_proj, upperarm);
    if upper_proj.length() > EPSILON {
        let delta = signed_angle(state.prev_upperarm, upper_proj, FORWARD);
        state.prev_upperarm = upper_proj;
        state.upperarm_rotation += delta * chirality;
    }

    let fore_proj = project_on_plane(forearm, FORWARD);
    state.forearm_extension = extension_ratio(fore_proj, forearm);
    if fore_proj.length() > EPSILON {
        // Express the forearm in the upper arm's frame. The reported sign is
        // flipped on the right hand, opposite to the upper arm's flip.
        let upper_world = state.upperarm_rotation * chirality;
        let local = rotate_about(fore_proj, FORWARD, -upper_world);
        let delta = signed_angle(state.prev_forearm, local, FORWARD);
        state.prev_forearm = local;
        state.forearm_rotation -= delta * chirality;
    }
}

/// Palm orientation as wrapped Euler angles (x, y, z).
///
/// The right hand flips the y and z axes so both hands read abduction and
/// pronation the same way.
pub fn wrist_rotation(palm: Quat, side: Side) -> Vec3 {
    let (y, x, z) = palm.to_euler(EulerRot::YXZ);
    let euler = Vec3::new(
        wrap_degrees(x.to_degrees()),
        wrap_degrees(y.to_degrees()),
        wrap_degrees(z.to_degrees()),
    );
    match side {
        Side::Left => euler,
        Side::Right => Vec3::new(euler.x, wrap_degrees(-euler.y), wrap_degrees(-euler.z)),
    }
}

/// Relative rotation between two consecutive bones as (x, y, z) degrees in (-180, 180]
fn joint_angles(parent: Quat, child: Quat) -> Vec3 {
    let (y, x, z) = (parent.inverse() * child).to_euler(EulerRot::YXZ);
    Vec3::new(
        wrap_signed(x.to_degrees()),
        wrap_signed(y.to_degrees()),
        wrap_signed(z.to_degrees()),
    )
}

/// Raw spread angle: rotation around the wagging axis between the first two bones.
///
/// `None` when the finger has fewer than two bones.
pub fn spread_angle(pose: &FingerPose) -> Option<f32> {
    match pose.bones.as_slice() {
        [first, second, ..] => Some(joint_angles(*first, *second).y),
        _ => None,
    }
}

/// Map a raw spread angle to [-1, 1].
pub fn map_spread(angle: f32, finger: Finger, side: Side) -> f32 {
    let mapped = match finger {
        Finger::Thumb => {
            let (lo, hi) = THUMB_SPREAD_RANGE;
            remap(angle.clamp(lo, hi), lo, hi, -1.0, 1.0)
        }
        _ => {
            let (lo, hi) = FINGER_SPREAD_RANGE;
            remap(angle, lo, hi, -1.0, 1.0)
        }
    };
    match side {
        Side::Left => -mapped,
        Side::Right => mapped,
    }
}

pub fn finger_spread(pose: &FingerPose, finger: Finger, side: Side) -> Option<f32> {
    spread_angle(pose).map(|angle| map_spread(angle, finger, side))
}

/// Curl of the finger's interior joints, summed and divided by the bone count.
///
/// Each joint's curl is read in [0, 360), so a hyperextended joint lands near 360
/// and pushes the average past [`FLEXION_GLITCH_DEGREES`], which resets it to 0.
/// `None` when the finger has fewer than three bones.
pub fn curl_average(pose: &FingerPose) -> Option<f32> {
    if pose.bones.len() < 3 {
        return None;
    }
    let total: f32 = pose.bones[1..]
        .windows(2)
        .map(|pair| joint_angles(pair[0], pair[1]).x.rem_euclid(360.0))
        .sum();
    let average = total / pose.bones.len() as f32;
    if average > FLEXION_GLITCH_DEGREES {
        Some(0.0)
    } else {
        Some(average)
    }
}

/// Map an average curl angle to flexion: 1 at rest, 0 at the end of the input range.
pub fn map_flexion(curl: f32, finger: Finger) -> f32 {
    let (lo, hi) = match finger {
        Finger::Thumb => THUMB_FLEXION_RANGE,
        _ => FINGER_FLEXION_RANGE,
    };
    remap(curl, lo, hi, 1.0, 0.0)
}

pub fn finger_flexion(pose: &FingerPose, finger: Finger) -> Option<f32> {
    curl_average(pose).map(|curl| map_flexion(curl, finger))
}
