//! Geometry helpers
//!
//! Pure functions shared by the kinematic extractor and the parameter registry:
//! plane projection, signed angles, range remapping and degree wrapping.
//! All angles are in degrees.

use glam::{Quat, Vec3};

/// Lengths below this are treated as degenerate
pub const EPSILON: f32 = 1e-6;

/// Lateral axis (left → right)
pub const RIGHT: Vec3 = Vec3::X;
/// Vertical axis
pub const UP: Vec3 = Vec3::Y;
/// Reference direction for arm rotation (an arm hanging straight down)
pub const DOWN: Vec3 = Vec3::NEG_Y;
/// Normal of the coronal plane (depth, pointing away from the body)
pub const FORWARD: Vec3 = Vec3::Z;

/// Project `v` onto the plane with the given normal.
///
/// A zero normal leaves the vector untouched.
pub fn project_on_plane(v: Vec3, normal: Vec3) -> Vec3 {
    let len_sq = normal.length_squared();
    if len_sq < EPSILON * EPSILON {
        return v;
    }
    v - normal * (v.dot(normal) / len_sq)
}

/// Ratio of a projected length to the full length, 0 when the full vector is degenerate.
pub fn extension_ratio(projected: Vec3, full: Vec3) -> f32 {
    let full_len = full.length();
    if full_len < EPSILON {
        return 0.0;
    }
    (projected.length() / full_len).clamp(0.0, 1.0)
}

/// Signed angle from `from` to `to`, measured around `axis`, in (-180, 180].
///
/// Returns 0 when either vector is degenerate.
pub fn signed_angle(from: Vec3, to: Vec3, axis: Vec3) -> f32 {
    if from.length_squared() < EPSILON * EPSILON || to.length_squared() < EPSILON * EPSILON {
        return 0.0;
    }
    let sin = axis.normalize_or_zero().dot(from.cross(to));
    let cos = from.dot(to);
    wrap_signed(sin.atan2(cos).to_degrees())
}

/// Rotate `v` around `axis` by `degrees`.
pub fn rotate_about(v: Vec3, axis: Vec3, degrees: f32) -> Vec3 {
    Quat::from_axis_angle(axis.normalize_or_zero(), degrees.to_radians()) * v
}

/// Linearly remap `value` from `[in_min, in_max]` to `[out_min, out_max]`.
///
/// The result is clamped to the output range. Either range may be inverted.
pub fn remap(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let span = in_max - in_min;
    if span.abs() < EPSILON {
        return out_min;
    }
    let t = (value - in_min) / span;
    let mapped = out_min + t * (out_max - out_min);
    let (lo, hi) = if out_min <= out_max {
        (out_min, out_max)
    } else {
        (out_max, out_min)
    };
    mapped.clamp(lo, hi)
}

/// Wrap an angle into [-180, 180) using `((angle + 180) mod 360) - 180`.
pub fn wrap_degrees(angle: f32) -> f32 {
    (angle + 180.0).rem_euclid(360.0) - 180.0
}

/// Wrap an angle into (-180, 180].
pub fn wrap_signed(angle: f32) -> f32 {
    let wrapped = wrap_degrees(angle);
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

/// Truncate toward zero at 1e-3 resolution.
pub fn truncate_milli(value: f32) -> f32 {
    (value * 1000.0).trunc() / 1000.0
}
