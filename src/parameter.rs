//! Parameter model
//!
//! A [`Parameter`] binds one derived kinematic value to a named VTube Studio input
//! parameter, together with the user-facing policy applied to it: enable flag,
//! mirroring, offset, smoothing window and output bounds.

use serde::{Deserialize, Serialize};

use crate::geometry::truncate_milli;
use crate::types::{Finger, HandStates, Side};

/// Prefix of parameters that already exist in VTube Studio
pub const DEFAULT_PREFIX: &str = "Hand";
/// Prefix of custom parameters declared by this plugin
pub const CUSTOM_PREFIX: &str = "LeapHand";

/// Which derived value a parameter reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    TotalFlexion,
    Spread,
    AngleX,
    AngleY,
    AngleZ,
    PositionX,
    PositionY,
    PositionZ,
    ForearmExtension,
    ForearmRotation,
    UpperarmExtension,
    UpperarmRotation,
    Found,
    HandOpen,
    HandDistance,
}

impl ParameterKind {
    /// Fixed name token for kinds that don't depend on a finger
    fn token(self) -> &'static str {
        match self {
            ParameterKind::TotalFlexion => "Finger",
            ParameterKind::Spread => "FingerSpread",
            ParameterKind::AngleX => "AngleX",
            ParameterKind::AngleY => "AngleY",
            ParameterKind::AngleZ => "AngleZ",
            ParameterKind::PositionX => "PositionX",
            ParameterKind::PositionY => "PositionY",
            ParameterKind::PositionZ => "PositionZ",
            ParameterKind::ForearmExtension => "ForearmExtension",
            ParameterKind::ForearmRotation => "ForearmRotation",
            ParameterKind::UpperarmExtension => "UpperarmExtension",
            ParameterKind::UpperarmRotation => "UpperarmRotation",
            ParameterKind::Found => "Found",
            ParameterKind::HandOpen => "Open",
            ParameterKind::HandDistance => "Distance",
        }
    }

    /// Whether mirroring reflects this kind's value around its default
    pub fn flips_when_mirrored(self) -> bool {
        matches!(
            self,
            ParameterKind::AngleX
                | ParameterKind::AngleZ
                | ParameterKind::PositionX
                | ParameterKind::ForearmRotation
                | ParameterKind::UpperarmRotation
        )
    }
}

/// Hand a parameter reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandScope {
    One(Side),
    Both,
}

/// Integer output bounds, used for display scaling and for declaring the parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: i32,
    pub max: i32,
    pub default: i32,
}

impl Bounds {
    pub const fn new(default: i32, min: i32, max: i32) -> Self {
        Self { min, max, default }
    }

    /// Whether the range is narrow enough that fractional display matters
    pub fn is_fractional(&self) -> bool {
        self.min.abs() + self.max.abs() < 10
    }
}

/// A named output parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub kind: ParameterKind,
    pub hand: HandScope,
    /// Meaningful only for flexion and spread kinds
    pub finger: Option<Finger>,
    /// Human-readable title, sent as the declaration's explanation
    pub title: String,
    /// Parameters VTube Studio already knows (not declared, visible by default)
    pub is_default: bool,
    pub enabled: bool,
    pub bounds: Bounds,
    pub offset: f32,
    /// Number of samples to smooth over.
    ///
    /// Stored and persisted with the settings so configurations round-trip, but
    /// never applied: transmitted values are always the unsmoothed reading.
    pub smoothing: u32,
    pub mirrored: bool,
    pub current_value: f32,
}

impl Parameter {
    pub fn new(
        kind: ParameterKind,
        hand: HandScope,
        finger: Option<Finger>,
        title: impl Into<String>,
        is_default: bool,
        bounds: Bounds,
    ) -> Self {
        Self {
            kind,
            hand,
            finger,
            title: title.into(),
            is_default,
            enabled: true,
            bounds,
            offset: 0.0,
            smoothing: 0,
            mirrored: false,
            current_value: bounds.default as f32,
        }
    }

    /// Base name derived from the kind and finger
    pub fn base_name(&self) -> String {
        match (self.kind, self.finger) {
            (ParameterKind::TotalFlexion, Some(f)) => {
                format!("Finger_{}_{}", f.index() + 1, f.name())
            }
            (ParameterKind::Spread, Some(f)) => {
                format!("FingerSpread{}{}", f.index() + 1, f.name())
            }
            (kind, _) => kind.token().to_string(),
        }
    }

    /// Side the output is attributed to after mirroring
    pub fn effective_hand(&self) -> HandScope {
        match self.hand {
            HandScope::One(side) if self.mirrored => HandScope::One(side.opposite()),
            scope => scope,
        }
    }

    fn name_for(&self, scope: HandScope) -> String {
        let prefix = if self.is_default {
            DEFAULT_PREFIX
        } else {
            CUSTOM_PREFIX
        };
        let side = match scope {
            HandScope::One(side) => side.as_str(),
            HandScope::Both => "",
        };
        format!("{prefix}{side}{}", self.base_name())
    }

    /// Transport name, using the effective (mirrored) side
    pub fn name(&self) -> String {
        self.name_for(self.effective_hand())
    }

    /// Stable key for persisted overrides; ignores mirroring
    pub fn settings_key(&self) -> String {
        self.name_for(self.hand)
    }

    pub fn toggle_mirror(&mut self) {
        self.mirrored = !self.mirrored;
    }

    /// Read the raw value this parameter is bound to, before offset and mirroring
    pub fn raw_value(&self, hands: &HandStates) -> f32 {
        let side = match self.hand {
            HandScope::One(side) => side,
            HandScope::Both => return hands.wrist_distance(),
        };
        let hand = hands.get(side);
        let finger = self.finger.map(|f| hand.finger(f));
        match self.kind {
            ParameterKind::TotalFlexion => finger.map_or(0.0, |f| f.flexion),
            ParameterKind::Spread => finger.map_or(0.0, |f| f.spread),
            ParameterKind::AngleX => hand.wrist_rotation.x,
            ParameterKind::AngleY => hand.wrist_rotation.y,
            ParameterKind::AngleZ => hand.wrist_rotation.z,
            ParameterKind::PositionX => hand.wrist_position.x,
            ParameterKind::PositionY => hand.wrist_position.y,
            ParameterKind::PositionZ => hand.wrist_position.z,
            ParameterKind::ForearmExtension => hand.forearm_extension,
            ParameterKind::ForearmRotation => hand.forearm_rotation,
            ParameterKind::UpperarmExtension => hand.upperarm_extension,
            ParameterKind::UpperarmRotation => hand.upperarm_rotation,
            ParameterKind::Found => {
                if hand.tracked {
                    1.0
                } else {
                    0.0
                }
            }
            ParameterKind::HandOpen => hand.openness(),
            ParameterKind::HandDistance => hands.wrist_distance(),
        }
    }

    /// Recompute the value for this tick.
    ///
    /// Returns `None` for disabled parameters, which emit nothing.
    pub fn update_value(&mut self, hands: &HandStates) -> Option<f32> {
        if !self.enabled {
            return None;
        }

        let mut value = self.raw_value(hands) + self.offset;

        if self.mirrored && self.kind.flips_when_mirrored() {
            value = 2.0 * self.bounds.default as f32 - value;
        }

        let value = truncate_milli(value);
        self.current_value = value;
        Some(value)
    }

    /// Value formatted for display: integers for wide ranges
    pub fn display_value(&self) -> f32 {
        if self.bounds.is_fractional() {
            self.current_value
        } else {
            self.current_value.round()
        }
    }
}

/// Build the fixed catalog: per hand the arm, wrist, finger and openness
/// parameters, followed by the cross-hand distance.
pub fn catalog() -> Vec<Parameter> {
    use ParameterKind::*;

    let mut params = Vec::new();
    for side in Side::ALL {
        let hand = HandScope::One(side);
        let arm_and_wrist: [(ParameterKind, &str, bool, Bounds); 11] = [
            (UpperarmExtension, "Upperarm Extension", false, Bounds::new(1, 0, 1)),
            (UpperarmRotation, "Shoulder Rotation", false, Bounds::new(0, -90, 90)),
            (ForearmExtension, "Forearm Extension", false, Bounds::new(1, 0, 1)),
            (ForearmRotation, "Elbow Rotation", false, Bounds::new(0, -180, 180)),
            (AngleX, "Hand Angle X", true, Bounds::new(0, -180, 180)),
            (AngleY, "Hand Angle Y", false, Bounds::new(0, -180, 180)),
            (AngleZ, "Hand Angle Z", true, Bounds::new(0, -180, 180)),
            (PositionX, "Hand Position X", true, Bounds::new(0, -5, 5)),
            (PositionY, "Hand Position Y", true, Bounds::new(0, -5, 5)),
            (PositionZ, "Hand Position Z", true, Bounds::new(0, -5, 5)),
            (Found, "Hand Found", true, Bounds::new(0, 0, 1)),
        ];
        for (kind, title, is_default, bounds) in arm_and_wrist {
            params.push(Parameter::new(kind, hand, None, title, is_default, bounds));
        }

        for finger in Finger::ALL {
            params.push(Parameter::new(
                TotalFlexion,
                hand,
                Some(finger),
                finger.name(),
                true,
                Bounds::new(0, 0, 1),
            ));
            params.push(Parameter::new(
                Spread,
                hand,
                Some(finger),
                format!("{} Spread", finger.name()),
                false,
                Bounds::new(0, -1, 1),
            ));
        }

        params.push(Parameter::new(
            HandOpen,
            hand,
            None,
            "Hand Open",
            true,
            Bounds::new(1, 0, 1),
        ));
    }

    params.push(Parameter::new(
        HandDistance,
        HandScope::Both,
        None,
        "Hand Distance",
        true,
        Bounds::new(0, 0, 10),
    ));

    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn find<'a>(params: &'a [Parameter], name: &str) -> &'a Parameter {
        params
            .iter()
            .find(|p| p.name() == name)
            .unwrap_or_else(|| panic!("missing parameter {name}"))
    }

    #[test]
    fn test_catalog_names() {
        let params = catalog();
        assert_eq!(params.len(), 2 * (11 + 10 + 1) + 1);

        let upper = find(&params, "LeapHandLeftUpperarmExtension");
        assert!(!upper.is_default);
        let flexion = find(&params, "HandRightFinger_1_Thumb");
        assert_eq!(flexion.finger, Some(Finger::Thumb));
        let spread = find(&params, "LeapHandLeftFingerSpread5Pinky");
        assert_eq!(spread.title, "Pinky Spread");
        find(&params, "HandLeftFound");
        find(&params, "HandRightOpen");
        find(&params, "HandRightAngleZ");
        let distance = find(&params, "HandDistance");
        assert_eq!(distance.hand, HandScope::Both);
    }

    #[test]
    fn test_catalog_names_unique_in_both_mirror_states() {
        let mut params = catalog();
        let names: HashSet<String> = params.iter().map(|p| p.name()).collect();
        assert_eq!(names.len(), params.len());

        params.iter_mut().for_each(Parameter::toggle_mirror);
        let mirrored: HashSet<String> = params.iter().map(|p| p.name()).collect();
        assert_eq!(mirrored.len(), params.len());
        assert_eq!(names, mirrored);
    }

    #[test]
    fn test_mirror_swaps_effective_side() {
        let mut p = Parameter::new(
            ParameterKind::UpperarmRotation,
            HandScope::One(Side::Left),
            None,
            "Shoulder Rotation",
            false,
            Bounds::new(0, -90, 90),
        );
        assert_eq!(p.name(), "LeapHandLeftUpperarmRotation");
        p.toggle_mirror();
        assert_eq!(p.name(), "LeapHandRightUpperarmRotation");
        assert_eq!(p.settings_key(), "LeapHandLeftUpperarmRotation");
        p.toggle_mirror();
        assert_eq!(p.name(), "LeapHandLeftUpperarmRotation");
    }

    #[test]
    fn test_update_value_offset_mirror_truncate() {
        let mut hands = HandStates::new();
        hands.get_mut(Side::Right).wrist_rotation.x = 12.34567;
        hands.get_mut(Side::Right).wrist_rotation.y = 12.34567;

        let mut angle_x = Parameter::new(
            ParameterKind::AngleX,
            HandScope::One(Side::Right),
            None,
            "Hand Angle X",
            true,
            Bounds::new(0, -180, 180),
        );
        angle_x.offset = 1.0;
        let v = angle_x.update_value(&hands).unwrap();
        assert!((v - 13.345).abs() < 1e-4);

        angle_x.toggle_mirror();
        let v = angle_x.update_value(&hands).unwrap();
        assert!((v + 13.345).abs() < 1e-4);
        assert_eq!(angle_x.current_value, v);

        // Vertical axes keep their sign
        let mut angle_y = Parameter::new(
            ParameterKind::AngleY,
            HandScope::One(Side::Right),
            None,
            "Hand Angle Y",
            false,
            Bounds::new(0, -180, 180),
        );
        angle_y.toggle_mirror();
        let v = angle_y.update_value(&hands).unwrap();
        assert!((v - 12.345).abs() < 1e-4);
    }

    #[test]
    fn test_disabled_parameter_has_no_value() {
        let mut p = catalog().remove(0);
        p.enabled = false;
        assert_eq!(p.update_value(&HandStates::new()), None);
    }

    #[test]
    fn test_found_reports_tracking() {
        let mut hands = HandStates::new();
        let mut found = Parameter::new(
            ParameterKind::Found,
            HandScope::One(Side::Left),
            None,
            "Hand Found",
            true,
            Bounds::new(0, 0, 1),
        );
        assert_eq!(found.update_value(&hands), Some(0.0));
        hands.get_mut(Side::Left).tracked = true;
        assert_eq!(found.update_value(&hands), Some(1.0));
    }

    #[test]
    fn test_display_value_rounding() {
        let mut p = Parameter::new(
            ParameterKind::ForearmRotation,
            HandScope::One(Side::Right),
            None,
            "Elbow Rotation",
            false,
            Bounds::new(0, -180, 180),
        );
        p.current_value = 42.618;
        assert_eq!(p.display_value(), 43.0);

        p.bounds = Bounds::new(1, 0, 1);
        p.current_value = 0.618;
        assert_eq!(p.display_value(), 0.618);
    }
}
