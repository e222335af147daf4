//! Tracking-loss policy
//!
//! Decides per tick whether a hand's parameters are emitted, reset to their
//! defaults once, or held back, based on the tracked → untracked edge.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::parameter::HandScope;
use crate::types::Side;

/// What to do with a hand's parameters once it is no longer tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackingLossPolicy {
    /// Send nothing; the consumer keeps the last received pose
    #[default]
    StayAtPose,
    /// Reset every parameter to its default once, then send nothing
    Default,
    /// Same reset behavior as `Default`
    WaitDefault,
}

impl TrackingLossPolicy {
    pub fn resets_on_loss(self) -> bool {
        !matches!(self, TrackingLossPolicy::StayAtPose)
    }
}

/// Per-tick decision for a group of parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// Send the computed value
    Emit,
    /// Send the default value with weight 0
    Reset,
    /// Send nothing
    Suppress,
}

/// Decisions for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossDecision {
    pub hands: [Emission; 2],
    /// Cross-hand parameters, driven by both hands being tracked
    pub both: Emission,
}

impl LossDecision {
    pub fn for_scope(&self, scope: HandScope) -> Emission {
        match scope {
            HandScope::One(side) => self.hands[side.index()],
            HandScope::Both => self.both,
        }
    }
}

/// Edge detector for tracked → untracked transitions
#[derive(Debug, Clone)]
pub struct TrackingLossTracker {
    policy: TrackingLossPolicy,
    was_tracked: [bool; 2],
}

impl TrackingLossTracker {
    pub fn new(policy: TrackingLossPolicy) -> Self {
        Self {
            policy,
            was_tracked: [false; 2],
        }
    }

    pub fn policy(&self) -> TrackingLossPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: TrackingLossPolicy) {
        self.policy = policy;
    }

    /// Advance one tick with this tick's tracked flags
    pub fn advance(&mut self, tracked: [bool; 2]) -> LossDecision {
        let hands = [
            self.decide(self.was_tracked[0], tracked[0]),
            self.decide(self.was_tracked[1], tracked[1]),
        ];
        let both = self.decide(
            self.was_tracked[0] && self.was_tracked[1],
            tracked[0] && tracked[1],
        );

        for side in Side::ALL {
            let i = side.index();
            if self.was_tracked[i] != tracked[i] {
                debug!(
                    hand = side.as_str(),
                    tracked = tracked[i],
                    policy = ?self.policy,
                    "tracking transition"
                );
            }
        }

        self.was_tracked = tracked;
        LossDecision { hands, both }
    }

    fn decide(&self, was: bool, now: bool) -> Emission {
        if now {
            Emission::Emit
        } else if was && self.policy.resets_on_loss() {
            Emission::Reset
        } else {
            Emission::Suppress
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stay_at_pose_suppresses() {
        let mut tracker = TrackingLossTracker::new(TrackingLossPolicy::StayAtPose);
        assert_eq!(tracker.advance([true, true]).hands, [Emission::Emit; 2]);
        let d = tracker.advance([false, true]);
        assert_eq!(d.hands, [Emission::Suppress, Emission::Emit]);
        assert_eq!(d.both, Emission::Suppress);
        assert_eq!(tracker.advance([false, true]).hands[0], Emission::Suppress);
        assert_eq!(tracker.advance([true, true]).hands[0], Emission::Emit);
    }

    #[test]
    fn test_default_resets_once_on_edge() {
        for policy in [TrackingLossPolicy::Default, TrackingLossPolicy::WaitDefault] {
            let mut tracker = TrackingLossTracker::new(policy);
            tracker.advance([true, true]);

            let d = tracker.advance([true, false]);
            assert_eq!(d.hands, [Emission::Emit, Emission::Reset]);
            assert_eq!(d.both, Emission::Reset);

            let d = tracker.advance([true, false]);
            assert_eq!(d.hands, [Emission::Emit, Emission::Suppress]);
            assert_eq!(d.both, Emission::Suppress);

            tracker.advance([true, true]);
            assert_eq!(tracker.advance([false, false]).hands, [Emission::Reset; 2]);
        }
    }

    #[test]
    fn test_never_tracked_hand_is_suppressed() {
        let mut tracker = TrackingLossTracker::new(TrackingLossPolicy::Default);
        let d = tracker.advance([false, false]);
        assert_eq!(d.hands, [Emission::Suppress; 2]);
        assert_eq!(d.both, Emission::Suppress);
    }

    #[test]
    fn test_both_follows_and_of_hands() {
        let mut tracker = TrackingLossTracker::new(TrackingLossPolicy::Default);
        assert_eq!(tracker.advance([true, false]).both, Emission::Suppress);
        assert_eq!(tracker.advance([true, true]).both, Emission::Emit);
        let d = tracker.advance([false, true]);
        assert_eq!(d.both, Emission::Reset);
        assert_eq!(d.for_scope(HandScope::One(Side::Right)), Emission::Emit);
        assert_eq!(d.for_scope(HandScope::One(Side::Left)), Emission::Reset);
    }
}
