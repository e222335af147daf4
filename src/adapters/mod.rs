//! Tracking sources
//!
//! A tracking source supplies the hand-pose frame for each tick. Live providers
//! and recorded sessions both sit behind [`TrackingSource`].

mod replay;

pub use replay::ReplaySource;

use crate::types::TrackingFrame;

/// Trait for hand-tracking providers
pub trait TrackingSource {
    /// Frame for the current tick, or `None` when the source has nothing more to give
    fn current_frame(&mut self) -> Option<TrackingFrame>;
}

impl<S: TrackingSource + ?Sized> TrackingSource for Box<S> {
    fn current_frame(&mut self) -> Option<TrackingFrame> {
        (**self).current_frame()
    }
}
