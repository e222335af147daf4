//! Handflux - hand tracking to VTube Studio parameter bridge
//!
//! Handflux turns per-frame hand poses into VTube Studio input parameters through a
//! deterministic pipeline: tracking source → kinematic extraction → parameter
//! registry → tracking-loss policy → batched injection over the plugin API.
//!
//! ## Modules
//!
//! - **Kinematics**: arm extension/rotation, wrist pose, finger flexion and spread
//! - **Registry**: the named parameter catalog with mirroring, offsets and overrides
//! - **Protocol**: VTube Studio websocket session with token authentication

pub mod adapters;
pub mod error;
pub mod geometry;
pub mod kinematics;
pub mod loss;
pub mod parameter;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod settings;
pub mod types;

pub use adapters::{ReplaySource, TrackingSource};
pub use error::BridgeError;
pub use kinematics::{BodyAnchor, KinematicExtractor};
pub use loss::TrackingLossPolicy;
pub use parameter::{Parameter, ParameterKind};
pub use pipeline::{replay_to_values, HandBridge, TickReport};
pub use registry::{ParameterRegistry, ParameterValue, RegistryConfig};
pub use settings::{Settings, SettingsTokenStore};
pub use types::{HandPose, HandState, HandStates, Side, TrackingFrame};

/// Handflux version
pub const HANDFLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Plugin name presented to VTube Studio
pub const PLUGIN_NAME: &str = "Handflux";
