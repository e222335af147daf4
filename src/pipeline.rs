//! Pipeline orchestration
//!
//! [`HandBridge`] runs one tick per tracking frame:
//! 1. drain connection events (token responses, auth results, disconnects)
//! 2. derive hand states from the frame
//! 3. recompute parameters and apply the tracking-loss policy
//! 4. send the batch when authenticated
//!
//! A tick never fails. Transport problems are logged and show up in the
//! connection state instead.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adapters::{ReplaySource, TrackingSource};
use crate::error::BridgeError;
use crate::kinematics::{BodyAnchor, KinematicExtractor};
use crate::loss::{TrackingLossPolicy, TrackingLossTracker};
use crate::protocol::{ClientEvent, Transport, TokenStore, VtsClient};
use crate::registry::{ParameterRegistry, ParameterValue};
use crate::settings::Settings;
use crate::types::{HandStates, TrackingFrame};

/// What a single tick produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub tracked: [bool; 2],
    pub values: Vec<ParameterValue>,
    /// Whether a batch was written to VTube Studio
    pub sent: bool,
}

/// Tracking frames in, VTube Studio parameter values out
pub struct HandBridge<T: Transport, K: TokenStore> {
    extractor: KinematicExtractor,
    hands: HandStates,
    registry: ParameterRegistry,
    loss: TrackingLossTracker,
    client: VtsClient<T, K>,
    ticks: u64,
}

impl<T: Transport, K: TokenStore> HandBridge<T, K> {
    pub fn new(settings: &Settings, client: VtsClient<T, K>) -> Result<Self, BridgeError> {
        settings.validate()?;
        Ok(Self {
            extractor: KinematicExtractor::new(settings.body),
            hands: HandStates::new(),
            registry: ParameterRegistry::new(&settings.registry_config())?,
            loss: TrackingLossTracker::new(settings.loss_policy),
            client,
            ticks: 0,
        })
    }

    pub fn connect(&mut self) -> Result<(), BridgeError> {
        self.client.connect()
    }

    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }

    /// Handle pending connection events without running a tick
    pub fn poll_connection(&mut self) {
        for event in self.client.drain() {
            match event {
                ClientEvent::Authenticated => self.declare_parameters(),
                ClientEvent::Disconnected => info!("VTube Studio session ended"),
            }
        }
    }

    /// Run one tick on `frame`
    pub fn tick(&mut self, frame: &TrackingFrame) -> TickReport {
        self.poll_connection();

        self.extractor.extract(frame, &mut self.hands);
        let values = self.registry.tick(&self.hands, &mut self.loss);

        let mut sent = false;
        if self.client.is_authenticated() {
            for value in &values {
                self.client.queue_value(&value.name, value.value, value.weight);
            }
            match self.client.flush() {
                Ok(flushed) => sent = flushed,
                Err(e) => warn!(error = %e, "failed to send parameter batch"),
            }
        }

        self.ticks += 1;
        TickReport {
            tick: self.ticks,
            tracked: self.registry.tracked(&self.hands),
            values,
            sent,
        }
    }

    /// Pull the current frame from `source` and tick on it.
    /// Returns `None` once the source is exhausted.
    pub fn tick_source<S: TrackingSource + ?Sized>(&mut self, source: &mut S) -> Option<TickReport> {
        let frame = source.current_frame()?;
        Some(self.tick(&frame))
    }

    pub fn toggle_mirror(&mut self) {
        self.registry.toggle_mirror();
        info!(mirrored = self.registry.is_mirrored(), "mirror toggled");
        // renamed custom parameters must exist under their new names
        if self.client.is_authenticated() {
            self.declare_parameters();
        }
    }

    pub fn set_loss_policy(&mut self, policy: TrackingLossPolicy) {
        self.loss.set_policy(policy);
    }

    pub fn loss_policy(&self) -> TrackingLossPolicy {
        self.loss.policy()
    }

    pub fn set_body_anchor(&mut self, anchor: BodyAnchor) {
        self.extractor.set_anchor(anchor);
    }

    pub fn hands(&self) -> &HandStates {
        &self.hands
    }

    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ParameterRegistry {
        &mut self.registry
    }

    pub fn client(&self) -> &VtsClient<T, K> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut VtsClient<T, K> {
        &mut self.client
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn declare_parameters(&mut self) {
        let declarations = self.registry.declarations();
        for decl in &declarations {
            if let Err(e) = self.client.declare_parameter(decl) {
                warn!(error = %e, parameter = %decl.name, "failed to declare parameter");
                return;
            }
        }
        debug!(count = declarations.len(), "custom parameters declared");
    }
}

/// Evaluate a recorded NDJSON session offline and return the values of every tick.
///
/// # Example
/// ```ignore
/// let ticks = replay_to_values(&ndjson, &Settings::default())?;
/// ```
pub fn replay_to_values(
    ndjson: &str,
    settings: &Settings,
) -> Result<Vec<Vec<ParameterValue>>, BridgeError> {
    settings.validate()?;
    let mut source = ReplaySource::parse_ndjson(ndjson)?;
    let extractor = KinematicExtractor::new(settings.body);
    let mut registry = ParameterRegistry::new(&settings.registry_config())?;
    let mut loss = TrackingLossTracker::new(settings.loss_policy);
    let mut hands = HandStates::new();

    let mut out = Vec::with_capacity(source.len());
    while let Some(frame) = source.current_frame() {
        extractor.extract(&frame, &mut hands);
        out.push(registry.tick(&hands, &mut loss));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        ConnectionState, MemoryTokenStore, MemoryTransport, PluginInfo, TransportEvent,
    };
    use crate::types::{HandPose, Side};
    use glam::{Quat, Vec3};
    use serde_json::Value;

    type TestBridge = HandBridge<MemoryTransport, MemoryTokenStore>;

    fn pose(side: Side) -> HandPose {
        let x = side.chirality() * 0.2;
        HandPose {
            side,
            elbow: Vec3::new(x, -0.3, 0.0),
            wrist: Vec3::new(x, -0.3, 0.25),
            palm: Quat::IDENTITY,
            fingers: Vec::new(),
        }
    }

    fn both_hands() -> TrackingFrame {
        TrackingFrame {
            captured_at: None,
            hands: vec![pose(Side::Left), pose(Side::Right)],
        }
    }

    fn left_only() -> TrackingFrame {
        TrackingFrame {
            captured_at: None,
            hands: vec![pose(Side::Left)],
        }
    }

    fn bridge(policy: TrackingLossPolicy) -> TestBridge {
        let settings = Settings {
            loss_policy: policy,
            ..Settings::default()
        };
        let client = VtsClient::new(
            MemoryTransport::new(),
            MemoryTokenStore::new(Some("token".to_string())),
            PluginInfo::default(),
        );
        HandBridge::new(&settings, client).unwrap()
    }

    fn authenticate(bridge: &mut TestBridge) {
        bridge.connect().unwrap();
        bridge.poll_connection();
        bridge
            .client_mut()
            .transport_mut()
            .push_message(r#"{"messageType":"AuthenticationResponse","data":{"authenticated":true}}"#);
    }

    fn sent(bridge: &mut TestBridge) -> Vec<Value> {
        bridge
            .client_mut()
            .transport_mut()
            .take_sent()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    fn injected_names(message: &Value) -> Vec<String> {
        message["data"]["parameterValues"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_offline_tick_sends_nothing() {
        let mut bridge = bridge(TrackingLossPolicy::StayAtPose);
        let report = bridge.tick(&both_hands());
        assert_eq!(report.tick, 1);
        assert_eq!(report.tracked, [true, true]);
        assert_eq!(report.values.len(), 45);
        assert!(!report.sent);
        assert!(bridge.client().transport().sent().is_empty());
    }

    #[test]
    fn test_declarations_precede_first_batch() {
        let mut bridge = bridge(TrackingLossPolicy::StayAtPose);
        authenticate(&mut bridge);
        let _ = sent(&mut bridge);

        let report = bridge.tick(&both_hands());
        assert!(report.sent);
        assert_eq!(bridge.client().state(), ConnectionState::Authenticated);

        let messages = sent(&mut bridge);
        let (batch, declarations) = messages.split_last().unwrap();
        assert_eq!(declarations.len(), 20);
        assert!(declarations
            .iter()
            .all(|m| m["messageType"] == "ParameterCreationRequest"));
        assert_eq!(batch["messageType"], "InjectParameterDataRequest");
        assert_eq!(injected_names(batch).len(), 45);
    }

    #[test]
    fn test_stay_at_pose_sends_nothing_for_lost_hand() {
        let mut bridge = bridge(TrackingLossPolicy::StayAtPose);
        authenticate(&mut bridge);
        bridge.tick(&both_hands());
        let _ = sent(&mut bridge);

        for _ in 0..3 {
            let report = bridge.tick(&left_only());
            assert_eq!(report.tracked, [true, false]);
            let messages = sent(&mut bridge);
            assert_eq!(messages.len(), 1);
            let names = injected_names(&messages[0]);
            assert_eq!(names.len(), 22);
            assert!(names.iter().all(|n| !n.contains("Right")));
            assert!(!names.contains(&"HandDistance".to_string()));
        }
    }

    #[test]
    fn test_default_policy_resets_exactly_once() {
        let mut bridge = bridge(TrackingLossPolicy::Default);
        authenticate(&mut bridge);
        bridge.tick(&both_hands());
        let _ = sent(&mut bridge);

        let report = bridge.tick(&left_only());
        let resets: Vec<_> = report.values.iter().filter(|v| v.weight == 0.0).collect();
        assert_eq!(resets.len(), 23);
        assert!(resets.iter().any(|v| v.name == "HandDistance"));
        assert!(resets.iter().any(|v| v.name == "HandRightFound" && v.value == 0.0));
        let batch = sent(&mut bridge);
        assert_eq!(injected_names(&batch[0]).len(), 22 + 23);

        for _ in 0..2 {
            let report = bridge.tick(&left_only());
            assert!(report.values.iter().all(|v| v.weight == 1.0));
            assert!(report.values.iter().all(|v| !v.name.contains("Right")));
            let names = injected_names(&sent(&mut bridge)[0]);
            assert!(!names.contains(&"HandDistance".to_string()));
        }
    }

    #[test]
    fn test_reconnect_redeclares_once() {
        let mut bridge = bridge(TrackingLossPolicy::StayAtPose);
        authenticate(&mut bridge);
        let _ = sent(&mut bridge);
        bridge.tick(&both_hands());
        assert_eq!(sent(&mut bridge).len(), 20 + 1);

        bridge
            .client_mut()
            .transport_mut()
            .push_event(TransportEvent::Closed);
        let report = bridge.tick(&both_hands());
        assert!(!report.sent);
        assert_eq!(bridge.client().state(), ConnectionState::Disconnected);
        bridge.tick(&both_hands());
        assert!(sent(&mut bridge).is_empty());

        // The cached token is reused on the new connection
        bridge.connect().unwrap();
        bridge.poll_connection();
        let messages = sent(&mut bridge);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["messageType"], "AuthenticationRequest");
        assert_eq!(messages[0]["data"]["authenticationToken"], "token");

        bridge
            .client_mut()
            .transport_mut()
            .push_message(r#"{"messageType":"AuthenticationResponse","data":{"authenticated":true}}"#);
        assert!(bridge.tick(&both_hands()).sent);
        let messages = sent(&mut bridge);
        let (batch, declarations) = messages.split_last().unwrap();
        assert_eq!(declarations.len(), 20);
        assert!(declarations
            .iter()
            .all(|m| m["messageType"] == "ParameterCreationRequest"));
        assert_eq!(batch["messageType"], "InjectParameterDataRequest");

        bridge.tick(&both_hands());
        let messages = sent(&mut bridge);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["messageType"], "InjectParameterDataRequest");
    }

    #[test]
    fn test_first_message_is_token_request_without_token() {
        let client = VtsClient::new(
            MemoryTransport::new(),
            MemoryTokenStore::default(),
            PluginInfo::default(),
        );
        let mut bridge = HandBridge::new(&Settings::default(), client).unwrap();
        bridge.connect().unwrap();
        bridge.tick(&TrackingFrame::empty());
        let messages = sent(&mut bridge);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["messageType"], "AuthenticationTokenRequest");
    }

    #[test]
    fn test_mirror_redeclares_when_authenticated() {
        let mut bridge = bridge(TrackingLossPolicy::StayAtPose);
        authenticate(&mut bridge);
        bridge.tick(&both_hands());
        let _ = sent(&mut bridge);

        bridge.toggle_mirror();
        assert!(bridge.registry().is_mirrored());
        assert_eq!(sent(&mut bridge).len(), 20);
    }

    #[test]
    fn test_tick_source_until_exhausted() {
        let mut bridge = bridge(TrackingLossPolicy::StayAtPose);
        let mut source = ReplaySource::from_frames(vec![both_hands(), left_only()]);
        assert!(bridge.tick_source(&mut source).is_some());
        assert!(bridge.tick_source(&mut source).is_some());
        assert!(bridge.tick_source(&mut source).is_none());
        assert_eq!(bridge.ticks(), 2);
    }

    #[test]
    fn test_replay_to_values_matches_bridge() {
        let frames = [both_hands(), left_only(), TrackingFrame::empty()];
        let ndjson = frames
            .iter()
            .map(|f| serde_json::to_string(f).unwrap())
            .collect::<Vec<_>>()
            .join("\n");

        let offline = replay_to_values(&ndjson, &Settings::default()).unwrap();
        let mut bridge = bridge(TrackingLossPolicy::StayAtPose);
        let live: Vec<_> = frames.iter().map(|f| bridge.tick(f).values).collect();
        assert_eq!(offline, live);
    }
}
