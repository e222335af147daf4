//! Parameter registry
//!
//! Owns the fixed parameter catalog and recomputes every parameter from the
//! latest hand states once per tick, applying user overrides, mirroring and the
//! tracking-loss policy.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::BridgeError;
use crate::loss::{Emission, TrackingLossTracker};
use crate::parameter::{catalog, Bounds, HandScope, Parameter, ParameterKind};
use crate::types::{HandStates, Side};

/// User overrides for one parameter, keyed by its settings key
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterOverride {
    pub enabled: Option<bool>,
    pub offset: f32,
    pub smoothing: u32,
}

/// Registry construction options
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Start advanced (custom) parameters disabled
    pub default_only: bool,
    /// Start with mirroring on
    pub mirror: bool,
    pub overrides: BTreeMap<String, ParameterOverride>,
}

/// One value to inject this tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub name: String,
    pub value: f32,
    pub weight: f32,
}

/// A custom parameter to create on the consumer side
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDeclaration {
    pub name: String,
    pub explanation: String,
    pub bounds: Bounds,
}

/// The parameter catalog and its per-tick evaluation
#[derive(Debug, Clone)]
pub struct ParameterRegistry {
    params: Vec<Parameter>,
    mirrored: bool,
}

impl ParameterRegistry {
    /// Build the catalog and apply the configuration
    pub fn new(config: &RegistryConfig) -> Result<Self, BridgeError> {
        let mut params = catalog();

        for param in &mut params {
            param.enabled = param.is_default || !config.default_only;
            if let Some(o) = config.overrides.get(&param.settings_key()) {
                if let Some(enabled) = o.enabled {
                    param.enabled = enabled;
                }
                param.offset = o.offset;
                param.smoothing = o.smoothing;
            }
            param.mirrored = config.mirror;
        }

        let mut seen = HashSet::new();
        for param in &params {
            let name = param.name();
            if !seen.insert(name.clone()) {
                return Err(BridgeError::DuplicateParameter(name));
            }
        }

        Ok(Self {
            params,
            mirrored: config.mirror,
        })
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    /// Look up a parameter by its settings key
    pub fn get(&self, key: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.settings_key() == key)
    }

    fn get_mut(&mut self, key: &str) -> Result<&mut Parameter, BridgeError> {
        self.params
            .iter_mut()
            .find(|p| p.settings_key() == key)
            .ok_or_else(|| BridgeError::UnknownParameter(key.to_string()))
    }

    pub fn set_enabled(&mut self, key: &str, enabled: bool) -> Result<(), BridgeError> {
        self.get_mut(key)?.enabled = enabled;
        Ok(())
    }

    pub fn set_offset(&mut self, key: &str, offset: f32) -> Result<(), BridgeError> {
        self.get_mut(key)?.offset = offset;
        Ok(())
    }

    pub fn set_smoothing(&mut self, key: &str, smoothing: u32) -> Result<(), BridgeError> {
        self.get_mut(key)?.smoothing = smoothing;
        Ok(())
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    /// Flip mirroring on every parameter at once
    pub fn toggle_mirror(&mut self) {
        self.mirrored = !self.mirrored;
        self.params.iter_mut().for_each(Parameter::toggle_mirror);
    }

    pub fn set_mirror(&mut self, mirror: bool) {
        if self.mirrored != mirror {
            self.toggle_mirror();
        }
    }

    /// Tracked flags for both hands, read from the values the `Found` parameters
    /// produced on the last tick. A hand whose `Found` is disabled falls back to
    /// its own tracked flag.
    pub fn tracked(&self, hands: &HandStates) -> [bool; 2] {
        Side::ALL.map(|side| {
            self.params
                .iter()
                .find(|p| p.enabled && p.kind == ParameterKind::Found && p.hand == HandScope::One(side))
                .map_or(hands.get(side).tracked, |p| p.current_value > 0.5)
        })
    }

    /// Recompute every parameter and collect the values to send this tick
    pub fn tick(
        &mut self,
        hands: &HandStates,
        loss: &mut TrackingLossTracker,
    ) -> Vec<ParameterValue> {
        let fresh: Vec<Option<f32>> = self
            .params
            .iter_mut()
            .map(|param| param.update_value(hands))
            .collect();
        let decision = loss.advance(self.tracked(hands));

        let mut values = Vec::new();
        for (param, value) in self.params.iter().zip(fresh) {
            let Some(value) = value else {
                continue;
            };

            match decision.for_scope(param.hand) {
                Emission::Emit => values.push(ParameterValue {
                    name: param.name(),
                    value,
                    weight: 1.0,
                }),
                Emission::Reset => values.push(ParameterValue {
                    name: param.name(),
                    value: param.bounds.default as f32,
                    weight: 0.0,
                }),
                Emission::Suppress => {}
            }
        }
        values
    }

    /// Custom parameters that must be created on the consumer after authentication
    pub fn declarations(&self) -> Vec<ParameterDeclaration> {
        self.params
            .iter()
            .filter(|p| p.enabled && !p.is_default)
            .map(|p| ParameterDeclaration {
                name: p.name(),
                explanation: p.title.clone(),
                bounds: p.bounds,
            })
            .collect()
    }

    /// Current overrides, for persisting back to settings
    pub fn overrides(&self) -> BTreeMap<String, ParameterOverride> {
        self.params
            .iter()
            .map(|p| {
                (
                    p.settings_key(),
                    ParameterOverride {
                        enabled: Some(p.enabled),
                        offset: p.offset,
                        smoothing: p.smoothing,
                    },
                )
            })
            .collect()
    }
}
