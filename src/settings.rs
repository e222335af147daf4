//! Persistent user settings
//!
//! Settings are stored as pretty JSON. Missing fields fall back to their defaults,
//! and a missing file loads as [`Settings::default`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BridgeError;
use crate::kinematics::BodyAnchor;
use crate::loss::TrackingLossPolicy;
use crate::protocol::messages::PluginInfo;
use crate::protocol::TokenStore;
use crate::registry::{ParameterOverride, RegistryConfig};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub mirror: bool,
    pub loss_policy: TrackingLossPolicy,
    pub body: BodyAnchor,
    /// Start with only the parameters VTube Studio already knows enabled
    pub default_only: bool,
    pub plugin: PluginInfo,
    /// Overrides keyed by parameter settings key
    pub parameters: BTreeMap<String, ParameterOverride>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            auth_token: None,
            mirror: false,
            loss_policy: TrackingLossPolicy::default(),
            body: BodyAnchor::default(),
            default_only: false,
            plugin: PluginInfo::default(),
            parameters: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, BridgeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from `path`, or return defaults if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self, BridgeError> {
        match fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), BridgeError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.host.trim().is_empty() {
            return Err(BridgeError::InvalidSettings("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(BridgeError::InvalidSettings("port must be non-zero".to_string()));
        }
        if !self.body.shoulder_width.is_finite() || self.body.shoulder_width < 0.0 {
            return Err(BridgeError::InvalidSettings(format!(
                "shoulder_width must be a non-negative number, got {}",
                self.body.shoulder_width
            )));
        }
        if !self.body.neck_base.is_finite() {
            return Err(BridgeError::InvalidSettings(
                "neck_base must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Websocket endpoint of the VTube Studio plugin API
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            default_only: self.default_only,
            mirror: self.mirror,
            overrides: self.parameters.clone(),
        }
    }
}

/// Token store backed by the `auth_token` field of a settings file
#[derive(Debug, Clone)]
pub struct SettingsTokenStore {
    path: PathBuf,
    token: Option<String>,
}

impl SettingsTokenStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BridgeError> {
        let path = path.into();
        let token = Settings::load(&path)?.auth_token;
        Ok(Self { path, token })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, token: Option<String>) -> Result<(), BridgeError> {
        let mut settings = Settings::load(&self.path)
            .map_err(|e| BridgeError::TokenStore(e.to_string()))?;
        settings.auth_token = token.clone();
        settings
            .save(&self.path)
            .map_err(|e| BridgeError::TokenStore(e.to_string()))?;
        self.token = token;
        Ok(())
    }
}

impl TokenStore for SettingsTokenStore {
    fn load(&self) -> Option<String> {
        self.token.clone()
    }

    fn store(&mut self, token: &str) -> Result<(), BridgeError> {
        self.write(Some(token.to_string()))
    }

    fn clear(&mut self) -> Result<(), BridgeError> {
        self.write(None)
    }
}
