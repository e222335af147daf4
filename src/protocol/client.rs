//! VTube Studio session client
//!
//! Drives the connection state machine:
//!
//! ```text
//! Disconnected -> Connecting -> AwaitingToken -> AwaitingAuth -> Authenticated
//!                            \________________/
//!                          (cached token skips the token request)
//! ```
//!
//! All inbound handling happens in [`VtsClient::drain`], which the tick loop
//! calls before computing parameter values.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::messages::{
    authentication_request, inject_parameter_data, parameter_creation, parse_inbound,
    token_request, Envelope, Inbound, InjectedValue, PluginInfo, ERROR_REQUIRES_AUTHENTICATION,
    ERROR_TOKEN_REQUEST_DENIED,
};
use super::transport::{Transport, TransportEvent};
use crate::error::BridgeError;
use crate::registry::ParameterDeclaration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingToken,
    AwaitingAuth,
    Authenticated,
}

/// Session transitions reported by [`VtsClient::drain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    Authenticated,
    Disconnected,
}

/// Persistence for the authentication token
pub trait TokenStore {
    fn load(&self) -> Option<String>;
    fn store(&mut self, token: &str) -> Result<(), BridgeError>;
    fn clear(&mut self) -> Result<(), BridgeError>;
}

impl<K: TokenStore + ?Sized> TokenStore for Box<K> {
    fn load(&self) -> Option<String> {
        (**self).load()
    }

    fn store(&mut self, token: &str) -> Result<(), BridgeError> {
        (**self).store(token)
    }

    fn clear(&mut self) -> Result<(), BridgeError> {
        (**self).clear()
    }
}

/// Token store that lives only as long as the process
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    token: Option<String>,
}

impl MemoryTokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.clone()
    }

    fn store(&mut self, token: &str) -> Result<(), BridgeError> {
        self.token = Some(token.to_string());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), BridgeError> {
        self.token = None;
        Ok(())
    }
}

/// Per-connection session data
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub auth_token: Option<String>,
    pub authenticated_at: Option<DateTime<Utc>>,
    pending: Vec<InjectedValue>,
}

impl Session {
    pub fn pending(&self) -> &[InjectedValue] {
        &self.pending
    }
}

pub struct VtsClient<T: Transport, K: TokenStore> {
    transport: T,
    tokens: K,
    plugin: PluginInfo,
    state: ConnectionState,
    session: Session,
    events: Vec<ClientEvent>,
}

impl<T: Transport, K: TokenStore> VtsClient<T, K> {
    pub fn new(transport: T, tokens: K, plugin: PluginInfo) -> Self {
        let session = Session {
            auth_token: tokens.load(),
            ..Session::default()
        };
        Self {
            transport,
            tokens,
            plugin,
            state: ConnectionState::Disconnected,
            session,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn plugin(&self) -> &PluginInfo {
        &self.plugin
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn token_store(&self) -> &K {
        &self.tokens
    }

    /// Open the connection. A no-op unless currently disconnected.
    pub fn connect(&mut self) -> Result<(), BridgeError> {
        if self.state != ConnectionState::Disconnected {
            debug!(state = ?self.state, "connect ignored; session already active");
            return Ok(());
        }
        self.transport.open()?;
        self.state = ConnectionState::Connecting;
        info!("connecting to VTube Studio");
        Ok(())
    }

    /// Close the connection and forget unsent values
    pub fn disconnect(&mut self) {
        self.transport.close();
        if self.state != ConnectionState::Disconnected {
            info!("disconnected from VTube Studio");
            self.set_disconnected();
        }
    }

    /// Process every transport event that arrived since the last call
    pub fn drain(&mut self) -> Vec<ClientEvent> {
        for event in self.transport.poll_events() {
            match event {
                TransportEvent::Opened => self.on_opened(),
                TransportEvent::Message(text) => self.on_message(&text),
                TransportEvent::Closed => {
                    if self.state != ConnectionState::Disconnected {
                        info!("VTube Studio closed the connection");
                        self.transport.close();
                        self.set_disconnected();
                    }
                }
                TransportEvent::Error(e) => {
                    if self.state != ConnectionState::Disconnected {
                        warn!(error = %e, "connection to VTube Studio failed");
                        self.transport.close();
                        self.set_disconnected();
                    }
                }
            }
        }
        std::mem::take(&mut self.events)
    }

    /// Ask VTube Studio to create a custom parameter
    pub fn declare_parameter(&mut self, decl: &ParameterDeclaration) -> Result<(), BridgeError> {
        if !self.is_authenticated() {
            return Err(BridgeError::NotAuthenticated);
        }
        self.send(parameter_creation(decl))
    }

    /// Add a value to the next batch. Returns false when not authenticated.
    pub fn queue_value(&mut self, id: &str, value: f32, weight: f32) -> bool {
        if !self.is_authenticated() {
            return false;
        }
        self.session.pending.push(InjectedValue {
            id: id.to_string(),
            value,
            weight,
        });
        true
    }

    /// Send the pending batch as one message. Returns whether anything was written.
    pub fn flush(&mut self) -> Result<bool, BridgeError> {
        if !self.is_authenticated() {
            self.session.pending.clear();
            return Ok(false);
        }
        if self.session.pending.is_empty() {
            return Ok(false);
        }
        let values = std::mem::take(&mut self.session.pending);
        self.send(inject_parameter_data(values))?;
        Ok(true)
    }

    fn on_opened(&mut self) {
        if self.state != ConnectionState::Connecting {
            debug!(state = ?self.state, "ignoring stale open event");
            return;
        }
        info!("connected to VTube Studio");
        self.begin_authentication();
    }

    fn on_message(&mut self, text: &str) {
        let inbound = match parse_inbound(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "ignoring malformed message from VTube Studio");
                return;
            }
        };

        match inbound {
            Inbound::Token(token) => {
                if self.state != ConnectionState::AwaitingToken {
                    debug!(state = ?self.state, "ignoring unexpected token response");
                    return;
                }
                info!("received authentication token");
                if let Err(e) = self.tokens.store(&token) {
                    warn!(error = %e, "failed to persist authentication token");
                }
                self.session.auth_token = Some(token.clone());
                if self.send(authentication_request(&self.plugin, &token)).is_ok() {
                    self.state = ConnectionState::AwaitingAuth;
                }
            }
            Inbound::Authentication {
                authenticated: true,
                ..
            } => {
                if self.state != ConnectionState::AwaitingAuth {
                    debug!(state = ?self.state, "ignoring unexpected authentication response");
                    return;
                }
                info!("authenticated with VTube Studio");
                self.state = ConnectionState::Authenticated;
                self.session.authenticated_at = Some(Utc::now());
                self.events.push(ClientEvent::Authenticated);
            }
            Inbound::Authentication {
                authenticated: false,
                reason,
            } => {
                warn!(reason = %reason, "authentication rejected; requesting a new token");
                self.restart_authentication();
            }
            Inbound::ApiError { error_id, message } => match error_id {
                ERROR_REQUIRES_AUTHENTICATION => {
                    warn!(error_id, message = %message, "token no longer valid; requesting a new one");
                    self.restart_authentication();
                }
                ERROR_TOKEN_REQUEST_DENIED => {
                    warn!(error_id, message = %message, "token request denied by user");
                    self.transport.close();
                    self.set_disconnected();
                }
                _ => warn!(error_id, message = %message, "VTube Studio reported an error"),
            },
            Inbound::Ack(message_type) => {
                debug!(message_type = message_type.as_str(), "request acknowledged");
            }
            Inbound::Unknown(message_type) => {
                debug!(message_type = %message_type, "ignoring unhandled message");
            }
        }
    }

    /// Authenticate with the cached token, or request one if there is none
    fn begin_authentication(&mut self) {
        match self.session.auth_token.clone() {
            Some(token) => {
                if self.send(authentication_request(&self.plugin, &token)).is_ok() {
                    self.state = ConnectionState::AwaitingAuth;
                }
            }
            None => {
                if self.send(token_request(&self.plugin)).is_ok() {
                    self.state = ConnectionState::AwaitingToken;
                }
            }
        }
    }

    fn restart_authentication(&mut self) {
        self.session.auth_token = None;
        self.session.pending.clear();
        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "failed to clear persisted token");
        }
        self.state = ConnectionState::Connecting;
        self.begin_authentication();
    }

    fn send<D: Serialize>(&mut self, envelope: Envelope<D>) -> Result<(), BridgeError> {
        let text = envelope.to_json()?;
        if let Err(e) = self.transport.send(text) {
            warn!(error = %e, "failed to write to VTube Studio");
            self.transport.close();
            self.set_disconnected();
            return Err(e);
        }
        Ok(())
    }

    fn set_disconnected(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Disconnected;
        self.session.pending.clear();
        self.session.authenticated_at = None;
        self.events.push(ClientEvent::Disconnected);
    }
}
