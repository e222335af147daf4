//! VTube Studio public API messages
//!
//! Every message is a tagged envelope `{apiName, apiVersion, requestID, messageType, data}`.
//! Outbound envelopes are typed; inbound ones are parsed into [`Inbound`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BridgeError;
use crate::registry::{ParameterDeclaration, ParameterValue};

pub const API_NAME: &str = "VTubeStudioPublicAPI";
pub const API_VERSION: &str = "1.0";

/// The request requires an authenticated session (token rejected or expired)
pub const ERROR_REQUIRES_AUTHENTICATION: i32 = 8;
/// The user denied the token request
pub const ERROR_TOKEN_REQUEST_DENIED: i32 = 50;

/// Message types this client sends or understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    AuthenticationTokenRequest,
    AuthenticationTokenResponse,
    AuthenticationRequest,
    AuthenticationResponse,
    ParameterCreationRequest,
    ParameterCreationResponse,
    InjectParameterDataRequest,
    InjectParameterDataResponse,
    ApiError,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::AuthenticationTokenRequest => "AuthenticationTokenRequest",
            MessageType::AuthenticationTokenResponse => "AuthenticationTokenResponse",
            MessageType::AuthenticationRequest => "AuthenticationRequest",
            MessageType::AuthenticationResponse => "AuthenticationResponse",
            MessageType::ParameterCreationRequest => "ParameterCreationRequest",
            MessageType::ParameterCreationResponse => "ParameterCreationResponse",
            MessageType::InjectParameterDataRequest => "InjectParameterDataRequest",
            MessageType::InjectParameterDataResponse => "InjectParameterDataResponse",
            MessageType::ApiError => "APIError",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        const ALL: [MessageType; 9] = [
            MessageType::AuthenticationTokenRequest,
            MessageType::AuthenticationTokenResponse,
            MessageType::AuthenticationRequest,
            MessageType::AuthenticationResponse,
            MessageType::ParameterCreationRequest,
            MessageType::ParameterCreationResponse,
            MessageType::InjectParameterDataRequest,
            MessageType::InjectParameterDataResponse,
            MessageType::ApiError,
        ];
        ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// Identity the plugin presents when requesting a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub developer: String,
}

impl Default for PluginInfo {
    fn default() -> Self {
        Self {
            name: crate::PLUGIN_NAME.to_string(),
            developer: "Handflux Contributors".to_string(),
        }
    }
}

/// Outbound message envelope
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub api_name: &'static str,
    pub api_version: &'static str,
    #[serde(rename = "requestID")]
    pub request_id: String,
    pub message_type: &'static str,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(message_type: MessageType, data: T) -> Self {
        Self {
            api_name: API_NAME,
            api_version: API_VERSION,
            request_id: Uuid::new_v4().to_string(),
            message_type: message_type.as_str(),
            data,
        }
    }

    pub fn to_json(&self) -> Result<String, BridgeError> {
        serde_json::to_string(self).map_err(BridgeError::JsonError)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequestData {
    pub plugin_name: String,
    pub plugin_developer: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationRequestData {
    pub plugin_name: String,
    pub plugin_developer: String,
    pub authentication_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterCreationData {
    pub parameter_name: String,
    pub explanation: String,
    pub min: i32,
    pub max: i32,
    pub default_value: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InjectedValue {
    pub id: String,
    pub value: f32,
    pub weight: f32,
}

impl From<&ParameterValue> for InjectedValue {
    fn from(v: &ParameterValue) -> Self {
        Self {
            id: v.name.clone(),
            value: v.value,
            weight: v.weight,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectParameterData {
    pub parameter_values: Vec<InjectedValue>,
}

pub fn token_request(plugin: &PluginInfo) -> Envelope<TokenRequestData> {
    Envelope::new(
        MessageType::AuthenticationTokenRequest,
        TokenRequestData {
            plugin_name: plugin.name.clone(),
            plugin_developer: plugin.developer.clone(),
        },
    )
}

pub fn authentication_request(
    plugin: &PluginInfo,
    token: &str,
) -> Envelope<AuthenticationRequestData> {
    Envelope::new(
        MessageType::AuthenticationRequest,
        AuthenticationRequestData {
            plugin_name: plugin.name.clone(),
            plugin_developer: plugin.developer.clone(),
            authentication_token: token.to_string(),
        },
    )
}

pub fn parameter_creation(decl: &ParameterDeclaration) -> Envelope<ParameterCreationData> {
    Envelope::new(
        MessageType::ParameterCreationRequest,
        ParameterCreationData {
            parameter_name: decl.name.clone(),
            explanation: decl.explanation.clone(),
            min: decl.bounds.min,
            max: decl.bounds.max,
            default_value: decl.bounds.default,
        },
    )
}

pub fn inject_parameter_data(values: Vec<InjectedValue>) -> Envelope<InjectParameterData> {
    Envelope::new(
        MessageType::InjectParameterDataRequest,
        InjectParameterData {
            parameter_values: values,
        },
    )
}

/// Raw inbound envelope; only the fields this client reads
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInbound {
    message_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponseData {
    authentication_token: String,
}

#[derive(Debug, Deserialize)]
struct AuthenticationResponseData {
    authenticated: bool,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorData {
    #[serde(rename = "errorID")]
    error_id: i32,
    #[serde(default)]
    message: String,
}

/// A parsed inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Token(String),
    Authentication { authenticated: bool, reason: String },
    ApiError { error_id: i32, message: String },
    /// Response to one of our own requests that carries nothing we act on
    Ack(MessageType),
    /// A message type this client doesn't handle
    Unknown(String),
}

/// Parse one inbound text message
pub fn parse_inbound(text: &str) -> Result<Inbound, BridgeError> {
    let raw: RawInbound = serde_json::from_str(text)?;
    let protocol_error =
        |e: serde_json::Error| BridgeError::Protocol(format!("{}: {}", raw.message_type, e));

    let inbound = match MessageType::parse(&raw.message_type) {
        Some(MessageType::AuthenticationTokenResponse) => {
            let data: TokenResponseData =
                serde_json::from_value(raw.data.clone()).map_err(protocol_error)?;
            Inbound::Token(data.authentication_token)
        }
        Some(MessageType::AuthenticationResponse) => {
            let data: AuthenticationResponseData =
                serde_json::from_value(raw.data.clone()).map_err(protocol_error)?;
            Inbound::Authentication {
                authenticated: data.authenticated,
                reason: data.reason,
            }
        }
        Some(MessageType::ApiError) => {
            let data: ApiErrorData =
                serde_json::from_value(raw.data.clone()).map_err(protocol_error)?;
            Inbound::ApiError {
                error_id: data.error_id,
                message: data.message,
            }
        }
        Some(
            t @ (MessageType::ParameterCreationResponse | MessageType::InjectParameterDataResponse),
        ) => Inbound::Ack(t),
        _ => Inbound::Unknown(raw.message_type.clone()),
    };
    Ok(inbound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::Bounds;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_token_request_envelope() {
        let plugin = PluginInfo {
            name: "Handflux".to_string(),
            developer: "Tester".to_string(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&token_request(&plugin).to_json().unwrap()).unwrap();

        assert_eq!(json["apiName"], "VTubeStudioPublicAPI");
        assert_eq!(json["apiVersion"], "1.0");
        assert_eq!(json["messageType"], "AuthenticationTokenRequest");
        assert_eq!(json["data"], json!({"pluginName": "Handflux", "pluginDeveloper": "Tester"}));
        assert!(Uuid::parse_str(json["requestID"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_parameter_creation_payload() {
        let decl = ParameterDeclaration {
            name: "LeapHandLeftUpperarmRotation".to_string(),
            explanation: "Shoulder Rotation".to_string(),
            bounds: Bounds::new(0, -90, 90),
        };
        let json: serde_json::Value =
            serde_json::from_str(&parameter_creation(&decl).to_json().unwrap()).unwrap();
        assert_eq!(
            json["data"],
            json!({
                "parameterName": "LeapHandLeftUpperarmRotation",
                "explanation": "Shoulder Rotation",
                "min": -90,
                "max": 90,
                "defaultValue": 0
            })
        );
    }

    #[test]
    fn test_inject_payload() {
        let env = inject_parameter_data(vec![InjectedValue {
            id: "HandLeftFound".to_string(),
            value: 1.0,
            weight: 0.0,
        }]);
        let json: serde_json::Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(json["messageType"], "InjectParameterDataRequest");
        assert_eq!(
            json["data"]["parameterValues"],
            json!([{"id": "HandLeftFound", "value": 1.0, "weight": 0.0}])
        );
    }

    #[test]
    fn test_parse_inbound_variants() {
        let token = r#"{"apiName":"VTubeStudioPublicAPI","apiVersion":"1.0","requestID":"x",
            "messageType":"AuthenticationTokenResponse","data":{"authenticationToken":"abc"}}"#;
        assert_eq!(parse_inbound(token).unwrap(), Inbound::Token("abc".to_string()));

        let auth = r#"{"messageType":"AuthenticationResponse","data":{"authenticated":false,"reason":"nope"}}"#;
        assert_eq!(
            parse_inbound(auth).unwrap(),
            Inbound::Authentication {
                authenticated: false,
                reason: "nope".to_string()
            }
        );

        let error = r#"{"messageType":"APIError","data":{"errorID":8,"message":"auth"}}"#;
        assert_eq!(
            parse_inbound(error).unwrap(),
            Inbound::ApiError {
                error_id: ERROR_REQUIRES_AUTHENTICATION,
                message: "auth".to_string()
            }
        );

        let ack = r#"{"messageType":"InjectParameterDataResponse","data":{}}"#;
        assert_eq!(
            parse_inbound(ack).unwrap(),
            Inbound::Ack(MessageType::InjectParameterDataResponse)
        );

        let other = r#"{"messageType":"HotkeysInCurrentModelResponse","data":{}}"#;
        assert_eq!(
            parse_inbound(other).unwrap(),
            Inbound::Unknown("HotkeysInCurrentModelResponse".to_string())
        );
    }

    #[test]
    fn test_parse_inbound_rejects_malformed() {
        assert!(matches!(
            parse_inbound("not json"),
            Err(BridgeError::JsonError(_))
        ));
        assert!(matches!(
            parse_inbound(r#"{"messageType":"AuthenticationResponse","data":{}}"#),
            Err(BridgeError::Protocol(_))
        ));
    }
}
