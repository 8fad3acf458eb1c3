//! Wire frame definitions for the control surface protocol.
//!
//! The control surface (OBS Studio with obs-websocket 5.x) exchanges JSON
//! frames of the shape `{"op": <u8>, "d": <payload>}`. Only the opcodes the
//! daemon actually uses are modeled here; anything else is surfaced as
//! [`ProtocolError::UnsupportedOpcode`] so the session layer can decide
//! whether to ignore or abort.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};

/// RPC version this client implements and requests during `Identify`.
pub const RPC_VERSION: u32 = 1;

/// Request status codes used by the daemon.
///
/// The full protocol defines many more; these are the ones we branch on.
pub mod status {
    /// The request succeeded.
    pub const SUCCESS: u16 = 100;
    /// The named resource (scene, input, ...) does not exist.
    pub const RESOURCE_NOT_FOUND: u16 = 600;
}

/// WebSocket close codes the server uses to reject a session.
pub mod close_code {
    /// The authentication string in `Identify` was wrong or missing.
    pub const AUTHENTICATION_FAILED: u16 = 4009;
}

mod opcode {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

/// Raw envelope used to peel the opcode before decoding the payload.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    op: u8,
    d: Value,
}

/// Authentication material carried in `Hello` when the server has a password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallenge {
    /// Per-connection random challenge.
    pub challenge: String,
    /// Server-configured salt.
    pub salt: String,
}

/// First frame sent by the server after the WebSocket opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    /// Server software version, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obs_web_socket_version: Option<String>,
    /// Highest RPC version the server speaks.
    pub rpc_version: u32,
    /// Present iff the server requires authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthChallenge>,
}

/// Client response to `Hello`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    /// RPC version the client requests.
    pub rpc_version: u32,
    /// Authentication string, required when `Hello` carried a challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    /// Bitmask of event categories to subscribe to. The daemon drives the
    /// surface and does not consume events, so this is zero.
    pub event_subscriptions: u32,
}

impl Identify {
    /// Builds an `Identify` with no event subscriptions.
    pub fn new(authentication: Option<String>) -> Self {
        Self {
            rpc_version: RPC_VERSION,
            authentication,
            event_subscriptions: 0,
        }
    }
}

/// Server acknowledgment that the session is established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    /// RPC version both sides will use.
    pub negotiated_rpc_version: u32,
}

/// An RPC request from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Request type discriminator, e.g. `SetCurrentProgramScene`.
    pub request_type: String,
    /// Client-chosen correlation id echoed back in the response.
    pub request_id: String,
    /// Type-specific request payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

impl Request {
    /// Request the list of scenes known to the surface.
    pub fn get_scene_list(request_id: impl Into<String>) -> Self {
        Self {
            request_type: "GetSceneList".to_string(),
            request_id: request_id.into(),
            request_data: None,
        }
    }

    /// Request a program scene switch.
    pub fn set_current_program_scene(
        request_id: impl Into<String>,
        scene_name: &str,
    ) -> Self {
        Self {
            request_type: "SetCurrentProgramScene".to_string(),
            request_id: request_id.into(),
            request_data: Some(serde_json::json!({ "sceneName": scene_name })),
        }
    }
}

/// Outcome of a request, carried inside [`RequestResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatus {
    /// Whether the request succeeded.
    pub result: bool,
    /// Machine-readable status code, see [`status`].
    pub code: u16,
    /// Optional human-readable explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// An RPC response from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    /// Echo of the request type.
    pub request_type: String,
    /// Echo of the client correlation id.
    pub request_id: String,
    /// Outcome of the request.
    pub request_status: RequestStatus,
    /// Type-specific response payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
}

impl RequestResponse {
    /// Returns true when the request succeeded.
    pub fn is_success(&self) -> bool {
        self.request_status.result
    }

    /// Decodes the response payload of a `GetSceneList` request.
    pub fn scene_list(&self) -> Result<SceneList> {
        let data = self.response_data.clone().ok_or_else(|| {
            ProtocolError::MalformedFrame("GetSceneList response without responseData".to_string())
        })?;
        Ok(serde_json::from_value(data)?)
    }
}

/// Decoded payload of a `GetSceneList` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneList {
    /// Scene currently on program output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_program_scene_name: Option<String>,
    /// All scenes known to the surface.
    pub scenes: Vec<Scene>,
}

impl SceneList {
    /// Returns the scene names in the order the surface reports them.
    pub fn scene_names(&self) -> Vec<String> {
        self.scenes.iter().map(|s| s.scene_name.clone()).collect()
    }
}

/// One entry of a [`SceneList`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    /// User-visible scene name; the identifier used in switch requests.
    pub scene_name: String,
    /// Position in the surface's scene collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_index: Option<i64>,
}

/// A server-pushed event notification.
///
/// The daemon subscribes to no event categories, but a conforming decoder
/// still has to accept the opcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event type discriminator.
    pub event_type: String,
    /// Type-specific event payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<Value>,
}

/// Frames sent from the daemon to the control surface.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Session identification, response to `Hello`.
    Identify(Identify),
    /// An RPC request.
    Request(Request),
}

impl ClientMessage {
    /// Encodes the frame as a JSON text payload.
    pub fn to_json(&self) -> Result<String> {
        let (op, d) = match self {
            ClientMessage::Identify(payload) => (opcode::IDENTIFY, serde_json::to_value(payload)?),
            ClientMessage::Request(payload) => (opcode::REQUEST, serde_json::to_value(payload)?),
        };
        Ok(serde_json::to_string(&Envelope { op, d })?)
    }
}

/// Frames received from the control surface.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Greeting with version and authentication material.
    Hello(Hello),
    /// Session established.
    Identified(Identified),
    /// Pushed event notification.
    Event(Event),
    /// Response to an earlier request.
    RequestResponse(RequestResponse),
}

impl ServerMessage {
    /// Decodes a JSON text payload into a typed frame.
    pub fn from_json(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;
        match envelope.op {
            opcode::HELLO => Ok(ServerMessage::Hello(serde_json::from_value(envelope.d)?)),
            opcode::IDENTIFIED => Ok(ServerMessage::Identified(serde_json::from_value(
                envelope.d,
            )?)),
            opcode::EVENT => Ok(ServerMessage::Event(serde_json::from_value(envelope.d)?)),
            opcode::REQUEST_RESPONSE => Ok(ServerMessage::RequestResponse(serde_json::from_value(
                envelope.d,
            )?)),
            other => Err(ProtocolError::UnsupportedOpcode(other)),
        }
    }
}

/// Server-side encoding helpers.
///
/// The daemon never sends these frames, but the integration test harness
/// stands in for a control surface and needs to produce them.
pub mod server {
    use super::*;

    /// Encodes a `Hello` frame.
    pub fn hello(payload: &Hello) -> Result<String> {
        encode(opcode::HELLO, payload)
    }

    /// Encodes an `Identified` frame.
    pub fn identified(payload: &Identified) -> Result<String> {
        encode(opcode::IDENTIFIED, payload)
    }

    /// Encodes a `RequestResponse` frame.
    pub fn request_response(payload: &RequestResponse) -> Result<String> {
        encode(opcode::REQUEST_RESPONSE, payload)
    }

    /// Decodes a client frame; the mirror image of [`ServerMessage::from_json`].
    pub fn decode_client(text: &str) -> Result<ClientMessage> {
        let envelope: Envelope = serde_json::from_str(text)?;
        match envelope.op {
            opcode::IDENTIFY => Ok(ClientMessage::Identify(serde_json::from_value(envelope.d)?)),
            opcode::REQUEST => Ok(ClientMessage::Request(serde_json::from_value(envelope.d)?)),
            other => Err(ProtocolError::UnsupportedOpcode(other)),
        }
    }

    fn encode<T: Serialize>(op: u8, payload: &T) -> Result<String> {
        Ok(serde_json::to_string(&Envelope {
            op,
            d: serde_json::to_value(payload)?,
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_with_authentication() {
        let json = r#"{"op":0,"d":{"obsWebSocketVersion":"5.1.0","rpcVersion":1,"authentication":{"challenge":"ch","salt":"sa"}}}"#;
        match ServerMessage::from_json(json).unwrap() {
            ServerMessage::Hello(hello) => {
                assert_eq!(hello.rpc_version, 1);
                let auth = hello.authentication.unwrap();
                assert_eq!(auth.challenge, "ch");
                assert_eq!(auth.salt, "sa");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_hello_without_authentication() {
        let json = r#"{"op":0,"d":{"rpcVersion":1}}"#;
        match ServerMessage::from_json(json).unwrap() {
            ServerMessage::Hello(hello) => assert!(hello.authentication.is_none()),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_identify_encoding() {
        let msg = ClientMessage::Identify(Identify::new(Some("authstring".to_string())));
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"op\":1"));
        assert!(json.contains("\"rpcVersion\":1"));
        assert!(json.contains("\"authentication\":\"authstring\""));
        assert!(json.contains("\"eventSubscriptions\":0"));
    }

    #[test]
    fn test_identify_without_authentication_omits_field() {
        let msg = ClientMessage::Identify(Identify::new(None));
        let json = msg.to_json().unwrap();
        assert!(!json.contains("authentication"));
    }

    #[test]
    fn test_set_scene_request_encoding() {
        let msg = ClientMessage::Request(Request::set_current_program_scene("req-1", "editor"));
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"op\":6"));
        assert!(json.contains("\"requestType\":\"SetCurrentProgramScene\""));
        assert!(json.contains("\"requestId\":\"req-1\""));
        assert!(json.contains("\"sceneName\":\"editor\""));
    }

    #[test]
    fn test_get_scene_list_request_has_no_data() {
        let request = Request::get_scene_list("req-2");
        assert!(request.request_data.is_none());
        let json = ClientMessage::Request(request).to_json().unwrap();
        assert!(!json.contains("requestData"));
    }

    #[test]
    fn test_request_response_decoding() {
        let json = r#"{"op":7,"d":{"requestType":"SetCurrentProgramScene","requestId":"req-1","requestStatus":{"result":true,"code":100}}}"#;
        match ServerMessage::from_json(json).unwrap() {
            ServerMessage::RequestResponse(response) => {
                assert!(response.is_success());
                assert_eq!(response.request_id, "req-1");
                assert_eq!(response.request_status.code, status::SUCCESS);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_request_response_failure_with_comment() {
        let json = r#"{"op":7,"d":{"requestType":"SetCurrentProgramScene","requestId":"req-9","requestStatus":{"result":false,"code":600,"comment":"No source was found"}}}"#;
        match ServerMessage::from_json(json).unwrap() {
            ServerMessage::RequestResponse(response) => {
                assert!(!response.is_success());
                assert_eq!(response.request_status.code, status::RESOURCE_NOT_FOUND);
                assert_eq!(
                    response.request_status.comment.as_deref(),
                    Some("No source was found")
                );
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_scene_list_decoding() {
        let json = r#"{"op":7,"d":{"requestType":"GetSceneList","requestId":"req-3","requestStatus":{"result":true,"code":100},"responseData":{"currentProgramSceneName":"editor","scenes":[{"sceneName":"editor","sceneIndex":0},{"sceneName":"terminal","sceneIndex":1}]}}}"#;
        let response = match ServerMessage::from_json(json).unwrap() {
            ServerMessage::RequestResponse(response) => response,
            other => panic!("unexpected frame: {:?}", other),
        };
        let list = response.scene_list().unwrap();
        assert_eq!(list.current_program_scene_name.as_deref(), Some("editor"));
        assert_eq!(list.scene_names(), vec!["editor", "terminal"]);
    }

    #[test]
    fn test_scene_list_without_data_is_malformed() {
        let response = RequestResponse {
            request_type: "GetSceneList".to_string(),
            request_id: "req-4".to_string(),
            request_status: RequestStatus {
                result: true,
                code: status::SUCCESS,
                comment: None,
            },
            response_data: None,
        };
        assert!(matches!(
            response.scene_list(),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_event_decoding() {
        let json = r#"{"op":5,"d":{"eventType":"CurrentProgramSceneChanged","eventData":{"sceneName":"browser"}}}"#;
        match ServerMessage::from_json(json).unwrap() {
            ServerMessage::Event(event) => {
                assert_eq!(event.event_type, "CurrentProgramSceneChanged");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_opcode_is_rejected() {
        let json = r#"{"op":9,"d":{}}"#;
        assert!(matches!(
            ServerMessage::from_json(json),
            Err(ProtocolError::UnsupportedOpcode(9))
        ));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(matches!(
            ServerMessage::from_json("{not json"),
            Err(ProtocolError::Deserialization(_))
        ));
    }

    #[test]
    fn test_server_helpers_roundtrip() {
        let hello = Hello {
            obs_web_socket_version: Some("5.1.0".to_string()),
            rpc_version: RPC_VERSION,
            authentication: None,
        };
        let encoded = server::hello(&hello).unwrap();
        match ServerMessage::from_json(&encoded).unwrap() {
            ServerMessage::Hello(decoded) => assert_eq!(decoded, hello),
            other => panic!("unexpected frame: {:?}", other),
        }

        let request = Request::set_current_program_scene("id", "scene");
        let encoded = ClientMessage::Request(request.clone()).to_json().unwrap();
        match server::decode_client(&encoded).unwrap() {
            ClientMessage::Request(decoded) => assert_eq!(decoded, request),
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}
