//! Wire format of the control-surface WebSocket protocol.
//!
//! Every frame is a JSON text message `{"op": <u8>, "d": {...}}`. The op code
//! selects the shape of `d`. Only the messages this client sends or consumes
//! get typed payloads; batch requests are recognised but not issued.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// RPC version announced in `Identify`.
pub const RPC_VERSION: u32 = 1;

// ── Op codes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Hello = 0,
    Identify = 1,
    Identified = 2,
    Reidentify = 3,
    Event = 5,
    Request = 6,
    RequestResponse = 7,
    RequestBatch = 8,
    RequestBatchResponse = 9,
}

impl TryFrom<u8> for OpCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Hello,
            1 => Self::Identify,
            2 => Self::Identified,
            3 => Self::Reidentify,
            5 => Self::Event,
            6 => Self::Request,
            7 => Self::RequestResponse,
            8 => Self::RequestBatch,
            9 => Self::RequestBatchResponse,
            other => return Err(Error::Protocol(format!("unknown op code {other}"))),
        })
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op as u8
    }
}

// ── Event subscription mask ──────────────────────────────────────────

/// Bitmask of event categories requested in `Identify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventSubscription(pub u32);

impl EventSubscription {
    pub const NONE: Self = Self(0);
    pub const GENERAL: Self = Self(1 << 0);
    pub const CONFIG: Self = Self(1 << 1);
    pub const SCENES: Self = Self(1 << 2);
    pub const INPUTS: Self = Self(1 << 3);
    pub const TRANSITIONS: Self = Self(1 << 4);
    pub const FILTERS: Self = Self(1 << 5);
    pub const OUTPUTS: Self = Self(1 << 6);
    pub const SCENE_ITEMS: Self = Self(1 << 7);
    pub const MEDIA_INPUTS: Self = Self(1 << 8);
    pub const VENDORS: Self = Self(1 << 9);
    pub const UI: Self = Self(1 << 10);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for EventSubscription {
    fn default() -> Self {
        Self::GENERAL | Self::SCENES | Self::TRANSITIONS
    }
}

impl std::ops::BitOr for EventSubscription {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ── Envelope ─────────────────────────────────────────────────────────

/// Raw frame as it travels over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

/// Decoded inbound frame.
#[derive(Debug, Clone)]
pub enum Inbound {
    Hello(Hello),
    Identified(Identified),
    Event(EventMessage),
    RequestResponse(RequestResponse),
    /// Frames the client recognises but has no use for.
    Ignored(OpCode),
}

// ── Payloads ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default, rename = "obsWebSocketVersion")]
    pub server_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    pub event_subscriptions: EventSubscription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub event_type: String,
    #[serde(default)]
    pub event_intent: u32,
    #[serde(default)]
    pub event_data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_type: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

impl RequestResponse {
    /// Convert a non-success status into [`Error::RequestFailed`].
    pub fn into_result(self) -> Result<Value, Error> {
        if self.request_status.result {
            Ok(self.response_data.unwrap_or(Value::Null))
        } else {
            Err(Error::RequestFailed {
                request_type: self.request_type,
                code: self.request_status.code,
                comment: self.request_status.comment,
            })
        }
    }
}

// ── Codec ────────────────────────────────────────────────────────────

/// Serialize a payload into a text frame with the given op code.
pub fn encode<T: Serialize>(op: OpCode, payload: &T) -> Result<String, Error> {
    let envelope = Envelope {
        op: op.into(),
        d: serde_json::to_value(payload)?,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Parse a text frame into a typed inbound message.
///
/// Unknown op codes and payloads that do not match their op code are
/// reported as [`Error::Protocol`]; the caller decides whether to drop the
/// frame or the connection.
pub fn decode(text: &str) -> Result<Inbound, Error> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let op = OpCode::try_from(envelope.op)?;

    let payload_err =
        |e: serde_json::Error| Error::Protocol(format!("malformed {op:?} payload: {e}"));

    Ok(match op {
        OpCode::Hello => Inbound::Hello(serde_json::from_value(envelope.d).map_err(payload_err)?),
        OpCode::Identified => {
            Inbound::Identified(serde_json::from_value(envelope.d).map_err(payload_err)?)
        }
        OpCode::Event => Inbound::Event(serde_json::from_value(envelope.d).map_err(payload_err)?),
        OpCode::RequestResponse => {
            Inbound::RequestResponse(serde_json::from_value(envelope.d).map_err(payload_err)?)
        }
        other => Inbound::Ignored(other),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identify_encodes_camel_case_with_mask() {
        let identify = Identify {
            rpc_version: RPC_VERSION,
            authentication: Some("secret".into()),
            event_subscriptions: EventSubscription::default(),
        };
        let text = encode(OpCode::Identify, &identify).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["op"], 1);
        assert_eq!(value["d"]["rpcVersion"], 1);
        assert_eq!(value["d"]["authentication"], "secret");
        assert_eq!(value["d"]["eventSubscriptions"], 1 | 4 | 16);
    }

    #[test]
    fn identify_without_token_omits_authentication() {
        let identify = Identify {
            rpc_version: RPC_VERSION,
            authentication: None,
            event_subscriptions: EventSubscription::GENERAL,
        };
        let text = encode(OpCode::Identify, &identify).unwrap();
        assert!(!text.contains("authentication"));
    }

    #[test]
    fn decode_hello_with_challenge() {
        let text = json!({
            "op": 0,
            "d": {
                "obsWebSocketVersion": "5.1.0",
                "rpcVersion": 1,
                "authentication": { "challenge": "abc", "salt": "xyz" }
            }
        })
        .to_string();

        let Inbound::Hello(hello) = decode(&text).unwrap() else {
            panic!("expected Hello");
        };
        assert_eq!(hello.server_version.as_deref(), Some("5.1.0"));
        assert_eq!(hello.authentication.unwrap().salt, "xyz");
    }

    #[test]
    fn decode_request_response_failure_maps_to_request_failed() {
        let text = json!({
            "op": 7,
            "d": {
                "requestType": "SetCurrentProgramScene",
                "requestId": "3",
                "requestStatus": { "result": false, "code": 600, "comment": "missing" }
            }
        })
        .to_string();

        let Inbound::RequestResponse(resp) = decode(&text).unwrap() else {
            panic!("expected RequestResponse");
        };
        assert_eq!(resp.request_id, "3");
        let err = resp.into_result().unwrap_err();
        assert!(matches!(err, Error::RequestFailed { code: 600, .. }));
    }

    #[test]
    fn decode_event_defaults_missing_data() {
        let text = r#"{"op":5,"d":{"eventType":"ExitStarted","eventIntent":1}}"#;
        let Inbound::Event(event) = decode(text).unwrap() else {
            panic!("expected Event");
        };
        assert_eq!(event.event_type, "ExitStarted");
        assert!(event.event_data.is_null());
    }

    #[test]
    fn unknown_op_code_is_protocol_error() {
        let err = decode(r#"{"op":4,"d":{}}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn batch_response_is_ignored_not_rejected() {
        let inbound = decode(r#"{"op":9,"d":{"requestId":"b1","results":[]}}"#).unwrap();
        assert!(matches!(
            inbound,
            Inbound::Ignored(OpCode::RequestBatchResponse)
        ));
    }

    #[test]
    fn malformed_payload_names_the_op() {
        let err = decode(r#"{"op":2,"d":{"wrong":true}}"#).unwrap_err();
        let Error::Protocol(msg) = err else {
            panic!("expected Protocol error");
        };
        assert!(msg.contains("Identified"));
    }
}
