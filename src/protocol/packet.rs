//! Packet construction and the wire shape

use crate::error::{Error, Result};
use crate::protocol::Address;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Correlation id tying a response packet to its originating request
///
/// Random 128-bit value rendered as hex. Uniqueness only has to hold within
/// the issuing node's pending-request table, but random ids keep replies
/// unambiguous even across node restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random request id
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Wrap an existing id value
    pub fn from_string(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response-correlation block of a request packet
///
/// Present exactly when the sender expects a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTo {
    /// Id the response packet must echo back as its top-level `rid`
    pub rid: RequestId,
}

/// A request or notification packet
///
/// The payload object's keys are merged into the top level of the wire form
/// next to the header fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPacket {
    /// Originating endpoint
    pub sender: Address,
    /// Intended receiver
    pub receiver: Address,
    /// Handler name the receiver dispatches on
    pub request: String,
    /// Correlation block; absent for fire-and-forget notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseTo>,
    /// Opaque structured payload (always a JSON object)
    #[serde(flatten)]
    pub payload: Value,
}

/// A response packet traveling back toward the request's originator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePacket {
    /// Correlation id copied from the request's response block
    pub rid: RequestId,
    /// The endpoint that issued the original request
    pub request_origin: Address,
    /// Failure description; absent on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Opaque structured payload (always a JSON object)
    #[serde(flatten)]
    pub payload: Value,
}

/// Any packet crossing a channel
///
/// The two forms are distinguished structurally: the `Response` variant is
/// tried first, so a top-level `rid` plus `request_origin` marks a reply and
/// everything else parses as a request. Applications must not use the header
/// field names as payload keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Packet {
    /// Reply to an earlier request
    Response(ResponsePacket),
    /// Request or notification
    Request(RequestPacket),
}

impl RequestPacket {
    /// Build a fire-and-forget notification packet
    pub fn notification(sender: Address, receiver: Address, request: &str, payload: Value) -> Self {
        Self {
            sender,
            receiver,
            request: request.to_string(),
            response: None,
            payload,
        }
    }

    /// Build a request packet expecting a correlated response
    pub fn request(
        sender: Address,
        receiver: Address,
        request: &str,
        rid: RequestId,
        payload: Value,
    ) -> Self {
        Self {
            sender,
            receiver,
            request: request.to_string(),
            response: Some(ResponseTo { rid }),
            payload,
        }
    }
}

impl ResponsePacket {
    /// Build a successful response carrying a handler's result
    pub fn ok(rid: RequestId, request_origin: Address, payload: Value) -> Self {
        Self {
            rid,
            request_origin,
            error: None,
            payload,
        }
    }

    /// Build an error response carrying a failure description
    pub fn failure(rid: RequestId, request_origin: Address, error: String) -> Self {
        Self {
            rid,
            request_origin,
            error: Some(error),
            payload: Value::Object(Default::default()),
        }
    }
}

/// Normalize a serialized payload into the object form packets require
///
/// Unit payloads (`()`, fieldless structs) serialize to `null` and are
/// promoted to the empty object; anything else that is not an object cannot
/// be merged into the packet's top level and is rejected.
pub(crate) fn object_payload(value: Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Object(Default::default())),
        Value::Object(map) => Ok(Value::Object(map)),
        _ => Err(Error::NonObjectPayload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_id_is_unique_hex() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 32);
        assert!(a.to_string().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_notification_wire_shape_omits_response_block() {
        let p = RequestPacket::notification(
            Address::Background,
            Address::Popup,
            "DeviceChanged",
            json!({ "device": 3 }),
        );
        let wire = serde_json::to_value(Packet::Request(p)).unwrap();
        assert_eq!(
            wire,
            json!({
                "sender": "Background",
                "receiver": "Popup",
                "request": "DeviceChanged",
                "device": 3,
            })
        );
    }

    #[test]
    fn test_request_wire_shape_nests_rid() {
        let rid = RequestId::from_string("abc123".into());
        let p = RequestPacket::request(
            Address::Injected,
            Address::Native,
            "Open",
            rid,
            json!({ "path": "/dev/hidraw0" }),
        );
        let wire = serde_json::to_value(Packet::Request(p)).unwrap();
        assert_eq!(
            wire,
            json!({
                "sender": "Injected",
                "receiver": "Native",
                "request": "Open",
                "response": { "rid": "abc123" },
                "path": "/dev/hidraw0",
            })
        );
    }

    #[test]
    fn test_response_wire_shape() {
        let rid = RequestId::from_string("abc123".into());
        let ok = ResponsePacket::ok(rid.clone(), Address::Injected, json!({ "fd": 7 }));
        let wire = serde_json::to_value(Packet::Response(ok)).unwrap();
        assert_eq!(
            wire,
            json!({
                "rid": "abc123",
                "request_origin": "Injected",
                "fd": 7,
            })
        );

        let err = ResponsePacket::failure(rid, Address::Injected, "denied".into());
        let wire = serde_json::to_value(Packet::Response(err)).unwrap();
        assert_eq!(
            wire,
            json!({
                "rid": "abc123",
                "request_origin": "Injected",
                "error": "denied",
            })
        );
    }

    #[test]
    fn test_packet_without_rid_parses_as_request() {
        let wire = json!({
            "sender": "Content",
            "receiver": "Background",
            "request": "Ping",
        });
        match serde_json::from_value::<Packet>(wire).unwrap() {
            Packet::Request(p) => {
                assert_eq!(p.request, "Ping");
                assert!(p.response.is_none());
            }
            Packet::Response(_) => panic!("parsed notification as response"),
        }
    }

    #[test]
    fn test_packet_with_rid_parses_as_response() {
        let wire = json!({
            "rid": "deadbeef",
            "request_origin": "Popup",
            "granted": true,
        });
        match serde_json::from_value::<Packet>(wire).unwrap() {
            Packet::Response(p) => {
                assert_eq!(p.rid, RequestId::from_string("deadbeef".into()));
                assert_eq!(p.request_origin, Address::Popup);
                assert_eq!(p.payload["granted"], json!(true));
            }
            Packet::Request(_) => panic!("parsed response as request"),
        }
    }

    #[test]
    fn test_object_payload_normalization() {
        assert_eq!(object_payload(json!(null)).unwrap(), json!({}));
        assert_eq!(object_payload(json!({ "a": 1 })).unwrap(), json!({ "a": 1 }));
        assert!(matches!(
            object_payload(json!(42)),
            Err(Error::NonObjectPayload)
        ));
    }
}
