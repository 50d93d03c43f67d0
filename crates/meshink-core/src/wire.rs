//! Wire format shared by all peers.
//!
//! Every frame is UTF-8 JSON of the form
//! ```json
//! { "kind": "canvas-state", "payload": [ <shape>, ... ] }
//! ```
//! There is no versioning or checksum; a frame carries one whole snapshot.

use crate::canvas::Snapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Envelope kind for a full canvas snapshot.
pub const KIND_CANVAS_STATE: &str = "canvas-state";

/// Largest inbound frame accepted for decoding (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Number of bytes in a [`Topic`].
pub const TOPIC_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed envelope: {0}")]
    Decode(serde_json::Error),
    #[error("failed to encode envelope: {0}")]
    Encode(serde_json::Error),
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },
    #[error("cannot encode message of unknown kind {0:?}")]
    UnknownKind(String),
}

#[derive(Debug, Error)]
pub enum TopicError {
    #[error("topic must be {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("topic is not valid hex")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Full canvas state; replaces whatever the receiver has.
    CanvasState(Snapshot),
    /// A kind this build does not understand. Receivers ignore it.
    Unknown { kind: String },
}

impl Message {
    pub fn kind(&self) -> &str {
        match self {
            Message::CanvasState(_) => KIND_CANVAS_STATE,
            Message::Unknown { kind } => kind,
        }
    }
}

#[derive(Serialize)]
struct OutgoingEnvelope<'a, P> {
    kind: &'a str,
    payload: &'a P,
}

#[derive(Deserialize)]
struct IncomingEnvelope {
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Encode a message into frame bytes.
pub fn encode(message: &Message) -> Result<Vec<u8>, WireError> {
    match message {
        Message::CanvasState(snapshot) => encode_snapshot(snapshot),
        Message::Unknown { kind } => Err(WireError::UnknownKind(kind.clone())),
    }
}

/// Encode a `canvas-state` frame without building a [`Message`] first.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, WireError> {
    serde_json::to_vec(&OutgoingEnvelope {
        kind: KIND_CANVAS_STATE,
        payload: snapshot,
    })
    .map_err(WireError::Encode)
}

/// Decode frame bytes into a message.
///
/// Unknown kinds decode successfully as [`Message::Unknown`]; only a known
/// kind with a bad payload, or a frame that is not an envelope, is an error.
pub fn decode(bytes: &[u8]) -> Result<Message, WireError> {
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: bytes.len(),
            limit: MAX_FRAME_SIZE,
        });
    }
    let envelope: IncomingEnvelope = serde_json::from_slice(bytes).map_err(WireError::Decode)?;
    match envelope.kind.as_str() {
        KIND_CANVAS_STATE => serde_json::from_value(envelope.payload)
            .map(Message::CanvasState)
            .map_err(WireError::Decode),
        _ => Ok(Message::Unknown {
            kind: envelope.kind,
        }),
    }
}

/// Identifier all participants of one document share out of band.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic([u8; TOPIC_LEN]);

impl Topic {
    pub fn new(bytes: [u8; TOPIC_LEN]) -> Self {
        Self(bytes)
    }

    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn from_hex(s: &str) -> Result<Self, TopicError> {
        let s = s.trim();
        if s.len() != TOPIC_LEN * 2 {
            return Err(TopicError::InvalidLength {
                expected: TOPIC_LEN * 2,
                actual: s.len(),
            });
        }
        let mut bytes = [0u8; TOPIC_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; TOPIC_LEN] {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.to_hex())
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{Freehand, Shape};
    use kurbo::Point;

    fn one_stroke() -> Snapshot {
        Snapshot::new(vec![Shape::Freehand(Freehand::from_points(vec![
            Point::new(1.0, 2.0),
            Point::new(3.0, 4.0),
        ]))])
    }

    #[test]
    fn test_encode_produces_envelope() {
        let bytes = encode(&Message::CanvasState(one_stroke())).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["kind"], KIND_CANVAS_STATE);
        assert!(value["payload"].is_array());
        assert_eq!(value["payload"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_decode_canvas_state() {
        let snapshot = one_stroke();
        let bytes = encode(&Message::CanvasState(snapshot.clone())).unwrap();
        assert_eq!(decode(&bytes).unwrap(), Message::CanvasState(snapshot));
    }

    #[test]
    fn test_decode_empty_snapshot() {
        let msg = decode(br#"{"kind":"canvas-state","payload":[]}"#).unwrap();
        assert_eq!(msg, Message::CanvasState(Snapshot::default()));
    }

    #[test]
    fn test_unknown_kind_is_not_an_error() {
        let msg = decode(br#"{"kind":"cursor","payload":{"x":1,"y":2}}"#).unwrap();
        assert_eq!(msg, Message::Unknown { kind: "cursor".into() });
        assert_eq!(msg.kind(), "cursor");

        let msg = decode(br#"{"kind":"ping"}"#).unwrap();
        assert!(matches!(msg, Message::Unknown { .. }));
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(decode(b"Hello world"), Err(WireError::Decode(_))));
        assert!(matches!(decode(br#"{"payload":[]}"#), Err(WireError::Decode(_))));
        assert!(matches!(
            decode(br#"{"kind":"canvas-state","payload":{"not":"a list"}}"#),
            Err(WireError::Decode(_))
        ));
        assert!(matches!(
            decode(br#"{"kind":"canvas-state","payload":[{"Blob":{}}]}"#),
            Err(WireError::Decode(_))
        ));
    }

    #[test]
    fn test_oversized_frame_rejected_before_parsing() {
        let bytes = vec![b' '; MAX_FRAME_SIZE + 1];
        assert!(matches!(decode(&bytes), Err(WireError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_unknown_kind_cannot_be_encoded() {
        let err = encode(&Message::Unknown { kind: "x".into() }).unwrap_err();
        assert!(matches!(err, WireError::UnknownKind(k) if k == "x"));
    }

    #[test]
    fn test_topic_hex() {
        let topic = Topic::new([0xab; TOPIC_LEN]);
        let hex = topic.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex.parse::<Topic>().unwrap(), topic);
        assert_eq!(topic.to_string(), hex);
    }

    #[test]
    fn test_topic_rejects_bad_input() {
        assert!(matches!(
            Topic::from_hex("abcd"),
            Err(TopicError::InvalidLength { expected: 64, actual: 4 })
        ));
        let not_hex = "zz".repeat(TOPIC_LEN);
        assert!(matches!(Topic::from_hex(&not_hex), Err(TopicError::InvalidHex(_))));
    }

    #[test]
    fn test_random_topics_differ() {
        assert_ne!(Topic::random(), Topic::random());
    }
}
