//! Wire protocol shapes.
//!
//! Clients speak JSON over the socket. Inbound frames are flat objects with a
//! numeric `type` discriminator; internally they are converted to an
//! [`Envelope`] plus a tagged [`Payload`] so routing can match exhaustively.
//! Outbound responses come in two shapes: [`ChatResponse`] for text and file
//! messages (private and group alike) and [`AvResponse`] for call signalling,
//! which carries the opaque `avData` blob on top.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::constants::AVATAR_PREFIX;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty receive id")]
    EmptyReceiveId,
}

/// Message discriminator. On the wire this is the numeric `type` field:
/// `0` text, `2` file, `3` audio/video signalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    File,
    AudioOrVideo,
}

impl MessageKind {
    pub fn code(self) -> u8 {
        match self {
            MessageKind::Text => 0,
            MessageKind::File => 2,
            MessageKind::AudioOrVideo => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MessageKind::Text),
            2 => Some(MessageKind::File),
            3 => Some(MessageKind::AudioOrVideo),
            _ => None,
        }
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        MessageKind::from_code(code)
            .ok_or_else(|| de::Error::custom(format!("unknown message type {code}")))
    }
}

/// Raw inbound frame as the client sends it.
///
/// Fields the client omits decode to empty strings, matching what loosely
/// typed frontends actually send.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFrame {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub send_id: String,
    #[serde(default)]
    pub send_name: String,
    #[serde(default)]
    pub send_avatar: String,
    #[serde(default)]
    pub receive_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub file_size: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub av_data: String,
}

/// Fields common to every message regardless of kind.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub session_id: String,
    pub send_id: String,
    pub send_name: String,
    pub send_avatar: String,
    pub receive_id: String,
}

/// Kind-specific message content.
#[derive(Debug, Clone)]
pub enum Payload {
    Text {
        content: String,
    },
    File {
        url: String,
        file_size: String,
        file_type: String,
        file_name: String,
    },
    AudioOrVideo {
        /// Raw `avData` JSON string, passed through untouched.
        av_data: String,
    },
}

/// A decoded inbound message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub envelope: Envelope,
    pub payload: Payload,
}

impl InboundMessage {
    /// Decode a raw wire frame.
    pub fn decode(raw: &[u8]) -> Result<Self, ProtocolError> {
        let frame: ChatFrame = serde_json::from_slice(raw)?;
        if frame.receive_id.is_empty() {
            return Err(ProtocolError::EmptyReceiveId);
        }
        Ok(frame.into())
    }

    pub fn kind(&self) -> MessageKind {
        match self.payload {
            Payload::Text { .. } => MessageKind::Text,
            Payload::File { .. } => MessageKind::File,
            Payload::AudioOrVideo { .. } => MessageKind::AudioOrVideo,
        }
    }
}

impl From<ChatFrame> for InboundMessage {
    fn from(frame: ChatFrame) -> Self {
        let envelope = Envelope {
            session_id: frame.session_id,
            send_id: frame.send_id,
            send_name: frame.send_name,
            send_avatar: frame.send_avatar,
            receive_id: frame.receive_id,
        };
        let payload = match frame.kind {
            MessageKind::Text => Payload::Text {
                content: frame.content,
            },
            MessageKind::File => Payload::File {
                url: frame.url,
                file_size: frame.file_size,
                file_type: frame.file_type,
                file_name: frame.file_name,
            },
            MessageKind::AudioOrVideo => Payload::AudioOrVideo {
                av_data: frame.av_data,
            },
        };
        InboundMessage { envelope, payload }
    }
}

/// Parsed call-signalling envelope carried inside `avData`.
///
/// `avData` is itself a JSON string; only `messageId` and `type` matter to
/// the server, everything else rides along for the peers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvData {
    #[serde(default)]
    pub message_id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl AvData {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Whether this signalling frame records a call event worth persisting.
    /// Everything else (ICE candidates, SDP relays, …) passes through.
    pub fn is_call_event(&self) -> bool {
        self.message_id == "PROXY"
            && matches!(self.kind.as_str(), "start_call" | "receive_call" | "reject_call")
    }
}

/// Response shape for text and file messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub send_id: String,
    pub send_name: String,
    pub send_avatar: String,
    pub receive_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub url: String,
    pub file_size: String,
    pub file_name: String,
    pub file_type: String,
    pub created_at: String,
}

/// Response shape for call signalling: [`ChatResponse`] plus the raw blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvResponse {
    #[serde(flatten)]
    pub base: ChatResponse,
    pub av_data: String,
}

/// Strip everything before the `/static/` segment of an avatar path.
///
/// Frontends sometimes send absolute URLs (`https://host/static/a.png`);
/// stored and echoed avatars must be host-independent. A path without the
/// segment normalizes to the empty string.
pub fn normalize_avatar(path: &str) -> String {
    match path.find(AVATAR_PREFIX) {
        Some(idx) => path[idx..].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_text_frame() {
        let raw = br#"{
            "sessionId": "S10000000001",
            "sendId": "U001",
            "sendName": "alice",
            "sendAvatar": "https://x/static/a.png",
            "receiveId": "U002",
            "type": 0,
            "content": "hi"
        }"#;

        let msg = InboundMessage::decode(raw).unwrap();
        assert_eq!(msg.kind(), MessageKind::Text);
        assert_eq!(msg.envelope.send_id, "U001");
        assert_eq!(msg.envelope.receive_id, "U002");
        match msg.payload {
            Payload::Text { content } => assert_eq!(content, "hi"),
            other => panic!("expected text payload, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let raw = br#"{"sendId":"U001","receiveId":"U002","type":7}"#;
        assert!(matches!(
            InboundMessage::decode(raw),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn decode_rejects_empty_receive_id() {
        let raw = br#"{"sendId":"U001","type":0,"content":"hi"}"#;
        assert!(matches!(
            InboundMessage::decode(raw),
            Err(ProtocolError::EmptyReceiveId)
        ));
    }

    #[test]
    fn av_gate_accepts_call_events_only() {
        let start = AvData::parse(r#"{"messageId":"PROXY","type":"start_call"}"#).unwrap();
        assert!(start.is_call_event());

        let reject = AvData::parse(r#"{"messageId":"PROXY","type":"reject_call"}"#).unwrap();
        assert!(reject.is_call_event());

        let candidate =
            AvData::parse(r#"{"messageId":"U002","type":"candidate","candidate":{}}"#).unwrap();
        assert!(!candidate.is_call_event());

        let wrong_kind = AvData::parse(r#"{"messageId":"PROXY","type":"hang_up"}"#).unwrap();
        assert!(!wrong_kind.is_call_event());
    }

    #[test]
    fn normalize_avatar_strips_host() {
        assert_eq!(
            normalize_avatar("https://127.0.0.1:8000/static/avatars/a.png"),
            "/static/avatars/a.png"
        );
        assert_eq!(normalize_avatar("/static/a.png"), "/static/a.png");
        assert_eq!(normalize_avatar("avatars/a.png"), "");
        assert_eq!(normalize_avatar(""), "");
    }

    #[test]
    fn response_field_names() {
        let rsp = ChatResponse {
            send_id: "U001".into(),
            send_name: "alice".into(),
            send_avatar: "/static/a.png".into(),
            receive_id: "U002".into(),
            kind: MessageKind::Text,
            content: "hi".into(),
            url: String::new(),
            file_size: "0B".into(),
            file_name: String::new(),
            file_type: String::new(),
            created_at: "2026-08-01 12:00:00".into(),
        };

        let value = serde_json::to_value(&rsp).unwrap();
        assert_eq!(value["sendId"], "U001");
        assert_eq!(value["type"], 0);
        assert_eq!(value["createdAt"], "2026-08-01 12:00:00");
        assert!(value.get("avData").is_none());

        let av = AvResponse {
            base: rsp,
            av_data: r#"{"messageId":"PROXY","type":"start_call"}"#.into(),
        };
        let value = serde_json::to_value(&av).unwrap();
        assert_eq!(value["type"], 0);
        assert!(value.get("avData").is_some());
    }

    #[test]
    fn response_round_trips_through_cache_encoding() {
        let rsp = ChatResponse {
            send_id: "U001".into(),
            send_name: "alice".into(),
            send_avatar: "/static/a.png".into(),
            receive_id: "G100".into(),
            kind: MessageKind::File,
            content: String::new(),
            url: "/static/files/report.pdf".into(),
            file_size: "12KB".into(),
            file_name: "report.pdf".into(),
            file_type: "pdf".into(),
            created_at: "2026-08-01 12:00:00".into(),
        };

        let encoded = serde_json::to_string(&vec![rsp.clone()]).unwrap();
        let decoded: Vec<ChatResponse> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, vec![rsp]);
    }
}
