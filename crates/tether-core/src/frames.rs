use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, MessageId, SessionId};

/// Inbound realtime envelope, discriminated by `type`. Frames may omit
/// `session_id`; the receiver then attributes them to the session whose
/// stream the channel is currently carrying.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "message")]
    Message {
        id: MessageId,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<AgentId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_name: Option<String>,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },

    #[serde(rename = "typing")]
    Typing {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        data: TypingData,
    },

    #[serde(rename = "stream_chunk")]
    StreamChunk {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        message_id: MessageId,
        chunk: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<AgentId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_name: Option<String>,
    },

    #[serde(rename = "message_completed")]
    MessageCompleted {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        message_id: MessageId,
    },

    #[serde(rename = "error")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        data: ErrorData,
    },

    /// Frame types this client does not understand. Kept as a real variant
    /// so dispatch can reject them with a typed error instead of a parse
    /// failure tearing down the read loop.
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TypingData {
    #[serde(default)]
    pub is_typing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServerFrame {
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Message { session_id, .. }
            | Self::Typing { session_id, .. }
            | Self::StreamChunk { session_id, .. }
            | Self::MessageCompleted { session_id, .. }
            | Self::Error { session_id, .. } => session_id.as_ref(),
            Self::Unknown => None,
        }
    }

    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
            Self::StreamChunk { .. } => "stream_chunk",
            Self::MessageCompleted { .. } => "message_completed",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// Outbound realtime envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "chat")]
    Chat { data: ChatSend },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatSend {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub message: String,
    pub message_id: MessageId,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_frame_parses() {
        let json = r#"{"type":"message","id":"msg_1","session_id":"sess_1",
                       "agent_id":"agent_1","agent_name":"Atlas","content":"hi",
                       "timestamp":"2026-08-01T12:00:00Z"}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.frame_type(), "message");
        assert_eq!(frame.session_id().unwrap().as_str(), "sess_1");
    }

    #[test]
    fn typing_frame_parses_nested_data() {
        let json = r#"{"type":"typing","data":{"is_typing":true,"agent_name":"Atlas"}}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        match frame {
            ServerFrame::Typing { session_id, data } => {
                assert!(session_id.is_none());
                assert!(data.is_typing);
                assert_eq!(data.agent_name.as_deref(), Some("Atlas"));
            }
            other => panic!("expected typing frame, got {other:?}"),
        }
    }

    #[test]
    fn stream_chunk_requires_message_id_and_chunk() {
        let json = r#"{"type":"stream_chunk","message_id":"msg_1","chunk":"Hel"}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.frame_type(), "stream_chunk");

        let missing = r#"{"type":"stream_chunk","chunk":"Hel"}"#;
        assert!(serde_json::from_str::<ServerFrame>(missing).is_err());
    }

    #[test]
    fn error_frame_parses_nested_message() {
        let json = r#"{"type":"error","data":{"message":"agent unavailable"}}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        match frame {
            ServerFrame::Error { data, .. } => {
                assert_eq!(data.message.as_deref(), Some("agent unavailable"));
            }
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_type_parses_as_unknown() {
        let json = r#"{"type":"workflow_update","data":{"step":3}}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        assert!(matches!(frame, ServerFrame::Unknown));
        assert_eq!(frame.frame_type(), "unknown");
    }

    #[test]
    fn server_frame_serde_roundtrip() {
        let frames = vec![
            ServerFrame::Message {
                id: MessageId::new(),
                session_id: Some(SessionId::new()),
                agent_id: Some(AgentId::new()),
                agent_name: Some("Atlas".into()),
                content: "hello".into(),
                timestamp: Some(Utc::now()),
            },
            ServerFrame::StreamChunk {
                session_id: None,
                message_id: MessageId::new(),
                chunk: "Hel".into(),
                agent_id: None,
                agent_name: None,
            },
            ServerFrame::MessageCompleted {
                session_id: Some(SessionId::new()),
                message_id: MessageId::new(),
            },
        ];

        for frame in &frames {
            let json = serde_json::to_string(frame).unwrap();
            let parsed: ServerFrame = serde_json::from_str(&json).unwrap();
            let json2 = serde_json::to_string(&parsed).unwrap();
            assert_eq!(json, json2, "roundtrip failed for {json}");
        }
    }

    #[test]
    fn chat_frame_wire_shape() {
        let frame = ClientFrame::Chat {
            data: ChatSend {
                agent_id: Some(AgentId::from_raw("agent_1")),
                message: "hello".into(),
                message_id: MessageId::from_raw("msg_1"),
                session_id: SessionId::from_raw("sess_1"),
                metadata: serde_json::Map::new(),
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "chat");
        assert_eq!(json["data"]["message"], "hello");
        assert_eq!(json["data"]["message_id"], "msg_1");
        assert_eq!(json["data"]["session_id"], "sess_1");
        assert!(json["data"].get("metadata").is_none());
    }
}
