use serde::{Deserialize, Serialize};

/// Messages the sync server pushes to a client.
///
/// Every optional field is a delta: absence means "no change", never "reset".
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Liveness check, answered with `pong`.
    Ping,

    /// Room created with this client as host.
    Hosted {
        #[serde(alias = "room")]
        room_code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<i64>,
    },

    /// Joined an existing room as a viewer.
    Joined {
        #[serde(alias = "room")]
        room_code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<i64>,
    },

    /// New media is about to play; always arrives paused.
    Prepare(PreparePush),

    /// Partial playback state update.
    State(StatePush),

    Presence {
        #[serde(default, alias = "presence", skip_serializing_if = "Option::is_none")]
        count: Option<u32>,
    },

    Readiness(ReadinessPush),

    Stats(StatsPush),

    /// Either side may be missing; the current room size fills it in.
    Layout {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<i64>,
    },

    Error {
        #[serde(default)]
        message: String,
    },

    /// Any `type` this client does not understand.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreparePush {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatePush {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time_ms: Option<i64>,
}

impl StatePush {
    /// Pushes that carry a media or play/pause edge must never be rate limited.
    pub fn is_important(&self) -> bool {
        self.url.is_some() || self.media_id.is_some() || self.is_playing.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessPush {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatsPush {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak: Option<u32>,
    /// Legacy servers embed `current=<n> peak=<n>` here instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Messages a client sends to the sync server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Ask the server for connection counts.
    Stats,
    Pong,
    Host {
        url: String,
        width: u32,
        height: u32,
    },
    Join {
        room_code: String,
    },
    Leave,
    Play {
        is_playing: bool,
    },
    Seek {
        position_seconds: f64,
    },
    PushUrl {
        url: String,
    },
    Ready {
        media_id: String,
    },
    Layout {
        width: u32,
        height: u32,
    },
}

impl ServerMessage {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Hosted { .. } => "hosted",
            Self::Joined { .. } => "joined",
            Self::Prepare(_) => "prepare",
            Self::State(_) => "state",
            Self::Presence { .. } => "presence",
            Self::Readiness(_) => "readiness",
            Self::Stats(_) => "stats",
            Self::Layout { .. } => "layout",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_push_keeps_absent_fields_absent() {
        let msg: ServerMessage =
            serde_json::from_value(json!({"type": "state", "isPlaying": true})).unwrap();
        match msg {
            ServerMessage::State(push) => {
                assert_eq!(push.is_playing, Some(true));
                assert!(push.url.is_none());
                assert!(push.position_seconds.is_none());
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_decodes_to_unknown() {
        let msg: ServerMessage =
            serde_json::from_value(json!({"type": "fireworks", "color": "red"})).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
    }

    #[test]
    fn test_hosted_accepts_room_alias() {
        let msg: ServerMessage =
            serde_json::from_value(json!({"type": "hosted", "room": "ABCD"})).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Hosted {
                room_code: "ABCD".into(),
                width: None,
                height: None
            }
        );
    }

    #[test]
    fn test_partial_pushes_decode() {
        let msg: ServerMessage =
            serde_json::from_value(json!({"type": "layout", "width": 1280})).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Layout {
                width: Some(1280),
                height: None
            }
        );

        let msg: ServerMessage = serde_json::from_value(json!({"type": "presence"})).unwrap();
        assert_eq!(msg, ServerMessage::Presence { count: None });

        let msg: ServerMessage =
            serde_json::from_value(json!({"type": "readiness", "presence": 5})).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Readiness(ReadinessPush {
                ready_count: None,
                ready_total: None,
                presence: Some(5),
            })
        );
    }

    #[test]
    fn test_presence_accepts_both_field_names() {
        let msg: ServerMessage =
            serde_json::from_value(json!({"type": "presence", "presence": 3})).unwrap();
        assert_eq!(msg, ServerMessage::Presence { count: Some(3) });
        let msg: ServerMessage =
            serde_json::from_value(json!({"type": "presence", "count": 4})).unwrap();
        assert_eq!(msg, ServerMessage::Presence { count: Some(4) });
    }

    #[test]
    fn test_client_message_wire_shape() {
        let value = serde_json::to_value(ClientMessage::PushUrl {
            url: "https://example.com/v".into(),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "push_url", "url": "https://example.com/v"}));

        let value = serde_json::to_value(ClientMessage::Play { is_playing: false }).unwrap();
        assert_eq!(value, json!({"type": "play", "isPlaying": false}));

        let value = serde_json::to_value(ClientMessage::Pong).unwrap();
        assert_eq!(value, json!({"type": "pong"}));
    }

    #[test]
    fn test_importance_classification() {
        assert!(!StatePush {
            position_seconds: Some(3.0),
            ..Default::default()
        }
        .is_important());
        assert!(StatePush {
            is_playing: Some(false),
            ..Default::default()
        }
        .is_important());
        assert!(StatePush {
            url: Some("x".into()),
            ..Default::default()
        }
        .is_important());
    }
}
