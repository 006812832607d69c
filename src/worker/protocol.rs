//! Protocol definitions for events delivered to the notification worker

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest frame either side accepts
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Notification referenced by click and close events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickedNotification {
    /// Host-assigned notification id
    pub id: String,
    #[serde(default)]
    pub tag: Option<String>,
    /// Data attached when the notification was shown
    #[serde(default)]
    pub data: Value,
}

impl ClickedNotification {
    /// `data.url` when it is a non-empty string
    pub fn url(&self) -> Option<&str> {
        self.data
            .get("url")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// Event delivered by the host to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    /// Worker script installed
    Install,
    /// Worker became the active worker
    Activate,
    /// Message from the push service
    Push {
        /// Opaque payload bytes, base64 on the wire
        #[serde(default, with = "push_data")]
        data: Option<Vec<u8>>,
    },
    /// User clicked a notification or one of its actions
    NotificationClick {
        notification: ClickedNotification,
        #[serde(default)]
        action: Option<String>,
    },
    /// User dismissed a notification
    NotificationClose { notification: ClickedNotification },
    /// Message posted by a page
    Message { data: Value },
}

impl WorkerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Push { .. } => "push",
            WorkerEvent::NotificationClick { .. } => "notification_click",
            WorkerEvent::NotificationClose { .. } => "notification_close",
            WorkerEvent::Message { .. } => "message",
        }
    }
}

/// Page-to-worker control message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

impl ControlMessage {
    /// Recognise a control message; any other shape yields `None`
    pub fn parse(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

/// Worker reply, sent once the event's side effects have finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAck {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventAck {
    pub fn success(outcome: impl Into<String>) -> Self {
        Self {
            ok: true,
            outcome: Some(outcome.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            outcome: None,
            error: Some(error.into()),
        }
    }
}

mod push_data {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => serializer.serialize_some(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| BASE64.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
