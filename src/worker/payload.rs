//! Notification payloads and their construction from untrusted push data

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Tag attached to notifications built from push events
pub const PUSH_NOTIFICATION_TAG: &str = "push-notification";
/// Tag attached to the demonstration notification
pub const TEST_NOTIFICATION_TAG: &str = "test-notification";

/// Fallback values for fields a push payload leaves out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDefaults {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_body")]
    pub body: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_badge")]
    pub badge: String,
}

fn default_title() -> String {
    "New Notification".to_string()
}

fn default_body() -> String {
    "You have a new message".to_string()
}

fn default_icon() -> String {
    "/icons/icon-192.png".to_string()
}

fn default_badge() -> String {
    "/icons/badge-72.png".to_string()
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: default_title(),
            body: default_body(),
            icon: default_icon(),
            badge: default_badge(),
        }
    }
}

/// Action button shown on a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Everything needed to display one notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Always carries `url`, the click target, plus any extra entries
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub require_interaction: bool,
}

impl NotificationPayload {
    /// Default notification pointing at `scope`
    pub fn with_defaults(scope: &str, defaults: &NotificationDefaults) -> Self {
        let mut data = Map::new();
        data.insert("url".to_string(), Value::String(scope.to_string()));

        Self {
            title: defaults.title.clone(),
            body: defaults.body.clone(),
            icon: Some(defaults.icon.clone()),
            badge: Some(defaults.badge.clone()),
            image: None,
            data,
            actions: Vec::new(),
            tag: Some(PUSH_NOTIFICATION_TAG.to_string()),
            require_interaction: false,
        }
    }

    /// Build a notification from the bytes delivered with a push event.
    ///
    /// JSON objects are merged over the defaults. Bytes that are not JSON
    /// become the body text. Never fails.
    pub fn from_push(data: Option<&[u8]>, scope: &str, defaults: &NotificationDefaults) -> Self {
        let mut payload = Self::with_defaults(scope, defaults);

        let bytes = match data {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return payload,
        };

        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(fields)) => payload.merge(&fields),
            Ok(other) => {
                debug!("Push data is JSON but not an object ({}), keeping defaults", other);
            }
            Err(e) => {
                debug!("Push data is not JSON ({}), using it as body text", e);
                payload.body = String::from_utf8_lossy(bytes).into_owned();
            }
        }

        payload
    }

    /// Fixed demonstration notification shown on request from the page
    pub fn test_notification(origin: &str, defaults: &NotificationDefaults) -> Self {
        let mut payload = Self::with_defaults(origin, defaults);
        payload.title = "Test Notification".to_string();
        payload.body = "This is a test notification from your site".to_string();
        payload.tag = Some(TEST_NOTIFICATION_TAG.to_string());
        payload
    }

    /// Click target
    pub fn url(&self) -> Option<&str> {
        self.data.get("url").and_then(Value::as_str)
    }

    fn merge(&mut self, fields: &Map<String, Value>) {
        if let Some(title) = non_empty_str(fields, "title") {
            self.title = title.to_string();
        }
        if let Some(body) = non_empty_str(fields, "body") {
            self.body = body.to_string();
        }
        if let Some(icon) = non_empty_str(fields, "icon") {
            self.icon = Some(icon.to_string());
        }
        if let Some(image) = non_empty_str(fields, "image") {
            self.image = Some(image.to_string());
        }
        if let Some(badge) = non_empty_str(fields, "badge") {
            self.badge = Some(badge.to_string());
        }
        if let Some(url) = non_empty_str(fields, "clickAction") {
            self.data
                .insert("url".to_string(), Value::String(url.to_string()));
        }
        // Extra data wins over clickAction, including for `url`
        if let Some(Value::Object(extra)) = fields.get("data") {
            for (key, value) in extra {
                self.data.insert(key.clone(), value.clone());
            }
        }
        if let Some(Value::Array(actions)) = fields.get("actions") {
            self.actions = actions
                .iter()
                .filter_map(|a| serde_json::from_value::<NotificationAction>(a.clone()).ok())
                .collect();
        }
    }
}

fn non_empty_str<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
