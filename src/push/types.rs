//! Types shared between the subscription manager, the host boundary and the UI

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Permission snapshot as seen by callers of the capability detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// Host lacks notification, worker or push capability
    Unsupported,
    /// User has not decided yet
    Default,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionState::Unsupported => "unsupported",
            PermissionState::Default => "default",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        }
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live permission value held by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    #[default]
    Default,
    Granted,
    Denied,
}

impl From<NotificationPermission> for PermissionState {
    fn from(permission: NotificationPermission) -> Self {
        match permission {
            NotificationPermission::Default => PermissionState::Default,
            NotificationPermission::Granted => PermissionState::Granted,
            NotificationPermission::Denied => PermissionState::Denied,
        }
    }
}

/// Raw encryption keys of a push subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionKeys {
    pub p256dh: Vec<u8>,
    pub auth: Vec<u8>,
}

/// Push subscription owned by the host platform.
///
/// The manager never mutates one of these; it only reads what the host
/// hands back and asks the host to create or destroy it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub endpoint: String,
    pub expiration_time: Option<DateTime<Utc>>,
    pub keys: SubscriptionKeys,
}

impl Subscription {
    /// Externally encoded form (base64 keys, epoch millisecond expiry)
    pub fn encode(&self) -> EncodedSubscription {
        EncodedSubscription {
            endpoint: self.endpoint.clone(),
            expiration_time: self.expiration_time.map(|t| t.timestamp_millis()),
            keys: EncodedKeys {
                p256dh: encode_key(&self.keys.p256dh),
                auth: encode_key(&self.keys.auth),
            },
        }
    }
}

/// Subscription resource as exchanged with the outside world
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedSubscription {
    pub endpoint: String,
    pub expiration_time: Option<i64>,
    pub keys: EncodedKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedKeys {
    pub p256dh: String,
    pub auth: String,
}

impl EncodedSubscription {
    pub fn decode(&self) -> Result<Subscription, PushError> {
        let expiration_time = match self.expiration_time {
            Some(ms) => Some(
                Utc.timestamp_millis_opt(ms)
                    .single()
                    .ok_or(PushError::InvalidExpiration(ms))?,
            ),
            None => None,
        };

        Ok(Subscription {
            endpoint: self.endpoint.clone(),
            expiration_time,
            keys: SubscriptionKeys {
                p256dh: decode_key(&self.keys.p256dh)?,
                auth: decode_key(&self.keys.auth)?,
            },
        })
    }
}

/// Standard base64 with padding, the same alphabet `btoa` produces
pub fn encode_key(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn decode_key(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(encoded)
}

/// Why a lifecycle operation did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum FailureReason {
    /// Capability missing, no retry path
    Unsupported,
    /// User declined; only an out-of-band settings change recovers
    PermissionDenied,
    /// Readiness gate failed or timed out; retry later
    SdkUnavailable,
    /// Legitimate empty state
    NoSubscription,
    /// Another subscribe call is still running
    SubscribeInProgress,
    /// Message from the host or SDK, passed through verbatim
    Other(String),
}

impl FailureReason {
    pub fn as_str(&self) -> &str {
        match self {
            FailureReason::Unsupported => "unsupported",
            FailureReason::PermissionDenied => "permission_denied",
            FailureReason::SdkUnavailable => "sdk_unavailable",
            FailureReason::NoSubscription => "no_subscription",
            FailureReason::SubscribeInProgress => "subscribe_in_progress",
            FailureReason::Other(message) => message,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FailureReason> for String {
    fn from(reason: FailureReason) -> Self {
        reason.as_str().to_string()
    }
}

impl From<String> for FailureReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "unsupported" => FailureReason::Unsupported,
            "permission_denied" => FailureReason::PermissionDenied,
            "sdk_unavailable" => FailureReason::SdkUnavailable,
            "no_subscription" => FailureReason::NoSubscription,
            "subscribe_in_progress" => FailureReason::SubscribeInProgress,
            _ => FailureReason::Other(s),
        }
    }
}

/// Result of a subscription lifecycle operation.
///
/// Serialises as `{"success":true}` or `{"success":false,"reason":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "OperationResultRepr", try_from = "OperationResultRepr")]
pub enum OperationResult {
    Success,
    Failure(FailureReason),
}

impl OperationResult {
    pub fn failure(reason: impl Into<FailureReason>) -> Self {
        OperationResult::Failure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success)
    }

    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            OperationResult::Success => None,
            OperationResult::Failure(reason) => Some(reason),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct OperationResultRepr {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<FailureReason>,
}

impl From<OperationResult> for OperationResultRepr {
    fn from(result: OperationResult) -> Self {
        match result {
            OperationResult::Success => Self {
                success: true,
                reason: None,
            },
            OperationResult::Failure(reason) => Self {
                success: false,
                reason: Some(reason),
            },
        }
    }
}

impl TryFrom<OperationResultRepr> for OperationResult {
    type Error = String;

    fn try_from(repr: OperationResultRepr) -> Result<Self, Self::Error> {
        match (repr.success, repr.reason) {
            (true, _) => Ok(OperationResult::Success),
            (false, Some(reason)) => Ok(OperationResult::Failure(reason)),
            (false, None) => Err("failed operation result without a reason".to_string()),
        }
    }
}

/// Failures that are raised rather than reported as an [`OperationResult`]
#[derive(Debug, Error)]
pub enum PushError {
    #[error("Notification permission not granted")]
    PermissionNotGranted,

    #[error("Permission request failed: {0}")]
    PermissionRequest(String),

    #[error("Failed to show notification: {0}")]
    Display(String),

    #[error("Invalid subscription key encoding: {0}")]
    KeyEncoding(#[from] base64::DecodeError),

    #[error("Invalid expiration time: {0}")]
    InvalidExpiration(i64),
}
