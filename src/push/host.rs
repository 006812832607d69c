//! Boundary between the coordinator and the platforms it runs on.
//!
//! `PushHost` is the page-side view of the browser: notification permission,
//! the worker registration and its push manager. `AnalyticsSdk` is the small
//! capability surface consumed from the third-party SDK that owns the
//! subscription server-side.

use anyhow::Result;
use async_trait::async_trait;

use super::types::{NotificationPermission, Subscription};
use crate::sdk::{ConsentValue, PageView, SdkSettings};
use crate::worker::NotificationPayload;

/// Capabilities present in the host environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Notification API
    pub notification: bool,
    /// Background worker registration
    pub service_worker: bool,
    /// Push manager on the registration
    pub push_manager: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            notification: true,
            service_worker: true,
            push_manager: true,
        }
    }

    pub fn none() -> Self {
        Self {
            notification: false,
            service_worker: false,
            push_manager: false,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.notification && self.service_worker && self.push_manager
    }
}

/// Page-side host platform
#[async_trait]
pub trait PushHost: Send + Sync {
    /// Capabilities of the environment, synchronous and side-effect free
    fn capabilities(&self) -> Capabilities;

    /// Live permission value
    fn permission(&self) -> NotificationPermission;

    /// Ask the user for permission. Suspends until the user answers.
    async fn request_permission(&self) -> Result<NotificationPermission>;

    /// Register the delivery worker script under `scope`, returning the scope
    /// the host actually registered
    async fn register_worker(&self, script: &str, scope: &str) -> Result<String>;

    /// Suspend until the worker registration is ready
    async fn registration_ready(&self) -> Result<()>;

    /// Current subscription of the ready registration
    async fn get_subscription(&self) -> Result<Option<Subscription>>;

    /// Destroy the current subscription. `Ok(false)` when the host reports
    /// that nothing was removed.
    async fn unsubscribe(&self) -> Result<bool>;

    /// Display a notification through the ready registration
    async fn show_notification(&self, payload: &NotificationPayload) -> Result<()>;

    /// Origin of the current page, used as the click target of test
    /// notifications
    fn origin(&self) -> String;
}

/// Capability surface of the analytics/identity SDK
#[async_trait]
pub trait AnalyticsSdk: Send + Sync {
    /// One-time configuration performed by the external initializer
    async fn configure(&self, settings: &SdkSettings) -> Result<()>;

    /// Create the push subscription and register it server-side
    async fn register_push_subscription(&self) -> Result<()>;

    /// Apply a collection consent decision
    async fn set_consent(&self, value: ConsentValue) -> Result<()>;

    /// Send a page-view event
    async fn send_page_view(&self, view: &PageView) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_capabilities_supported() {
        assert!(Capabilities::all().is_supported());
        assert!(!Capabilities::none().is_supported());
    }

    #[test]
    fn test_missing_push_manager_is_unsupported() {
        let caps = Capabilities {
            push_manager: false,
            ..Capabilities::all()
        };
        assert!(!caps.is_supported());
    }
}
