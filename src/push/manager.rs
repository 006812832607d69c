//! Subscription lifecycle: subscribe, unsubscribe and status queries
//!
//! Every expected failure comes back as an [`OperationResult`]. Only a
//! platform rejection of the permission request and a failed test
//! notification are raised as [`PushError`].

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::capability;
use super::gate::{ReadinessGate, ReadinessState, ReadyOutcome};
use super::host::{AnalyticsSdk, PushHost};
use super::types::{
    EncodedSubscription, FailureReason, NotificationPermission, OperationResult, PermissionState,
    PushError, Subscription,
};
use crate::worker::{NotificationDefaults, NotificationPayload};

/// Default upper bound on waiting for the worker registration
pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SubscriptionManager {
    host: Arc<dyn PushHost>,
    sdk: Arc<dyn AnalyticsSdk>,
    gate: ReadinessGate,
    ready_timeout: Option<Duration>,
    registration_timeout: Duration,
    defaults: NotificationDefaults,
    /// Held for the whole of one subscribe call
    in_flight: Mutex<()>,
}

impl SubscriptionManager {
    pub fn new(host: Arc<dyn PushHost>, sdk: Arc<dyn AnalyticsSdk>, gate: ReadinessGate) -> Self {
        Self {
            host,
            sdk,
            gate,
            ready_timeout: None,
            registration_timeout: DEFAULT_REGISTRATION_TIMEOUT,
            defaults: NotificationDefaults::default(),
            in_flight: Mutex::new(()),
        }
    }

    /// Bound the SDK readiness wait; unbounded when `None`
    pub fn with_ready_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Bound the wait for the worker registration used by unsubscribe and
    /// the subscription queries
    pub fn with_registration_timeout(mut self, timeout: Duration) -> Self {
        self.registration_timeout = timeout;
        self
    }

    /// Icon and badge used by the test notification
    pub fn with_defaults(mut self, defaults: NotificationDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn is_supported(&self) -> bool {
        capability::is_supported(self.host.as_ref())
    }

    pub fn permission_state(&self) -> PermissionState {
        capability::permission_state(self.host.as_ref())
    }

    /// Read-only view of the SDK readiness
    pub fn sdk_state(&self) -> ReadinessState {
        self.gate.state()
    }

    /// Request permission, wait for the SDK and register the subscription.
    ///
    /// A call that overlaps a running one is rejected with
    /// `subscribe_in_progress`. Once started, a call runs to completion.
    pub async fn subscribe(&self) -> Result<OperationResult, PushError> {
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Rejecting subscribe, another call is in flight");
                return Ok(OperationResult::failure(FailureReason::SubscribeInProgress));
            }
        };

        if !self.is_supported() {
            return Ok(OperationResult::failure(FailureReason::Unsupported));
        }

        let permission = self
            .host
            .request_permission()
            .await
            .map_err(|e| PushError::PermissionRequest(format!("{:#}", e)))?;
        if permission != NotificationPermission::Granted {
            info!("Notification permission not granted: {:?}", permission);
            return Ok(OperationResult::failure(FailureReason::PermissionDenied));
        }

        match self.gate.await_ready(self.ready_timeout).await {
            ReadyOutcome::Ready => {}
            ReadyOutcome::Failed(cause) => {
                warn!("SDK unavailable: {}", cause);
                return Ok(OperationResult::failure(FailureReason::SdkUnavailable));
            }
            ReadyOutcome::TimedOut => {
                warn!("SDK did not become ready within {:?}", self.ready_timeout);
                return Ok(OperationResult::failure(FailureReason::SdkUnavailable));
            }
        }

        if let Err(e) = self.sdk.register_push_subscription().await {
            warn!("Push subscription registration failed: {:#}", e);
            return Ok(OperationResult::failure(FailureReason::Other(e.to_string())));
        }

        info!("Push subscription registered");
        Ok(OperationResult::Success)
    }

    /// Destroy the current subscription
    pub async fn unsubscribe(&self) -> OperationResult {
        if !self.is_supported() {
            return OperationResult::failure(FailureReason::Unsupported);
        }

        let subscription = match self.current_subscription().await {
            Ok(Some(subscription)) => subscription,
            Ok(None) => return OperationResult::failure(FailureReason::NoSubscription),
            Err(e) => return OperationResult::failure(FailureReason::Other(format!("{:#}", e))),
        };

        match self.host.unsubscribe().await {
            Ok(true) => {
                info!("Unsubscribed {}", subscription.endpoint);
                OperationResult::Success
            }
            // Removed concurrently between lookup and removal
            Ok(false) => OperationResult::failure(FailureReason::NoSubscription),
            Err(e) => {
                warn!("Unsubscribe failed: {:#}", e);
                OperationResult::failure(FailureReason::Other(e.to_string()))
            }
        }
    }

    pub async fn is_subscribed(&self) -> bool {
        if !self.is_supported() {
            return false;
        }
        match self.current_subscription().await {
            Ok(subscription) => subscription.is_some(),
            Err(e) => {
                warn!("Failed to check subscription: {:#}", e);
                false
            }
        }
    }

    /// Current subscription with base64 keys; `None` when absent or on failure
    pub async fn get_subscription_details(&self) -> Option<EncodedSubscription> {
        if !self.is_supported() {
            return None;
        }
        match self.current_subscription().await {
            Ok(subscription) => subscription.map(|s| s.encode()),
            Err(e) => {
                warn!("Failed to read subscription details: {:#}", e);
                None
            }
        }
    }

    /// Display the fixed demonstration notification
    pub async fn show_test_notification(&self) -> Result<(), PushError> {
        if self.permission_state() != PermissionState::Granted {
            return Err(PushError::PermissionNotGranted);
        }

        let payload = NotificationPayload::test_notification(&self.host.origin(), &self.defaults);
        self.host
            .show_notification(&payload)
            .await
            .map_err(|e| PushError::Display(format!("{:#}", e)))?;

        info!("Test notification shown");
        Ok(())
    }

    async fn current_subscription(&self) -> anyhow::Result<Option<Subscription>> {
        tokio::time::timeout(self.registration_timeout, self.host.registration_ready())
            .await
            .map_err(|_| anyhow::anyhow!("Worker registration not ready"))??;
        self.host.get_subscription().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::host::Capabilities;
    use crate::sim::{PromptResponse, SimulatedBrowser, SimulatedSdk};

    fn setup() -> (Arc<SimulatedBrowser>, Arc<SimulatedSdk>, ReadinessGate, SubscriptionManager) {
        let browser = Arc::new(SimulatedBrowser::registered("https://site/"));
        let sdk = Arc::new(SimulatedSdk::configured(browser.clone()));
        let gate = ReadinessGate::new();
        let manager = SubscriptionManager::new(browser.clone(), sdk.clone(), gate.clone());
        (browser, sdk, gate, manager)
    }

    #[tokio::test]
    async fn test_subscribe_success() {
        let (browser, sdk, gate, manager) = setup();
        gate.mark_ready();

        let result = manager.subscribe().await.unwrap();
        assert_eq!(result, OperationResult::Success);
        assert_eq!(sdk.register_calls(), 1);
        assert!(browser.subscription().is_some());
        assert!(manager.is_subscribed().await);
    }

    #[tokio::test]
    async fn test_subscribe_unsupported() {
        let (browser, sdk, gate, manager) = setup();
        gate.mark_ready();
        browser.set_capabilities(Capabilities::none());

        let result = manager.subscribe().await.unwrap();
        assert_eq!(result, OperationResult::failure(FailureReason::Unsupported));
        assert_eq!(browser.permission_requests(), 0);
        assert_eq!(sdk.register_calls(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_denied_never_calls_sdk() {
        let (browser, sdk, gate, manager) = setup();
        gate.mark_ready();
        browser.set_prompt_response(PromptResponse::Deny);

        let result = manager.subscribe().await.unwrap();
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"success":false,"reason":"permission_denied"}"#
        );
        assert_eq!(sdk.register_calls(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_dismissed_prompt_is_denied() {
        let (browser, sdk, gate, manager) = setup();
        gate.mark_ready();
        browser.set_prompt_response(PromptResponse::Dismiss);

        let result = manager.subscribe().await.unwrap();
        assert_eq!(result, OperationResult::failure(FailureReason::PermissionDenied));
        assert_eq!(sdk.register_calls(), 0);
    }

    #[tokio::test]
    async fn test_permission_request_rejection_is_raised() {
        let (browser, _, gate, manager) = setup();
        gate.mark_ready();
        browser.set_prompt_response(PromptResponse::Fail("blocked by policy".to_string()));

        let err = manager.subscribe().await.unwrap_err();
        assert!(matches!(err, PushError::PermissionRequest(msg) if msg.contains("blocked by policy")));
    }

    #[tokio::test]
    async fn test_subscribe_failed_gate_is_sdk_unavailable() {
        let (_, sdk, gate, manager) = setup();
        gate.mark_failed("script blocked");

        let result = manager.subscribe().await.unwrap();
        assert_eq!(result, OperationResult::failure(FailureReason::SdkUnavailable));
        assert_eq!(sdk.register_calls(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_gate_timeout_is_sdk_unavailable() {
        let (_, _, _, manager) = setup();
        let manager = manager.with_ready_timeout(Some(Duration::from_millis(20)));

        let result = manager.subscribe().await.unwrap();
        assert_eq!(result, OperationResult::failure(FailureReason::SdkUnavailable));
    }

    #[tokio::test]
    async fn test_sdk_error_is_passed_through() {
        let (_, sdk, gate, manager) = setup();
        gate.mark_ready();
        sdk.set_register_error(Some("network unreachable".to_string()));

        let result = manager.subscribe().await.unwrap();
        assert_eq!(
            result,
            OperationResult::failure(FailureReason::Other("network unreachable".to_string()))
        );
    }

    #[tokio::test]
    async fn test_overlapping_subscribe_is_rejected() {
        let (_, sdk, gate, manager) = setup();
        let manager = Arc::new(manager);

        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.subscribe().await })
        };
        // Let the first call reach the gate wait
        for _ in 0..100 {
            if manager.in_flight.try_lock().is_err() {
                break;
            }
            tokio::task::yield_now().await;
        }

        let second = manager.subscribe().await.unwrap();
        assert_eq!(second, OperationResult::failure(FailureReason::SubscribeInProgress));

        gate.mark_ready();
        assert_eq!(first.await.unwrap().unwrap(), OperationResult::Success);
        assert_eq!(sdk.register_calls(), 1);

        // The guard is released once the first call finished
        assert_eq!(manager.subscribe().await.unwrap(), OperationResult::Success);
    }

    #[tokio::test]
    async fn test_unsubscribe_without_subscription() {
        let (_, _, _, manager) = setup();
        let result = manager.unsubscribe().await;
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"success":false,"reason":"no_subscription"}"#
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_subscription() {
        let (browser, _, gate, manager) = setup();
        gate.mark_ready();
        manager.subscribe().await.unwrap();

        assert_eq!(manager.unsubscribe().await, OperationResult::Success);
        assert!(browser.subscription().is_none());
        assert!(!manager.is_subscribed().await);
        assert_eq!(
            manager.unsubscribe().await,
            OperationResult::failure(FailureReason::NoSubscription)
        );
    }

    #[tokio::test]
    async fn test_details_are_encoded() {
        let (browser, _, gate, manager) = setup();
        assert_eq!(manager.get_subscription_details().await, None);

        gate.mark_ready();
        manager.subscribe().await.unwrap();

        let details = manager.get_subscription_details().await.unwrap();
        let subscription = browser.subscription().unwrap();
        assert_eq!(details.endpoint, subscription.endpoint);
        assert_eq!(details.decode().unwrap(), subscription);
    }

    #[tokio::test]
    async fn test_unsupported_host_is_never_subscribed() {
        let (browser, _, _, manager) = setup();
        browser.set_capabilities(Capabilities::none());
        assert!(!manager.is_subscribed().await);
        assert_eq!(manager.get_subscription_details().await, None);
        assert_eq!(
            manager.unsubscribe().await,
            OperationResult::failure(FailureReason::Unsupported)
        );
    }

    #[tokio::test]
    async fn test_queries_wait_for_worker_registration() {
        let browser = Arc::new(SimulatedBrowser::new("https://site/"));
        let sdk = Arc::new(SimulatedSdk::configured(browser.clone()));
        let manager = Arc::new(SubscriptionManager::new(
            browser.clone(),
            sdk,
            ReadinessGate::new(),
        ));

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.unsubscribe().await })
        };
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        browser
            .register_worker("/service-worker.js", "https://site/")
            .await
            .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, OperationResult::failure(FailureReason::NoSubscription));
        assert!(!manager.is_subscribed().await);
    }

    #[tokio::test]
    async fn test_registration_timeout_is_reported() {
        let browser = Arc::new(SimulatedBrowser::new("https://site/"));
        let sdk = Arc::new(SimulatedSdk::configured(browser.clone()));
        let manager = SubscriptionManager::new(browser, sdk, ReadinessGate::new())
            .with_registration_timeout(Duration::from_millis(20));

        match manager.unsubscribe().await {
            OperationResult::Failure(FailureReason::Other(message)) => {
                assert!(message.contains("registration not ready"), "{}", message)
            }
            other => panic!("Expected timeout failure, got {:?}", other),
        }
        assert!(!manager.is_subscribed().await);
        assert_eq!(manager.get_subscription_details().await, None);
    }

    #[tokio::test]
    async fn test_test_notification_requires_permission() {
        let (browser, _, _, manager) = setup();
        browser.set_permission(NotificationPermission::Denied);

        let err = manager.show_test_notification().await.unwrap_err();
        assert!(matches!(err, PushError::PermissionNotGranted));
        assert!(browser.shown_notifications().is_empty());
    }

    #[tokio::test]
    async fn test_test_notification_is_displayed() {
        let (browser, _, _, manager) = setup();
        browser.set_permission(NotificationPermission::Granted);

        manager.show_test_notification().await.unwrap();
        let shown = browser.shown_notifications();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].payload.title, "Test Notification");
        assert_eq!(shown[0].payload.url(), Some("https://site"));
    }

    #[tokio::test]
    async fn test_test_notification_display_failure_is_raised() {
        let (browser, _, _, manager) = setup();
        browser.set_permission(NotificationPermission::Granted);
        browser.set_display_error(Some("quota exceeded".to_string()));

        let err = manager.show_test_notification().await.unwrap_err();
        assert!(matches!(err, PushError::Display(msg) if msg.contains("quota exceeded")));
    }
}
