//! In-memory browser implementing both the page-side and the worker-side host

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::push::host::{Capabilities, PushHost};
use crate::push::types::{NotificationPermission, Subscription, SubscriptionKeys};
use crate::worker::{NotificationPayload, WindowClient, WorkerHost, WorkerLifecycle};

/// How the simulated user answers the permission prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptResponse {
    #[default]
    Grant,
    Deny,
    /// Prompt closed without a decision
    Dismiss,
    /// The platform rejects the request itself
    Fail(String),
}

/// Notification currently on screen
#[derive(Debug, Clone, PartialEq)]
pub struct ShownNotification {
    pub id: String,
    pub payload: NotificationPayload,
    pub shown_at: DateTime<Utc>,
}

struct BrowserState {
    capabilities: Capabilities,
    permission: NotificationPermission,
    prompt_response: PromptResponse,
    permission_requests: usize,
    registration_scope: Option<String>,
    subscription: Option<Subscription>,
    lifecycle: WorkerLifecycle,
    windows: Vec<WindowClient>,
    notifications: Vec<ShownNotification>,
    /// Every notification ever displayed, in display order
    history: Vec<ShownNotification>,
    closed: Vec<String>,
    display_error: Option<String>,
    can_open_windows: bool,
}

/// Simulated browser shared by the page and the worker
pub struct SimulatedBrowser {
    scope: String,
    origin: String,
    state: Mutex<BrowserState>,
    registered: watch::Sender<bool>,
}

impl SimulatedBrowser {
    /// Browser with every capability, no worker registered yet
    pub fn new(scope: &str) -> Self {
        let (registered, _) = watch::channel(false);
        Self {
            scope: scope.to_string(),
            origin: origin_of(scope),
            state: Mutex::new(BrowserState {
                capabilities: Capabilities::all(),
                permission: NotificationPermission::Default,
                prompt_response: PromptResponse::Grant,
                permission_requests: 0,
                registration_scope: None,
                subscription: None,
                lifecycle: WorkerLifecycle::Installing,
                windows: Vec::new(),
                notifications: Vec::new(),
                history: Vec::new(),
                closed: Vec::new(),
                display_error: None,
                can_open_windows: true,
            }),
            registered,
        }
    }

    /// Browser whose worker registration is already ready
    pub fn registered(scope: &str) -> Self {
        let browser = Self::new(scope);
        browser.mark_registered(scope);
        browser
    }

    fn state(&self) -> MutexGuard<'_, BrowserState> {
        // A panic while holding the lock leaves plain data behind; keep going
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mark_registered(&self, scope: &str) {
        self.state().registration_scope = Some(scope.to_string());
        self.registered.send_replace(true);
    }

    pub fn set_capabilities(&self, capabilities: Capabilities) {
        self.state().capabilities = capabilities;
    }

    pub fn set_permission(&self, permission: NotificationPermission) {
        self.state().permission = permission;
    }

    pub fn set_prompt_response(&self, response: PromptResponse) {
        self.state().prompt_response = response;
    }

    /// Make every display attempt fail with `error`
    pub fn set_display_error(&self, error: Option<String>) {
        self.state().display_error = error;
    }

    pub fn set_can_open_windows(&self, can_open: bool) {
        self.state().can_open_windows = can_open;
    }

    /// Number of times the page asked for permission
    pub fn permission_requests(&self) -> usize {
        self.state().permission_requests
    }

    /// User revokes permission in browser settings; the subscription goes too
    pub fn revoke_permission(&self) {
        let mut state = self.state();
        state.permission = NotificationPermission::Denied;
        state.subscription = None;
        info!("Permission revoked out of band");
    }

    pub fn subscription(&self) -> Option<Subscription> {
        self.state().subscription.clone()
    }

    /// Subscribe the registration's push manager, returning the existing
    /// subscription when there is one
    pub fn create_subscription(&self) -> Result<Subscription> {
        let mut state = self.state();
        if state.registration_scope.is_none() {
            bail!("No active worker registration");
        }
        if state.permission != NotificationPermission::Granted {
            bail!("Registration failed - permission denied");
        }
        if let Some(existing) = &state.subscription {
            return Ok(existing.clone());
        }

        let id = Uuid::new_v4();
        let mut p256dh = vec![0x04];
        p256dh.extend_from_slice(Uuid::new_v4().as_bytes());
        p256dh.extend_from_slice(Uuid::new_v4().as_bytes());
        p256dh.extend_from_slice(Uuid::new_v4().as_bytes());
        p256dh.extend_from_slice(Uuid::new_v4().as_bytes());

        let subscription = Subscription {
            endpoint: format!("https://push.simulated.invalid/send/{}", id),
            expiration_time: None,
            keys: SubscriptionKeys {
                p256dh,
                auth: Uuid::new_v4().as_bytes().to_vec(),
            },
        };
        state.subscription = Some(subscription.clone());
        info!("Created push subscription {}", subscription.endpoint);
        Ok(subscription)
    }

    /// Open a window that the worker does not control yet
    pub fn open_test_window(&self, url: &str, visible: bool) -> String {
        let id = Uuid::new_v4().to_string();
        self.state().windows.push(WindowClient {
            id: id.clone(),
            url: url.to_string(),
            visible,
            focused: false,
            controlled: false,
        });
        id
    }

    pub fn windows(&self) -> Vec<WindowClient> {
        self.state().windows.clone()
    }

    pub fn shown_notifications(&self) -> Vec<ShownNotification> {
        self.state().notifications.clone()
    }

    /// Everything displayed so far, including notifications replaced by tag
    pub fn display_history(&self) -> Vec<ShownNotification> {
        self.state().history.clone()
    }

    pub fn closed_notifications(&self) -> Vec<String> {
        self.state().closed.clone()
    }

    pub fn lifecycle(&self) -> WorkerLifecycle {
        self.state().lifecycle
    }

    fn display(&self, payload: &NotificationPayload) -> Result<()> {
        let mut state = self.state();
        if let Some(error) = &state.display_error {
            bail!("{}", error);
        }
        if state.permission != NotificationPermission::Granted {
            bail!("No notification permission has been granted for this origin");
        }

        // Same tag replaces the notification on screen
        if let Some(tag) = &payload.tag {
            state
                .notifications
                .retain(|n| n.payload.tag.as_ref() != Some(tag));
        }

        let id = Uuid::new_v4().to_string();
        debug!("Showing notification {}: {}", id, payload.title);
        let shown = ShownNotification {
            id,
            payload: payload.clone(),
            shown_at: Utc::now(),
        };
        state.history.push(shown.clone());
        state.notifications.push(shown);
        Ok(())
    }
}

fn origin_of(url: &str) -> String {
    match url.find("://") {
        Some(start) => {
            let rest = &url[start + 3..];
            let end = rest.find('/').map(|i| start + 3 + i).unwrap_or(url.len());
            url[..end].to_string()
        }
        None => url.trim_end_matches('/').to_string(),
    }
}

#[async_trait]
impl PushHost for SimulatedBrowser {
    fn capabilities(&self) -> Capabilities {
        self.state().capabilities
    }

    fn permission(&self) -> NotificationPermission {
        self.state().permission
    }

    async fn request_permission(&self) -> Result<NotificationPermission> {
        let mut state = self.state();
        state.permission_requests += 1;

        // A decision already made is returned without prompting again
        if state.permission != NotificationPermission::Default {
            return Ok(state.permission);
        }

        match state.prompt_response.clone() {
            PromptResponse::Grant => state.permission = NotificationPermission::Granted,
            PromptResponse::Deny => state.permission = NotificationPermission::Denied,
            PromptResponse::Dismiss => {}
            PromptResponse::Fail(message) => return Err(anyhow!(message)),
        }
        Ok(state.permission)
    }

    async fn register_worker(&self, script: &str, scope: &str) -> Result<String> {
        if !self.state().capabilities.service_worker {
            bail!("Service workers are not supported");
        }
        info!("Registered worker {} with scope {}", script, scope);
        self.mark_registered(scope);
        Ok(scope.to_string())
    }

    async fn registration_ready(&self) -> Result<()> {
        let mut rx = self.registered.subscribe();
        rx.wait_for(|ready| *ready)
            .await
            .map_err(|_| anyhow!("Worker registration was dropped"))?;
        Ok(())
    }

    async fn get_subscription(&self) -> Result<Option<Subscription>> {
        Ok(self.state().subscription.clone())
    }

    async fn unsubscribe(&self) -> Result<bool> {
        Ok(self.state().subscription.take().is_some())
    }

    async fn show_notification(&self, payload: &NotificationPayload) -> Result<()> {
        self.display(payload)
    }

    fn origin(&self) -> String {
        self.origin.clone()
    }
}

#[async_trait]
impl WorkerHost for SimulatedBrowser {
    fn scope(&self) -> String {
        self.scope.clone()
    }

    async fn skip_waiting(&self) -> Result<()> {
        self.state().lifecycle = WorkerLifecycle::Active;
        Ok(())
    }

    async fn claim_clients(&self) -> Result<()> {
        let mut state = self.state();
        state.lifecycle = WorkerLifecycle::Active;
        let scope = self.scope.clone();
        for window in state.windows.iter_mut() {
            if window.url.starts_with(&scope) {
                window.controlled = true;
            }
        }
        Ok(())
    }

    async fn show_notification(&self, payload: &NotificationPayload) -> Result<()> {
        self.display(payload)
    }

    async fn close_notification(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        state.notifications.retain(|n| n.id != id);
        state.closed.push(id.to_string());
        Ok(())
    }

    async fn match_windows(&self, include_uncontrolled: bool) -> Result<Vec<WindowClient>> {
        Ok(self
            .state()
            .windows
            .iter()
            .filter(|w| include_uncontrolled || w.controlled)
            .cloned()
            .collect())
    }

    async fn focus_window(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        if !state.windows.iter().any(|w| w.id == id) {
            bail!("Window not found: {}", id);
        }
        for window in state.windows.iter_mut() {
            window.focused = window.id == id;
            if window.focused {
                window.visible = true;
            }
        }
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<Option<WindowClient>> {
        let mut state = self.state();
        if !state.can_open_windows {
            return Ok(None);
        }

        for window in state.windows.iter_mut() {
            window.focused = false;
        }
        let window = WindowClient {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            visible: true,
            focused: true,
            controlled: url.starts_with(&self.scope),
        };
        state.windows.push(window.clone());
        Ok(Some(window))
    }
}
