//! Host services available to the notification worker

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::payload::NotificationPayload;
use super::protocol::ClickedNotification;

/// Lifecycle phase of the worker, owned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerLifecycle {
    #[default]
    Installing,
    Waiting,
    Active,
}

/// Open window as reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowClient {
    pub id: String,
    pub url: String,
    pub visible: bool,
    pub focused: bool,
    /// Whether this worker controls the window
    pub controlled: bool,
}

/// Worker-side host platform
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Registration scope, the default click target
    fn scope(&self) -> String;

    /// Promote this worker to active without waiting for old pages to close
    async fn skip_waiting(&self) -> Result<()>;

    /// Take control of every open in-scope window
    async fn claim_clients(&self) -> Result<()>;

    async fn show_notification(&self, payload: &NotificationPayload) -> Result<()>;

    async fn close_notification(&self, id: &str) -> Result<()>;

    /// Windows known to the host, visible or hidden
    async fn match_windows(&self, include_uncontrolled: bool) -> Result<Vec<WindowClient>>;

    async fn focus_window(&self, id: &str) -> Result<()>;

    /// Open a new window; `None` when the host cannot open windows
    async fn open_window(&self, url: &str) -> Result<Option<WindowClient>>;
}

/// Custom handling for notification action buttons
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle_action(&self, action: &str, notification: &ClickedNotification) -> Result<()>;
}
