//! Notification delivery worker
//!
//! Receives push payloads, displays notifications and routes notification
//! clicks to open windows. The worker keeps no state between events: the host
//! may tear it down and respawn it at any point, so everything it needs comes
//! from the event itself, the host or an explicit store.

pub mod client;
pub mod host;
pub mod payload;
pub mod protocol;
pub mod server;
pub mod store;

pub use client::send_event;
pub use host::{ActionHandler, WindowClient, WorkerHost, WorkerLifecycle};
pub use payload::{NotificationAction, NotificationDefaults, NotificationPayload};
pub use protocol::{ClickedNotification, ControlMessage, EventAck, WorkerEvent};
pub use server::run_listener;
pub use store::{DismissalRecord, DismissalStore, FileDismissalStore};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::app::config::WorkerConfig;

/// Default socket path for the worker transport
pub fn socket_path() -> std::path::PathBuf {
    directories::ProjectDirs::from("", "", "push-coordinator")
        .map(|d| d.runtime_dir().unwrap_or(d.data_dir()).to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("push-coordinator"))
        .join("worker.sock")
}

/// What handling one event did
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Installed { skipped_waiting: bool },
    Activated,
    Displayed(NotificationPayload),
    Focused { window_id: String, url: String },
    Opened { url: String },
    /// The host cannot open windows
    NoWindow { url: String },
    Dismissed,
    SkippedWaiting,
    Ignored,
}

impl EventOutcome {
    pub fn summary(&self) -> String {
        match self {
            EventOutcome::Installed { skipped_waiting } => {
                format!("installed (skip waiting: {})", skipped_waiting)
            }
            EventOutcome::Activated => "activated".to_string(),
            EventOutcome::Displayed(payload) => format!("displayed \"{}\"", payload.title),
            EventOutcome::Focused { url, .. } => format!("focused {}", url),
            EventOutcome::Opened { url } => format!("opened {}", url),
            EventOutcome::NoWindow { url } => format!("cannot open {}", url),
            EventOutcome::Dismissed => "dismissed".to_string(),
            EventOutcome::SkippedWaiting => "skipped waiting".to_string(),
            EventOutcome::Ignored => "ignored".to_string(),
        }
    }
}

pub struct NotificationWorker {
    host: Arc<dyn WorkerHost>,
    skip_waiting_on_install: bool,
    defaults: NotificationDefaults,
    action_handler: Option<Arc<dyn ActionHandler>>,
    dismissals: Option<Arc<dyn DismissalStore>>,
}

impl NotificationWorker {
    pub fn new(host: Arc<dyn WorkerHost>, config: &WorkerConfig) -> Self {
        Self {
            host,
            skip_waiting_on_install: config.skip_waiting_on_install,
            defaults: config.notification.clone(),
            action_handler: None,
            dismissals: None,
        }
    }

    pub fn with_action_handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.action_handler = Some(handler);
        self
    }

    pub fn with_dismissal_store(mut self, store: Arc<dyn DismissalStore>) -> Self {
        self.dismissals = Some(store);
        self
    }

    /// Handle one event. Returns only after every side effect has finished.
    pub async fn handle(&self, event: WorkerEvent) -> Result<EventOutcome> {
        debug!("Worker handling {} event", event.kind());

        match event {
            WorkerEvent::Install => self.on_install().await,
            WorkerEvent::Activate => self.on_activate().await,
            WorkerEvent::Push { data } => self.on_push(data.as_deref()).await,
            WorkerEvent::NotificationClick {
                notification,
                action,
            } => self.on_click(&notification, action.as_deref()).await,
            WorkerEvent::NotificationClose { notification } => Ok(self.on_close(&notification).await),
            WorkerEvent::Message { data } => self.on_message(&data).await,
        }
    }

    async fn on_install(&self) -> Result<EventOutcome> {
        info!("Worker installed");
        if self.skip_waiting_on_install {
            self.host
                .skip_waiting()
                .await
                .context("Failed to skip waiting on install")?;
        }
        Ok(EventOutcome::Installed {
            skipped_waiting: self.skip_waiting_on_install,
        })
    }

    async fn on_activate(&self) -> Result<EventOutcome> {
        self.host
            .claim_clients()
            .await
            .context("Failed to claim clients")?;
        info!("Worker activated and claimed open windows");
        Ok(EventOutcome::Activated)
    }

    async fn on_push(&self, data: Option<&[u8]>) -> Result<EventOutcome> {
        let payload = NotificationPayload::from_push(data, &self.host.scope(), &self.defaults);
        debug!("Push payload resolved: {:?}", payload);

        self.host
            .show_notification(&payload)
            .await
            .context("Failed to show push notification")?;

        info!("Displayed push notification: {}", payload.title);
        Ok(EventOutcome::Displayed(payload))
    }

    async fn on_click(
        &self,
        notification: &ClickedNotification,
        action: Option<&str>,
    ) -> Result<EventOutcome> {
        if let Err(e) = self.host.close_notification(&notification.id).await {
            warn!("Failed to close notification {}: {}", notification.id, e);
        }

        let target = notification
            .url()
            .map(str::to_string)
            .unwrap_or_else(|| self.host.scope());

        if let Some(action) = action.filter(|a| !a.is_empty()) {
            match &self.action_handler {
                Some(handler) => {
                    if let Err(e) = handler.handle_action(action, notification).await {
                        warn!("Action handler failed for '{}': {}", action, e);
                    }
                }
                None => debug!("No handler for action '{}', ignoring", action),
            }
        }

        let windows = self
            .host
            .match_windows(true)
            .await
            .context("Failed to list windows")?;

        if let Some(window) = windows.iter().find(|w| w.url == target) {
            self.host
                .focus_window(&window.id)
                .await
                .with_context(|| format!("Failed to focus window {}", window.id))?;
            info!("Focused existing window at {}", target);
            return Ok(EventOutcome::Focused {
                window_id: window.id.clone(),
                url: target,
            });
        }

        match self
            .host
            .open_window(&target)
            .await
            .with_context(|| format!("Failed to open window at {}", target))?
        {
            Some(_) => {
                info!("Opened new window at {}", target);
                Ok(EventOutcome::Opened { url: target })
            }
            None => {
                warn!("Host cannot open windows, dropping click for {}", target);
                Ok(EventOutcome::NoWindow { url: target })
            }
        }
    }

    async fn on_close(&self, notification: &ClickedNotification) -> EventOutcome {
        debug!("Notification {} dismissed", notification.id);

        if let Some(store) = &self.dismissals {
            let record = DismissalRecord {
                notification_id: notification.id.clone(),
                tag: notification.tag.clone(),
                url: notification.url().map(str::to_string),
                dismissed_at: Utc::now(),
            };
            if let Err(e) = store.record(&record).await {
                warn!("Failed to record dismissal: {}", e);
            }
        }

        EventOutcome::Dismissed
    }

    async fn on_message(&self, data: &Value) -> Result<EventOutcome> {
        match ControlMessage::parse(data) {
            Some(ControlMessage::SkipWaiting) => {
                self.host
                    .skip_waiting()
                    .await
                    .context("Failed to skip waiting")?;
                info!("Skip waiting requested by page");
                Ok(EventOutcome::SkippedWaiting)
            }
            None => {
                debug!("Ignoring unrecognized message: {}", data);
                Ok(EventOutcome::Ignored)
            }
        }
    }
}
