//! External SDK initializer
//!
//! Runs once at process start: registers the delivery worker, configures the
//! analytics SDK and reports the outcome to the readiness gate. `commands`
//! holds the consent and page-view calls made once the SDK is up.

mod commands;

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::push::{AnalyticsSdk, PushHost, ReadinessGate};

pub use crate::app::config::SdkSettings;
pub use commands::{ConsentValue, PageView, SdkCommands, DEFAULT_PAGE_TITLE, PAGE_VIEW_EVENT_TYPE};

pub struct SdkInitializer {
    host: Arc<dyn PushHost>,
    sdk: Arc<dyn AnalyticsSdk>,
    gate: ReadinessGate,
    settings: SdkSettings,
    script_path: String,
    scope: String,
    load_delay: Duration,
}

impl SdkInitializer {
    pub fn new(
        host: Arc<dyn PushHost>,
        sdk: Arc<dyn AnalyticsSdk>,
        gate: ReadinessGate,
        settings: SdkSettings,
    ) -> Self {
        Self {
            host,
            sdk,
            gate,
            settings,
            script_path: "/service-worker.js".to_string(),
            scope: "/".to_string(),
            load_delay: Duration::ZERO,
        }
    }

    /// Worker script and scope to register
    pub fn with_worker(mut self, script_path: impl Into<String>, scope: impl Into<String>) -> Self {
        self.script_path = script_path.into();
        self.scope = scope.into();
        self
    }

    /// Time the SDK takes to load before it can be configured
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Register the worker, then configure the SDK and resolve the gate.
    ///
    /// A failed worker registration is logged and does not stop SDK setup.
    pub async fn run(self) {
        if self.host.capabilities().service_worker {
            match self.host.register_worker(&self.script_path, &self.scope).await {
                Ok(scope) => info!("Worker registered with scope {}", scope),
                Err(e) => warn!("Worker registration failed: {:#}", e),
            }
        } else {
            warn!("Worker registration not available, skipping");
        }

        self.gate.mark_initializing();

        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }

        match self.sdk.configure(&self.settings).await {
            Ok(()) => self.gate.mark_ready(),
            Err(e) => {
                warn!("SDK configuration failed: {:#}", e);
                self.gate.mark_failed(format!("{:#}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::{ReadinessState, ReadyOutcome};
    use crate::sim::{SimulatedBrowser, SimulatedSdk};

    #[tokio::test]
    async fn test_run_registers_worker_and_marks_ready() {
        let browser = Arc::new(SimulatedBrowser::new("https://site/"));
        let sdk = Arc::new(SimulatedSdk::new(browser.clone()));
        let gate = ReadinessGate::new();
        let settings = SdkSettings {
            datastream_id: "ds-1".to_string(),
            ..SdkSettings::default()
        };

        SdkInitializer::new(browser.clone(), sdk.clone(), gate.clone(), settings)
            .with_worker("/service-worker.js", "https://site/")
            .run()
            .await;

        assert_eq!(gate.state(), ReadinessState::Ready);
        assert_eq!(sdk.settings().unwrap().datastream_id, "ds-1");
        browser.registration_ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_configure_failure_marks_gate_failed() {
        let browser = Arc::new(SimulatedBrowser::new("https://site/"));
        let sdk = Arc::new(SimulatedSdk::new(browser.clone()));
        sdk.set_configure_error(Some("script blocked".to_string()));
        let gate = ReadinessGate::new();

        SdkInitializer::new(browser, sdk, gate.clone(), SdkSettings::default())
            .run()
            .await;

        assert_eq!(
            gate.await_ready(None).await,
            ReadyOutcome::Failed("script blocked".to_string())
        );
    }

    #[tokio::test]
    async fn test_waiters_released_after_load_delay() {
        let browser = Arc::new(SimulatedBrowser::new("https://site/"));
        let sdk = Arc::new(SimulatedSdk::new(browser.clone()));
        let gate = ReadinessGate::new();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.await_ready(None).await })
        };

        tokio::spawn(
            SdkInitializer::new(browser, sdk, gate.clone(), SdkSettings::default())
                .with_load_delay(Duration::from_millis(20))
                .run(),
        );

        assert_eq!(waiter.await.unwrap(), ReadyOutcome::Ready);
        // A late caller does not wait
        assert_eq!(gate.await_ready(Some(Duration::ZERO)).await, ReadyOutcome::Ready);
    }
}
