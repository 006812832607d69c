//! In-memory analytics SDK backed by the simulated browser

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::browser::SimulatedBrowser;
use crate::push::host::AnalyticsSdk;
use crate::sdk::{ConsentValue, PageView, SdkSettings};

pub struct SimulatedSdk {
    browser: Arc<SimulatedBrowser>,
    settings: Mutex<Option<SdkSettings>>,
    configure_error: Mutex<Option<String>>,
    register_error: Mutex<Option<String>>,
    register_calls: AtomicUsize,
    consent: Mutex<Option<ConsentValue>>,
    consent_requests: Mutex<Vec<Value>>,
    page_views: Mutex<Vec<PageView>>,
}

impl SimulatedSdk {
    /// SDK that still needs `configure`
    pub fn new(browser: Arc<SimulatedBrowser>) -> Self {
        Self {
            browser,
            settings: Mutex::new(None),
            configure_error: Mutex::new(None),
            register_error: Mutex::new(None),
            register_calls: AtomicUsize::new(0),
            consent: Mutex::new(None),
            consent_requests: Mutex::new(Vec::new()),
            page_views: Mutex::new(Vec::new()),
        }
    }

    /// SDK already configured with default settings
    pub fn configured(browser: Arc<SimulatedBrowser>) -> Self {
        let sdk = Self::new(browser);
        *lock(&sdk.settings) = Some(SdkSettings::default());
        sdk
    }

    /// Make `configure` fail, as when the SDK script cannot load
    pub fn set_configure_error(&self, error: Option<String>) {
        *lock(&self.configure_error) = error;
    }

    /// Make `register_push_subscription` fail, as on a network error
    pub fn set_register_error(&self, error: Option<String>) {
        *lock(&self.register_error) = error;
    }

    pub fn settings(&self) -> Option<SdkSettings> {
        lock(&self.settings).clone()
    }

    /// Number of registration calls received
    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    /// Last consent decision applied
    pub fn consent(&self) -> Option<ConsentValue> {
        *lock(&self.consent)
    }

    /// `setConsent` request bodies, oldest first
    pub fn consent_requests(&self) -> Vec<Value> {
        lock(&self.consent_requests).clone()
    }

    pub fn page_views(&self) -> Vec<PageView> {
        lock(&self.page_views).clone()
    }

    fn ensure_configured(&self) -> Result<()> {
        if lock(&self.settings).is_none() {
            bail!("SDK is not configured");
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl AnalyticsSdk for SimulatedSdk {
    async fn configure(&self, settings: &SdkSettings) -> Result<()> {
        if let Some(error) = lock(&self.configure_error).clone() {
            bail!("{}", error);
        }
        *lock(&self.settings) = Some(settings.clone());
        info!("SDK configured for datastream '{}'", settings.datastream_id);
        Ok(())
    }

    async fn register_push_subscription(&self) -> Result<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = lock(&self.register_error).clone() {
            bail!("{}", error);
        }
        self.ensure_configured()?;

        let subscription = self.browser.create_subscription()?;
        info!("SDK registered subscription {}", subscription.endpoint);
        Ok(())
    }

    async fn set_consent(&self, value: ConsentValue) -> Result<()> {
        self.ensure_configured()?;
        lock(&self.consent_requests).push(value.to_request());
        *lock(&self.consent) = Some(value);
        Ok(())
    }

    async fn send_page_view(&self, view: &PageView) -> Result<()> {
        self.ensure_configured()?;
        debug!("SDK event {}", view.to_xdm());
        lock(&self.page_views).push(view.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::types::NotificationPermission;

    #[tokio::test]
    async fn test_register_requires_configuration() {
        let browser = Arc::new(SimulatedBrowser::registered("https://site/"));
        browser.set_permission(NotificationPermission::Granted);
        let sdk = SimulatedSdk::new(browser.clone());

        assert!(sdk.register_push_subscription().await.is_err());
        assert_eq!(sdk.register_calls(), 1);

        sdk.configure(&SdkSettings::default()).await.unwrap();
        sdk.register_push_subscription().await.unwrap();
        assert!(browser.subscription().is_some());
    }

    #[tokio::test]
    async fn test_configure_error() {
        let browser = Arc::new(SimulatedBrowser::new("https://site/"));
        let sdk = SimulatedSdk::new(browser);
        sdk.set_configure_error(Some("script blocked".to_string()));

        let err = sdk.configure(&SdkSettings::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "script blocked");
        assert!(sdk.settings().is_none());
    }

    #[tokio::test]
    async fn test_consent_replaces_previous_decision() {
        let browser = Arc::new(SimulatedBrowser::new("https://site/"));
        let sdk = SimulatedSdk::configured(browser);

        sdk.set_consent(ConsentValue::Granted).await.unwrap();
        sdk.set_consent(ConsentValue::Denied).await.unwrap();
        assert_eq!(sdk.consent(), Some(ConsentValue::Denied));
        assert_eq!(sdk.consent_requests().len(), 2);
    }
}
