//! Page-level SDK commands: consent and page views.
//!
//! Both are fire-and-forget. Before the SDK is ready they are skipped rather
//! than queued.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::push::{AnalyticsSdk, ReadinessGate};

/// XDM event type of a page view
pub const PAGE_VIEW_EVENT_TYPE: &str = "web.webpagedetails.pageViews";

/// Title used when a page view is sent without a name
pub const DEFAULT_PAGE_TITLE: &str = "Push Notifications";

/// Collection consent under the Adobe 2.0 standard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsentValue {
    #[serde(rename = "y")]
    Granted,
    #[serde(rename = "n")]
    Denied,
}

impl ConsentValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentValue::Granted => "y",
            ConsentValue::Denied => "n",
        }
    }

    /// Request body of the SDK's `setConsent` command
    pub fn to_request(self) -> Value {
        json!({
            "consent": [{
                "standard": "Adobe",
                "version": "2.0",
                "value": {
                    "collect": { "val": self.as_str() },
                    "personalize": { "val": self.as_str() },
                },
            }]
        })
    }
}

impl fmt::Display for ConsentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsentValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "y" | "yes" | "in" => Ok(ConsentValue::Granted),
            "n" | "no" | "out" => Ok(ConsentValue::Denied),
            other => Err(format!("unknown consent value '{}' (expected in or out)", other)),
        }
    }
}

/// One page view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageView {
    pub name: String,
    pub url: String,
}

impl PageView {
    /// XDM body of the SDK's `sendEvent` command
    pub fn to_xdm(&self) -> Value {
        json!({
            "xdm": {
                "eventType": PAGE_VIEW_EVENT_TYPE,
                "web": {
                    "webPageDetails": {
                        "name": self.name,
                        "URL": self.url,
                    },
                },
            }
        })
    }
}

/// Consent and page-view commands gated on SDK readiness
#[derive(Clone)]
pub struct SdkCommands {
    sdk: Arc<dyn AnalyticsSdk>,
    gate: ReadinessGate,
    page_url: String,
    page_title: String,
}

impl SdkCommands {
    pub fn new(sdk: Arc<dyn AnalyticsSdk>, gate: ReadinessGate, page_url: impl Into<String>) -> Self {
        Self {
            sdk,
            gate,
            page_url: page_url.into(),
            page_title: DEFAULT_PAGE_TITLE.to_string(),
        }
    }

    /// Name of page views sent without one
    pub fn with_page_title(mut self, title: impl Into<String>) -> Self {
        self.page_title = title.into();
        self
    }

    /// Apply a consent decision. `Ok(false)` when the SDK is not ready and
    /// nothing was sent.
    pub async fn set_consent(&self, value: ConsentValue) -> Result<bool> {
        if !self.gate.state().is_ready() {
            debug!("SDK not ready, consent '{}' not sent", value);
            return Ok(false);
        }
        self.sdk.set_consent(value).await?;
        info!("Consent set to '{}'", value);
        Ok(true)
    }

    /// Record a page view under `name`, or the page title when absent.
    /// `Ok(false)` when the SDK is not ready and nothing was sent.
    pub async fn send_page_view(&self, name: Option<&str>) -> Result<bool> {
        if !self.gate.state().is_ready() {
            debug!("SDK not ready, page view not sent");
            return Ok(false);
        }
        let view = PageView {
            name: name
                .filter(|n| !n.is_empty())
                .unwrap_or(self.page_title.as_str())
                .to_string(),
            url: self.page_url.clone(),
        };
        self.sdk.send_page_view(&view).await?;
        info!("Page view '{}' sent", view.name);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::SdkSettings;
    use crate::sim::{SimulatedBrowser, SimulatedSdk};

    fn commands() -> (Arc<SimulatedSdk>, ReadinessGate, SdkCommands) {
        let browser = Arc::new(SimulatedBrowser::new("https://site/"));
        let sdk = Arc::new(SimulatedSdk::new(browser));
        let gate = ReadinessGate::new();
        let commands = SdkCommands::new(sdk.clone(), gate.clone(), "https://site/shop");
        (sdk, gate, commands)
    }

    #[tokio::test]
    async fn test_commands_skipped_before_ready() {
        let (sdk, gate, commands) = commands();
        gate.mark_initializing();

        assert!(!commands.set_consent(ConsentValue::Granted).await.unwrap());
        assert!(!commands.send_page_view(Some("Home")).await.unwrap());
        assert!(sdk.consent_requests().is_empty());
        assert!(sdk.page_views().is_empty());
    }

    #[tokio::test]
    async fn test_commands_skipped_after_failure() {
        let (sdk, gate, commands) = commands();
        gate.mark_failed("blocked");

        assert!(!commands.set_consent(ConsentValue::Denied).await.unwrap());
        assert!(sdk.consent_requests().is_empty());
    }

    #[tokio::test]
    async fn test_commands_sent_once_ready() {
        let (sdk, gate, commands) = commands();
        sdk.configure(&SdkSettings::default()).await.unwrap();
        gate.mark_ready();

        assert!(commands.set_consent(ConsentValue::Denied).await.unwrap());
        assert_eq!(sdk.consent(), Some(ConsentValue::Denied));
        assert_eq!(
            sdk.consent_requests()[0]["consent"][0]["value"]["personalize"]["val"],
            "n"
        );

        assert!(commands.send_page_view(None).await.unwrap());
        assert!(commands.send_page_view(Some("Cart")).await.unwrap());
        let views = sdk.page_views();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].name, DEFAULT_PAGE_TITLE);
        assert_eq!(views[1].name, "Cart");
        assert!(views.iter().all(|v| v.url == "https://site/shop"));
    }

    #[tokio::test]
    async fn test_sdk_error_is_returned() {
        let (sdk, gate, commands) = commands();
        gate.mark_ready();

        // Never configured, so the SDK refuses the command
        assert!(commands.send_page_view(Some("Home")).await.is_err());
        assert!(sdk.page_views().is_empty());
    }

    #[test]
    fn test_consent_request_shape() {
        assert_eq!(
            ConsentValue::Granted.to_request(),
            json!({"consent": [{
                "standard": "Adobe",
                "version": "2.0",
                "value": {"collect": {"val": "y"}, "personalize": {"val": "y"}},
            }]})
        );
    }

    #[test]
    fn test_page_view_xdm_shape() {
        let view = PageView {
            name: "Home".to_string(),
            url: "https://site/".to_string(),
        };
        let xdm = view.to_xdm();
        assert_eq!(xdm["xdm"]["eventType"], PAGE_VIEW_EVENT_TYPE);
        assert_eq!(xdm["xdm"]["web"]["webPageDetails"]["name"], "Home");
        assert_eq!(xdm["xdm"]["web"]["webPageDetails"]["URL"], "https://site/");
    }

    #[test]
    fn test_consent_value_parsing() {
        assert_eq!("in".parse::<ConsentValue>(), Ok(ConsentValue::Granted));
        assert_eq!("Y".parse::<ConsentValue>(), Ok(ConsentValue::Granted));
        assert_eq!("out".parse::<ConsentValue>(), Ok(ConsentValue::Denied));
        assert!("maybe".parse::<ConsentValue>().is_err());
    }
}
