use serde::Serialize;
use std::time::{Duration, Instant};

use crate::push::{
    EncodedSubscription, FailureReason, OperationResult, PermissionState, ReadinessState,
    SubscriptionManager,
};
use crate::sdk::ConsentValue;

/// 画面に表示するステータスのスナップショット
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub supported: bool,
    pub permission: PermissionState,
    pub subscribed: bool,
    pub sdk: ReadinessState,
    /// 購読中のみ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<EncodedSubscription>,
}

impl StatusSnapshot {
    /// Query the manager through its public operations only
    pub async fn capture(manager: &SubscriptionManager) -> Self {
        let supported = manager.is_supported();
        let permission = manager.permission_state();
        let subscribed = manager.is_subscribed().await;
        let details = if subscribed {
            manager.get_subscription_details().await
        } else {
            None
        };

        Self {
            supported,
            permission,
            subscribed,
            sdk: manager.sdk_state(),
            details,
        }
    }
}

/// ユーザー操作の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Subscribe,
    Unsubscribe,
    TestNotification,
}

impl Operation {
    /// Label shown while the operation runs
    pub fn pending_label(&self) -> &'static str {
        match self {
            Operation::Subscribe => "Subscribing...",
            Operation::Unsubscribe => "Unsubscribing...",
            Operation::TestNotification => "Sending test notification...",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKind {
    Success,
    Error,
}

/// 自動で消える情報メッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoMessage {
    pub text: String,
    pub kind: InfoKind,
    pub shown_at: Instant,
}

/// アプリケーション状態
pub struct AppState {
    /// 最新のステータス（初回取得前はNone）
    pub snapshot: Option<StatusSnapshot>,
    /// 実行中の操作
    pub pending: Option<Operation>,
    /// 情報メッセージ
    pub info: Option<InfoMessage>,
    info_dismiss: Duration,
    /// 終了フラグ
    pub should_quit: bool,
}

impl AppState {
    pub fn new(info_dismiss: Duration) -> Self {
        Self {
            snapshot: None,
            pending: None,
            info: None,
            info_dismiss,
            should_quit: false,
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: StatusSnapshot) {
        self.snapshot = Some(snapshot);
    }

    /// Subscribe is offered unless unsupported, subscribed or denied
    pub fn can_subscribe(&self) -> bool {
        if self.pending.is_some() {
            return false;
        }
        match &self.snapshot {
            Some(s) => s.supported && !s.subscribed && s.permission != PermissionState::Denied,
            None => false,
        }
    }

    pub fn can_unsubscribe(&self) -> bool {
        self.pending.is_none() && self.is_subscribed()
    }

    pub fn can_test(&self) -> bool {
        self.pending.is_none() && self.is_subscribed()
    }

    fn is_subscribed(&self) -> bool {
        self.snapshot
            .as_ref()
            .map(|s| s.supported && s.subscribed)
            .unwrap_or(false)
    }

    /// 操作を開始（ボタンが無効なら false）
    pub fn begin(&mut self, op: Operation) -> bool {
        let allowed = match op {
            Operation::Subscribe => self.can_subscribe(),
            Operation::Unsubscribe => self.can_unsubscribe(),
            Operation::TestNotification => self.can_test(),
        };
        if allowed {
            self.pending = Some(op);
        }
        allowed
    }

    pub fn finish_subscribe(&mut self, result: Result<OperationResult, String>) {
        self.pending = None;
        match result {
            Ok(OperationResult::Success) => {
                self.show_success("Successfully subscribed to push notifications!")
            }
            Ok(OperationResult::Failure(FailureReason::PermissionDenied)) => self.show_error(
                "Permission denied. Please allow notifications in your browser settings.",
            ),
            Ok(OperationResult::Failure(reason)) => {
                self.show_error(format!("Failed to subscribe: {}", reason))
            }
            Err(e) => self.show_error(format!("Failed to subscribe: {}", e)),
        }
    }

    pub fn finish_unsubscribe(&mut self, result: OperationResult) {
        self.pending = None;
        match result {
            OperationResult::Success => {
                self.show_success("Successfully unsubscribed from push notifications")
            }
            OperationResult::Failure(reason) => {
                self.show_error(format!("Failed to unsubscribe: {}", reason))
            }
        }
    }

    pub fn finish_test(&mut self, result: Result<(), String>) {
        self.pending = None;
        match result {
            Ok(()) => self.show_success("Test notification sent!"),
            Err(e) => self.show_error(format!("Failed to show notification: {}", e)),
        }
    }

    /// 同意設定の結果（`Ok(false)` はSDK未準備で送信されなかった）
    pub fn finish_consent(&mut self, value: ConsentValue, result: Result<bool, String>) {
        match result {
            Ok(true) => self.show_success(format!("Consent set to '{}'", value)),
            Ok(false) => self.show_error("SDK not ready, consent not sent"),
            Err(e) => self.show_error(format!("Failed to set consent: {}", e)),
        }
    }

    /// ページビュー送信の結果
    pub fn finish_page_view(&mut self, result: Result<bool, String>) {
        match result {
            Ok(true) => self.show_success("Page view sent"),
            Ok(false) => self.show_error("SDK not ready, page view not sent"),
            Err(e) => self.show_error(format!("Failed to send page view: {}", e)),
        }
    }

    pub fn show_success(&mut self, text: impl Into<String>) {
        self.show_info(text.into(), InfoKind::Success);
    }

    pub fn show_error(&mut self, text: impl Into<String>) {
        self.show_info(text.into(), InfoKind::Error);
    }

    fn show_info(&mut self, text: String, kind: InfoKind) {
        self.info = Some(InfoMessage {
            text,
            kind,
            shown_at: Instant::now(),
        });
    }

    /// 期限切れの情報メッセージを消す
    pub fn tick(&mut self, now: Instant) {
        let expired = self
            .info
            .as_ref()
            .map(|info| now.saturating_duration_since(info.shown_at) >= self.info_dismiss)
            .unwrap_or(false);
        if expired {
            self.info = None;
        }
    }

    /// Pretty JSON of the subscription, shown while subscribed
    pub fn details_json(&self) -> Option<String> {
        self.snapshot
            .as_ref()
            .and_then(|s| s.details.as_ref())
            .and_then(|details| serde_json::to_string_pretty(details).ok())
    }
}
