use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use std::time::Duration;

use super::state::StatusSnapshot;
use crate::push::OperationResult;
use crate::sdk::ConsentValue;

/// アプリケーション内部イベント
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// キー入力
    Key(KeyEvent),
    /// ターミナルリサイズ
    Resize(u16, u16),
    /// ステータス再取得の結果
    Snapshot(StatusSnapshot),
    /// subscribe完了（Errはプラットフォームによる権限要求の拒否）
    Subscribed(Result<OperationResult, String>),
    /// unsubscribe完了
    Unsubscribed(OperationResult),
    /// テスト通知の結果
    TestNotified(Result<(), String>),
    /// SDKの準備状態が確定した
    SdkResolved,
    /// 同意設定の結果（falseはSDK未準備）
    ConsentSet(ConsentValue, Result<bool, String>),
    /// ページビュー送信の結果
    PageViewSent(Result<bool, String>),
}

/// ユーザーアクション（キー入力から変換）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Subscribe,
    Unsubscribe,
    TestNotification,
    /// 同意を設定
    SetConsent(ConsentValue),
    /// ページビュー送信
    SendPageView,
    /// リフレッシュ
    Refresh,
    /// 終了
    Quit,
    /// 何もしない
    None,
}

impl From<KeyEvent> for Action {
    fn from(key: KeyEvent) -> Self {
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Action::Quit,
            (KeyCode::Char('s'), _) => Action::Subscribe,
            (KeyCode::Char('u'), _) => Action::Unsubscribe,
            (KeyCode::Char('t'), _) => Action::TestNotification,
            (KeyCode::Char('i'), _) => Action::SetConsent(ConsentValue::Granted),
            (KeyCode::Char('o'), _) => Action::SetConsent(ConsentValue::Denied),
            (KeyCode::Char('v'), _) => Action::SendPageView,
            // リフレッシュ
            (KeyCode::Char('r'), _) => Action::Refresh,
            // 終了
            (KeyCode::Char('q') | KeyCode::Esc, _) => Action::Quit,
            // その他
            _ => Action::None,
        }
    }
}

/// イベントポーリング
pub fn poll_event(timeout: Duration) -> std::io::Result<Option<AppEvent>> {
    if event::poll(timeout)? {
        match event::read()? {
            Event::Key(key) => Ok(Some(AppEvent::Key(key))),
            Event::Resize(w, h) => Ok(Some(AppEvent::Resize(w, h))),
            _ => Ok(None),
        }
    } else {
        Ok(None)
    }
}
