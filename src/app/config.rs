use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::sim::PromptResponse;
use crate::worker::NotificationDefaults;

/// SDK設定（外部イニシャライザが `configure` に渡す）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkSettings {
    #[serde(default)]
    pub datastream_id: String,
    #[serde(default)]
    pub org_id: String,
    #[serde(default = "default_edge_domain")]
    pub edge_domain: String,
    /// プッシュサービスに渡すVAPID公開鍵
    #[serde(default)]
    pub vapid_public_key: String,
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub tracking_dataset_id: String,
    #[serde(default)]
    pub debug_enabled: bool,
    /// ユーザーが選択するまで適用する同意状態
    #[serde(default = "default_consent")]
    pub default_consent: String,
}

fn default_edge_domain() -> String {
    "edge.adobedc.net".to_string()
}

fn default_consent() -> String {
    "pending".to_string()
}

impl Default for SdkSettings {
    fn default() -> Self {
        Self {
            datastream_id: String::new(),
            org_id: String::new(),
            edge_domain: default_edge_domain(),
            vapid_public_key: String::new(),
            application_id: String::new(),
            tracking_dataset_id: String::new(),
            debug_enabled: false,
            default_consent: default_consent(),
        }
    }
}

/// 通知ワーカー設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// イニシャライザが登録するワーカースクリプト
    #[serde(default = "default_script_path")]
    pub script_path: String,
    /// install時に待機フェーズをスキップするか
    #[serde(default = "default_skip_waiting")]
    pub skip_waiting_on_install: bool,
    /// 通知の却下を記録するJSON Linesファイル（未設定なら記録しない）
    #[serde(default)]
    pub dismissal_log: Option<PathBuf>,
    /// プッシュに含まれないときに使う通知のデフォルト値
    #[serde(default)]
    pub notification: NotificationDefaults,
}

fn default_script_path() -> String {
    "/service-worker.js".to_string()
}

fn default_skip_waiting() -> bool {
    true
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            script_path: default_script_path(),
            skip_waiting_on_install: default_skip_waiting(),
            dismissal_log: None,
            notification: NotificationDefaults::default(),
        }
    }
}

/// シミュレーションホストの挙動
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    /// 権限プロンプトへのシミュレーション上の応答
    #[serde(default)]
    pub prompt_response: PromptResponse,
    /// SDKロード完了までの遅延（ミリ秒）
    #[serde(default)]
    pub sdk_load_delay_ms: u64,
    /// SDKのロードを失敗させる
    #[serde(default)]
    pub sdk_fail: bool,
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// ワーカーの登録スコープ
    #[serde(default = "default_scope")]
    pub scope: String,
    /// ワーカーソケットパス
    #[serde(default = "crate::worker::socket_path")]
    pub socket_path: PathBuf,
    /// ログレベル
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// SDKの準備待ちタイムアウト（秒、未設定で無制限）
    #[serde(default)]
    pub ready_timeout_secs: Option<u64>,
    /// 情報メッセージの自動消去までの秒数
    #[serde(default = "default_info_dismiss_secs")]
    pub info_dismiss_secs: u64,
    #[serde(default)]
    pub sdk: SdkSettings,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

fn default_scope() -> String {
    "https://localhost:8080/".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_info_dismiss_secs() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            socket_path: crate::worker::socket_path(),
            log_level: default_log_level(),
            ready_timeout_secs: None,
            info_dismiss_secs: default_info_dismiss_secs(),
            sdk: SdkSettings::default(),
            worker: WorkerConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

impl Config {
    /// 設定ファイルから読み込み（存在しない場合はデフォルトを作成して保存）
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::parse(&content)
        } else {
            // 初回起動時はデフォルト設定をファイルに保存
            let config = Self::default();
            if let Err(e) = config.save() {
                tracing::warn!("Failed to save default config: {}", e);
            }
            Ok(config)
        }
    }

    /// TOML文字列から読み込み
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// 設定ファイルパスを取得
    pub fn config_path() -> Result<PathBuf> {
        // ~/.config/push-coordinator/config.toml を使用
        let base_dirs = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("Failed to determine home directory"))?;
        Ok(base_dirs.home_dir().join(".config/push-coordinator/config.toml"))
    }

    /// 現在の設定をファイルに保存
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    pub fn ready_timeout(&self) -> Option<std::time::Duration> {
        self.ready_timeout_secs.map(std::time::Duration::from_secs)
    }
}
