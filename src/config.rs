use secrecy::SecretBox;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database_url: SecretBox<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // リカバリー設定
    /// リセットリンクの生成に使うベースURL（テンプレート描画でのみ参照される）
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// 有効期限を指定しないリクエストに適用されるデフォルトTTL（時間単位）
    #[serde(default = "default_recovery_expiration_hours")]
    pub recovery_expiration_hours: i64,
    /// 期限切れレコードの掃除間隔（秒）
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    // SMTP設定（オプション - email機能有効時のみ使用）
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<SecretBox<String>>,
    pub smtp_password: Option<SecretBox<String>>,
    #[serde(default)]
    pub smtp_from_address: Option<String>,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
const DEFAULT_RECOVERY_EXPIRATION_HOURS: i64 = 3;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 3600;
const DEFAULT_SMTP_PORT: u16 = 587;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_recovery_expiration_hours() -> i64 {
    DEFAULT_RECOVERY_EXPIRATION_HOURS
}

fn default_cleanup_interval_secs() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_SECS
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}
