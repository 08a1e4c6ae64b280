use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::mpsc::UnboundedSender;

use crate::clock::SystemClock;
use crate::config::Config;
use crate::models::NotificationEvent;
use crate::repositories::{PgRecoveryStore, PgUserDirectory};
use crate::services::{Argon2PasswordEncoder, EmailDispatcher, RecoveryService};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// リカバリーサービス（全依存をインターフェース参照で保持）
    pub recovery_service: RecoveryService,
}

impl AppState {
    /// 新しい AppState を作成
    ///
    /// 本番構成: PostgreSQL のストア/ディレクトリ、argon2 エンコーダー、
    /// メールリレーへのディスパッチャー、システムクロック。
    pub fn new(
        db_pool: PgPool,
        relay_tx: UnboundedSender<NotificationEvent>,
        config: Config,
    ) -> Self {
        let config = Arc::new(config);

        let recovery_service = RecoveryService::new(
            Arc::new(PgUserDirectory::new(db_pool.clone())),
            Arc::new(PgRecoveryStore::new(db_pool)),
            Arc::new(Argon2PasswordEncoder::new()),
            Arc::new(EmailDispatcher::new(relay_tx)),
            Arc::new(SystemClock::new()),
            config.recovery_expiration_hours,
        );

        Self {
            config,
            recovery_service,
        }
    }
}
