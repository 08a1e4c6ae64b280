use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::models::{NotificationEvent, RecoveryRecord, TemplateKind};

/// 通知ディスパッチャー
///
/// fire-and-forget: イベントをリレーへ引き渡した時点で完了とみなす。
/// 配送の成否は呼び出し元の結果に影響しない（失敗はログのみ）。
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send_recovery_email(&self, record: &RecoveryRecord);
    async fn send_one_time_token(&self, record: &RecoveryRecord);
}

/// メールリレーへの発行実装
///
/// イベントバス（unbounded チャネル）に NotificationEvent を流すだけで、
/// テンプレート描画もSMTP送信もここでは行わない。
#[derive(Clone)]
pub struct EmailDispatcher {
    relay_tx: UnboundedSender<NotificationEvent>,
}

impl EmailDispatcher {
    pub fn new(relay_tx: UnboundedSender<NotificationEvent>) -> Self {
        Self { relay_tx }
    }

    fn publish(&self, event: NotificationEvent) {
        // リレー停止中でも呼び出し元を失敗させない
        if self.relay_tx.send(event).is_err() {
            tracing::warn!("通知リレーが停止しているためイベントを破棄");
        }
    }
}

#[async_trait]
impl NotificationDispatcher for EmailDispatcher {
    async fn send_recovery_email(&self, record: &RecoveryRecord) {
        tracing::info!(email = %record.email, "リカバリー通知をディスパッチ");
        self.publish(NotificationEvent::from_record(TemplateKind::Recovery, record));
    }

    async fn send_one_time_token(&self, record: &RecoveryRecord) {
        tracing::info!(email = %record.email, "ワンタイムトークン通知をディスパッチ");
        self.publish(NotificationEvent::from_record(
            TemplateKind::OneTimeToken,
            record,
        ));
    }
}
