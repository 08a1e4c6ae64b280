use crate::models::RecoveryRecord;

/// 通知テンプレートの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// パスワードリカバリー案内
    Recovery,
    /// 管理者向けワンタイムトークン案内
    OneTimeToken,
}

/// メールリレーへ渡す通知イベント
///
/// 永続化されない。描画に必要な情報（テンプレート種別・宛先・ロケール・
/// トークン）だけを運び、本文の組み立てはリレー側で行う。
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub kind: TemplateKind,
    pub recipient: String,
    pub username: String,
    pub locale: String,
    pub token: String,
}

impl NotificationEvent {
    pub fn from_record(kind: TemplateKind, record: &RecoveryRecord) -> Self {
        Self {
            kind,
            recipient: record.email.clone(),
            username: record.username.clone(),
            locale: record.locale.clone(),
            token: record.token.clone(),
        }
    }
}
