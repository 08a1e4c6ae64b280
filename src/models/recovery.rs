use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// パスワードリカバリーレコード
///
/// 未処理のリカバリーリクエスト1件を表す。token をキーとして永続化され、
/// リセット成功または掃除処理によって削除されるまで有効。
/// token は作成後に変更されない。
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RecoveryRecord {
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub token: String,
    pub expiration_date: OffsetDateTime,
    pub locale: String,
}

impl RecoveryRecord {
    /// 期限切れ判定
    ///
    /// expiration_date == now は期限切れ扱い（厳密に未来の場合のみ有効）
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expiration_date <= now
    }
}
