use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// アカウント情報
///
/// 本サービスはユーザーを作成しない。参照とパスワードハッシュの更新のみ行う。
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub roles: Vec<String>,
    pub locale: String,
}

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
