use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::User;

/// ユーザーディレクトリ
///
/// 本サービスはユーザーの作成・削除を行わない。参照と更新のみ。
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// メールアドレスでユーザーを検索
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// ユーザー名でユーザーを検索
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// ユーザー情報（パスワードハッシュ含む）を更新
    ///
    /// # Note
    /// password_hash はログに出力しないこと
    async fn update(&self, user: &User) -> Result<(), AppError>;
}

/// PostgreSQL 実装
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, roles, locale
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, roles, locale
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET email = $2, password_hash = $3, roles = $4, locale = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.roles)
        .bind(&user.locale)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// インメモリ参照実装（開発・テスト用）
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, user: User) {
        self.users
            .write()
            .expect("directory lock poisoned")
            .insert(user.username.clone(), user);
    }
}

impl Default for MemoryUserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .read()
            .expect("directory lock poisoned")
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .read()
            .expect("directory lock poisoned")
            .get(username)
            .cloned())
    }

    async fn update(&self, user: &User) -> Result<(), AppError> {
        self.users
            .write()
            .expect("directory lock poisoned")
            .insert(user.username.clone(), user.clone());
        Ok(())
    }
}
