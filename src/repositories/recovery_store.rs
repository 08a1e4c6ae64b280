use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::clock::{Clock, SystemClock};
use crate::error::AppError;
use crate::models::RecoveryRecord;

/// リカバリーレコードの永続化層
///
/// レコードは token をキーとして保存される。トークンの一意性は
/// 生成側のエントロピーとキー検索の組み合わせで担保され、
/// ストア自体はロックによる排他を要求しない。
#[async_trait]
pub trait RecoveryStore: Send + Sync {
    /// 新しいリカバリーレコードを作成
    async fn create(
        &self,
        username: &str,
        email: &str,
        token: &str,
        expiration_date: OffsetDateTime,
        locale: &str,
    ) -> Result<RecoveryRecord, AppError>;

    /// トークンでレコードを検索
    ///
    /// # Note
    /// 有効期限の検証は呼び出し側で行う
    async fn find_for_token(&self, token: &str) -> Result<Option<RecoveryRecord>, AppError>;

    /// 呼び出し時点で期限切れのレコードをすべて取得
    async fn get_expired(&self) -> Result<Vec<RecoveryRecord>, AppError>;

    /// レコードを削除
    ///
    /// 冪等: 既に存在しないレコードの削除はエラーにしない
    async fn remove(&self, record: &RecoveryRecord) -> Result<(), AppError>;
}

/// PostgreSQL 実装
#[derive(Clone)]
pub struct PgRecoveryStore {
    pool: PgPool,
}

impl PgRecoveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecoveryStore for PgRecoveryStore {
    async fn create(
        &self,
        username: &str,
        email: &str,
        token: &str,
        expiration_date: OffsetDateTime,
        locale: &str,
    ) -> Result<RecoveryRecord, AppError> {
        let record = sqlx::query_as::<_, RecoveryRecord>(
            r#"
            INSERT INTO password_recoveries (username, email, token, expiration_date, locale)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING username, email, token, expiration_date, locale
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(token)
        .bind(expiration_date)
        .bind(locale)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_for_token(&self, token: &str) -> Result<Option<RecoveryRecord>, AppError> {
        let record = sqlx::query_as::<_, RecoveryRecord>(
            r#"
            SELECT username, email, token, expiration_date, locale
            FROM password_recoveries
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_expired(&self) -> Result<Vec<RecoveryRecord>, AppError> {
        let records = sqlx::query_as::<_, RecoveryRecord>(
            r#"
            SELECT username, email, token, expiration_date, locale
            FROM password_recoveries
            WHERE expiration_date <= NOW()
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn remove(&self, record: &RecoveryRecord) -> Result<(), AppError> {
        // 行が既に消えていても成功扱い（rows_affected は見ない）
        sqlx::query(
            r#"
            DELETE FROM password_recoveries
            WHERE token = $1
            "#,
        )
        .bind(&record.token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// インメモリ参照実装
///
/// 開発・テスト用。token をキーとした HashMap で、レコード単位の
/// 操作はロック1回で完結する。
pub struct MemoryRecoveryStore {
    records: RwLock<HashMap<String, RecoveryRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryRecoveryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 全レコードのスナップショット（検証用）
    pub fn snapshot(&self) -> Vec<RecoveryRecord> {
        self.records
            .read()
            .expect("store lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

impl Default for MemoryRecoveryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecoveryStore for MemoryRecoveryStore {
    async fn create(
        &self,
        username: &str,
        email: &str,
        token: &str,
        expiration_date: OffsetDateTime,
        locale: &str,
    ) -> Result<RecoveryRecord, AppError> {
        let record = RecoveryRecord {
            username: username.to_string(),
            email: email.to_string(),
            token: token.to_string(),
            expiration_date,
            locale: locale.to_string(),
        };

        self.records
            .write()
            .expect("store lock poisoned")
            .insert(token.to_string(), record.clone());

        Ok(record)
    }

    async fn find_for_token(&self, token: &str) -> Result<Option<RecoveryRecord>, AppError> {
        Ok(self
            .records
            .read()
            .expect("store lock poisoned")
            .get(token)
            .cloned())
    }

    async fn get_expired(&self) -> Result<Vec<RecoveryRecord>, AppError> {
        let now = self.clock.now();
        Ok(self
            .records
            .read()
            .expect("store lock poisoned")
            .values()
            .filter(|r| r.is_expired(now))
            .cloned()
            .collect())
    }

    async fn remove(&self, record: &RecoveryRecord) -> Result<(), AppError> {
        self.records
            .write()
            .expect("store lock poisoned")
            .remove(&record.token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use time::Duration;

    #[tokio::test]
    async fn test_find_for_token_returns_created_record() {
        let store = MemoryRecoveryStore::new();
        let expiration = OffsetDateTime::now_utc() + Duration::hours(1);

        store
            .create("username", "username@domain.net", "token", expiration, "en")
            .await
            .unwrap();

        let found = store.find_for_token("token").await.unwrap().unwrap();
        assert_eq!(found.username, "username");
        assert_eq!(found.expiration_date, expiration);
    }

    #[tokio::test]
    async fn test_get_expired_only_returns_expired_records() {
        let now = OffsetDateTime::now_utc();
        let clock = Arc::new(MockClock::new(now));
        let store = MemoryRecoveryStore::with_clock(clock);

        store
            .create("a", "a@domain.net", "live", now + Duration::hours(1), "en")
            .await
            .unwrap();
        store
            .create("b", "b@domain.net", "gone", now - Duration::hours(1), "en")
            .await
            .unwrap();
        // 境界: 期限 == 現在時刻は期限切れ
        store
            .create("c", "c@domain.net", "edge", now, "en")
            .await
            .unwrap();

        let mut expired: Vec<String> = store
            .get_expired()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.token)
            .collect();
        expired.sort();

        assert_eq!(expired, vec!["edge".to_string(), "gone".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = MemoryRecoveryStore::new();
        let record = store
            .create(
                "username",
                "username@domain.net",
                "token",
                OffsetDateTime::now_utc(),
                "en",
            )
            .await
            .unwrap();

        store.remove(&record).await.unwrap();
        // 2回目も成功する
        store.remove(&record).await.unwrap();
        assert!(store.is_empty());
    }
}
