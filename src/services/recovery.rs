use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::RecoveryRecord;
use crate::repositories::{RecoveryStore, UserDirectory};
use crate::services::notify::NotificationDispatcher;
use crate::services::password_encoder::PasswordEncoder;
use crate::services::token::TokenGenerator;

/// ワンタイムトークン発行が許可されるロール
pub const ADMIN_ROLE: &str = "admin";

/// パスワードリカバリーサービス
///
/// リカバリーレコードの発行・検証・消費を司るオーケストレーター。
/// 依存はすべてコンストラクタで注入されたインターフェース参照であり、
/// グローバルな状態には一切依存しない。
///
/// # Security
/// - トークン・パスワードはログに出力しない
/// - 通知の配送失敗は永続化済みの結果を覆さない
#[derive(Clone)]
pub struct RecoveryService {
    user_directory: Arc<dyn UserDirectory>,
    recovery_store: Arc<dyn RecoveryStore>,
    password_encoder: Arc<dyn PasswordEncoder>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    token_generator: TokenGenerator,
    clock: Arc<dyn Clock>,
    default_expiration_hours: i64,
}

impl RecoveryService {
    pub fn new(
        user_directory: Arc<dyn UserDirectory>,
        recovery_store: Arc<dyn RecoveryStore>,
        password_encoder: Arc<dyn PasswordEncoder>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        default_expiration_hours: i64,
    ) -> Self {
        Self {
            user_directory,
            recovery_store,
            password_encoder,
            dispatcher,
            token_generator: TokenGenerator::new(),
            clock,
            default_expiration_hours,
        }
    }

    /// パスワードリカバリーリクエスト
    ///
    /// メールアドレスでユーザーを解決し、リカバリーレコードを作成する。
    /// notify が真の場合のみ、レコード永続化後にリカバリー通知を
    /// ディスパッチする。
    pub async fn password_recovery_request(
        &self,
        email: &str,
        expiration_hours: Option<i64>,
        notify: bool,
    ) -> Result<(), AppError> {
        let user = self
            .user_directory
            .find_by_email(email)
            .await?
            .ok_or(AppError::UserNotFound)?;

        let record = self
            .create_recovery(&user.username, &user.email, expiration_hours, &user.locale)
            .await?;

        if notify {
            self.dispatcher.send_recovery_email(&record).await;
        }

        tracing::info!(username = %record.username, "リカバリーレコード作成完了");
        Ok(())
    }

    /// 管理者向けワンタイムトークン発行
    ///
    /// 永続化の流れは password_recovery_request と同一だが、
    /// ユーザー名の存在と admin ロールを追加で検証する。
    /// 成功時はワンタイムトークン通知（リカバリー通知とは別種別）を
    /// ディスパッチする。
    pub async fn one_time_token_open_id(
        &self,
        email: &str,
        expiration_hours: Option<i64>,
        notify: bool,
    ) -> Result<(), AppError> {
        let user = self
            .user_directory
            .find_by_email(email)
            .await?
            .ok_or(AppError::UserNotFound)?;

        if user.username.trim().is_empty() {
            return Err(AppError::UserNotFound);
        }
        if !user.has_role(ADMIN_ROLE) {
            tracing::warn!(username = %user.username, "ワンタイムトークン発行拒否: 管理者ではない");
            return Err(AppError::NonAdminUser);
        }

        let record = self
            .create_recovery(&user.username, &user.email, expiration_hours, &user.locale)
            .await?;

        if notify {
            self.dispatcher.send_one_time_token(&record).await;
        }

        tracing::info!(username = %record.username, "ワンタイムトークン発行完了");
        Ok(())
    }

    /// パスワードリセット
    ///
    /// トークンの存在しない場合と期限切れの場合は同一のエラーを返す
    /// （トークン存在有無の漏洩防止）。期限切れレコードはこの経路では
    /// 削除せず、掃除処理に委ねる。成功したリセットはレコードを削除し、
    /// 同じトークンの再利用を不可能にする。
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AppError> {
        // ストア参照の前に確認用パスワードを検証する
        if new_password != confirm_password {
            return Err(AppError::InvalidArgument(
                "新しいパスワードと確認用パスワードが一致しません".to_string(),
            ));
        }

        let record = self
            .recovery_store
            .find_for_token(token)
            .await?
            .ok_or(AppError::InvalidToken)?;

        if record.is_expired(self.clock.now()) {
            tracing::info!(username = %record.username, "リセット拒否: トークン期限切れ");
            return Err(AppError::InvalidToken);
        }

        // レコードが指すユーザーが消えている場合もトークン無効として扱う
        let mut user = self
            .user_directory
            .find_by_username(&record.username)
            .await?
            .ok_or(AppError::InvalidToken)?;

        user.password_hash = Some(self.password_encoder.encode(new_password)?);
        self.user_directory.update(&user).await?;

        // トークンは一度きり
        self.recovery_store.remove(&record).await?;

        tracing::info!(username = %record.username, "パスワードリセット完了");
        Ok(())
    }

    /// 期限切れレコードの掃除
    ///
    /// 冪等。リセット処理と競合しても、remove の冪等性により
    /// どちらが先でも破綻しない。
    pub async fn clean_up_expired_recoveries(&self) -> Result<(), AppError> {
        let expired = self.recovery_store.get_expired().await?;
        let count = expired.len();

        for record in &expired {
            self.recovery_store.remove(record).await?;
        }

        if count > 0 {
            tracing::info!(count, "期限切れリカバリーレコードを削除");
        }
        Ok(())
    }

    /// レコード作成の共通経路
    ///
    /// 有効期限の検証・トークン生成・永続化を行う。通知はここでは行わない。
    async fn create_recovery(
        &self,
        username: &str,
        email: &str,
        expiration_hours: Option<i64>,
        locale: &str,
    ) -> Result<RecoveryRecord, AppError> {
        let expiration_date = self.compute_expiration(expiration_hours)?;
        let token = self.token_generator.generate();

        self.recovery_store
            .create(username, email, &token, expiration_date, locale)
            .await
    }

    /// 有効期限の計算
    ///
    /// 省略時は設定のデフォルトTTLを適用。明示指定された非正の値は
    /// レコードを書き込む前に拒否する（省略と 0 は別物）。
    fn compute_expiration(
        &self,
        expiration_hours: Option<i64>,
    ) -> Result<OffsetDateTime, AppError> {
        let hours = match expiration_hours {
            Some(hours) if hours <= 0 => {
                return Err(AppError::InvalidArgument(
                    "有効期限は正の値で指定してください".to_string(),
                ));
            }
            Some(hours) => hours,
            None => self.default_expiration_hours,
        };

        Ok(self.clock.now() + Duration::hours(hours))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::clock::MockClock;
    use crate::models::User;
    use crate::repositories::{MemoryRecoveryStore, MemoryUserDirectory};
    use crate::services::token::TOKEN_LENGTH;

    const USERNAME: &str = "username";
    const EMAIL: &str = "username@domain.net";
    const PASSWORD: &str = "password";
    const EXPIRATION_HOURS: i64 = 5;

    /// find_for_token の呼び出し回数を数えるストアラッパー
    struct TrackingStore {
        inner: MemoryRecoveryStore,
        find_calls: AtomicUsize,
    }

    impl TrackingStore {
        fn new(clock: Arc<dyn Clock>) -> Self {
            Self {
                inner: MemoryRecoveryStore::with_clock(clock),
                find_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RecoveryStore for TrackingStore {
        async fn create(
            &self,
            username: &str,
            email: &str,
            token: &str,
            expiration_date: OffsetDateTime,
            locale: &str,
        ) -> Result<RecoveryRecord, AppError> {
            self.inner
                .create(username, email, token, expiration_date, locale)
                .await
        }

        async fn find_for_token(&self, token: &str) -> Result<Option<RecoveryRecord>, AppError> {
            self.find_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.find_for_token(token).await
        }

        async fn get_expired(&self) -> Result<Vec<RecoveryRecord>, AppError> {
            self.inner.get_expired().await
        }

        async fn remove(&self, record: &RecoveryRecord) -> Result<(), AppError> {
            self.inner.remove(record).await
        }
    }

    /// 通知の回数と宛先を記録するディスパッチャー
    #[derive(Default)]
    struct CountingDispatcher {
        recovery_count: AtomicUsize,
        one_time_count: AtomicUsize,
        last_recipient: Mutex<Option<String>>,
    }

    #[async_trait]
    impl NotificationDispatcher for CountingDispatcher {
        async fn send_recovery_email(&self, record: &RecoveryRecord) {
            self.recovery_count.fetch_add(1, Ordering::SeqCst);
            *self.last_recipient.lock().unwrap() = Some(record.email.clone());
        }

        async fn send_one_time_token(&self, record: &RecoveryRecord) {
            self.one_time_count.fetch_add(1, Ordering::SeqCst);
            *self.last_recipient.lock().unwrap() = Some(record.email.clone());
        }
    }

    /// 決定的なエンコーダー（ハッシュ化の代わりに接頭辞を付ける）
    struct PlainEncoder;

    impl PasswordEncoder for PlainEncoder {
        fn encode(&self, password: &str) -> Result<String, AppError> {
            Ok(format!("encoded:{}", password))
        }
    }

    struct Fixture {
        service: RecoveryService,
        directory: Arc<MemoryUserDirectory>,
        store: Arc<TrackingStore>,
        dispatcher: Arc<CountingDispatcher>,
        clock: Arc<MockClock>,
        now: OffsetDateTime,
    }

    fn fixture() -> Fixture {
        let now = OffsetDateTime::now_utc();
        let clock = Arc::new(MockClock::new(now));
        let directory = Arc::new(MemoryUserDirectory::new());
        let store = Arc::new(TrackingStore::new(clock.clone()));
        let dispatcher = Arc::new(CountingDispatcher::default());

        let service = RecoveryService::new(
            directory.clone(),
            store.clone(),
            Arc::new(PlainEncoder),
            dispatcher.clone(),
            clock.clone(),
            3,
        );

        Fixture {
            service,
            directory,
            store,
            dispatcher,
            clock,
            now,
        }
    }

    fn user(roles: &[&str]) -> User {
        User {
            id: Uuid::new_v4(),
            username: USERNAME.to_string(),
            email: EMAIL.to_string(),
            password_hash: Some("old-hash".to_string()),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            locale: "en".to_string(),
        }
    }

    /// ストア内の唯一のレコードを取り出す
    fn stored_record(fx: &Fixture) -> RecoveryRecord {
        let mut records = fx.store.inner.snapshot();
        assert_eq!(records.len(), 1);
        records.pop().unwrap()
    }

    #[tokio::test]
    async fn test_create_recovery() {
        let fx = fixture();
        fx.directory.insert(user(&[]));

        fx.service
            .password_recovery_request(EMAIL, Some(EXPIRATION_HOURS), true)
            .await
            .unwrap();

        assert_eq!(fx.store.inner.len(), 1);

        let record = stored_record(&fx);

        assert_eq!(record.username, USERNAME);
        assert_eq!(record.email, EMAIL);
        assert_eq!(record.locale, "en");
        assert_eq!(record.token.len(), TOKEN_LENGTH);
        // 有効期限は now + 5h ちょうど
        assert_eq!(record.expiration_date, fx.now + Duration::hours(EXPIRATION_HOURS));

        assert_eq!(fx.dispatcher.recovery_count.load(Ordering::SeqCst), 1);
        assert_eq!(fx.dispatcher.one_time_count.load(Ordering::SeqCst), 0);
        assert_eq!(
            fx.dispatcher.last_recipient.lock().unwrap().as_deref(),
            Some(EMAIL)
        );
    }

    #[tokio::test]
    async fn test_create_recovery_without_notify() {
        let fx = fixture();
        fx.directory.insert(user(&[]));

        fx.service
            .password_recovery_request(EMAIL, Some(EXPIRATION_HOURS), false)
            .await
            .unwrap();

        assert_eq!(fx.store.inner.len(), 1);
        assert_eq!(fx.dispatcher.recovery_count.load(Ordering::SeqCst), 0);
        assert_eq!(fx.dispatcher.one_time_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_recovery_rejects_negative_expiration() {
        let fx = fixture();
        fx.directory.insert(user(&[]));

        let err = fx
            .service
            .password_recovery_request(EMAIL, Some(-2), true)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidArgument(_)));
        // レコードは一切作成されない
        assert!(fx.store.inner.is_empty());
        assert_eq!(fx.dispatcher.recovery_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_recovery_rejects_zero_expiration() {
        let fx = fixture();
        fx.directory.insert(user(&[]));

        let err = fx
            .service
            .password_recovery_request(EMAIL, Some(0), true)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidArgument(_)));
        assert!(fx.store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_create_recovery_default_expiration() {
        let fx = fixture();
        fx.directory.insert(user(&[]));

        fx.service
            .password_recovery_request(EMAIL, None, true)
            .await
            .unwrap();

        let record = stored_record(&fx);

        // 省略時はデフォルトTTL（3時間）が適用され、必ず未来になる
        assert!(record.expiration_date > fx.now);
        assert_eq!(record.expiration_date, fx.now + Duration::hours(3));
    }

    #[tokio::test]
    async fn test_create_recovery_unknown_user() {
        let fx = fixture();

        let err = fx
            .service
            .password_recovery_request(EMAIL, Some(EXPIRATION_HOURS), true)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UserNotFound));
        assert!(fx.store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired_records() {
        let fx = fixture();

        fx.store
            .create(USERNAME, EMAIL, "expired-token", fx.now - Duration::hours(1), "en")
            .await
            .unwrap();
        fx.store
            .create(USERNAME, EMAIL, "live-token", fx.now + Duration::hours(1), "en")
            .await
            .unwrap();

        fx.service.clean_up_expired_recoveries().await.unwrap();

        assert_eq!(fx.store.inner.len(), 1);
        assert!(
            fx.store
                .find_for_token("live-token")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            fx.store
                .find_for_token("expired-token")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_cleanup_with_no_expired_records_is_noop() {
        let fx = fixture();
        fx.service.clean_up_expired_recoveries().await.unwrap();
        assert!(fx.store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_reset_rejects_wrong_confirmation_before_lookup() {
        let fx = fixture();

        let err = fx
            .service
            .reset_password("token", PASSWORD, "ppassword")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidArgument(_)));
        // ストア参照は一度も発生しない
        assert_eq!(fx.store.find_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reset_rejects_unknown_token() {
        let fx = fixture();

        let err = fx
            .service
            .reset_password("token", PASSWORD, PASSWORD)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidToken));
    }

    #[tokio::test]
    async fn test_reset_rejects_token_expiring_exactly_now() {
        let fx = fixture();
        fx.directory.insert(user(&[]));
        fx.store
            .create(USERNAME, EMAIL, "token", fx.now, "en")
            .await
            .unwrap();

        let err = fx
            .service
            .reset_password("token", PASSWORD, PASSWORD)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidToken));
        // 期限切れレコードはこの経路では削除されない
        assert_eq!(fx.store.inner.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_rejects_token_after_ttl_elapses() {
        let fx = fixture();
        fx.directory.insert(user(&[]));

        fx.service
            .password_recovery_request(EMAIL, Some(EXPIRATION_HOURS), false)
            .await
            .unwrap();
        let record = stored_record(&fx);

        // TTLちょうど経過した時点で期限切れになる
        fx.clock.advance(Duration::hours(EXPIRATION_HOURS));

        let err = fx
            .service
            .reset_password(&record.token, PASSWORD, PASSWORD)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[tokio::test]
    async fn test_reset_password_round_trip() {
        let fx = fixture();
        fx.directory.insert(user(&[]));
        fx.store
            .create(USERNAME, EMAIL, "token", fx.now + Duration::minutes(30), "en")
            .await
            .unwrap();

        fx.service
            .reset_password("token", PASSWORD, PASSWORD)
            .await
            .unwrap();

        let updated = fx
            .directory
            .find_by_username(USERNAME)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.password_hash.as_deref(), Some("encoded:password"));

        // レコードは消費済みで、同じトークンは再利用できない
        assert!(fx.store.inner.is_empty());
        let err = fx
            .service
            .reset_password("token", PASSWORD, PASSWORD)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }

    #[tokio::test]
    async fn test_one_time_token_requires_admin_role() {
        let fx = fixture();
        fx.directory.insert(user(&["user"]));

        let err = fx
            .service
            .one_time_token_open_id(EMAIL, None, true)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NonAdminUser));
        assert!(fx.store.inner.is_empty());
        assert_eq!(fx.dispatcher.one_time_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_one_time_token_rejects_blank_username() {
        let fx = fixture();
        let mut blank = user(&["admin"]);
        blank.username = String::new();
        // MemoryUserDirectory は username をキーにするため直接登録
        fx.directory.insert(blank);

        let err = fx
            .service
            .one_time_token_open_id(EMAIL, None, true)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UserNotFound));
        assert!(fx.store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_one_time_token_for_admin() {
        let fx = fixture();
        fx.directory.insert(user(&["admin"]));

        fx.service
            .one_time_token_open_id(EMAIL, Some(EXPIRATION_HOURS), true)
            .await
            .unwrap();

        assert_eq!(fx.store.inner.len(), 1);
        let record = stored_record(&fx);
        assert_eq!(record.token.len(), TOKEN_LENGTH);
        assert_eq!(record.expiration_date, fx.now + Duration::hours(EXPIRATION_HOURS));

        // 通知はワンタイムトークン種別のみ
        assert_eq!(fx.dispatcher.one_time_count.load(Ordering::SeqCst), 1);
        assert_eq!(fx.dispatcher.recovery_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_one_time_token_rejects_negative_expiration() {
        let fx = fixture();
        fx.directory.insert(user(&["admin"]));

        let err = fx
            .service
            .one_time_token_open_id(EMAIL, Some(-2), true)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidArgument(_)));
        assert!(fx.store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_one_time_token_default_expiration_is_in_future() {
        let fx = fixture();
        fx.directory.insert(user(&["admin"]));

        fx.service
            .one_time_token_open_id(EMAIL, None, true)
            .await
            .unwrap();

        let record = stored_record(&fx);
        assert!(record.expiration_date > fx.now);
        assert_eq!(fx.dispatcher.one_time_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sweep_and_reset_race_is_absorbed() {
        let fx = fixture();
        fx.directory.insert(user(&[]));
        let record = fx
            .store
            .create(USERNAME, EMAIL, "token", fx.now + Duration::minutes(30), "en")
            .await
            .unwrap();

        // 掃除（あるいは並行リセット）が先にレコードを消した場合、
        // 後から来たリセットは not-found と同じ扱いになる
        fx.store.remove(&record).await.unwrap();

        let err = fx
            .service
            .reset_password("token", PASSWORD, PASSWORD)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidToken));
    }
}
