use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

// === リカバリーリクエスト ===

#[derive(Debug, Deserialize)]
pub struct RecoveryRequest {
    pub email: String,
    /// 省略時は設定のデフォルトTTLが適用される
    #[serde(default)]
    pub expiration_hours: Option<i64>,
    #[serde(default = "default_notify")]
    pub notify: bool,
}

fn default_notify() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct RecoveryResponse {
    pub message: String,
}

/// POST /api/recovery/request
///
/// # Security
/// token はレスポンスにもログにも出さない
pub async fn request_recovery(
    State(state): State<AppState>,
    Json(request): Json<RecoveryRequest>,
) -> Result<Json<RecoveryResponse>, AppError> {
    validate_email(&request.email)?;

    state
        .recovery_service
        .password_recovery_request(&request.email, request.expiration_hours, request.notify)
        .await?;

    Ok(Json(RecoveryResponse {
        message: "パスワードリカバリー手順をメールで送信しました".to_string(),
    }))
}

/// POST /api/recovery/one-time-token
///
/// 管理者アカウントに対してのみワンタイムトークンを発行する
pub async fn request_one_time_token(
    State(state): State<AppState>,
    Json(request): Json<RecoveryRequest>,
) -> Result<Json<RecoveryResponse>, AppError> {
    validate_email(&request.email)?;

    state
        .recovery_service
        .one_time_token_open_id(&request.email, request.expiration_hours, request.notify)
        .await?;

    Ok(Json(RecoveryResponse {
        message: "ワンタイムトークンをメールで送信しました".to_string(),
    }))
}

// === パスワードリセット実行 ===

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordResponse {
    pub message: String,
}

/// POST /api/recovery/reset
///
/// # Security
/// - token, new_password はログに出力しない
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<ResetPasswordResponse>, AppError> {
    validate_reset_password_request(&request)?;

    state
        .recovery_service
        .reset_password(
            &request.token,
            &request.new_password,
            &request.confirm_password,
        )
        .await?;

    tracing::info!("パスワードリセット完了");

    Ok(Json(ResetPasswordResponse {
        message: "パスワードが更新されました".to_string(),
    }))
}

/// メールアドレスのバリデーション
fn validate_email(email: &str) -> Result<(), AppError> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(AppError::InvalidArgument(
            "有効なメールアドレスを入力してください".to_string(),
        ));
    }
    Ok(())
}

/// リセットパスワードリクエストのバリデーション
fn validate_reset_password_request(request: &ResetPasswordRequest) -> Result<(), AppError> {
    if request.token.trim().is_empty() {
        return Err(AppError::InvalidArgument(
            "トークンは必須です".to_string(),
        ));
    }
    if request.new_password.len() < 8 {
        return Err(AppError::InvalidArgument(
            "パスワードは8文字以上で入力してください".to_string(),
        ));
    }
    Ok(())
}
