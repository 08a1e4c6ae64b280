use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("ユーザーが見つかりません")]
    UserNotFound,

    #[error("無効または期限切れのトークンです")]
    InvalidToken,

    #[error("管理者権限が必要です")]
    NonAdminUser,

    #[error("不正な引数: {0}")]
    InvalidArgument(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),

    #[error("内部エラー")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::UserNotFound => (
                StatusCode::NOT_FOUND,
                "該当するユーザーが見つかりません".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::BAD_REQUEST,
                // 不在と期限切れを区別しない（トークン存在有無の漏洩防止）
                "無効または期限切れのトークンです".to_string(),
            ),
            Self::NonAdminUser => (
                StatusCode::FORBIDDEN,
                "この操作には管理者権限が必要です".to_string(),
            ),
            Self::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Database(e) => {
                tracing::error!(error = ?e, "データベースエラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = ?e, "内部エラー");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "内部エラーが発生しました".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
