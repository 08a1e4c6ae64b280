use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::Config;
use crate::models::{NotificationEvent, TemplateKind};

/// 描画済みメール
#[derive(Debug)]
pub struct RenderedMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// テンプレート描画
///
/// 種別とロケールから件名・本文を組み立てる。リセットURLのベースは
/// 設定の server_url（RecoveryService 自体はこの値を参照しない）。
/// ロケールは ja / en の2系統で、未知のロケールは en にフォールバック。
pub fn render(event: &NotificationEvent, server_url: &str) -> RenderedMail {
    let japanese = event.locale.starts_with("ja");

    let (subject, body) = match event.kind {
        TemplateKind::Recovery => {
            let link = format!("{}/recovery/reset?token={}", server_url, event.token);
            if japanese {
                (
                    "パスワード再設定のご案内".to_string(),
                    format!(
                        "{} 様\n\n以下のリンクからパスワードを再設定してください。\n{}\n\nこのリクエストに心当たりがない場合は本メールを破棄してください。",
                        event.username, link
                    ),
                )
            } else {
                (
                    "Password recovery".to_string(),
                    format!(
                        "Hello {},\n\nUse the link below to reset your password.\n{}\n\nIf you did not request this, please ignore this message.",
                        event.username, link
                    ),
                )
            }
        }
        TemplateKind::OneTimeToken => {
            let link = format!("{}/recovery/onetimetoken?token={}", server_url, event.token);
            if japanese {
                (
                    "ワンタイムログイントークン".to_string(),
                    format!(
                        "{} 様\n\n以下のリンクからログインしてください。\n{}",
                        event.username, link
                    ),
                )
            } else {
                (
                    "One-time login token".to_string(),
                    format!(
                        "Hello {},\n\nUse the link below to log in.\n{}",
                        event.username, link
                    ),
                )
            }
        }
    };

    RenderedMail {
        to: event.recipient.clone(),
        subject,
        body,
    }
}

/// メールリレーワーカー
///
/// ディスパッチャーが発行したイベントを消費し、テンプレートを描画して
/// 送信する。email フィーチャー無効時はログ出力のみ（開発モード）。
pub struct MailRelay {
    rx: UnboundedReceiver<NotificationEvent>,
    config: Arc<Config>,
}

impl MailRelay {
    pub fn new(rx: UnboundedReceiver<NotificationEvent>, config: Arc<Config>) -> Self {
        Self { rx, config }
    }

    pub async fn run(mut self) {
        tracing::info!("メールリレー起動");

        while let Some(event) = self.rx.recv().await {
            let mail = render(&event, &self.config.server_url);
            self.deliver(&mail).await;
        }

        tracing::info!("メールリレー停止");
    }

    #[cfg(not(feature = "email"))]
    async fn deliver(&self, mail: &RenderedMail) {
        // 開発モード: メール送信せずログ出力のみ（本文はトークンを含むため出さない）
        tracing::info!(
            to = %mail.to,
            subject = %mail.subject,
            "メール送信（開発モード: ログ出力のみ）"
        );
    }

    #[cfg(feature = "email")]
    async fn deliver(&self, mail: &RenderedMail) {
        if let Err(e) = self.deliver_smtp(mail).await {
            // 配送失敗はリレー内で完結させる（リクエスト側には波及しない）
            tracing::error!(error = ?e, to = %mail.to, "メール送信に失敗");
        }
    }

    #[cfg(feature = "email")]
    async fn deliver_smtp(&self, mail: &RenderedMail) -> anyhow::Result<()> {
        use lettre::message::Mailbox;
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
        use secrecy::ExposeSecret;

        let (host, username, password, from) = match (
            &self.config.smtp_host,
            &self.config.smtp_username,
            &self.config.smtp_password,
            &self.config.smtp_from_address,
        ) {
            (Some(host), Some(username), Some(password), Some(from)) => {
                (host, username, password, from)
            }
            _ => {
                tracing::warn!("SMTP未設定のため送信をスキップ");
                return Ok(());
            }
        };

        let message = Message::builder()
            .from(from.parse::<Mailbox>()?)
            .to(mail.to.parse::<Mailbox>()?)
            .subject(mail.subject.clone())
            .body(mail.body.clone())?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
            .port(self.config.smtp_port)
            .credentials(Credentials::new(
                username.expose_secret().clone(),
                password.expose_secret().clone(),
            ))
            .build();

        mailer.send(message).await?;
        Ok(())
    }
}
