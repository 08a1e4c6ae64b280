pub mod mailer;
pub mod notify;
pub mod password_encoder;
pub mod recovery;
pub mod token;

pub use mailer::MailRelay;
pub use notify::{EmailDispatcher, NotificationDispatcher};
pub use password_encoder::{Argon2PasswordEncoder, PasswordEncoder};
pub use recovery::RecoveryService;
pub use token::TokenGenerator;
