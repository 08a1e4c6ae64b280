pub mod notification;
pub mod recovery;
pub mod user;

pub use notification::{NotificationEvent, TemplateKind};
pub use recovery::RecoveryRecord;
pub use user::User;
