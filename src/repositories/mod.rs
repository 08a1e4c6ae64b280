pub mod recovery_store;
pub mod user_directory;

pub use recovery_store::{MemoryRecoveryStore, PgRecoveryStore, RecoveryStore};
pub use user_directory::{MemoryUserDirectory, PgUserDirectory, UserDirectory};
