pub mod health;
pub mod recovery;

pub use health::health_check;
pub use recovery::{request_one_time_token, request_recovery, reset_password};
