mod health;
mod logs;

pub use health::{health_check, readiness_check, stats};
pub use logs::{get_log, home, publish_log};
