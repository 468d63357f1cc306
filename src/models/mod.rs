mod api;
mod log_message;
mod sys_log;

pub use api::{HealthResponse, PublishQuery, PublishResponse, StatsResponse};
pub use log_message::{DELIMITER, LogMessage};
pub use sys_log::{NewSysLog, SysLog};
