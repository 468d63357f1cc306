use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A processed log line as stored in the `sys_log` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SysLog {
    /// Store-assigned identifier
    pub id: i64,
    /// Broker message id the record was created from
    pub msg_id: String,
    pub content: String,
    pub create_time: DateTime<Utc>,
}

/// A log record that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSysLog {
    pub msg_id: String,
    pub content: String,
    pub create_time: DateTime<Utc>,
}

impl NewSysLog {
    /// Create a record stamped with the current time.
    pub fn new(msg_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            msg_id: msg_id.into(),
            content: content.into(),
            create_time: Utc::now(),
        }
    }

    pub fn with_id(self, id: i64) -> SysLog {
        SysLog {
            id,
            msg_id: self.msg_id,
            content: self.content,
            create_time: self.create_time,
        }
    }
}
