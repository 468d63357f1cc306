use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Separator between content and message id on the wire.
pub const DELIMITER: char = '|';

/// A log line as it travels through the broker.
///
/// Wire form is `content|message_id`. Decoding splits on the last
/// delimiter, so content may itself contain `|` while ids never do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    content: String,
    message_id: String,
}

impl LogMessage {
    /// Create a message with a freshly generated UUID v4 id.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a message with a caller-supplied id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidRecord` if the id is empty or contains the delimiter.
    pub fn with_id(content: impl Into<String>, message_id: impl Into<String>) -> AppResult<Self> {
        let message_id = message_id.into();
        if message_id.is_empty() {
            return Err(AppError::InvalidRecord("message id cannot be empty".to_string()));
        }
        if message_id.contains(DELIMITER) {
            return Err(AppError::InvalidRecord(format!(
                "message id cannot contain '{DELIMITER}'"
            )));
        }
        Ok(Self {
            content: content.into(),
            message_id,
        })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Serialize to the wire form `content|message_id`.
    pub fn encode(&self) -> String {
        format!("{}{DELIMITER}{}", self.content, self.message_id)
    }
}

impl FromStr for LogMessage {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (content, message_id) = raw
            .rsplit_once(DELIMITER)
            .ok_or_else(|| AppError::InvalidRecord("missing delimiter".to_string()))?;

        if message_id.is_empty() {
            return Err(AppError::InvalidRecord("empty message id".to_string()));
        }

        Ok(Self {
            content: content.to_string(),
            message_id: message_id.to_string(),
        })
    }
}

impl fmt::Display for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{DELIMITER}{}", self.content, self.message_id)
    }
}
