use crate::error::{AppError, AppResult};

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length for resource names (streams, topics).
///
/// This matches Iggy's internal limit for identifier length.
pub const MAX_NAME_LENGTH: usize = 255;

/// Default upper bound for log content, in bytes.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 64 * 1024;

/// Validate a resource name (stream or topic).
///
/// Rules:
/// - Must be between 1 and 255 characters
/// - Must start and end with an alphanumeric character
/// - Can contain alphanumeric characters, dots, underscores, and hyphens
/// - Cannot contain consecutive dots, underscores, or hyphens
pub fn validate_resource_name(name: &str, resource_type: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::BadRequest(format!(
            "{resource_type} name cannot be empty"
        )));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(AppError::BadRequest(format!(
            "{resource_type} name cannot exceed {MAX_NAME_LENGTH} characters"
        )));
    }

    if !name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest(format!(
            "{resource_type} name must start with an alphanumeric character"
        )));
    }

    if !name.chars().next_back().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest(format!(
            "{resource_type} name must end with an alphanumeric character"
        )));
    }

    let mut prev_special = false;
    for (i, c) in name.chars().enumerate() {
        let is_special = matches!(c, '.' | '_' | '-');

        if !c.is_ascii_alphanumeric() && !is_special {
            return Err(AppError::BadRequest(format!(
                "{resource_type} name contains invalid character '{c}' at position {i}. \
                 Only alphanumeric characters, dots, underscores, and hyphens are allowed"
            )));
        }

        if is_special && prev_special {
            return Err(AppError::BadRequest(format!(
                "{resource_type} name cannot contain consecutive special characters at position {i}"
            )));
        }

        prev_special = is_special;
    }

    Ok(())
}

/// Validate the content of a log line before it is published.
///
/// Any text is accepted up to `max_len` bytes, including the empty string,
/// newlines and the delimiter `|`. Records are split on the last delimiter
/// and message ids never contain one.
pub fn validate_content(content: &str, max_len: usize) -> AppResult<()> {
    if content.len() > max_len {
        return Err(AppError::BadRequest(format!(
            "Log content cannot exceed {} bytes (got {})",
            max_len,
            content.len()
        )));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_resource_name("sys-log-stream", "Stream").is_ok());
        assert!(validate_resource_name("sys_log.v2", "Topic").is_ok());
        assert!(validate_resource_name("a", "Stream").is_ok());
    }

    #[test]
    fn test_empty_name() {
        let result = validate_resource_name("", "Stream");
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_name_too_long() {
        let long_name = "a".repeat(256);
        let result = validate_resource_name(&long_name, "Stream");
        assert!(result.unwrap_err().to_string().contains("cannot exceed"));
    }

    #[test]
    fn test_name_edges_must_be_alphanumeric() {
        let start = validate_resource_name("-topic", "Topic").unwrap_err();
        assert!(start.to_string().contains("must start with an alphanumeric"));

        let end = validate_resource_name("topic.", "Topic").unwrap_err();
        assert!(end.to_string().contains("must end with an alphanumeric"));
    }

    #[test]
    fn test_name_invalid_characters() {
        let err = validate_resource_name("sys|log", "Topic").unwrap_err();
        assert!(err.to_string().contains("invalid character '|'"));

        let err = validate_resource_name("sys--log", "Topic").unwrap_err();
        assert!(err.to_string().contains("consecutive special"));
    }

    #[test]
    fn test_valid_content() {
        assert!(validate_content("disk usage above 90%", 1024).is_ok());
        assert!(validate_content("a|b|c", 1024).is_ok());
        assert!(validate_content("col1\tcol2", 1024).is_ok());
        assert!(validate_content("überwachung gestartet", 1024).is_ok());
    }

    #[test]
    fn test_empty_content_allowed() {
        assert!(validate_content("", 1024).is_ok());
        assert!(validate_content("", 0).is_ok());
    }

    #[test]
    fn test_content_too_long() {
        let content = "x".repeat(17);
        let err = validate_content(&content, 16).unwrap_err();
        assert!(err.to_string().contains("cannot exceed 16 bytes"));
        assert!(validate_content(&"x".repeat(16), 16).is_ok());
    }

    #[test]
    fn test_multiline_content_allowed() {
        assert!(validate_content("java.lang.NullPointerException\n\tat Foo.bar(Foo.java:42)", 1024).is_ok());
        assert!(validate_content("line one\r\nline two", 1024).is_ok());
    }
}
