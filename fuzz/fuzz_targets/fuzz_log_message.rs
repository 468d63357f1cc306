//! Fuzz testing for record parsing and content validation.
//!
//! Checks that arbitrary payloads never panic the parser, and that any
//! record which parses encodes back to the same bytes.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_log_message -- -max_total_time=60
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use log_relay::models::LogMessage;
use log_relay::validation::{validate_content, validate_resource_name, DEFAULT_MAX_CONTENT_LENGTH};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(message) = s.parse::<LogMessage>() {
        assert!(!message.message_id().is_empty());
        assert_eq!(message.encode(), s);
    }

    let _ = validate_content(s, DEFAULT_MAX_CONTENT_LENGTH);
    let _ = validate_resource_name(s, "Topic");
});
