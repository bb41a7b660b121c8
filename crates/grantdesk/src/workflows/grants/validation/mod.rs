//! Turns untrusted JSON payloads into validated grant workflow inputs.
//!
//! Every validator walks the whole payload and reports all problems it finds, in field order,
//! rather than stopping at the first one.

mod blocks;
mod creation;
mod fields;
mod review;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub use creation::{validate_creation, validate_update};
pub use review::{
    validate_assignment, validate_bulk_update, validate_cancellation, validate_review,
};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;
pub const MAX_REQUESTED_AMOUNT: f64 = 10_000_000.0;
pub const MAX_SUPPORTING_DOCUMENTS: usize = 10;
pub const MAX_REVIEW_TEXT_CHARS: usize = 1000;
pub const MAX_REASON_CHARS: usize = 500;
pub const MAX_BULK_IDS: usize = 50;

/// Ordered list of human-readable problems with a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation failed: {}", .errors.join("; "))]
pub struct ValidationFailure {
    pub errors: Vec<String>,
}

impl ValidationFailure {
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
        }
    }
}

/// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` date (midnight UTC).
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    fields::parse_timestamp(raw)
}

fn as_object(payload: &Value) -> Result<&Map<String, Value>, ValidationFailure> {
    payload
        .as_object()
        .ok_or_else(|| ValidationFailure::single("Request body must be a JSON object"))
}
