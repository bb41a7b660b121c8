use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use super::ValidationFailure;

/// Result of reading one JSON member. `null` counts as missing.
pub(super) enum Read<T> {
    Missing,
    Invalid,
    Value(T),
}

impl<T> Read<T> {
    pub(super) fn value(self) -> Option<T> {
        match self {
            Read::Value(value) => Some(value),
            Read::Missing | Read::Invalid => None,
        }
    }
}

pub(super) fn lookup<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|value| !value.is_null())
}

/// Ordered collection of every problem found in one payload.
#[derive(Debug, Default)]
pub(super) struct Report {
    errors: Vec<String>,
}

impl Report {
    pub(super) fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub(super) fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub(super) fn into_failure(mut self) -> ValidationFailure {
        if self.errors.is_empty() {
            self.errors.push("Request payload is incomplete".to_string());
        }
        ValidationFailure {
            errors: self.errors,
        }
    }

    /// Trimmed string member. Wrong JSON types are reported against `key`.
    pub(super) fn text(&mut self, object: &Map<String, Value>, key: &str) -> Read<String> {
        match lookup(object, key) {
            None => Read::Missing,
            Some(Value::String(raw)) => Read::Value(raw.trim().to_string()),
            Some(_) => {
                self.push(format!("{key} must be a string"));
                Read::Invalid
            }
        }
    }

    /// Non-empty trimmed string; `missing` is reported when absent or blank.
    pub(super) fn required_text(
        &mut self,
        object: &Map<String, Value>,
        key: &str,
        missing: &str,
    ) -> Option<String> {
        match self.text(object, key) {
            Read::Value(value) if !value.is_empty() => Some(value),
            Read::Value(_) | Read::Missing => {
                self.push(missing);
                None
            }
            Read::Invalid => None,
        }
    }

    /// Optional string; blank values collapse to `None`.
    pub(super) fn optional_text(
        &mut self,
        object: &Map<String, Value>,
        key: &str,
    ) -> Option<String> {
        self.text(object, key)
            .value()
            .filter(|value| !value.is_empty())
    }

    pub(super) fn limit_length(
        &mut self,
        value: Option<String>,
        max_chars: usize,
        too_long: &str,
    ) -> Option<String> {
        match value {
            Some(value) if value.chars().count() > max_chars => {
                self.push(too_long);
                None
            }
            other => other,
        }
    }

    pub(super) fn number(&mut self, object: &Map<String, Value>, key: &str) -> Read<f64> {
        match lookup(object, key) {
            None => Read::Missing,
            Some(Value::Number(number)) => match number.as_f64() {
                Some(value) if value.is_finite() => Read::Value(value),
                _ => {
                    self.push(format!("{key} must be a number"));
                    Read::Invalid
                }
            },
            Some(_) => {
                self.push(format!("{key} must be a number"));
                Read::Invalid
            }
        }
    }

    /// Optional amount that may not be negative.
    pub(super) fn non_negative_amount(
        &mut self,
        object: &Map<String, Value>,
        key: &str,
        negative: &str,
    ) -> Option<f64> {
        match self.number(object, key) {
            Read::Value(value) if value < 0.0 => {
                self.push(negative);
                None
            }
            other => other.value(),
        }
    }

    /// Whole-number member. Negative values report `negative`.
    pub(super) fn count(
        &mut self,
        object: &Map<String, Value>,
        key: &str,
        negative: &str,
    ) -> Read<u32> {
        match self.number(object, key) {
            Read::Value(value) if value < 0.0 => {
                self.push(negative);
                Read::Invalid
            }
            Read::Value(value) if value.fract() != 0.0 || value > f64::from(u32::MAX) => {
                self.push(format!("{key} must be a whole number"));
                Read::Invalid
            }
            Read::Value(value) => Read::Value(value as u32),
            Read::Missing => Read::Missing,
            Read::Invalid => Read::Invalid,
        }
    }

    pub(super) fn flag(&mut self, object: &Map<String, Value>, key: &str) -> Read<bool> {
        match lookup(object, key) {
            None => Read::Missing,
            Some(Value::Bool(flag)) => Read::Value(*flag),
            Some(_) => {
                self.push(format!("{key} must be true or false"));
                Read::Invalid
            }
        }
    }

    /// RFC 3339 timestamp or `YYYY-MM-DD` date, the latter read as midnight UTC.
    pub(super) fn date(&mut self, object: &Map<String, Value>, key: &str) -> Read<DateTime<Utc>> {
        match lookup(object, key) {
            None => Read::Missing,
            Some(Value::String(raw)) => match parse_timestamp(raw) {
                Some(value) => Read::Value(value),
                None => {
                    self.push(format!("{key} must be an ISO 8601 date"));
                    Read::Invalid
                }
            },
            Some(_) => {
                self.push(format!("{key} must be an ISO 8601 date"));
                Read::Invalid
            }
        }
    }

    /// Parse a string member through `FromStr`, reporting `invalid` on failure.
    pub(super) fn label<T: std::str::FromStr>(
        &mut self,
        object: &Map<String, Value>,
        key: &str,
        invalid: &str,
    ) -> Read<T> {
        match lookup(object, key) {
            None => Read::Missing,
            Some(Value::String(raw)) => match raw.trim().parse::<T>() {
                Ok(value) => Read::Value(value),
                Err(_) => {
                    self.push(invalid);
                    Read::Invalid
                }
            },
            Some(_) => {
                self.push(invalid);
                Read::Invalid
            }
        }
    }

    pub(super) fn array<'a>(
        &mut self,
        object: &'a Map<String, Value>,
        key: &str,
        not_array: &str,
    ) -> Read<&'a Vec<Value>> {
        match lookup(object, key) {
            None => Read::Missing,
            Some(Value::Array(items)) => Read::Value(items),
            Some(_) => {
                self.push(not_array);
                Read::Invalid
            }
        }
    }

    pub(super) fn object<'a>(
        &mut self,
        object: &'a Map<String, Value>,
        key: &str,
    ) -> Read<&'a Map<String, Value>> {
        match lookup(object, key) {
            None => Read::Missing,
            Some(Value::Object(inner)) => Read::Value(inner),
            Some(_) => {
                self.push(format!("{key} must be an object"));
                Read::Invalid
            }
        }
    }

    /// Parse every element of a string array through `FromStr`.
    pub(super) fn labels<T: std::str::FromStr>(
        &mut self,
        items: &[Value],
        kind: &str,
    ) -> Option<Vec<T>> {
        let mut parsed = Vec::with_capacity(items.len());
        let mut clean = true;
        for item in items {
            match item.as_str().map(|raw| raw.trim().parse::<T>()) {
                Some(Ok(value)) => parsed.push(value),
                Some(Err(_)) => {
                    self.push(format!("Invalid {kind} '{}'", item.as_str().unwrap_or_default()));
                    clean = false;
                }
                None => {
                    self.push(format!("Invalid {kind} {item}"));
                    clean = false;
                }
            }
        }
        clean.then_some(parsed)
    }

    /// Optional list of free-form labels.
    pub(super) fn string_list(
        &mut self,
        object: &Map<String, Value>,
        key: &str,
    ) -> Read<Vec<String>> {
        let message = format!("{key} must be a list of strings");
        match self.array(object, key, &message) {
            Read::Value(items) => {
                let values: Option<Vec<String>> = items
                    .iter()
                    .map(|item| item.as_str().map(|raw| raw.trim().to_string()))
                    .collect();
                match values {
                    Some(values) => {
                        Read::Value(values.into_iter().filter(|v| !v.is_empty()).collect())
                    }
                    None => {
                        self.push(message);
                        Read::Invalid
                    }
                }
            }
            Read::Missing => Read::Missing,
            Read::Invalid => Read::Invalid,
        }
    }
}

pub(super) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

/// `local@domain.tld`: no whitespace, exactly one `@`, a dot with text on both sides after it.
pub(super) fn is_valid_email(candidate: &str) -> bool {
    EMAIL_PATTERN.is_match(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn email_shape_matches_single_at_and_dotted_domain() {
        assert!(is_valid_email("head@school.edu.ng"));
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("head@school"));
        assert!(!is_valid_email("head school@x.org"));
        assert!(!is_valid_email("@school.org"));
        assert!(!is_valid_email("a@@school.org"));
        assert!(!is_valid_email("a@school."));
        assert!(!is_valid_email("head\t@school.org"));
    }

    #[test]
    fn email_dots_only_need_text_on_either_side_of_one_of_them() {
        assert!(is_valid_email("a@b.com."));
        assert!(is_valid_email("a.@b.com"));
        assert!(is_valid_email("a@b..com"));
        assert!(!is_valid_email("a@.com"));
    }

    #[test]
    fn timestamps_accept_rfc3339_and_plain_dates() {
        assert_eq!(
            parse_timestamp("2026-01-05"),
            Some(Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_timestamp("2026-01-05T10:30:00+01:00"),
            Some(Utc.with_ymd_and_hms(2026, 1, 5, 9, 30, 0).unwrap())
        );
        assert_eq!(parse_timestamp("next tuesday"), None);
    }
}
