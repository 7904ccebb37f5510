//! Normalization of raw stored check records.
//!
//! Records come from disk and may have been written by older versions of the
//! CRUD layer or edited by hand, so every field is checked independently and
//! all problems are reported together.

use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{CheckDescriptor, CheckState, HttpMethod, Protocol};

/// Length of generated check ids
pub const CHECK_ID_LEN: usize = 20;

/// Length of a subscriber id (a ten digit phone number)
pub const OWNER_ID_LEN: usize = 10;

pub const MIN_TIMEOUT_SECONDS: u64 = 1;
pub const MAX_TIMEOUT_SECONDS: u64 = 5;

const KNOWN_FIELDS: [&str; 9] = [
    "id",
    "userPhone",
    "protocol",
    "url",
    "method",
    "successCodes",
    "timeoutSeconds",
    "state",
    "lastChecked",
];

/// A single rejected field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl FieldError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self { field, reason: reason.into() }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// A stored record that cannot be turned into a check
#[derive(Debug, Clone, Error)]
#[error("malformed check record: {}", join_problems(.problems))]
pub struct ValidationError {
    pub problems: Vec<FieldError>,
}

fn join_problems(problems: &[FieldError]) -> String {
    problems.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Validate a raw record and normalize it into a [`CheckDescriptor`].
///
/// `state` and `lastChecked` are optional: a check the worker has never seen
/// defaults to `down` and "never checked". Unknown keys are preserved.
pub fn validate_check(raw: &Value) -> Result<CheckDescriptor, ValidationError> {
    let Some(record) = raw.as_object() else {
        return Err(ValidationError {
            problems: vec![FieldError::new("record", "expected a JSON object")],
        });
    };

    let mut problems = Vec::new();

    let id = collect(validate_fixed_string(record, "id", CHECK_ID_LEN), &mut problems);
    let owner_id =
        collect(validate_fixed_string(record, "userPhone", OWNER_ID_LEN), &mut problems);
    let protocol = collect(validate_protocol(record), &mut problems);
    let url = collect(validate_url(record), &mut problems);
    let method = collect(validate_method(record), &mut problems);
    let success_codes = collect(validate_success_codes(record), &mut problems);
    let timeout_seconds = collect(validate_timeout(record.get("timeoutSeconds")), &mut problems);

    let (
        Some(id),
        Some(owner_id),
        Some(protocol),
        Some(url),
        Some(method),
        Some(success_codes),
        Some(timeout_seconds),
    ) = (id, owner_id, protocol, url, method, success_codes, timeout_seconds)
    else {
        return Err(ValidationError { problems });
    };

    let extra: Map<String, Value> = record
        .iter()
        .filter(|(key, _)| !KNOWN_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(CheckDescriptor {
        id,
        owner_id,
        protocol,
        url,
        method,
        success_codes,
        timeout_seconds,
        state: normalize_state(record.get("state")),
        last_checked: normalize_last_checked(record.get("lastChecked")),
        extra,
    })
}

fn collect<T>(result: Result<T, FieldError>, problems: &mut Vec<FieldError>) -> Option<T> {
    result.map_err(|problem| problems.push(problem)).ok()
}

fn validate_fixed_string(
    record: &Map<String, Value>,
    field: &'static str,
    expected_len: usize,
) -> Result<String, FieldError> {
    let value = record
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| FieldError::new(field, "missing or not a string"))?
        .trim();

    if value.chars().count() != expected_len {
        return Err(FieldError::new(
            field,
            format!("expected {expected_len} characters, got {}", value.chars().count()),
        ));
    }

    Ok(value.to_string())
}

fn validate_protocol(record: &Map<String, Value>) -> Result<Protocol, FieldError> {
    record
        .get("protocol")
        .and_then(Value::as_str)
        .and_then(Protocol::parse)
        .ok_or_else(|| FieldError::new("protocol", "must be one of http, https"))
}

fn validate_url(record: &Map<String, Value>) -> Result<String, FieldError> {
    let url = record
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    if url.is_empty() {
        return Err(FieldError::new("url", "missing or empty"));
    }

    Ok(url.to_string())
}

fn validate_method(record: &Map<String, Value>) -> Result<HttpMethod, FieldError> {
    record
        .get("method")
        .and_then(Value::as_str)
        .and_then(HttpMethod::parse)
        .ok_or_else(|| FieldError::new("method", "must be one of get, post, put, delete"))
}

fn validate_success_codes(record: &Map<String, Value>) -> Result<Vec<u16>, FieldError> {
    let codes = record
        .get("successCodes")
        .and_then(Value::as_array)
        .ok_or_else(|| FieldError::new("successCodes", "missing or not a list"))?;

    if codes.is_empty() {
        return Err(FieldError::new("successCodes", "must not be empty"));
    }

    codes
        .iter()
        .map(|code| {
            code.as_u64()
                .and_then(|code| u16::try_from(code).ok())
                .ok_or_else(|| FieldError::new("successCodes", format!("{code} is not a status code")))
        })
        .collect()
}

/// Validate the per-probe timeout
pub fn validate_timeout(value: Option<&Value>) -> Result<u64, FieldError> {
    let seconds = value
        .and_then(Value::as_u64)
        .ok_or_else(|| FieldError::new("timeoutSeconds", "missing or not a whole number"))?;

    if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&seconds) {
        return Err(FieldError::new(
            "timeoutSeconds",
            format!("{seconds} outside {MIN_TIMEOUT_SECONDS}..={MAX_TIMEOUT_SECONDS}"),
        ));
    }

    Ok(seconds)
}

fn normalize_state(value: Option<&Value>) -> CheckState {
    match value.and_then(Value::as_str) {
        Some("up") => CheckState::Up,
        _ => CheckState::Down,
    }
}

// The CRUD layer stores `false` for checks that were never executed.
fn normalize_last_checked(value: Option<&Value>) -> Option<i64> {
    value.and_then(Value::as_i64).filter(|millis| *millis > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    impl ValidationError {
        fn has_problem_with(&self, field: &str) -> bool {
            self.problems.iter().any(|p| p.field == field)
        }
    }

    fn raw_check() -> Value {
        json!({
            "id": "abcdefghij0123456789",
            "userPhone": "5551234567",
            "protocol": "http",
            "url": "example.com/health",
            "method": "get",
            "successCodes": [200, 201],
            "timeoutSeconds": 3,
        })
    }

    #[test]
    fn test_valid_record_defaults_state() {
        let check = validate_check(&raw_check()).unwrap();
        assert_eq!(check.id, "abcdefghij0123456789");
        assert_eq!(check.protocol, Protocol::Http);
        assert_eq!(check.method, HttpMethod::Get);
        assert_eq!(check.success_codes, vec![200, 201]);
        assert_eq!(check.state, CheckState::Down);
        assert_eq!(check.last_checked, None);
    }

    #[test]
    fn test_existing_state_is_kept() {
        let mut raw = raw_check();
        raw["state"] = json!("up");
        raw["lastChecked"] = json!(1_700_000_000_000_i64);

        let check = validate_check(&raw).unwrap();
        assert_eq!(check.state, CheckState::Up);
        assert_eq!(check.last_checked, Some(1_700_000_000_000));
    }

    #[test]
    fn test_unset_markers_mean_never_checked() {
        for marker in [json!(false), json!(0), json!(null), json!("yesterday")] {
            let mut raw = raw_check();
            raw["lastChecked"] = marker;
            raw["state"] = json!("sideways");

            let check = validate_check(&raw).unwrap();
            assert_eq!(check.last_checked, None);
            assert_eq!(check.state, CheckState::Down);
        }
    }

    #[test]
    fn test_strings_are_trimmed() {
        let mut raw = raw_check();
        raw["id"] = json!("  abcdefghij0123456789 ");
        raw["url"] = json!(" example.com ");

        let check = validate_check(&raw).unwrap();
        assert_eq!(check.id, "abcdefghij0123456789");
        assert_eq!(check.url, "example.com");
    }

    #[test]
    fn test_missing_url_is_rejected() {
        let mut raw = raw_check();
        raw.as_object_mut().unwrap().remove("url");

        let err = validate_check(&raw).unwrap_err();
        assert!(err.has_problem_with("url"));
        assert_eq!(err.problems.len(), 1);
    }

    #[test]
    fn test_every_bad_field_is_reported() {
        let raw = json!({
            "id": "short",
            "userPhone": 5551234567_u64,
            "protocol": "ftp",
            "url": "",
            "method": "patch",
            "successCodes": [],
            "timeoutSeconds": 9,
        });

        let err = validate_check(&raw).unwrap_err();
        for field in ["id", "userPhone", "protocol", "url", "method", "successCodes", "timeoutSeconds"] {
            assert!(err.has_problem_with(field), "{field} not reported");
        }
    }

    #[test]
    fn test_non_object_record() {
        let err = validate_check(&json!(["not", "a", "check"])).unwrap_err();
        assert!(err.has_problem_with("record"));
    }

    #[test]
    fn test_validate_timeout() {
        assert_eq!(validate_timeout(Some(&json!(1))).unwrap(), 1); // Min
        assert_eq!(validate_timeout(Some(&json!(5))).unwrap(), 5); // Max

        assert!(validate_timeout(Some(&json!(0))).is_err());
        assert!(validate_timeout(Some(&json!(6))).is_err());
        assert!(validate_timeout(Some(&json!(2.5))).is_err());
        assert!(validate_timeout(Some(&json!("3"))).is_err());
        assert!(validate_timeout(None).is_err());
    }

    #[test]
    fn test_success_codes_must_be_status_codes() {
        let mut raw = raw_check();
        raw["successCodes"] = json!([200, "ok"]);
        assert!(validate_check(&raw).unwrap_err().has_problem_with("successCodes"));

        raw["successCodes"] = json!([70000]);
        assert!(validate_check(&raw).unwrap_err().has_problem_with("successCodes"));
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let mut raw = raw_check();
        raw["label"] = json!("marketing site");

        let check = validate_check(&raw).unwrap();
        assert_eq!(check.extra.get("label"), Some(&json!("marketing site")));
        assert!(!check.extra.contains_key("url"));
    }
}
