use reqwest::StatusCode;
use serde_json::Value;

use super::ProviderError;

const RATE_LIMIT_CODE: u64 = 429;
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

/// True when the response is a rate-limit signal, either through the status
/// line or through a code embedded in the JSON error body.
pub fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || body_signals_rate_limit(body)
}

pub fn body_signals_rate_limit(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return false;
    };

    if is_rate_limit_code(value.get("status")) || is_rate_limit_code(value.get("code")) {
        return true;
    }

    let Some(error) = value.get("error") else {
        return false;
    };

    if is_rate_limit_code(error.get("code")) || is_rate_limit_code(error.get("status")) {
        return true;
    }

    if error
        .get("status")
        .and_then(Value::as_str)
        .map(|status| status.eq_ignore_ascii_case("RESOURCE_EXHAUSTED"))
        .unwrap_or(false)
    {
        return true;
    }

    error
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors.iter().any(|entry| {
                entry
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(|reason| RATE_LIMIT_REASONS.contains(&reason))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

fn is_rate_limit_code(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Number(number)) => number.as_u64() == Some(RATE_LIMIT_CODE),
        Some(Value::String(text)) => text.trim() == "429",
        _ => false,
    }
}

/// Maps a non-2xx response to the provider error taxonomy.
pub fn classify_http_failure(status: StatusCode, body: String) -> ProviderError {
    if is_rate_limited(status, &body) {
        ProviderError::RateLimited
    } else {
        ProviderError::Http {
            status: status.as_u16(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_rate_limited() {
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, ""));
        assert!(!is_rate_limited(StatusCode::INTERNAL_SERVER_ERROR, "oops"));
    }

    #[test]
    fn detects_embedded_codes() {
        assert!(body_signals_rate_limit(r#"{"ok":false,"status":429}"#));
        assert!(body_signals_rate_limit(r#"{"error":{"code":429,"message":"slow down"}}"#));
        assert!(body_signals_rate_limit(r#"{"error":{"code":"429"}}"#));
        assert!(body_signals_rate_limit(
            r#"{"error":{"code":400,"status":"RESOURCE_EXHAUSTED"}}"#
        ));
        assert!(body_signals_rate_limit(
            r#"{"error":{"code":403,"errors":[{"reason":"userRateLimitExceeded"}]}}"#
        ));
    }

    #[test]
    fn ordinary_failures_are_not_rate_limits() {
        assert!(!body_signals_rate_limit("not json"));
        assert!(!body_signals_rate_limit(
            r#"{"error":{"code":403,"errors":[{"reason":"forbidden"}]}}"#
        ));
        assert!(!body_signals_rate_limit(r#"{"status":500}"#));
    }

    #[test]
    fn classifies_http_failures() {
        let err = classify_http_failure(StatusCode::FORBIDDEN, r#"{"error":{"code":429}}"#.into());
        assert!(matches!(err, ProviderError::RateLimited));

        let err = classify_http_failure(StatusCode::BAD_GATEWAY, "upstream down".into());
        match err {
            ProviderError::Http { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
