//! Bearer-token authentication for the ingest endpoint.

use axum::http::HeaderMap;

/// Why an ingest request was not authenticated. Maps onto 500/401/403:
/// a missing server-side token is our misconfiguration, never the caller's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// INGEST_TOKEN is not configured on the server.
    ServerMisconfigured,
    /// No `Authorization: Bearer ...` header on the request.
    MissingBearer,
    /// Token present but wrong.
    InvalidToken,
}

/// Check the Authorization header against the configured token.
pub fn check_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), AuthFailure> {
    let expected = match expected {
        Some(t) if !t.is_empty() => t,
        _ => return Err(AuthFailure::ServerMisconfigured),
    };

    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = match header.strip_prefix("Bearer ") {
        Some(t) => t,
        None => return Err(AuthFailure::MissingBearer),
    };

    if constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(AuthFailure::InvalidToken)
    }
}

/// Constant-time comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn valid_token_passes() {
        let headers = headers_with("Bearer secret-token");
        assert_eq!(check_bearer(&headers, Some("secret-token")), Ok(()));
    }

    #[test]
    fn missing_server_token_is_server_error() {
        let headers = headers_with("Bearer anything");
        assert_eq!(
            check_bearer(&headers, None),
            Err(AuthFailure::ServerMisconfigured)
        );
        assert_eq!(
            check_bearer(&headers, Some("")),
            Err(AuthFailure::ServerMisconfigured)
        );
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let headers = HeaderMap::new();
        assert_eq!(
            check_bearer(&headers, Some("secret")),
            Err(AuthFailure::MissingBearer)
        );
    }

    #[test]
    fn non_bearer_scheme_is_unauthorized() {
        let headers = headers_with("Basic dXNlcjpwYXNz");
        assert_eq!(
            check_bearer(&headers, Some("secret")),
            Err(AuthFailure::MissingBearer)
        );
    }

    #[test]
    fn wrong_token_is_forbidden() {
        let headers = headers_with("Bearer wrong");
        assert_eq!(
            check_bearer(&headers, Some("secret")),
            Err(AuthFailure::InvalidToken)
        );
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }
}
