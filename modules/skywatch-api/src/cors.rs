//! Exact-origin CORS with hard preflight rejection.
//!
//! tower-http's CorsLayer silently omits headers for unknown origins; this
//! deployment instead answers preflights from unlisted origins with 403 so
//! misconfigured embedders fail loudly.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::AppState;

/// Is this Origin on the exact allow-list?
pub fn origin_allowed(origin: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|a| a == origin)
}

pub async fn cors_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if request.method() == Method::OPTIONS {
        return match origin.as_deref() {
            Some(o) if origin_allowed(o, &state.config.allowed_origins) => {
                let mut response = StatusCode::OK.into_response();
                apply_cors_headers(&mut response, o);
                response
            }
            Some(o) => {
                warn!(origin = %o, "blocked CORS preflight from unknown origin");
                StatusCode::FORBIDDEN.into_response()
            }
            // Non-CORS OPTIONS probe
            None => StatusCode::OK.into_response(),
        };
    }

    let mut response = next.run(request).await;
    if let Some(o) = origin.as_deref() {
        if origin_allowed(o, &state.config.allowed_origins) {
            apply_cors_headers(&mut response, o);
        } else {
            warn!(origin = %o, "request from unlisted origin, no CORS headers added");
        }
    }
    response
}

fn apply_cors_headers(response: &mut Response, origin: &str) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_origins_only() {
        let allowed = vec![
            "https://skywatch.example".to_string(),
            "http://localhost:3000".to_string(),
        ];
        assert!(origin_allowed("https://skywatch.example", &allowed));
        assert!(origin_allowed("http://localhost:3000", &allowed));
        assert!(!origin_allowed("https://evil.example", &allowed));
        // No prefix or subdomain matching
        assert!(!origin_allowed("https://skywatch.example.evil.com", &allowed));
        assert!(!origin_allowed("https://sub.skywatch.example", &allowed));
    }

    #[test]
    fn empty_allow_list_blocks_everything() {
        assert!(!origin_allowed("https://skywatch.example", &[]));
    }
}
