use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Caller-supplied ids longer than this (or carrying characters outside
/// [A-Za-z0-9._-]) are replaced rather than propagated into logs.
const MAX_REQUEST_ID_LEN: usize = 64;

/// Request id available to handlers via extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Accept the caller's `x-request-id` when it is well formed, otherwise
/// mint a fresh UUID. The id is written back onto the request so the
/// trace span picks it up, stashed in extensions, and echoed on the
/// response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    match HeaderValue::from_str(&request_id) {
        Ok(value) => {
            req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
            req.extensions_mut().insert(RequestId(request_id));

            let mut response = next.run(req).await;
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
            response
        }
        Err(_) => next.run(req).await,
    }
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.len() > MAX_REQUEST_ID_LEN {
        return None;
    }
    let acceptable = raw
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    acceptable.then(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_ids_pass_through() {
        assert_eq!(
            sanitize_request_id("req-1234.abc_DEF").as_deref(),
            Some("req-1234.abc_DEF")
        );
        assert_eq!(sanitize_request_id("  trimmed  ").as_deref(), Some("trimmed"));
    }

    #[test]
    fn oversized_or_hostile_ids_are_replaced() {
        assert_eq!(sanitize_request_id(""), None);
        assert_eq!(sanitize_request_id(&"x".repeat(65)), None);
        assert_eq!(sanitize_request_id("abc\rnope"), None);
        assert_eq!(sanitize_request_id("id with spaces"), None);
    }
}
