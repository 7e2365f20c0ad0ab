use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::IntoResponse,
};

/// Route classes with different browser policies: the Swagger UI needs
/// inline assets and same-origin framing, while the JSON API should
/// never render, frame, or be cached anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Surface {
    Docs,
    Api,
}

fn surface_for(path: &str) -> Surface {
    if path.starts_with("/docs") || path.starts_with("/api-docs") {
        Surface::Docs
    } else {
        Surface::Api
    }
}

pub async fn security_headers_middleware(req: Request, next: Next) -> impl IntoResponse {
    let surface = surface_for(req.uri().path());

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );

    match surface {
        Surface::Docs => {
            headers.insert(
                header::CONTENT_SECURITY_POLICY,
                HeaderValue::from_static(
                    "default-src 'self'; \
                     script-src 'self' 'unsafe-inline'; \
                     style-src 'self' 'unsafe-inline'; \
                     img-src 'self' data:; \
                     connect-src 'self'",
                ),
            );
            headers.insert(
                header::X_FRAME_OPTIONS,
                HeaderValue::from_static("SAMEORIGIN"),
            );
        }
        Surface::Api => {
            headers.insert(
                header::CONTENT_SECURITY_POLICY,
                HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
            );
            headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
            // Responses carry session tokens and OTP echoes.
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swagger_routes_get_the_relaxed_policy() {
        assert_eq!(surface_for("/docs"), Surface::Docs);
        assert_eq!(surface_for("/docs/index.html"), Surface::Docs);
        assert_eq!(surface_for("/api-docs/openapi.json"), Surface::Docs);
    }

    #[test]
    fn everything_else_is_locked_down() {
        assert_eq!(surface_for("/api/auth/login/user"), Surface::Api);
        assert_eq!(surface_for("/health"), Surface::Api);
        assert_eq!(surface_for("/"), Surface::Api);
    }
}
