use axum::{
    extract::{FromRequest, Request},
    Json,
};
use civic_core::error::AppError;
use serde::de::DeserializeOwned;
use validator::Validate;

/// JSON extractor that runs the DTO's `validator` rules and rejects
/// through the shared error taxonomy: malformed bodies become
/// `BadRequest`, rule failures become `ValidationError` with the
/// per-field messages in the details.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Malformed JSON body: {}", e.body_text())))?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request as HttpRequest, StatusCode};
    use axum::response::IntoResponse;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct EmailForm {
        #[validate(email)]
        email: String,
    }

    fn json_request(body: &str) -> Request {
        HttpRequest::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn rule_failures_map_to_validation_error() {
        let req = json_request(r#"{"email":"not-an-email"}"#);
        let err = ValidatedJson::<EmailForm>::from_request(req, &())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_bodies_map_to_bad_request() {
        let req = json_request("{not json");
        let err = ValidatedJson::<EmailForm>::from_request(req, &())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn valid_bodies_pass_through() {
        let req = json_request(r#"{"email":"jane@example.com"}"#);
        let ValidatedJson(form) = ValidatedJson::<EmailForm>::from_request(req, &())
            .await
            .unwrap();
        assert_eq!(form.email, "jane@example.com");
    }
}
