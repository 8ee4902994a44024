//! Check the session token of a protected request.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, header};
use serde::{Deserialize, Serialize};

use crate::ServerError;
use crate::login::LoginOrchestrator;
use crate::token::Claims;

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub message: String,
    pub user_info: Claims,
}

pub async fn handler(
    State(orchestrator): State<Arc<LoginOrchestrator>>,
    headers: HeaderMap,
) -> Result<Json<Response>, ServerError> {
    // A header that is present but not visible ASCII is not a missing one.
    let authorization = headers
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| ServerError::InvalidToken))
        .transpose()?;
    let claims = orchestrator.authorize(authorization)?;

    let name = claims.name.as_deref().unwrap_or(&claims.sub);
    Ok(Json(Response {
        success: true,
        message: format!("Hello, {name}! You are authenticated."),
        user_info: claims,
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use http_body_util::BodyExt;

    use super::*;
    use crate::clock::FixedClock;
    use crate::key::tests::keypair;
    use crate::token::SessionTokenCodec;
    use crate::token::tests::profile;
    use crate::*;

    async fn call(path: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
        let app = app(router::state("http://localhost:1"));
        let response =
            make_request(token, app, Method::GET, path, String::default()).await;

        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn token() -> String {
        SessionTokenCodec::new(keypair(), Duration::from_secs(600))
            .sign(&profile())
            .unwrap()
            .into_inner()
    }

    #[tokio::test]
    async fn test_verify_user() {
        let token = token();

        for path in ["/verify-user", "/authorize"] {
            let (status, body) = call(path, Some(token.as_str())).await;
            assert_eq!(status, StatusCode::OK);

            let body: Response = serde_json::from_value(body).unwrap();
            assert!(body.success);
            assert_eq!(body.message, "Hello, A! You are authenticated.");
            assert_eq!(body.user_info.sub, "u1");
            assert_eq!(body.user_info.email.as_deref(), Some("a@b.com"));
        }
    }

    #[tokio::test]
    async fn test_verify_bearer_token() {
        let (status, _) = call("/verify-user", Some(format!("Bearer {}", token()).as_str())).await;

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_header() {
        let (status, body) = call("/verify-user", None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Authorization header missing");
        assert_eq!(body["kind"], "missing_credential");
    }

    #[tokio::test]
    async fn test_invalid_token() {
        let (status, body) = call("/verify-user", Some("not-a-jwt")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid JWT");
    }

    #[tokio::test]
    async fn test_non_ascii_header() {
        use axum::extract::Request;
        use axum::http::HeaderValue;
        use tower::util::ServiceExt;

        let app = app(router::state("http://localhost:1"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/verify-user")
                    .header(
                        header::AUTHORIZATION,
                        HeaderValue::from_bytes(b"\xff\xfe").unwrap(),
                    )
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "Invalid JWT");
        assert_eq!(body["kind"], "invalid_token");
    }

    #[tokio::test]
    async fn test_expired_token() {
        let token = SessionTokenCodec::new(keypair(), Duration::from_secs(600))
            .with_clock(Box::new(FixedClock::new(1_000)))
            .sign(&profile())
            .unwrap();
        let (status, body) = call("/verify-user", Some(token.as_str())).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "JWT expired");
        assert_eq!(body["kind"], "token_expired");
    }
}
