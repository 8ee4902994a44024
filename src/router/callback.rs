//! Redirect target of the identity provider.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::ServerError;
use crate::login::LoginOrchestrator;

#[derive(Debug, Deserialize)]
pub struct Params {
    code: Option<String>,
    state: Option<String>,
}

pub async fn handler(
    State(orchestrator): State<Arc<LoginOrchestrator>>,
    Query(params): Query<Params>,
) -> Result<Response, ServerError> {
    orchestrator
        .complete_login(params.code.as_deref(), params.state.as_deref())
        .await
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use axum::http::{StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::*;

    async fn mount_provider(server: &MockServer, exchange_status: u16, lookups: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("code=abc123"))
            .respond_with(
                ResponseTemplate::new(exchange_status)
                    .set_body_json(json!({"access_token": "tok1"})),
            )
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": "u1",
                "email": "a@b.com",
                "name": "A",
            })))
            .expect(lookups)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_cli_callback() {
        let server = MockServer::start().await;
        mount_provider(&server, 200, 1).await;
        let state = router::state(&server.uri());
        let app = app(state.clone());

        let response = make_request(
            None,
            app,
            Method::GET,
            "/callback?code=abc123&state=app-type%3DCLI",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("<h1>CLI JWT</h1>"));

        let token = body
            .split("200px;\">")
            .nth(1)
            .and_then(|rest| rest.split("</textarea>").next())
            .unwrap();
        // Same `kid` as the key published at `/.well-known/jwks.json`.
        let jwt_header = jsonwebtoken::decode_header(token).unwrap();
        assert_eq!(jwt_header.kid.as_deref(), Some("test-key"));

        let claims = state.orchestrator.authorize(Some(token)).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.email.as_deref(), Some("a@b.com"));
        assert_eq!(claims.name.as_deref(), Some("A"));

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert!(claims.exp.abs_diff(now + 600) <= 5);
    }

    #[tokio::test]
    async fn test_web_callback() {
        let server = MockServer::start().await;
        mount_provider(&server, 200, 1).await;
        let app = app(router::state(&server.uri()));

        let response = make_request(
            None,
            app,
            Method::GET,
            "/callback?code=abc123&state=app-type%3DWeb",
            String::default(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "http://localhost:8000/calorie-counter/home"
        );
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("jwt_calorie_counter_profile=ey"));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn test_refused_exchange() {
        let server = MockServer::start().await;
        mount_provider(&server, 400, 0).await;
        let app = app(router::state(&server.uri()));

        let response = make_request(
            None,
            app,
            Method::GET,
            "/callback?code=abc123&state=app-type%3DCLI",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["kind"], "exchange_failed");
    }

    #[tokio::test]
    async fn test_refused_profile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok1"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        let app = app(router::state(&server.uri()));

        let response = make_request(
            None,
            app,
            Method::GET,
            "/callback?code=abc123&state=app-type%3DWeb",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        // No session cookie for a failed login.
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "profile_fetch_failed");
    }

    #[tokio::test]
    async fn test_missing_code_and_unknown_client() {
        let server = MockServer::start().await;
        // Nothing may reach the provider.
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        for (uri, kind) in [
            ("/callback?state=app-type%3DCLI", "missing_code"),
            ("/callback", "missing_code"),
            ("/callback?code=abc123&state=app-type%3DFlask", "unknown_client"),
            ("/callback?code=abc123", "unknown_client"),
        ] {
            let app = app(router::state(&server.uri()));
            let response =
                make_request(None, app, Method::GET, uri, String::default()).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let body = response.into_body().collect().await.unwrap().to_bytes();
            let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(body["kind"], kind, "{uri}");
        }
    }
}
