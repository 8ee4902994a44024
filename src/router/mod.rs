//! HTTP handlers.
pub mod auth;
pub mod callback;
pub mod login;
pub mod logout;
pub mod status;
pub mod verify;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

/// `302 Found` to `location`.
pub(crate) fn redirect(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Create a state whose identity provider lives at `provider`.
/// MUST NEVER be used in production.
#[cfg(test)]
pub fn state(provider: &str) -> crate::AppState {
    let config = crate::config::Configuration::from_yaml(&format!(
        r#"
name: gateway
url: http://localhost:7001
provider:
  domain: tenant.example.com
  token_url: {provider}/oauth/token
  userinfo_url: {provider}/userinfo
  timeout: 2
callback_url: http://localhost:7001/callback
frontend_url: http://localhost:8000/calorie-counter/home
clients:
  default:
    client_id: default-id
    client_secret: default-secret
  cli:
    client_id: cli-id
    client_secret: cli-secret
token:
  key_id: test-key
"#
    ))
    .unwrap();

    crate::build_state(config, crate::key::tests::keypair(), None).unwrap()
}
