//! Entry point for front ends: tell them where to start a login.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::{Deserialize, Serialize};

use crate::ServerError;
use crate::config::Configuration;
use crate::login::ClientKind;

#[derive(Debug, Serialize, Deserialize)]
pub struct Body {
    #[serde(rename = "app-type")]
    app_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "login-url")]
    pub login_url: String,
}

pub async fn handler(
    State(config): State<Arc<Configuration>>,
    body: Result<Json<Body>, JsonRejection>,
) -> Result<Json<Response>, ServerError> {
    let Json(body) = body?;
    let kind: ClientKind = body
        .app_type
        .as_deref()
        .ok_or(ServerError::UnknownClient)?
        .parse()?;

    Ok(Json(Response {
        login_url: format!(
            "{}/login?app-type={kind}",
            config.url.trim_end_matches('/')
        ),
    }))
}
