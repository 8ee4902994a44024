//! Send the user to the identity provider.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::ServerError;
use crate::login::LoginOrchestrator;

/// Tag used when the caller did not say which application it is.
const MISSING_APP_TYPE: &str = "invalid_entry";

#[derive(Debug, Deserialize)]
pub struct Params {
    #[serde(rename = "app-type")]
    app_type: Option<String>,
}

pub async fn handler(
    State(orchestrator): State<Arc<LoginOrchestrator>>,
    Query(params): Query<Params>,
) -> Result<Response, ServerError> {
    let tag = params.app_type.as_deref().unwrap_or(MISSING_APP_TYPE);
    let url = orchestrator.begin_login_with_tag(tag)?;

    Ok(super::redirect(url))
}
