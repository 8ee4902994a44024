//! End a web session.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;

use crate::login::LoginOrchestrator;

pub async fn handler(State(orchestrator): State<Arc<LoginOrchestrator>>) -> Response {
    orchestrator.logout()
}
