//! Based on JWK (RFC 7517 <https://datatracker.ietf.org/doc/html/rfc7517>).

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::config::Configuration;
use crate::key::KeyPair;

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    keys: Vec<Key>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Key {
    kty: String,
    alg: String,
    r#use: String,
    key_ops: Vec<String>,
    kid: String,
    n: String,
    e: String,
}

pub async fn handler(
    State(config): State<Arc<Configuration>>,
    State(keys): State<Arc<KeyPair>>,
) -> Json<Response> {
    let (n, e) = keys.public_key().jwk_components();

    Json(Response {
        keys: vec![Key {
            kty: "RSA".into(),
            alg: "RS256".into(),
            r#use: "sig".into(),
            key_ops: vec!["verify".into()],
            kid: config.token.key_id().to_owned(),
            n,
            e,
        }],
    })
}
