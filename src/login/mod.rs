//! Login flow.
//!
//! A login goes through three steps: the user is redirected to the identity
//! provider, the provider calls back with a one-time code, then the code is
//! traded for a profile which is signed into a session token and handed to
//! the client that started the login.

mod client;
mod state;

use std::sync::Arc;

use axum::extract::FromRef;
use axum::response::Response;
use url::Url;

pub use client::{CliResponder, ClientKind, ClientResponder, WebResponder};
pub use state::StateCodec;

use crate::AppState;
use crate::config::{ClientCredentials, Clients, Configuration};
use crate::error::{Result, ServerError};
use crate::provider::{IdentityProvider, SCOPES};
use crate::token::{Claims, SessionToken, SessionTokenCodec};

const BEARER: &str = "Bearer";

/// Token part of an `Authorization` header value.
fn bearer_token(header: &str) -> &str {
    let header = header.trim();
    match header.strip_prefix(BEARER) {
        Some(rest) if rest.is_empty() || rest.starts_with(' ') => rest.trim(),
        _ => header,
    }
}

/// Drives logins from redirect to token delivery, and checks tokens on
/// protected requests.
pub struct LoginOrchestrator {
    provider: Arc<dyn IdentityProvider>,
    codec: SessionTokenCodec,
    states: StateCodec,
    clients: Clients,
    authorize_url: Url,
    callback_url: String,
    prompt: Option<String>,
    cli: CliResponder,
    web: WebResponder,
}

impl FromRef<AppState> for Arc<LoginOrchestrator> {
    fn from_ref(state: &AppState) -> Arc<LoginOrchestrator> {
        Arc::clone(&state.orchestrator)
    }
}

impl LoginOrchestrator {
    /// Create a new [`LoginOrchestrator`].
    pub fn new(
        config: &Configuration,
        provider: Arc<dyn IdentityProvider>,
        codec: SessionTokenCodec,
    ) -> Result<Self> {
        let authorize_url =
            Url::parse(&config.provider.authorize_url()).map_err(|err| {
                ServerError::Internal {
                    details: "invalid authorization endpoint".into(),
                    source: Some(Box::new(err)),
                }
            })?;

        let states = StateCodec::new(config.state_key.as_deref());
        if !states.is_signed() {
            tracing::warn!(
                "no `state_key` configured, callbacks are not bound to this gateway"
            );
        }

        Ok(Self {
            provider,
            codec,
            states,
            clients: config.clients.clone(),
            authorize_url,
            callback_url: config.callback_url.clone(),
            prompt: config.provider.prompt.clone(),
            cli: CliResponder,
            web: WebResponder::new(
                config.frontend_url.clone(),
                config.cookie.name.clone(),
                config.cookie.secure,
            ),
        })
    }

    /// Authorization URL to send the user to.
    pub fn begin_login(&self, kind: ClientKind) -> Result<String> {
        self.authorization_url(kind.as_str(), self.clients.for_kind(kind))
    }

    /// Same as [`LoginOrchestrator::begin_login`] for a raw `app-type` value.
    ///
    /// An unknown tag is not refused here: it travels in the state with the
    /// default credentials and the callback rejects it.
    pub fn begin_login_with_tag(&self, tag: &str) -> Result<String> {
        match tag.parse::<ClientKind>() {
            Ok(kind) => self.begin_login(kind),
            Err(_) => self.authorization_url(tag, &self.clients.default),
        }
    }

    fn authorization_url(&self, tag: &str, credentials: &ClientCredentials) -> Result<String> {
        let state = self.states.encode(tag)?;

        let mut url = self.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &credentials.client_id)
                .append_pair("redirect_uri", &self.callback_url)
                .append_pair("scope", SCOPES)
                .append_pair("state", &state);
            if let Some(prompt) = &self.prompt {
                query.append_pair("prompt", prompt);
            }
        }

        Ok(url.into())
    }

    /// Trade the callback parameters for a session token.
    ///
    /// Checks run in order and stop at the first failure; the provider is
    /// never contacted without a code and a known client.
    pub async fn authenticate(
        &self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<(ClientKind, SessionToken)> {
        let code = code
            .filter(|code| !code.is_empty())
            .ok_or(ServerError::MissingCode)?;
        let kind = self
            .states
            .decode(state.ok_or(ServerError::UnknownClient)?)?;

        let access_token = self
            .provider
            .exchange_code(code, &self.callback_url, self.clients.for_kind(kind))
            .await?;
        let profile = self.provider.fetch_profile(&access_token).await?;
        let token = self.codec.sign(&profile)?;

        tracing::info!(client = %kind, subject = %profile.subject, "user logged in");
        Ok((kind, token))
    }

    /// Complete a login and deliver the token to its client.
    pub async fn complete_login(
        &self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<Response> {
        match self.authenticate(code, state).await {
            Ok((kind, token)) => {
                metrics::counter!("logins_total", "client" => kind.as_str(), "outcome" => "success")
                    .increment(1);
                Ok(self.responder(kind).respond(&token))
            },
            Err(err) => {
                let client = state
                    .and_then(|state| self.states.decode(state).ok())
                    .map_or("unknown", |kind| kind.as_str());
                metrics::counter!("logins_total", "client" => client, "outcome" => err.kind())
                    .increment(1);
                Err(err)
            },
        }
    }

    fn responder(&self, kind: ClientKind) -> &dyn ClientResponder {
        match kind {
            ClientKind::Cli => &self.cli,
            ClientKind::Web => &self.web,
        }
    }

    /// Check the token carried by an `Authorization` header.
    ///
    /// Both the raw token and the `Bearer <token>` form are accepted.
    pub fn authorize(&self, header: Option<&str>) -> Result<Claims> {
        let token = header
            .map(bearer_token)
            .filter(|token| !token.is_empty())
            .ok_or(ServerError::MissingCredential);

        let result = token.and_then(|token| self.codec.verify(token));
        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        metrics::counter!("verifications_total", "outcome" => outcome).increment(1);

        result
    }

    /// Response dropping the web session.
    pub fn logout(&self) -> Response {
        self.web.logout()
    }
}
