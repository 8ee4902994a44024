//! Outbound calls to the external identity provider.
//!
//! Neither call is ever retried: an authorization code is single-use, so a
//! failed exchange is reported as is and the user has to log in again.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::ClientCredentials;
use crate::error::{Result, ServerError};

const GRANT_TYPE: &str = "authorization_code";
pub const SCOPES: &str = "openid profile email";

/// Subject identity returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stable subject identifier. Never empty.
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Any other claim sent by the provider.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Credential granting access to the provider profile endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([redacted])")
    }
}

/// Port for the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Trade a one-time authorization code for an access token.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        credentials: &ClientCredentials,
    ) -> Result<AccessToken>;

    /// Fetch the profile of the subject behind `access_token`.
    async fn fetch_profile(&self, access_token: &AccessToken) -> Result<UserProfile>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// [`IdentityProvider`] reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    client: Client,
    token_url: String,
    userinfo_url: String,
}

impl HttpIdentityProvider {
    /// Create a new [`HttpIdentityProvider`].
    ///
    /// `timeout` bounds each outbound request; an elapsed timeout counts as
    /// a failed call.
    pub fn new(
        token_url: impl Into<String>,
        userinfo_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ServerError::Internal {
                details: "cannot build http client".into(),
                source: Some(Box::new(err)),
            })?;

        Ok(Self {
            client,
            token_url: token_url.into(),
            userinfo_url: userinfo_url.into(),
        })
    }
}

/// Providers answer 200, 201 or 204 on success.
fn is_success(status: StatusCode) -> bool {
    (200..=204).contains(&status.as_u16())
}

async fn failure_reason(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("status code: {}, {}", status.as_u16(), body.trim())
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        credentials: &ClientCredentials,
    ) -> Result<AccessToken> {
        let form = [
            ("grant_type", GRANT_TYPE),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("scope", SCOPES),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|err| ServerError::ExchangeFailed(err.to_string()))?;

        if !is_success(response.status()) {
            let reason = failure_reason(response).await;
            tracing::warn!(%reason, "authorization code exchange refused");
            return Err(ServerError::ExchangeFailed(reason));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| ServerError::ExchangeFailed(err.to_string()))?;
        let tokens: TokenResponse = serde_json::from_slice(&body)
            .map_err(|err| ServerError::MalformedResponse(err.to_string()))?;

        match tokens.access_token {
            Some(token) if !token.is_empty() => Ok(AccessToken(token)),
            _ => Err(ServerError::MalformedResponse(
                "missing `access_token` field".into(),
            )),
        }
    }

    async fn fetch_profile(&self, access_token: &AccessToken) -> Result<UserProfile> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(access_token.secret())
            .send()
            .await
            .map_err(|err| ServerError::ProfileFetchFailed(err.to_string()))?;

        if !is_success(response.status()) {
            let reason = failure_reason(response).await;
            tracing::warn!(%reason, "profile lookup refused");
            return Err(ServerError::ProfileFetchFailed(reason));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| ServerError::ProfileFetchFailed(err.to_string()))?;
        let profile: UserProfile = serde_json::from_slice(&body)
            .map_err(|err| ServerError::MalformedResponse(err.to_string()))?;

        if profile.subject.is_empty() {
            return Err(ServerError::MalformedResponse("empty `sub` field".into()));
        }

        Ok(profile)
    }
}
