//! Configuration manager for the gateway.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;
use crate::login::ClientKind;
use crate::token::DEFAULT_KID;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_ADDRESS: &str = "0.0.0.0:7001";
const DEFAULT_PROMPT: &str = "select_account";
const DEFAULT_PROVIDER_TIMEOUT: u64 = 5; // seconds.
const DEFAULT_TOKEN_TTL: u64 = 60 * 10; // 10 minutes.
const MAX_TOKEN_TTL: u64 = 60 * 60 * 24; // 1 day.
const DEFAULT_COOKIE_NAME: &str = "jwt_calorie_counter_profile";

/// Errors raised while reading `config.yaml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot open configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Public base URL of this service.
    pub url: String,
    /// Socket address the HTTP server binds to.
    #[serde(default = "default_address")]
    pub address: String,
    /// Identity provider endpoints.
    pub provider: Provider,
    /// Redirect URI registered on the identity provider.
    pub callback_url: String,
    /// Landing page of the web front end.
    pub frontend_url: String,
    /// OAuth client credentials, per client kind.
    #[serde(skip_serializing)]
    pub clients: Clients,
    /// Related to session token signing.
    #[serde(default)]
    pub token: Token,
    /// Related to the web session cookie.
    #[serde(default)]
    pub cookie: Cookie,
    /// Secret binding the `state` parameter to this gateway.
    #[serde(default, skip_serializing)]
    pub state_key: Option<String>,
    #[serde(default)]
    pub telemetry: Telemetry,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
}

/// Identity provider configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    /// Hostname of the identity provider, such as `tenant.auth0.com`.
    pub domain: String,
    authorize_url: Option<String>,
    token_url: Option<String>,
    userinfo_url: Option<String>,
    /// `prompt` sent on the authorization redirect.
    #[serde(default = "default_prompt")]
    pub prompt: Option<String>,
    /// Outbound request timeout, in seconds.
    #[serde(default = "default_provider_timeout")]
    pub timeout: u64,
}

impl Provider {
    fn endpoint(&self, explicit: &Option<String>, path: &str) -> String {
        explicit
            .clone()
            .unwrap_or_else(|| format!("https://{}{path}", self.domain))
    }

    pub fn authorize_url(&self) -> String {
        self.endpoint(&self.authorize_url, "/authorize")
    }

    pub fn token_url(&self) -> String {
        self.endpoint(&self.token_url, "/oauth/token")
    }

    pub fn userinfo_url(&self) -> String {
        self.endpoint(&self.userinfo_url, "/userinfo")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// A pair of OAuth client credentials.
#[derive(Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

/// Credentials used for each client kind.
///
/// `cli` and `web` fall back to `default` when absent.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clients {
    pub default: ClientCredentials,
    pub cli: Option<ClientCredentials>,
    pub web: Option<ClientCredentials>,
}

impl Clients {
    /// Credentials registered for `kind`.
    pub fn for_kind(&self, kind: ClientKind) -> &ClientCredentials {
        match kind {
            ClientKind::Cli => self.cli.as_ref().unwrap_or(&self.default),
            ClientKind::Web => self.web.as_ref().unwrap_or(&self.default),
        }
    }

    fn all(&self) -> impl Iterator<Item = &ClientCredentials> {
        std::iter::once(&self.default)
            .chain(self.cli.iter())
            .chain(self.web.iter())
    }
}

/// Session token configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    /// Token lifetime, in seconds.
    pub ttl: u64,
    pub key_id: Option<String>,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            private_key_path: PathBuf::from("private.pem"),
            public_key_path: PathBuf::from("public.pem"),
            ttl: DEFAULT_TOKEN_TTL,
            key_id: None,
        }
    }
}

impl Token {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }

    /// Key identifier set on tokens and published in the JWKS.
    pub fn key_id(&self) -> &str {
        self.key_id.as_deref().unwrap_or(DEFAULT_KID)
    }
}

/// Web session cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cookie {
    pub name: String,
    /// Set `Secure` attribute. Must be enabled behind HTTPS.
    pub secure: bool,
}

impl Default for Cookie {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.into(),
            secure: false,
        }
    }
}

/// Telemetry exporters.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Export spans with OTLP (gRPC).
    #[serde(default)]
    pub otlp: bool,
    /// Expose Prometheus metrics on `/metrics`.
    #[serde(default)]
    pub metrics: bool,
}

fn default_address() -> String {
    DEFAULT_ADDRESS.into()
}

fn default_prompt() -> Option<String> {
    Some(DEFAULT_PROMPT.into())
}

fn default_provider_timeout() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Application version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        Ok(Url::parse(&url_with_scheme)?.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, ConfigError> {
        let file_path = if self.path.as_os_str().is_empty() {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        } else {
            self.path.clone()
        };

        let file = File::open(&file_path).map_err(|source| ConfigError::Io {
            path: file_path.clone(),
            source,
        })?;
        let config: Configuration = serde_yaml::from_reader(file)?;

        Ok(Arc::new(config.finalize()?))
    }

    /// Parse a configuration held in memory.
    pub fn from_yaml(yaml: &str) -> Result<Arc<Self>, ConfigError> {
        let config: Configuration = serde_yaml::from_str(yaml)?;
        Ok(Arc::new(config.finalize()?))
    }

    /// Apply environment overrides, normalize URLs and check invariants.
    fn finalize(mut self) -> Result<Self, ConfigError> {
        self.version = VERSION.to_owned();

        if let Ok(client_id) = std::env::var("CLIENT_ID") {
            self.clients.default.client_id = client_id;
        }
        if let Ok(client_secret) = std::env::var("CLIENT_SECRET") {
            self.clients.default.client_secret = client_secret;
        }
        if let Ok(state_key) = std::env::var("STATE_KEY") {
            self.state_key = Some(state_key);
        }

        self.url = Self::normalize_url(&self.url)?;
        self.callback_url = Self::normalize_url(&self.callback_url)?;
        self.frontend_url = Self::normalize_url(&self.frontend_url)?;
        for endpoint in [
            self.provider.authorize_url(),
            self.provider.token_url(),
            self.provider.userinfo_url(),
        ] {
            Url::parse(&endpoint)?;
        }

        if self.token.ttl == 0 {
            return Err(ConfigError::Invalid("`token.ttl` must be positive"));
        }
        if self.token.ttl > MAX_TOKEN_TTL {
            return Err(ConfigError::Invalid("`token.ttl` exceeds one day"));
        }
        if self.provider.timeout == 0 {
            return Err(ConfigError::Invalid("`provider.timeout` must be positive"));
        }
        if self.token.key_id.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::Invalid("empty `token.key_id`"));
        }
        if self.clients.all().any(|c| c.client_id.is_empty()) {
            return Err(ConfigError::Invalid("empty `client_id`"));
        }
        if self.state_key.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::Invalid("empty `state_key`"));
        }

        Ok(self)
    }
}
