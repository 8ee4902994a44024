//! Manage session tokens.
//!
//! A session token is a RS256 JSON web token holding a minimal profile.
//! Nothing is stored server-side: a well-formed, unexpired token signed by
//! the configured key is the whole proof.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, ServerError};
use crate::key::{KeyPair, PrivateKey, PublicKey};
use crate::provider::UserProfile;

const ALGORITHM: Algorithm = Algorithm::RS256;

/// Key identifier used when none is configured.
pub const DEFAULT_KID: &str = "authgate-rs256";

/// Pieces of information asserted on a session token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier given by the identity provider.
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Identifies the expiration time on or after which the token must not
    /// be accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the token was issued.
    pub iat: u64,
}

impl Claims {
    /// Profile carried by the token.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            subject: self.sub.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            extra: Default::default(),
        }
    }
}

/// Signed, compact session token.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([redacted])")
    }
}

impl AsRef<str> for SessionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
impl From<&str> for SessionToken {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

/// Sign `profile` into a token valid for `ttl` starting at `now`, with
/// `key_id` as the `kid` header.
pub fn sign(
    profile: &UserProfile,
    key: &PrivateKey,
    key_id: &str,
    ttl: Duration,
    now: u64,
) -> Result<SessionToken> {
    if profile.subject.is_empty() {
        return Err(ServerError::Internal {
            details: "cannot sign a profile without subject".into(),
            source: None,
        });
    }
    if ttl.as_secs() == 0 {
        return Err(ServerError::Internal {
            details: "token lifetime must be at least one second".into(),
            source: None,
        });
    }

    let exp = now
        .checked_add(ttl.as_secs())
        .ok_or_else(|| ServerError::Internal {
            details: "token expiration overflows".into(),
            source: None,
        })?;
    let claims = Claims {
        sub: profile.subject.clone(),
        email: profile.email.clone(),
        name: profile.name.clone(),
        exp,
        iat: now,
    };

    let mut header = Header::new(ALGORITHM);
    header.kid = Some(key_id.to_owned());

    encode(&header, &claims, key.encoding_key())
        .map(SessionToken)
        .map_err(|err| ServerError::Internal {
            details: "token signing failed".into(),
            source: Some(Box::new(err)),
        })
}

/// Decode and check a token against `key`.
///
/// Expired tokens give [`ServerError::TokenExpired`]; anything else wrong
/// (structure, signature, algorithm) gives [`ServerError::InvalidToken`].
pub fn verify(token: &str, key: &PublicKey) -> Result<Claims> {
    let mut validation = Validation::new(ALGORITHM);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let claims = decode::<Claims>(token, key.decoding_key(), &validation)
        .map_err(|err| match err.kind() {
            ErrorKind::ExpiredSignature => ServerError::TokenExpired,
            _ => ServerError::InvalidToken,
        })?
        .claims;

    if claims.exp <= claims.iat || claims.sub.is_empty() {
        return Err(ServerError::InvalidToken);
    }

    Ok(claims)
}

/// Sign and verify session tokens with the process keypair.
pub struct SessionTokenCodec {
    keys: Arc<KeyPair>,
    key_id: String,
    ttl: Duration,
    clock: Box<dyn Clock>,
}

impl SessionTokenCodec {
    /// Create a new [`SessionTokenCodec`].
    pub fn new(keys: Arc<KeyPair>, ttl: Duration) -> Self {
        Self {
            keys,
            key_id: DEFAULT_KID.to_owned(),
            ttl,
            clock: Box::new(SystemClock),
        }
    }

    /// Replace the `kid` header of minted tokens.
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = key_id.into();
        self
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a fresh token. Two calls never share `iat`/`exp` unless they
    /// happen within the same second.
    pub fn sign(&self, profile: &UserProfile) -> Result<SessionToken> {
        sign(
            profile,
            self.keys.private_key(),
            &self.key_id,
            self.ttl,
            self.clock.now(),
        )
    }

    /// Verify a token with the public key only.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        verify(token, self.keys.public_key())
    }
}
