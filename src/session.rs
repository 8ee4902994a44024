//! Server-side session handling.
//!
//! Session tokens are self-contained, so no backend keeps track of them:
//! refreshing or revoking one is refused until a store exists.

use async_trait::async_trait;

use crate::error::{Result, ServerError};
use crate::token::SessionToken;

/// Port for a store able to extend or revoke sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Issue a new token for a still valid session.
    async fn refresh_session(&self, token: &SessionToken) -> Result<SessionToken>;

    /// Revoke every session of `subject` before their expiry.
    async fn invalidate_session(&self, subject: &str) -> Result<()>;
}

/// [`SessionStore`] used when no backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSessionStore;

#[async_trait]
impl SessionStore for UnavailableSessionStore {
    async fn refresh_session(&self, _token: &SessionToken) -> Result<SessionToken> {
        Err(ServerError::SessionStoreUnavailable)
    }

    async fn invalidate_session(&self, _subject: &str) -> Result<()> {
        Err(ServerError::SessionStoreUnavailable)
    }
}
