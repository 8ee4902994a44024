//! `state` parameter carried through the identity provider.
//!
//! Without a key the state is the plain `app-type=<tag>` pair. With a key,
//! a random nonce and an HMAC-SHA256 signature are appended so a callback
//! can only complete a login this gateway started:
//! `app-type=<tag>;nonce=<hex>;sig=<hex>`.

use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;

use super::ClientKind;
use crate::error::{Result, ServerError};

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "app-type=";
const SIGNATURE: &str = ";sig=";
const NONCE_LENGTH: usize = 16;

/// Encode and decode the `state` parameter.
#[derive(Clone, Default)]
pub struct StateCodec {
    key: Option<Vec<u8>>,
}

impl std::fmt::Debug for StateCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCodec")
            .field("signed", &self.key.is_some())
            .finish()
    }
}

impl StateCodec {
    /// Create a new [`StateCodec`], signing states when `key` is set.
    pub fn new(key: Option<&str>) -> Self {
        Self {
            key: key.map(|key| key.as_bytes().to_vec()),
        }
    }

    pub fn is_signed(&self) -> bool {
        self.key.is_some()
    }

    fn mac(key: &[u8]) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(key).map_err(|_| ServerError::Internal {
            details: "cannot key state signature".into(),
            source: None,
        })
    }

    /// Build the state for an arbitrary client tag.
    pub fn encode(&self, tag: &str) -> Result<String> {
        let plain = format!("{PREFIX}{tag}");
        let Some(key) = &self.key else {
            return Ok(plain);
        };

        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);
        let payload = format!("{plain};nonce={}", hex::encode(nonce));

        let mut mac = Self::mac(key)?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{payload}{SIGNATURE}{signature}"))
    }

    /// Recover the client kind from a returned state.
    ///
    /// Any state this gateway could not have produced gives
    /// [`ServerError::UnknownClient`].
    pub fn decode(&self, state: &str) -> Result<ClientKind> {
        let payload = match &self.key {
            None => state,
            Some(key) => {
                let (payload, signature) = state
                    .rsplit_once(SIGNATURE)
                    .ok_or(ServerError::UnknownClient)?;
                let signature =
                    hex::decode(signature).map_err(|_| ServerError::UnknownClient)?;

                let mut mac = Self::mac(key)?;
                mac.update(payload.as_bytes());
                mac.verify_slice(&signature)
                    .map_err(|_| ServerError::UnknownClient)?;

                payload
            },
        };

        let field = payload.split(';').next().unwrap_or_default();
        // Bare tags are what older front ends send.
        field.strip_prefix(PREFIX).unwrap_or(field).parse()
    }
}
