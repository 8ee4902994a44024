//! Signing keypair loading.
//!
//! Keys are read once, from PEM files, and shared read-only for the whole
//! process lifetime. Rotation requires a restart.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use axum::extract::FromRef;
use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::AppState;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0} is not a PEM encoded RSA key")]
    Pem(&'static str),
    #[error("public key is not the public half of the private key")]
    Mismatch,
}

/// Key used to sign session tokens.
#[derive(Clone)]
pub struct PrivateKey {
    encoding: EncodingKey,
    public: RsaPublicKey,
}

impl PrivateKey {
    /// Parse a PKCS#8 or PKCS#1 PEM encoded RSA private key.
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|_| KeyError::Pem("private key"))?;
        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|_| KeyError::Pem("private key"))?;

        Ok(Self {
            encoding,
            public: RsaPublicKey::from(&private),
        })
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([redacted])")
    }
}

/// Key used to verify session tokens.
#[derive(Clone)]
pub struct PublicKey {
    decoding: DecodingKey,
    rsa: RsaPublicKey,
}

impl PublicKey {
    /// Parse a SPKI or PKCS#1 PEM encoded RSA public key.
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let rsa = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|_| KeyError::Pem("public key"))?;
        let decoding = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|_| KeyError::Pem("public key"))?;

        Ok(Self { decoding, rsa })
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    /// Modulus and exponent, base64url encoded as required by JWK.
    pub fn jwk_components(&self) -> (String, String) {
        let n = Base64UrlUnpadded::encode_string(&self.rsa.n().to_bytes_be());
        let e = Base64UrlUnpadded::encode_string(&self.rsa.e().to_bytes_be());
        (n, e)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &(self.rsa.size() * 8))
            .finish()
    }
}

/// Private and public halves of the signing key.
#[derive(Debug, Clone)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Build a keypair from two PEM documents.
    ///
    /// # Errors
    ///
    /// Returns `Err` if either key is malformed or if the public key does
    /// not belong to the private key.
    pub fn from_pem(private_pem: &str, public_pem: &str) -> Result<Self, KeyError> {
        let private = PrivateKey::from_pem(private_pem)?;
        let public = PublicKey::from_pem(public_pem)?;

        if private.public != public.rsa {
            return Err(KeyError::Mismatch);
        }

        Ok(Self { private, public })
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }
}

impl FromRef<AppState> for Arc<KeyPair> {
    fn from_ref(state: &AppState) -> Arc<KeyPair> {
        Arc::clone(&state.keys)
    }
}

/// Reads the keypair from disk on first use.
pub struct KeyProvider {
    private_path: PathBuf,
    public_path: PathBuf,
    keys: OnceLock<Arc<KeyPair>>,
}

impl KeyProvider {
    /// Create a new [`KeyProvider`]. Nothing is read yet.
    pub fn new(private_path: impl Into<PathBuf>, public_path: impl Into<PathBuf>) -> Self {
        Self {
            private_path: private_path.into(),
            public_path: public_path.into(),
            keys: OnceLock::new(),
        }
    }

    /// Load the private key file.
    pub fn load_private_key(&self) -> Result<PrivateKey, KeyError> {
        PrivateKey::from_pem(&read_pem(&self.private_path)?)
    }

    /// Load the public key file.
    pub fn load_public_key(&self) -> Result<PublicKey, KeyError> {
        PublicKey::from_pem(&read_pem(&self.public_path)?)
    }

    /// Return the cached keypair, loading it if needed.
    pub fn keys(&self) -> Result<Arc<KeyPair>, KeyError> {
        if let Some(keys) = self.keys.get() {
            return Ok(Arc::clone(keys));
        }

        let keys = Arc::new(KeyPair::from_pem(
            &read_pem(&self.private_path)?,
            &read_pem(&self.public_path)?,
        )?);
        tracing::info!(
            private_key = %self.private_path.display(),
            public_key = %self.public_path.display(),
            "signing keypair loaded"
        );

        Ok(Arc::clone(self.keys.get_or_init(|| keys)))
    }
}

fn read_pem(path: &Path) -> Result<String, KeyError> {
    fs::read_to_string(path).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })
}
