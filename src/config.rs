use std::fmt;
use std::fs;
use std::path::Path;

use jsonwebtoken::EncodingKey;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};

use crate::error::{AuthError, Result};
use crate::exchange::APPLE_TOKEN_URL;
use crate::identity::APPLE_KEYS_URL;

const PKCS8_LABEL: &str = "PRIVATE KEY";

/// Team, client and key identifiers plus the `.p8` signing key downloaded
/// from the Apple developer portal.
///
/// Load the key once with [`load_key_from_file`](AppleConfig::load_key_from_file)
/// or [`load_key_from_bytes`](AppleConfig::load_key_from_bytes) before sharing
/// the config between requests.
#[derive(Clone)]
pub struct AppleConfig {
    pub team_id: String,
    pub client_id: String,
    pub key_id: String,
    pub(crate) key: Option<EncodingKey>,
    pub(crate) token_url: String,
    pub(crate) keys_url: String,
}

impl AppleConfig {
    pub fn new<S: Into<String>>(team_id: S, client_id: S, key_id: S) -> Self {
        AppleConfig {
            team_id: team_id.into(),
            client_id: client_id.into(),
            key_id: key_id.into(),
            key: None,
            token_url: APPLE_TOKEN_URL.to_string(),
            keys_url: APPLE_KEYS_URL.to_string(),
        }
    }

    /// Build a config from the environment.
    ///
    /// Requires `APPLE_TEAM_ID`, `APPLE_CLIENT_ID` and `APPLE_KEY_ID`. When
    /// `APPLE_PRIVATE_KEY_PATH` is also set the key is loaded from that file.
    pub fn from_env() -> Result<Self> {
        let mut config = AppleConfig::new(
            env_var("APPLE_TEAM_ID")?,
            env_var("APPLE_CLIENT_ID")?,
            env_var("APPLE_KEY_ID")?,
        );
        if let Ok(path) = std::env::var("APPLE_PRIVATE_KEY_PATH") {
            config.load_key_from_file(path)?;
        }
        tracing::debug!(
            team_id = %config.team_id,
            client_id = %config.client_id,
            has_key = config.has_key(),
            "Apple configuration loaded from environment"
        );
        Ok(config)
    }

    pub fn with_token_url<S: Into<String>>(mut self, url: S) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_keys_url<S: Into<String>>(mut self, url: S) -> Self {
        self.keys_url = url.into();
        self
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Parse a PEM armored PKCS#8 P-256 private key and keep it for signing.
    ///
    /// A missing or broken PEM envelope is a [`AuthError::Decode`]; anything
    /// wrong with the DER inside it is a [`AuthError::KeyFormat`]. A failed load
    /// leaves a previously loaded key in place.
    pub fn load_key_from_bytes(&mut self, pem_bytes: &[u8]) -> Result<()> {
        let block = pem::parse(pem_bytes).map_err(|e| AuthError::Decode(e.to_string()))?;
        if block.tag() != PKCS8_LABEL {
            return Err(AuthError::KeyFormat(format!(
                "expected a \"{}\" PEM block, found \"{}\"",
                PKCS8_LABEL,
                block.tag()
            )));
        }

        let der = block.contents();
        if der.is_empty() {
            return Err(AuthError::Decode("PEM block has no content".to_string()));
        }
        EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, der, &SystemRandom::new())
            .map_err(|e| AuthError::KeyFormat(e.to_string()))?;

        self.key = Some(EncodingKey::from_ec_der(der));
        tracing::debug!(key_id = %self.key_id, "loaded ES256 signing key");
        Ok(())
    }

    pub fn load_key_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| AuthError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_key_from_bytes(&bytes)
    }
}

impl fmt::Debug for AppleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppleConfig")
            .field("team_id", &self.team_id)
            .field("client_id", &self.client_id)
            .field("key_id", &self.key_id)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("token_url", &self.token_url)
            .field("keys_url", &self.keys_url)
            .finish()
    }
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| AuthError::Config(format!("missing environment variable {}", name)))
}
