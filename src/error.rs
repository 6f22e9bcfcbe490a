use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

/// Every way a key load, code exchange or identity token read can fail.
///
/// Callers are expected to `match` on the variant: a `HttpStatus` with a 400
/// usually means a stale or reused authorization code, while `Network` means
/// Apple could not be reached at all.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid private key: {0}")]
    KeyFormat(String),
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to sign client assertion: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },
    #[error("malformed identity token: {0}")]
    Parse(String),
    #[error("identity token claims are not a JSON object")]
    Claim,
    #[error("Key ID not found")]
    KidNotFound,
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// HTTP status observed from Apple, if this error came from a non-200 response.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
