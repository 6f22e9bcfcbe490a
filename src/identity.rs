//! Reading Apple identity tokens.
//!
//! [`extract_identity`] only decodes the claims; it trusts whatever it is
//! given and must only be used on tokens that came straight from Apple's token
//! endpoint over TLS. Tokens that arrive from a client app go through
//! [`verify_identity`], which checks the signature against Apple's published
//! keys as well as `iss`, `aud` and `exp`.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::AppleConfig;
use crate::error::{AuthError, Result};
use crate::exchange::APPLE_ISSUER;

/// Apple's published identity token signing keys.
pub const APPLE_KEYS_URL: &str = "https://appleid.apple.com/auth/keys";

/// Subject and email of a signed in user. Either may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
}

/// The claim set of a JWT as a flat string-keyed mapping.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ClaimMap(Map<String, Value>);

impl ClaimMap {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Text form of a scalar claim. Absent, null and structured claims read as
    /// an empty string.
    pub fn string(&self, name: &str) -> String {
        match self.0.get(name) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.string("sub"),
            email: self.string("email"),
        }
    }
}

/// Read `sub` and `email` from an identity token without checking its signature.
pub fn extract_identity(token: &str) -> Result<UserIdentity> {
    let claims = unverified_claims(token)?;
    let user = claims.identity();
    tracing::debug!(sub = %user.id, has_email = !user.email.is_empty(), "extracted identity token claims");
    Ok(user)
}

/// Decode the claim set of a compact JWT. The signature segment is ignored.
pub fn unverified_claims(token: &str) -> Result<ClaimMap> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AuthError::Parse(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    let header = decode_segment("header", segments[0])?;
    if !header.is_object() {
        return Err(AuthError::Parse("header is not a JSON object".to_string()));
    }

    match decode_segment("payload", segments[1])? {
        Value::Object(map) => Ok(ClaimMap(map)),
        _ => Err(AuthError::Claim),
    }
}

fn decode_segment(name: &str, segment: &str) -> Result<Value> {
    let bytes = base64::decode_config(segment, base64::URL_SAFE_NO_PAD)
        .map_err(|e| AuthError::Parse(format!("{} is not base64url: {}", name, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::Parse(format!("{} is not JSON: {}", name, e)))
}

/// Verify an identity token against Apple's published keys and read the user
/// from it. `client_id` must match the token's `aud`.
pub async fn verify_identity(client_id: &str, token: &str) -> Result<UserIdentity> {
    verify_identity_with(APPLE_KEYS_URL, client_id, token, false).await
}

/// [`verify_identity`] against an arbitrary key set URL, optionally skipping
/// the `exp` check.
pub async fn verify_identity_with(
    keys_url: &str,
    client_id: &str,
    token: &str,
    ignore_expire: bool,
) -> Result<UserIdentity> {
    let header = decode_header(token)?;
    let kid = match header.kid {
        Some(k) => k,
        None => return Err(AuthError::KidNotFound),
    };

    let keys = fetch_keys(keys_url).await?;
    let jwk = match keys.find(&kid) {
        Some(jwk) => jwk,
        None => return Err(AuthError::KeyNotFound(kid)),
    };

    let mut val = Validation::new(Algorithm::RS256);
    val.validate_exp = !ignore_expire;
    if ignore_expire {
        val.required_spec_claims.remove("exp");
    }
    val.set_issuer(&[APPLE_ISSUER]);
    val.set_audience(&[client_id]);

    let token_data = decode::<ClaimMap>(token, &DecodingKey::from_jwk(jwk)?, &val)?;
    Ok(token_data.claims.identity())
}

async fn fetch_keys(url: &str) -> Result<JwkSet> {
    let network = |source| AuthError::Network {
        url: url.to_string(),
        source,
    };

    let resp = reqwest::get(url).await.map_err(network)?;
    let status = resp.status();
    let body = resp.text().await.map_err(network)?;
    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), url, "failed to fetch Apple signing keys");
        return Err(AuthError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| AuthError::Decode(e.to_string()))
}

impl AppleConfig {
    /// Strictly verify an identity token issued for this config's client id.
    pub async fn verify_identity(&self, token: &str) -> Result<UserIdentity> {
        verify_identity_with(&self.keys_url, &self.client_id, token, false).await
    }
}
