use std::time::Duration;

use jsonwebtoken::{encode, get_current_timestamp, Algorithm, Header};
use serde::{Deserialize, Serialize};

use crate::config::AppleConfig;
use crate::error::{AuthError, Result};

/// Apple's OAuth token endpoint.
pub const APPLE_TOKEN_URL: &str = "https://appleid.apple.com/auth/token";
/// `aud` of every client assertion.
pub const APPLE_AUDIENCE: &str = "https://appleid.apple.com";
/// `iss` of every Apple identity token.
pub const APPLE_ISSUER: &str = APPLE_AUDIENCE;
pub const GRANT_TYPE: &str = "authorization_code";

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    iat: u64,
    exp: u64,
    aud: &'a str,
    sub: &'a str,
}

/// Tokens returned by Apple for an authorization code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: String,
    pub token_type: String,
}

impl AppleConfig {
    /// Sign a client assertion valid for `lifetime_secs` seconds from now.
    ///
    /// The result is sent as `client_secret` to the token endpoint.
    pub fn client_secret(&self, lifetime_secs: u64) -> Result<String> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| AuthError::Config("missing cert".to_string()))?;

        let now = get_current_timestamp();
        let exp = now
            .checked_add(lifetime_secs)
            .ok_or_else(|| AuthError::Config("assertion lifetime overflows".to_string()))?;
        let claims = AssertionClaims {
            iss: &self.team_id,
            iat: now,
            exp,
            aud: APPLE_AUDIENCE,
            sub: &self.client_id,
        };

        let mut header = Header::new(Algorithm::ES256);
        header.typ = None;
        header.kid = Some(self.key_id.clone());

        encode(&header, &claims, key).map_err(AuthError::Signing)
    }

    /// Exchange an authorization code for Apple's token bundle.
    ///
    /// `lifetime_secs` is the lifetime of the signed client assertion, not of
    /// the returned tokens.
    pub async fn exchange_code(&self, code: &str, lifetime_secs: u64) -> Result<TokenResponse> {
        self.send_exchange(code, lifetime_secs, None).await
    }

    /// Same as [`exchange_code`](AppleConfig::exchange_code), giving up after
    /// `timeout`. A timeout is reported as [`AuthError::Network`].
    pub async fn exchange_code_with_timeout(
        &self,
        code: &str,
        lifetime_secs: u64,
        timeout: Duration,
    ) -> Result<TokenResponse> {
        self.send_exchange(code, lifetime_secs, Some(timeout)).await
    }

    async fn send_exchange(
        &self,
        code: &str,
        lifetime_secs: u64,
        timeout: Option<Duration>,
    ) -> Result<TokenResponse> {
        let client_secret = self.client_secret(lifetime_secs)?;
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("code", code),
            ("grant_type", GRANT_TYPE),
        ];

        tracing::debug!(client_id = %self.client_id, url = %self.token_url, "exchanging authorization code");

        let mut request = reqwest::Client::new().post(&self.token_url).form(&params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let resp = request.send().await.map_err(|e| self.network_error(e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.network_error(e))?;

        if status != reqwest::StatusCode::OK {
            tracing::warn!(status = status.as_u16(), body = %body, "token endpoint rejected authorization code");
            return Err(AuthError::HttpStatus {
                url: self.token_url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| AuthError::Decode(e.to_string()))
    }

    fn network_error(&self, source: reqwest::Error) -> AuthError {
        tracing::warn!(url = %self.token_url, error = %source, "token request failed");
        AuthError::Network {
            url: self.token_url.clone(),
            source,
        }
    }
}
