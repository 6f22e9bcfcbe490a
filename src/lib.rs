//! # Backend for Sign In With Apple
//!
//! Exchanges an authorization code for Apple's tokens as described in Apple's docs at:
//!	[https://developer.apple.com/documentation/sign_in_with_apple/generate_and_validate_tokens]()
//!
//! To exchange a code, your app server must:
//!
//! 1. Load the `.p8` private key created for Sign In with Apple.
//!
//! 2. Sign a `JWS ES256` client assertion with `iss` = team id, `sub` = client id
//!    and `aud` = [https://appleid.apple.com]().
//!
//! 3. POST the assertion as `client_secret`, together with the authorization code, to
//!
//! 	[https://appleid.apple.com/auth/token]()
//!
//! 4. Read the user from the returned `id_token`.
//!
//! ```no_run
//! use siwa_exchange::{extract_identity, AppleConfig};
//!
//! # async fn sign_in(code: &str) -> siwa_exchange::Result<()> {
//! let mut config = AppleConfig::new("TEAM123456", "com.example.service", "KEY1234567");
//! config.load_key_from_file("AuthKey_KEY1234567.p8")?;
//!
//! let tokens = config.exchange_code(code, 300).await?;
//! let user = extract_identity(&tokens.id_token)?;
//! println!("signed in {} <{}>", user.id, user.email);
//! # Ok(())
//! # }
//! ```
//!
//! Identity tokens received from anywhere other than the token endpoint
//! should go through [`verify_identity`] instead, which checks them against
//! Apple's public keys at [https://appleid.apple.com/auth/keys]().

mod config;
mod error;
mod exchange;
mod identity;

pub use config::AppleConfig;
pub use error::{AuthError, Result};
pub use exchange::{TokenResponse, APPLE_AUDIENCE, APPLE_ISSUER, APPLE_TOKEN_URL, GRANT_TYPE};
pub use identity::{
    extract_identity, unverified_claims, verify_identity, verify_identity_with, ClaimMap,
    UserIdentity, APPLE_KEYS_URL,
};
