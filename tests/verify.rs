use jsonwebtoken::{encode, get_current_timestamp, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use siwa_exchange::{verify_identity_with, AppleConfig, AuthError, UserIdentity};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RS256_KEY: &[u8] = include_bytes!("fixtures/rs256_private.pem");
const APPLE_JWKS: &str = include_str!("fixtures/apple_jwks.json");
const CLIENT_ID: &str = "com.example.service";

async fn keys_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_string(APPLE_JWKS))
        .mount(&server)
        .await;
    server
}

fn keys_url(server: &MockServer) -> String {
    format!("{}/auth/keys", server.uri())
}

fn claims() -> Value {
    let now = get_current_timestamp();
    json!({
        "iss": "https://appleid.apple.com",
        "aud": CLIENT_ID,
        "iat": now,
        "exp": now + 600,
        "sub": "001234.abcdef.0987",
        "email": "relay@privaterelay.appleid.com",
    })
}

fn sign(kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &EncodingKey::from_rsa_pem(RS256_KEY).unwrap()).unwrap()
}

#[tokio::test]
async fn valid_token_is_verified() {
    let server = keys_server().await;
    let token = sign(Some("test-apple-kid"), &claims());

    let user = verify_identity_with(&keys_url(&server), CLIENT_ID, &token, false)
        .await
        .unwrap();
    assert_eq!(
        user,
        UserIdentity {
            id: "001234.abcdef.0987".to_string(),
            email: "relay@privaterelay.appleid.com".to_string(),
        }
    );
}

#[tokio::test]
async fn config_verifies_with_its_client_id() {
    let server = keys_server().await;
    let token = sign(Some("test-apple-kid"), &claims());

    let config = AppleConfig::new("TEAM123456", CLIENT_ID, "KEY1234567").with_keys_url(keys_url(&server));
    let user = config.verify_identity(&token).await.unwrap();
    assert_eq!(user.id, "001234.abcdef.0987");
}

#[tokio::test]
async fn wrong_audience_is_rejected() {
    let server = keys_server().await;
    let token = sign(Some("test-apple-kid"), &claims());

    let err = verify_identity_with(&keys_url(&server), "com.other.app", &token, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Jwt(_)), "{:?}", err);
}

#[tokio::test]
async fn wrong_issuer_is_rejected() {
    let server = keys_server().await;
    let mut claims = claims();
    claims["iss"] = json!("https://evil.example.com");
    let token = sign(Some("test-apple-kid"), &claims);

    let err = verify_identity_with(&keys_url(&server), CLIENT_ID, &token, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Jwt(_)), "{:?}", err);
}

#[tokio::test]
async fn expired_token_is_rejected_unless_ignored() {
    let server = keys_server().await;
    let mut claims = claims();
    claims["exp"] = json!(1_000_000);
    let token = sign(Some("test-apple-kid"), &claims);

    let err = verify_identity_with(&keys_url(&server), CLIENT_ID, &token, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Jwt(_)), "{:?}", err);

    let user = verify_identity_with(&keys_url(&server), CLIENT_ID, &token, true)
        .await
        .unwrap();
    assert_eq!(user.id, "001234.abcdef.0987");
}

#[tokio::test]
async fn tampered_payload_is_rejected() {
    let server = keys_server().await;
    let token = sign(Some("test-apple-kid"), &claims());

    let mut forged = claims();
    forged["sub"] = json!("someone-else");
    let forged_payload = base64::encode_config(
        serde_json::to_vec(&forged).unwrap(),
        base64::URL_SAFE_NO_PAD,
    );
    let parts: Vec<&str> = token.split('.').collect();
    let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

    let err = verify_identity_with(&keys_url(&server), CLIENT_ID, &tampered, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Jwt(_)), "{:?}", err);
}

#[tokio::test]
async fn missing_kid_is_rejected_before_fetching_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(APPLE_JWKS))
        .expect(0)
        .mount(&server)
        .await;
    let token = sign(None, &claims());

    let err = verify_identity_with(&keys_url(&server), CLIENT_ID, &token, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::KidNotFound), "{:?}", err);
}

#[tokio::test]
async fn unknown_kid_is_rejected() {
    let server = keys_server().await;
    let token = sign(Some("rotated-away"), &claims());

    let err = verify_identity_with(&keys_url(&server), CLIENT_ID, &token, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::KeyNotFound(ref kid) if kid == "rotated-away"));
}

#[tokio::test]
async fn key_endpoint_failure_is_an_http_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let token = sign(Some("test-apple-kid"), &claims());

    let err = verify_identity_with(&keys_url(&server), CLIENT_ID, &token, false)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[test]
fn lenient_extraction_ignores_signature() {
    let parts_token = sign(Some("test-apple-kid"), &claims());
    let mut parts: Vec<&str> = parts_token.split('.').collect();
    parts[2] = "garbage";
    let user = siwa_exchange::extract_identity(&parts.join(".")).unwrap();
    assert_eq!(user.email, "relay@privaterelay.appleid.com");
}
