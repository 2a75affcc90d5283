//! Session tokens and auth cookies
//!
//! Login sessions are opaque random tokens stored server-side. Short-lived
//! OAuth flow values (state, PKCE verifier) are kept in HMAC-signed cookies.

use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::AppError;

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "auth_token";

/// Lifetime of the OAuth state and verifier cookies
pub const OAUTH_FLOW_COOKIE_MAX_AGE_SECS: i64 = 600;

type HmacSha256 = Hmac<Sha256>;

/// 32 random bytes, hex encoded (64 chars)
pub fn generate_random_token() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Sign a value
///
/// Token format: value.base64(hmac_sha256(value))
pub fn sign_value(value: &str, secret: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(value.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", value, signature_b64))
}

/// Verify a signed value and return the original
///
/// # Returns
/// `None` if the value is malformed or the signature does not match
pub fn verify_signed_value(signed: &str, secret: &str) -> Option<String> {
    let (value, signature_b64) = signed.rsplit_once('.')?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(value.as_bytes());

    let signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .ok()?;
    mac.verify_slice(&signature).ok()?;

    Some(value.to_string())
}

/// Session cookie that expires together with the session
pub fn build_session_cookie(
    token: &str,
    expires_at: DateTime<Utc>,
    secure: bool,
) -> Cookie<'static> {
    let max_age = (expires_at - Utc::now()).num_seconds().max(0);
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age))
        .build()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .build();
    cookie.make_removal();
    cookie
}

/// Short-lived cookie holding a signed OAuth flow value
///
/// A `cross_site` cookie must come back on the provider's form POST, which
/// browsers only allow for `SameSite=None` together with `Secure`.
pub fn build_flow_cookie(
    name: String,
    signed_value: String,
    secure: bool,
    cross_site: bool,
) -> Cookie<'static> {
    let same_site = if cross_site && secure {
        SameSite::None
    } else {
        SameSite::Lax
    };
    Cookie::build((name, signed_value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(same_site)
        .max_age(time::Duration::seconds(OAUTH_FLOW_COOKIE_MAX_AGE_SECS))
        .build()
}

pub fn clear_flow_cookie(name: String) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, "")).path("/").http_only(true).build();
    cookie.make_removal();
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-that-is-32-bytes!";

    #[test]
    fn random_token_is_64_hex_chars() {
        let token = generate_random_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_random_token());
    }

    #[test]
    fn signed_value_verifies() {
        let signed = sign_value("abc123", SECRET).unwrap();
        assert_eq!(verify_signed_value(&signed, SECRET).as_deref(), Some("abc123"));
    }

    #[test]
    fn tampered_value_is_rejected() {
        let signed = sign_value("abc123", SECRET).unwrap();
        let (_, signature) = signed.rsplit_once('.').unwrap();
        let forged = format!("abc124.{}", signature);
        assert!(verify_signed_value(&forged, SECRET).is_none());
        assert!(verify_signed_value(&signed, "another-secret-that-is-32-bytes!!").is_none());
        assert!(verify_signed_value("no-signature", SECRET).is_none());
    }

    #[test]
    fn session_cookie_attributes() {
        let expires_at = Utc::now() + chrono::Duration::hours(4);
        let cookie = build_session_cookie("tok", expires_at, true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        let max_age = cookie.max_age().unwrap().whole_seconds();
        assert!(max_age > 4 * 3600 - 60 && max_age <= 4 * 3600);
    }

    #[test]
    fn flow_cookie_lives_ten_minutes() {
        let cookie = build_flow_cookie(
            "oauth_state_github".to_string(),
            "v.s".to_string(),
            false,
            false,
        );
        assert_eq!(cookie.max_age().unwrap().whole_seconds(), 600);
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn form_post_flow_cookie_is_same_site_none_only_when_secure() {
        let secure = build_flow_cookie("a".to_string(), "v.s".to_string(), true, true);
        assert_eq!(secure.same_site(), Some(SameSite::None));

        let plain = build_flow_cookie("a".to_string(), "v.s".to_string(), false, true);
        assert_eq!(plain.same_site(), Some(SameSite::Lax));
    }
}
