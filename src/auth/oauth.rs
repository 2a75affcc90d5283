//! OAuth 2.0 authorization code flow with PKCE
//!
//! Supports Google, GitHub and Apple. Each provider differs only in its
//! endpoints, scopes and the way user info is obtained, so a single
//! [`OAuthClient`] drives all three from [`OAuthProvider`] metadata.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::session::generate_random_token;
use crate::config::{OAuthConfig, OAuthProviderConfig};
use crate::error::AppError;

// =============================================================================
// Providers
// =============================================================================

/// Supported identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Github,
    Apple,
}

impl OAuthProvider {
    /// Parse the `{provider}` path segment
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "google" => Some(Self::Google),
            "github" => Some(Self::Github),
            "apple" => Some(Self::Apple),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
            Self::Apple => "apple",
        }
    }

    fn default_authorization_url(&self) -> &'static str {
        match self {
            Self::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            Self::Github => "https://github.com/login/oauth/authorize",
            Self::Apple => "https://appleid.apple.com/auth/authorize",
        }
    }

    fn default_token_url(&self) -> &'static str {
        match self {
            Self::Google => "https://oauth2.googleapis.com/token",
            Self::Github => "https://github.com/login/oauth/access_token",
            Self::Apple => "https://appleid.apple.com/auth/token",
        }
    }

    fn default_userinfo_url(&self) -> Option<&'static str> {
        match self {
            Self::Google => Some("https://www.googleapis.com/oauth2/v2/userinfo"),
            Self::Github => Some("https://api.github.com/user"),
            Self::Apple => None,
        }
    }

    pub fn scopes(&self) -> &'static str {
        match self {
            Self::Google => "openid email profile",
            Self::Github => "user:email",
            Self::Apple => "name email",
        }
    }

    /// Apple posts the callback as a form instead of a redirect
    pub fn uses_form_post(&self) -> bool {
        matches!(self, Self::Apple)
    }

    /// Cookie holding the signed CSRF state for this provider
    pub fn state_cookie_name(&self) -> String {
        format!("oauth_state_{}", self.as_str())
    }

    /// Cookie holding the signed PKCE verifier for this provider
    pub fn verifier_cookie_name(&self) -> String {
        format!("oauth_code_verifier_{}", self.as_str())
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PKCE
// =============================================================================

/// CSRF state plus PKCE verifier/challenge pair for one authorization attempt
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// 32 random bytes, hex
    pub state: String,
    /// 32 random bytes, base64url without padding
    pub code_verifier: String,
    /// base64url(SHA-256(code_verifier))
    pub code_challenge: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        let mut bytes = [0_u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let code_verifier = URL_SAFE_NO_PAD.encode(bytes);
        let code_challenge = code_challenge_for(&code_verifier);

        Self {
            state: generate_random_token(),
            code_verifier,
            code_challenge,
        }
    }
}

/// S256 code challenge
pub fn code_challenge_for(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

// =============================================================================
// Provider payloads
// =============================================================================

/// Tokens returned by the provider's token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_in: Option<i64>,
    /// GitHub answers 200 with an error body for bad codes
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Provider-independent identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthUserInfo {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: Option<String>,
    sub: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: serde_json::Value,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubEmail {
    pub email: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Deserialize)]
struct AppleIdTokenClaims {
    sub: String,
    email: Option<String>,
    name: Option<serde_json::Value>,
}

// =============================================================================
// Client
// =============================================================================

/// Resolved credentials and endpoints for one provider
#[derive(Debug, Clone)]
struct ProviderSettings {
    client_id: String,
    client_secret: Option<String>,
    authorization_url: String,
    token_url: String,
    userinfo_url: Option<String>,
    emails_url: String,
}

/// OAuth client shared by all providers
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    config: OAuthConfig,
    base_url: String,
}

impl OAuthClient {
    /// # Arguments
    /// * `base_url` - Public base URL used to build callback URLs
    pub fn new(http: reqwest::Client, config: OAuthConfig, base_url: String) -> Self {
        Self {
            http,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Callback URL registered with the provider
    pub fn redirect_uri(&self, provider: OAuthProvider) -> String {
        format!("{}/api/auth/oauth/{}/callback", self.base_url, provider)
    }

    fn settings(&self, provider: OAuthProvider) -> Result<ProviderSettings, AppError> {
        let raw: &OAuthProviderConfig = match provider {
            OAuthProvider::Google => &self.config.google,
            OAuthProvider::Github => &self.config.github,
            OAuthProvider::Apple => &self.config.apple,
        };

        let client_id = raw
            .client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::NotConfigured(format!(
                    "{} OAuth is not configured",
                    provider.as_str().to_ascii_uppercase()
                ))
            })?;

        Ok(ProviderSettings {
            client_id: client_id.to_string(),
            client_secret: raw.client_secret.clone(),
            authorization_url: raw
                .authorization_url
                .clone()
                .unwrap_or_else(|| provider.default_authorization_url().to_string()),
            token_url: raw
                .token_url
                .clone()
                .unwrap_or_else(|| provider.default_token_url().to_string()),
            userinfo_url: raw
                .userinfo_url
                .clone()
                .or_else(|| provider.default_userinfo_url().map(str::to_string)),
            emails_url: raw
                .emails_url
                .clone()
                .unwrap_or_else(|| "https://api.github.com/user/emails".to_string()),
        })
    }

    /// Build the provider authorization URL for a PKCE challenge
    ///
    /// # Errors
    /// `NotConfigured` if the provider has no client id
    pub fn authorization_url(
        &self,
        provider: OAuthProvider,
        pkce: &PkceChallenge,
    ) -> Result<String, AppError> {
        let settings = self.settings(provider)?;
        let redirect_uri = self.redirect_uri(provider);

        let mut url = url::Url::parse(&settings.authorization_url)
            .map_err(|e| AppError::Config(format!("invalid authorization url: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &settings.client_id)
                .append_pair("redirect_uri", &redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", provider.scopes())
                .append_pair("state", &pkce.state)
                .append_pair("code_challenge", &pkce.code_challenge)
                .append_pair("code_challenge_method", "S256");
            if provider.uses_form_post() {
                query.append_pair("response_mode", "form_post");
            }
        }

        Ok(url.into())
    }

    /// Exchange an authorization code for tokens
    ///
    /// One form POST, no retry. Non-2xx answers and error bodies fail.
    pub async fn exchange_code(
        &self,
        provider: OAuthProvider,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenSet, AppError> {
        let settings = self.settings(provider)?;
        let redirect_uri = self.redirect_uri(provider);

        let mut form = vec![
            ("client_id", settings.client_id.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = settings.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self
            .http
            .post(&settings.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "{} token exchange failed with {}: {}",
                provider, status, body
            )));
        }

        let tokens: TokenSet = response.json().await?;
        if let Some(error) = tokens.error.as_deref() {
            return Err(AppError::Upstream(format!(
                "{} token exchange rejected: {} {}",
                provider,
                error,
                tokens.error_description.as_deref().unwrap_or("")
            )));
        }
        if tokens.access_token.is_none() && tokens.id_token.is_none() {
            return Err(AppError::Upstream(format!(
                "{} token response carried no token",
                provider
            )));
        }

        Ok(tokens)
    }

    /// Resolve the signed-in identity from the issued tokens
    pub async fn fetch_user_info(
        &self,
        provider: OAuthProvider,
        tokens: &TokenSet,
    ) -> Result<OAuthUserInfo, AppError> {
        match provider {
            OAuthProvider::Apple => {
                let id_token = tokens.id_token.as_deref().ok_or_else(|| {
                    AppError::Upstream("ID token is required for Apple OAuth".to_string())
                })?;
                decode_apple_id_token(id_token)
            }
            OAuthProvider::Google => {
                let settings = self.settings(provider)?;
                let access_token = require_access_token(provider, tokens)?;
                let url = userinfo_url(provider, &settings)?;
                let user: GoogleUser = self.get_json(url, access_token).await?;

                let id = user.id.or(user.sub).ok_or_else(|| {
                    AppError::Upstream("google user info has no id".to_string())
                })?;
                Ok(OAuthUserInfo {
                    id,
                    email: user.email,
                    name: user.name,
                })
            }
            OAuthProvider::Github => {
                let settings = self.settings(provider)?;
                let access_token = require_access_token(provider, tokens)?;
                let url = userinfo_url(provider, &settings)?;
                let user: GitHubUser = self.get_json(url, access_token).await?;

                let emails = match self
                    .get_json::<Vec<GitHubEmail>>(&settings.emails_url, access_token)
                    .await
                {
                    Ok(emails) => emails,
                    Err(error) => {
                        tracing::warn!(%error, "GitHub email listing failed; using profile email");
                        Vec::new()
                    }
                };

                let email = select_github_email(&emails)
                    .or(user.email.filter(|e| !e.trim().is_empty()))
                    .unwrap_or_else(|| format!("{}@github.local", user.login));

                let id = match user.id {
                    serde_json::Value::String(id) => id,
                    other => other.to_string(),
                };

                Ok(OAuthUserInfo {
                    id,
                    email: Some(email),
                    name: user.name.filter(|n| !n.trim().is_empty()).or(Some(user.login)),
                })
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "GET {} failed with {}",
                url, status
            )));
        }

        Ok(response.json().await?)
    }
}

fn require_access_token(provider: OAuthProvider, tokens: &TokenSet) -> Result<&str, AppError> {
    tokens
        .access_token
        .as_deref()
        .ok_or_else(|| AppError::Upstream(format!("{} issued no access token", provider)))
}

fn userinfo_url(provider: OAuthProvider, settings: &ProviderSettings) -> Result<&str, AppError> {
    settings
        .userinfo_url
        .as_deref()
        .ok_or_else(|| AppError::Config(format!("{} has no user info endpoint", provider)))
}

/// Primary verified address, else the first primary, else the first listed
pub fn select_github_email(emails: &[GitHubEmail]) -> Option<String> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.primary))
        .or_else(|| emails.first())
        .map(|e| e.email.clone())
}

/// Read identity claims from an Apple id_token
///
/// The payload is decoded locally; the signature is not verified.
pub fn decode_apple_id_token(id_token: &str) -> Result<OAuthUserInfo, AppError> {
    let payload_b64 = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| AppError::Upstream("malformed Apple id_token".to_string()))?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64.trim_end_matches('='))
        .map_err(|e| AppError::Upstream(format!("Apple id_token is not base64url: {}", e)))?;

    let claims: AppleIdTokenClaims = serde_json::from_slice(&payload)
        .map_err(|e| AppError::Upstream(format!("Apple id_token payload: {}", e)))?;

    let name = match claims.name {
        Some(serde_json::Value::String(name)) => Some(name),
        Some(serde_json::Value::Object(parts)) => {
            let joined = ["firstName", "lastName"]
                .iter()
                .filter_map(|key| parts.get(*key).and_then(|v| v.as_str()))
                .collect::<Vec<_>>()
                .join(" ");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    };

    Ok(OAuthUserInfo {
        id: claims.sub,
        email: claims.email,
        name,
    })
}
