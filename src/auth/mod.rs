//! Authentication
//!
//! Handles:
//! - Password hashing
//! - Session tokens and cookies
//! - OAuth flow (Google, GitHub, Apple)
//! - Authentication middleware

mod middleware;
pub mod oauth;
pub mod password;
pub mod session;

pub use middleware::{CurrentUser, extract_token_from_headers, require_auth};
pub use oauth::{OAuthClient, OAuthProvider, OAuthUserInfo, PkceChallenge};
