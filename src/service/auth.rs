//! Password authentication and session service
//!
//! Handles signup, login, logout and session validation. Sessions are
//! opaque tokens stored in the `sessions` table and checked lazily on read.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::auth::password::{hash_password, verify_password};
use crate::auth::session::generate_random_token;
use crate::data::{Database, EntityId, Session, User};
use crate::error::AppError;

const MIN_PASSWORD_LEN: usize = 6;

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const OAUTH_ONLY_ACCOUNT: &str =
    "This account was created with OAuth. Please sign in with your OAuth provider.";

/// A user together with the session just issued to them
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub user: User,
    pub session: Session,
}

/// Authentication service
pub struct AuthService {
    db: Arc<Database>,
    session_ttl: Duration,
}

impl AuthService {
    /// Create new auth service
    pub fn new(db: Arc<Database>, session_ttl: Duration) -> Self {
        Self { db, session_ttl }
    }

    /// Register a new password account and log it in
    ///
    /// # Errors
    /// `Validation` for missing fields, short passwords or a taken email
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
    ) -> Result<AuthOutcome, AppError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Email and password are required".to_string(),
            ));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        if self.db.get_user_by_email(email).await?.is_some() {
            return Err(AppError::Validation(
                "User with this email already exists".to_string(),
            ));
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(e.into()))??;

        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let user = User::new(email.to_string(), Some(password_hash), name);
        self.db.insert_user(&user).await?;

        tracing::info!(user_id = %user.id, "User signed up");

        let session = self.issue_session(&user.id, "signup").await?;
        Ok(AuthOutcome { user, session })
    }

    /// Log in with email and password
    ///
    /// # Errors
    /// `InvalidCredentials` for unknown emails, wrong passwords and OAuth-only accounts
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthOutcome, AppError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let user = self
            .db
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| AppError::InvalidCredentials(INVALID_CREDENTIALS.to_string()))?;

        let Some(password_hash) = user.password_hash.clone() else {
            return Err(AppError::InvalidCredentials(OAUTH_ONLY_ACCOUNT.to_string()));
        };

        let password = password.to_string();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
            .await
            .map_err(|e| AppError::Internal(e.into()))??;

        if !valid {
            tracing::debug!(user_id = %user.id, "Password mismatch");
            return Err(AppError::InvalidCredentials(INVALID_CREDENTIALS.to_string()));
        }

        let session = self.issue_session(&user.id, "password").await?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(AuthOutcome { user, session })
    }

    /// Delete the session behind `token`. Unknown tokens are ignored.
    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        if self.db.delete_session_by_token(token).await? {
            tracing::debug!("Session deleted on logout");
        }
        Ok(())
    }

    /// Resolve a session token to its user
    ///
    /// Expired sessions are deleted and reported as absent.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, AppError> {
        let Some(session) = self.db.get_session_by_token(token).await? else {
            return Ok(None);
        };

        if session.is_expired() {
            self.db.delete_session_by_token(token).await?;
            tracing::debug!(user_id = %session.user_id, "Expired session removed");
            return Ok(None);
        }

        self.db.get_user(&session.user_id).await
    }

    /// Replace every session of a user with a fresh one
    pub async fn refresh_session(&self, user_id: &str) -> Result<Session, AppError> {
        let removed = self.db.delete_user_sessions(user_id).await?;
        tracing::debug!(user_id = %user_id, removed, "Sessions revoked for refresh");
        self.issue_session(user_id, "refresh").await
    }

    /// Create and store a new session for a user
    pub(crate) async fn issue_session(
        &self,
        user_id: &str,
        method: &str,
    ) -> Result<Session, AppError> {
        let now = Utc::now();
        let session = Session {
            id: EntityId::new().0,
            user_id: user_id.to_string(),
            token: generate_random_token(),
            expires_at: now + self.session_ttl,
            created_at: now,
        };
        self.db.insert_session(&session).await?;

        crate::metrics::SESSIONS_ISSUED_TOTAL
            .with_label_values(&[method])
            .inc();

        Ok(session)
    }
}
