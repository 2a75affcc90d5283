//! OAuth user service
//!
//! Maps a provider identity to a local user, linking or creating accounts
//! as needed, and issues a session for it.

use std::sync::Arc;

use chrono::{Duration, Utc};

use super::auth::{AuthOutcome, AuthService};
use crate::auth::oauth::{OAuthProvider, OAuthUserInfo, TokenSet};
use crate::data::{Database, EntityId, OAuthAccount, User};
use crate::error::AppError;

/// OAuth user service
pub struct OAuthUserService {
    db: Arc<Database>,
    auth: AuthService,
}

impl OAuthUserService {
    pub fn new(db: Arc<Database>, session_ttl: Duration) -> Self {
        let auth = AuthService::new(db.clone(), session_ttl);
        Self { db, auth }
    }

    /// Find or create the user behind a provider identity and log them in
    ///
    /// # Steps
    /// 1. Reject identities without an email
    /// 2. Known link: refresh stored tokens, reuse its user
    /// 3. Unknown link: attach to the user with the same email, or create one
    /// 4. Issue a fresh session
    pub async fn find_or_create_user(
        &self,
        provider: OAuthProvider,
        info: &OAuthUserInfo,
        tokens: &TokenSet,
    ) -> Result<AuthOutcome, AppError> {
        let email = info
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .ok_or_else(|| {
                AppError::Validation(
                    "Email is required but not provided by OAuth provider".to_string(),
                )
            })?;

        let token_expires_at = tokens
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + Duration::seconds(secs));

        let user = match self
            .db
            .get_oauth_account(provider.as_str(), &info.id)
            .await?
        {
            Some(account) => {
                self.db
                    .update_oauth_account_tokens(
                        &account.id,
                        tokens.access_token.as_deref(),
                        tokens.refresh_token.as_deref(),
                        token_expires_at,
                    )
                    .await?;

                self.db
                    .get_user(&account.user_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("User"))?
            }
            None => {
                let existing = self.db.get_user_by_email(email).await?;
                let (user, new_user) = match existing {
                    Some(user) => (user, false),
                    None => (
                        User::new(email.to_string(), None, info.name.clone()),
                        true,
                    ),
                };

                let now = Utc::now();
                let account = OAuthAccount {
                    id: EntityId::new().0,
                    user_id: user.id.clone(),
                    provider: provider.as_str().to_string(),
                    provider_account_id: info.id.clone(),
                    access_token: tokens.access_token.clone(),
                    refresh_token: tokens.refresh_token.clone(),
                    expires_at: token_expires_at,
                    created_at: now,
                    updated_at: now,
                };
                self.db
                    .insert_oauth_account(new_user.then_some(&user), &account)
                    .await?;

                tracing::info!(
                    user_id = %user.id,
                    provider = %provider,
                    new_user,
                    "OAuth account linked"
                );
                user
            }
        };

        let session = self.auth.issue_session(&user.id, provider.as_str()).await?;
        Ok(AuthOutcome { user, session })
    }
}
