//! SQLite database operations
//!
//! All database access goes through this module.
//! Uses SQLx with runtime-checked queries.

use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_error) if db_error.is_unique_violation())
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
            }
        }

        // sqlx enables foreign_keys on every SQLite connection by default
        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Migration(e)
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Get user by ID
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Get user by email (exact match)
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Insert a new user
    ///
    /// # Errors
    /// `AppError::Validation` if the email is already registered
    pub async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (
                id, email, password_hash, name, plan,
                ai_calls_used, ai_calls_limit, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.plan)
        .bind(user.ai_calls_used)
        .bind(user.ai_calls_limit)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(AppError::Validation(
                "User with this email already exists".to_string(),
            )),
            Err(error) => Err(error.into()),
        }
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Insert a new session
    pub async fn insert_session(&self, session: &Session) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, token, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.token)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get session by token, expired or not
    pub async fn get_session_by_token(&self, token: &str) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    /// Delete a session by token
    ///
    /// # Returns
    /// `true` if a session was removed
    pub async fn delete_session_by_token(&self, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every session belonging to a user
    pub async fn delete_user_sessions(&self, user_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // OAuth accounts
    // =========================================================================

    /// Find the account link for a provider identity
    pub async fn get_oauth_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<OAuthAccount>, AppError> {
        let account = sqlx::query_as::<_, OAuthAccount>(
            "SELECT * FROM accounts WHERE provider = ? AND provider_account_id = ?",
        )
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Refresh stored provider tokens on an existing link
    pub async fn update_oauth_account_tokens(
        &self,
        id: &str,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET access_token = ?, refresh_token = ?, expires_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert an account link, optionally creating its user in the same transaction.
    pub async fn insert_oauth_account(
        &self,
        new_user: Option<&User>,
        account: &OAuthAccount,
    ) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<(), AppError> = async {
            if let Some(user) = new_user {
                sqlx::query(
                    r#"
                    INSERT INTO users (
                        id, email, password_hash, name, plan,
                        ai_calls_used, ai_calls_limit, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&user.id)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.name)
                .bind(&user.plan)
                .bind(user.ai_calls_used)
                .bind(user.ai_calls_limit)
                .bind(user.created_at)
                .bind(user.updated_at)
                .execute(&mut *conn)
                .await?;
            }

            sqlx::query(
                r#"
                INSERT INTO accounts (
                    id, user_id, provider, provider_account_id,
                    access_token, refresh_token, expires_at, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&account.id)
            .bind(&account.user_id)
            .bind(&account.provider)
            .bind(&account.provider_account_id)
            .bind(&account.access_token)
            .bind(&account.refresh_token)
            .bind(account.expires_at)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&mut *conn)
            .await?;

            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(())
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    // =========================================================================
    // Analyses
    // =========================================================================

    /// Get analysis by ID
    pub async fn get_analysis(&self, id: &str) -> Result<Option<Analysis>, AppError> {
        let analysis = sqlx::query_as::<_, Analysis>("SELECT * FROM analyses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(analysis)
    }

    /// List a user's analyses, newest first
    pub async fn list_analyses(&self, user_id: &str) -> Result<Vec<AnalysisSummary>, AppError> {
        let analyses = sqlx::query_as::<_, AnalysisSummary>(
            r#"
            SELECT id, document_name, created_at, updated_at
            FROM analyses
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(analyses)
    }

    /// Get the user's analyses among `ids`
    ///
    /// Unknown IDs and analyses owned by other users are skipped.
    pub async fn get_user_analyses_by_ids(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> Result<Vec<Analysis>, AppError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM analyses WHERE user_id = ");
        query.push_bind(user_id);
        query.push(" AND id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let analyses = query
            .build_query_as::<Analysis>()
            .fetch_all(&self.pool)
            .await?;

        Ok(analyses)
    }

    /// Store an analysis and count one AI call against its owner atomically
    pub async fn insert_analysis_with_usage(&self, analysis: &Analysis) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<(), AppError> = async {
            sqlx::query(
                r#"
                INSERT INTO analyses (
                    id, user_id, document_name, document_text, requirements,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&analysis.id)
            .bind(&analysis.user_id)
            .bind(&analysis.document_name)
            .bind(&analysis.document_text)
            .bind(&analysis.requirements)
            .bind(analysis.created_at)
            .bind(analysis.updated_at)
            .execute(&mut *conn)
            .await?;

            sqlx::query(
                "UPDATE users SET ai_calls_used = ai_calls_used + 1, updated_at = ? WHERE id = ?",
            )
            .bind(Utc::now())
            .bind(&analysis.user_id)
            .execute(&mut *conn)
            .await?;

            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(())
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    /// Delete an analysis together with its share link
    pub async fn delete_analysis(&self, id: &str) -> Result<bool, AppError> {
        sqlx::query("DELETE FROM share_links WHERE analysis_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query("DELETE FROM analyses WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Share links
    // =========================================================================

    /// Get the share link of an analysis
    pub async fn get_share_link_by_analysis(
        &self,
        analysis_id: &str,
    ) -> Result<Option<ShareLink>, AppError> {
        let link = sqlx::query_as::<_, ShareLink>("SELECT * FROM share_links WHERE analysis_id = ?")
            .bind(analysis_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(link)
    }

    /// Get a share link by its public token
    pub async fn get_share_link_by_token(&self, token: &str) -> Result<Option<ShareLink>, AppError> {
        let link = sqlx::query_as::<_, ShareLink>("SELECT * FROM share_links WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        Ok(link)
    }

    /// Insert a share link unless the analysis already has one
    ///
    /// # Returns
    /// The link now stored for the analysis (the existing one on conflict)
    pub async fn insert_share_link_if_absent(
        &self,
        link: &ShareLink,
    ) -> Result<ShareLink, AppError> {
        sqlx::query(
            r#"
            INSERT INTO share_links (
                id, analysis_id, token, is_public, expires_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(analysis_id) DO NOTHING
            "#,
        )
        .bind(&link.id)
        .bind(&link.analysis_id)
        .bind(&link.token)
        .bind(link.is_public)
        .bind(link.expires_at)
        .bind(link.created_at)
        .bind(link.updated_at)
        .execute(&self.pool)
        .await?;

        self.get_share_link_by_analysis(&link.analysis_id)
            .await?
            .ok_or_else(|| AppError::not_found("Share link"))
    }

    /// Change the visibility of a share link
    pub async fn update_share_link_visibility(
        &self,
        id: &str,
        is_public: bool,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE share_links SET is_public = ?, updated_at = ? WHERE id = ?")
            .bind(is_public)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Delete the share link of an analysis
    pub async fn delete_share_link_by_analysis(&self, analysis_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM share_links WHERE analysis_id = ?")
            .bind(analysis_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Contact requests
    // =========================================================================

    /// Persist a sales enquiry
    pub async fn insert_contact_request(&self, request: &ContactRequest) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO contact_requests (
                id, name, email, company, phone, message, plan_name, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.id)
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.company)
        .bind(&request.phone)
        .bind(&request.message)
        .bind(&request.plan_name)
        .bind(request.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Count stored sales enquiries
    pub async fn count_contact_requests(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contact_requests")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
