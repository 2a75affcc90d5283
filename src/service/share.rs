//! Share link service
//!
//! An analysis has at most one share link. The token in the link is
//! enough to read the analysis; `is_public` is reported to the viewer.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::analysis::BrdRequirements;
use crate::auth::session::generate_random_token;
use crate::data::{Analysis, Database, EntityId, ShareLink};
use crate::error::AppError;

use super::analysis::AnalysisService;

/// An analysis as seen through a share link
#[derive(Debug, Clone)]
pub struct SharedAnalysis {
    pub id: String,
    pub document_name: String,
    pub requirements: BrdRequirements,
    pub created_at: DateTime<Utc>,
    pub is_public: bool,
}

/// Share link service
pub struct ShareService {
    db: Arc<Database>,
}

impl ShareService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn owned_analysis(&self, user_id: &str, analysis_id: &str) -> Result<Analysis, AppError> {
        let analysis = self
            .db
            .get_analysis(analysis_id)
            .await?
            .ok_or_else(|| AppError::not_found("Analysis"))?;
        if analysis.user_id != user_id {
            return Err(AppError::Forbidden);
        }
        Ok(analysis)
    }

    /// Create the share link, or return the existing one
    pub async fn create(&self, user_id: &str, analysis_id: &str) -> Result<ShareLink, AppError> {
        let analysis = self.owned_analysis(user_id, analysis_id).await?;

        if let Some(existing) = self.db.get_share_link_by_analysis(&analysis.id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let candidate = ShareLink {
            id: EntityId::new().0,
            analysis_id: analysis.id.clone(),
            token: generate_random_token(),
            is_public: false,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        // A concurrent create for the same analysis loses to the stored row
        let link = self.db.insert_share_link_if_absent(&candidate).await?;

        if link.id == candidate.id {
            crate::metrics::SHARE_LINKS_CREATED_TOTAL.inc();
            tracing::info!(
                user_id = %user_id,
                analysis_id = %analysis.id,
                "Share link created"
            );
        }
        Ok(link)
    }

    /// Current share link of an owned analysis, if any
    pub async fn get(&self, user_id: &str, analysis_id: &str) -> Result<Option<ShareLink>, AppError> {
        let analysis = self.owned_analysis(user_id, analysis_id).await?;
        self.db.get_share_link_by_analysis(&analysis.id).await
    }

    /// Toggle public visibility
    ///
    /// # Errors
    /// `NotFound` when the analysis has no share link yet
    pub async fn set_visibility(
        &self,
        user_id: &str,
        analysis_id: &str,
        is_public: bool,
    ) -> Result<ShareLink, AppError> {
        let analysis = self.owned_analysis(user_id, analysis_id).await?;
        let mut link = self
            .db
            .get_share_link_by_analysis(&analysis.id)
            .await?
            .ok_or_else(|| AppError::not_found("Share link"))?;

        self.db
            .update_share_link_visibility(&link.id, is_public)
            .await?;
        link.is_public = is_public;
        link.updated_at = Utc::now();
        Ok(link)
    }

    /// Remove the share link. Missing links are ignored.
    pub async fn delete(&self, user_id: &str, analysis_id: &str) -> Result<(), AppError> {
        let analysis = self.owned_analysis(user_id, analysis_id).await?;
        if self.db.delete_share_link_by_analysis(&analysis.id).await? {
            tracing::info!(user_id = %user_id, analysis_id = %analysis.id, "Share link revoked");
        }
        Ok(())
    }

    /// Resolve a share token without authentication
    ///
    /// # Errors
    /// `NotFound` for unknown tokens, `Expired` for links past `expires_at`
    pub async fn resolve(&self, token: &str) -> Result<SharedAnalysis, AppError> {
        let link = self
            .db
            .get_share_link_by_token(token)
            .await?
            .ok_or_else(|| AppError::not_found("Share link"))?;

        if link.is_expired() {
            return Err(AppError::Expired("Share link has expired".to_string()));
        }

        let analysis = self
            .db
            .get_analysis(&link.analysis_id)
            .await?
            .ok_or_else(|| AppError::not_found("Analysis"))?;
        let requirements = AnalysisService::requirements_of(&analysis)?;

        Ok(SharedAnalysis {
            id: analysis.id,
            document_name: analysis.document_name,
            requirements,
            created_at: analysis.created_at,
            is_public: link.is_public,
        })
    }
}
