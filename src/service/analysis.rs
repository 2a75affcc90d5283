//! Analysis service
//!
//! Stores, loads and derives reports from BRD analyses. Every stored
//! analysis counts one AI call against its owner's plan.

use std::sync::Arc;

use crate::analysis::{BrdRequirements, ComparisonRow, LlmClient};
use crate::data::{Analysis, AnalysisSummary, Database, User};
use crate::error::AppError;

/// Upper bound on analyses compared side by side
const MAX_COMPARED_ANALYSES: usize = 10;

/// A document ready to be sent to the LLM
#[derive(Debug, Clone)]
pub struct AnalyzeInput {
    pub document_name: String,
    pub document_text: String,
}

/// Analysis service
pub struct AnalysisService {
    db: Arc<Database>,
    llm: Arc<LlmClient>,
}

impl AnalysisService {
    pub fn new(db: Arc<Database>, llm: Arc<LlmClient>) -> Self {
        Self { db, llm }
    }

    fn ensure_quota(user: &User) -> Result<(), AppError> {
        if user.has_ai_calls_remaining() {
            return Ok(());
        }
        tracing::info!(
            user_id = %user.id,
            used = user.ai_calls_used,
            limit = user.ai_calls_limit,
            "AI call quota exhausted"
        );
        Err(AppError::QuotaExceeded {
            plan: user.plan().to_string(),
            limit: user.ai_calls_limit,
        })
    }

    async fn store(
        &self,
        user: &User,
        document_name: String,
        document_text: String,
        requirements: &BrdRequirements,
        source: &str,
    ) -> Result<Analysis, AppError> {
        let requirements_json =
            serde_json::to_string(requirements).map_err(|e| AppError::Internal(e.into()))?;
        let analysis = Analysis::new(
            user.id.clone(),
            document_name,
            document_text,
            requirements_json,
        );
        self.db.insert_analysis_with_usage(&analysis).await?;

        crate::metrics::ANALYSES_CREATED_TOTAL
            .with_label_values(&[source])
            .inc();
        tracing::info!(
            user_id = %user.id,
            analysis_id = %analysis.id,
            source,
            "Analysis stored"
        );

        Ok(analysis)
    }

    /// List the user's analyses, newest first
    pub async fn list(&self, user_id: &str) -> Result<Vec<AnalysisSummary>, AppError> {
        self.db.list_analyses(user_id).await
    }

    /// Save a result computed elsewhere
    ///
    /// # Errors
    /// `Validation` for missing fields or a non-object `requirements`,
    /// `QuotaExceeded` when the plan has no calls left
    pub async fn save(
        &self,
        user: &User,
        document_name: &str,
        document_text: &str,
        requirements: serde_json::Value,
    ) -> Result<Analysis, AppError> {
        if document_name.trim().is_empty() || document_text.trim().is_empty() || requirements.is_null()
        {
            return Err(AppError::Validation("Missing required fields".to_string()));
        }
        Self::ensure_quota(user)?;

        let requirements = BrdRequirements::from_value(requirements)
            .map_err(|e| AppError::Validation(format!("Invalid requirements: {}", e)))?;

        self.store(
            user,
            document_name.trim().to_string(),
            document_text.to_string(),
            &requirements,
            "import",
        )
        .await
    }

    /// Run the LLM over a document and store the result
    ///
    /// The quota is checked before the upstream call so exhausted plans
    /// never reach the LLM.
    pub async fn analyze(
        &self,
        user: &User,
        input: AnalyzeInput,
    ) -> Result<(Analysis, BrdRequirements), AppError> {
        let document_name = input.document_name.trim().to_string();
        if document_name.is_empty() {
            return Err(AppError::Validation("Document name is required".to_string()));
        }
        if input.document_text.trim().is_empty() {
            return Err(AppError::Validation("Document text is required".to_string()));
        }
        Self::ensure_quota(user)?;

        let requirements = self
            .llm
            .analyze(&input.document_text, &document_name)
            .await?;
        let analysis = self
            .store(user, document_name, input.document_text, &requirements, "llm")
            .await?;

        Ok((analysis, requirements))
    }

    /// Load an analysis owned by `user_id`
    ///
    /// # Errors
    /// `NotFound` if it does not exist, `Forbidden` if someone else owns it
    pub async fn get_owned(&self, user_id: &str, id: &str) -> Result<Analysis, AppError> {
        let analysis = self
            .db
            .get_analysis(id)
            .await?
            .ok_or_else(|| AppError::not_found("Analysis"))?;

        if analysis.user_id != user_id {
            return Err(AppError::Forbidden);
        }
        Ok(analysis)
    }

    /// Parse the stored requirements JSON
    pub fn requirements_of(analysis: &Analysis) -> Result<BrdRequirements, AppError> {
        let value: serde_json::Value = serde_json::from_str(&analysis.requirements)
            .map_err(|e| AppError::Internal(e.into()))?;
        BrdRequirements::from_value(value).map_err(|e| AppError::Internal(e.into()))
    }

    /// Delete an owned analysis and its share link
    pub async fn delete(&self, user_id: &str, id: &str) -> Result<(), AppError> {
        let analysis = self.get_owned(user_id, id).await?;
        self.db.delete_analysis(&analysis.id).await?;
        tracing::info!(user_id = %user_id, analysis_id = %analysis.id, "Analysis deleted");
        Ok(())
    }

    /// Comparison rows in the order requested
    ///
    /// IDs that are unknown or owned by someone else are skipped.
    pub async fn compare(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> Result<Vec<ComparisonRow>, AppError> {
        let mut requested: Vec<String> = Vec::new();
        for id in ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
            if !requested.iter().any(|seen| seen == id) {
                requested.push(id.to_string());
            }
        }

        if requested.is_empty() {
            return Err(AppError::Validation(
                "At least one analysis id is required".to_string(),
            ));
        }
        if requested.len() > MAX_COMPARED_ANALYSES {
            return Err(AppError::Validation(format!(
                "At most {} analyses can be compared",
                MAX_COMPARED_ANALYSES
            )));
        }

        let analyses = self.db.get_user_analyses_by_ids(user_id, &requested).await?;

        let mut rows = Vec::with_capacity(analyses.len());
        for id in &requested {
            if let Some(analysis) = analyses.iter().find(|a| &a.id == id) {
                let requirements = Self::requirements_of(analysis)?;
                rows.push(ComparisonRow::new(
                    analysis.id.clone(),
                    analysis.document_name.clone(),
                    &requirements,
                ));
            }
        }
        Ok(rows)
    }
}
