//! API request and response DTOs
//!
//! JSON bodies use camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::BrdRequirements;
use crate::data::{Analysis, AnalysisSummary, ShareLink, User};
use crate::service::SharedAnalysis;

// =============================================================================
// Auth
// =============================================================================

/// User as returned to the browser
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub plan: String,
    pub ai_calls_used: i64,
    pub ai_calls_limit: i64,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            plan: user.plan.clone(),
            ai_calls_used: user.ai_calls_used,
            ai_calls_limit: user.ai_calls_limit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Query string or form body of an OAuth callback
#[derive(Debug, Default, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

// =============================================================================
// Analyses
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummaryResponse {
    pub id: String,
    pub document_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AnalysisSummary> for AnalysisSummaryResponse {
    fn from(summary: AnalysisSummary) -> Self {
        Self {
            id: summary.id,
            document_name: summary.document_name,
            created_at: summary.created_at,
            updated_at: summary.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalysisListResponse {
    pub analyses: Vec<AnalysisSummaryResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAnalysisRequest {
    #[serde(default)]
    pub document_name: String,
    #[serde(default)]
    pub document_text: String,
    #[serde(default)]
    pub requirements: serde_json::Value,
}

/// JSON alternative to a multipart upload for `POST /api/analyze`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeTextRequest {
    #[serde(default)]
    pub document_name: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAnalysisResponse {
    pub id: String,
    pub document_name: String,
    pub created_at: DateTime<Utc>,
}

/// Analysis with its requirements; `document_text` only for the owner view
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub id: String,
    pub document_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_text: Option<String>,
    pub requirements: BrdRequirements,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AnalysisResponse {
    pub fn full(analysis: Analysis, requirements: BrdRequirements) -> Self {
        Self {
            id: analysis.id,
            document_name: analysis.document_name,
            document_text: Some(analysis.document_text),
            requirements,
            created_at: analysis.created_at,
            updated_at: Some(analysis.updated_at),
        }
    }

    /// Fresh LLM result, without the document body
    pub fn analyzed(analysis: Analysis, requirements: BrdRequirements) -> Self {
        Self {
            id: analysis.id,
            document_name: analysis.document_name,
            document_text: None,
            requirements,
            created_at: analysis.created_at,
            updated_at: None,
        }
    }
}

/// Envelope `{"analysis": ...}`
#[derive(Debug, Serialize)]
pub struct AnalysisEnvelope<T> {
    pub analysis: T,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateParams {
    pub hourly_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompareParams {
    /// Comma-separated analysis IDs
    pub ids: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompareResponse {
    pub analyses: Vec<crate::analysis::ComparisonRow>,
}

// =============================================================================
// Share links
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLinkResponse {
    pub share_token: Option<String>,
    pub is_public: bool,
}

impl From<Option<ShareLink>> for ShareLinkResponse {
    fn from(link: Option<ShareLink>) -> Self {
        match link {
            Some(link) => Self {
                share_token: Some(link.token),
                is_public: link.is_public,
            },
            None => Self {
                share_token: None,
                is_public: false,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShareRequest {
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedAnalysisResponse {
    pub id: String,
    pub document_name: String,
    pub requirements: BrdRequirements,
    pub created_at: DateTime<Utc>,
    pub is_public: bool,
}

impl From<SharedAnalysis> for SharedAnalysisResponse {
    fn from(shared: SharedAnalysis) -> Self {
        Self {
            id: shared.id,
            document_name: shared.document_name,
            requirements: shared.requirements,
            created_at: shared.created_at,
            is_public: shared.is_public,
        }
    }
}

// =============================================================================
// Contact
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSalesRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub message: String,
    pub plan_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContactSalesResponse {
    pub success: bool,
    pub message: String,
}
