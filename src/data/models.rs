//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Plans
// =============================================================================

/// Subscription plan
///
/// Stored as its uppercase name in `users.plan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Plan {
    Free,
    Basic,
    Pro,
    Enterprise,
}

/// `ai_calls_limit` value meaning "no limit"
pub const UNLIMITED_AI_CALLS: i64 = -1;

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "FREE",
            Plan::Basic => "BASIC",
            Plan::Pro => "PRO",
            Plan::Enterprise => "ENTERPRISE",
        }
    }

    /// Parse a stored plan name. Unknown names fall back to FREE.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "BASIC" => Plan::Basic,
            "PRO" => Plan::Pro,
            "ENTERPRISE" => Plan::Enterprise,
            _ => Plan::Free,
        }
    }

    /// AI calls allowed per account on this plan
    pub fn ai_calls_limit(&self) -> i64 {
        match self {
            Plan::Free => 5,
            Plan::Basic => 50,
            Plan::Pro => 200,
            Plan::Enterprise => UNLIMITED_AI_CALLS,
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// User
// =============================================================================

/// A registered user
///
/// `password_hash` is `None` for accounts created through OAuth.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub plan: String,
    pub ai_calls_used: i64,
    pub ai_calls_limit: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a new FREE-plan user
    pub fn new(email: String, password_hash: Option<String>, name: Option<String>) -> Self {
        let now = Utc::now();
        let plan = Plan::Free;
        Self {
            id: EntityId::new().0,
            email,
            password_hash,
            name,
            plan: plan.as_str().to_string(),
            ai_calls_used: 0,
            ai_calls_limit: plan.ai_calls_limit(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn plan(&self) -> Plan {
        Plan::parse(&self.plan)
    }

    /// Whether another AI call is allowed
    pub fn has_ai_calls_remaining(&self) -> bool {
        self.ai_calls_limit == UNLIMITED_AI_CALLS || self.ai_calls_used < self.ai_calls_limit
    }
}

// =============================================================================
// Session
// =============================================================================

/// A login session, addressed by its opaque token
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    /// 64 hex chars
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

// =============================================================================
// OAuth account link
// =============================================================================

/// Link between a user and an external identity
///
/// `(provider, provider_account_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OAuthAccount {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub provider_account_id: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Analysis
// =============================================================================

/// A stored analysis result
///
/// `requirements` holds the normalized requirements JSON as text.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Analysis {
    pub id: String,
    pub user_id: String,
    pub document_name: String,
    pub document_text: String,
    pub requirements: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Analysis {
    pub fn new(
        user_id: String,
        document_name: String,
        document_text: String,
        requirements: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new().0,
            user_id,
            document_name,
            document_text,
            requirements,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Listing row for an analysis (no document body)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnalysisSummary {
    pub id: String,
    pub document_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Share link
// =============================================================================

/// Share token for one analysis (at most one per analysis)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShareLink {
    pub id: String,
    pub analysis_id: String,
    /// 64 hex chars
    pub token: String,
    pub is_public: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShareLink {
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| expires_at <= Utc::now())
            .unwrap_or(false)
    }
}

// =============================================================================
// Contact request
// =============================================================================

/// A sales enquiry from the pricing page
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContactRequest {
    pub id: String,
    pub name: String,
    pub email: String,
    pub company: String,
    pub phone: String,
    pub message: String,
    pub plan_name: Option<String>,
    pub created_at: DateTime<Utc>,
}
