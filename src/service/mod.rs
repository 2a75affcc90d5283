//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate database, OAuth and LLM operations.

mod analysis;
mod auth;
mod oauth_user;
mod share;

pub use analysis::{AnalysisService, AnalyzeInput};
pub use auth::{AuthOutcome, AuthService};
pub use oauth_user::OAuthUserService;
pub use share::{ShareService, SharedAnalysis};
