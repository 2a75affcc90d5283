//! API layer
//!
//! HTTP handlers for:
//! - Authentication (password and OAuth)
//! - Analyses, exports and reports
//! - Share links
//! - Contact sales
//! - Metrics (Prometheus)

mod analyses;
mod auth;
mod contact;
mod dto;
pub mod metrics;
mod share;

pub use dto::*;

pub use analyses::analyses_router;
pub use auth::auth_router;
pub use contact::contact_router;
pub use metrics::metrics_router;
pub use share::{share_router, shared_router};
