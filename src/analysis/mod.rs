//! BRD analysis
//!
//! Document text extraction, the LLM extraction call, the requirements
//! schema and the reports derived from it.

pub mod document;
pub mod llm;
pub mod pdf;
pub mod report;
pub mod requirements;

pub use llm::LlmClient;
pub use report::{ComparisonRow, Estimate, ExportFormat, Statistics};
pub use requirements::BrdRequirements;
