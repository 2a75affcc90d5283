//! Derived views over stored requirements
//!
//! Statistics, time/cost estimates, comparison rows and CSV/Markdown
//! exports. All functions are pure.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use super::requirements::BrdRequirements;

const HOURS_PER_DAY: f64 = 8.0;
const HOURS_PER_WEEK: f64 = 40.0;
const HOURS_PER_MONTH: f64 = 160.0;

const HOURS_PER_FUNCTIONAL: f64 = 8.0;
const HOURS_PER_FRONTEND: f64 = 6.0;
const HOURS_PER_API_ENDPOINT: f64 = 12.0;

const MAX_TEAM_SIZE: u64 = 5;

pub const DEFAULT_HOURLY_RATE: f64 = 50.0;

fn ceil_units(hours: f64, per_unit: f64) -> u64 {
    if hours <= 0.0 {
        0
    } else {
        (hours / per_unit).ceil() as u64
    }
}

fn role_key(role: &str) -> String {
    let role = role.trim();
    if role.is_empty() {
        "unassigned".to_string()
    } else {
        role.to_string()
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriorityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl PriorityCounts {
    fn record(&mut self, priority: Option<&str>) {
        match priority {
            Some("high") => self.high += 1,
            Some("medium") => self.medium += 1,
            Some("low") => self.low += 1,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsByType {
    pub functional: usize,
    pub non_functional: usize,
    pub frontend: usize,
}

/// Dashboard statistics for one analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    /// Functional + non-functional + frontend
    pub total_requirements: usize,
    pub total_tasks: usize,
    pub total_user_stories: usize,
    pub total_apis: usize,
    pub total_hours: f64,
    pub estimated_days: u64,
    pub estimated_weeks: u64,
    /// Over functional, frontend and task items
    pub priority: PriorityCounts,
    /// Task count per role
    pub roles: BTreeMap<String, usize>,
    pub requirements_by_type: RequirementsByType,
    pub non_functional_by_type: BTreeMap<String, usize>,
}

impl Statistics {
    pub fn compute(requirements: &BrdRequirements) -> Self {
        let requirements_by_type = RequirementsByType {
            functional: requirements.functional_requirements.len(),
            non_functional: requirements.non_functional_requirements.len(),
            frontend: requirements.frontend_requirements.len(),
        };

        let mut priority = PriorityCounts::default();
        for item in &requirements.functional_requirements {
            priority.record(item.priority.as_deref());
        }
        for item in &requirements.frontend_requirements {
            priority.record(item.priority.as_deref());
        }
        for task in &requirements.task_breakdown {
            priority.record(Some(task.priority.as_str()));
        }

        let mut roles = BTreeMap::new();
        for task in &requirements.task_breakdown {
            *roles.entry(role_key(&task.role)).or_insert(0) += 1;
        }

        let mut non_functional_by_type = BTreeMap::new();
        for item in &requirements.non_functional_requirements {
            let kind = if item.kind.is_empty() {
                "other"
            } else {
                item.kind.as_str()
            };
            *non_functional_by_type.entry(kind.to_string()).or_insert(0) += 1;
        }

        let total_hours = requirements.task_hours();

        Self {
            total_requirements: requirements_by_type.functional
                + requirements_by_type.non_functional
                + requirements_by_type.frontend,
            total_tasks: requirements.task_breakdown.len(),
            total_user_stories: requirements.user_stories.len(),
            total_apis: requirements.api_endpoints.len(),
            total_hours,
            estimated_days: ceil_units(total_hours, HOURS_PER_DAY),
            estimated_weeks: ceil_units(total_hours, HOURS_PER_WEEK),
            priority,
            roles,
            requirements_by_type,
            non_functional_by_type,
        }
    }
}

// =============================================================================
// Time and cost estimate
// =============================================================================

/// Project time/cost estimate
///
/// Task estimates are padded with flat allowances for functional
/// requirements, frontend requirements and API endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub hourly_rate: f64,
    pub total_hours: f64,
    pub estimated_days: u64,
    pub estimated_weeks: u64,
    pub estimated_months: u64,
    pub base_cost: f64,
    pub low_cost: f64,
    pub high_cost: f64,
    pub recommended_team_size: u64,
    pub min_team_size: u64,
    pub max_team_size: u64,
    pub role_hours: BTreeMap<String, f64>,
}

impl Estimate {
    pub fn compute(requirements: &BrdRequirements, hourly_rate: f64) -> Self {
        let total_hours = requirements.task_hours()
            + requirements.functional_requirements.len() as f64 * HOURS_PER_FUNCTIONAL
            + requirements.frontend_requirements.len() as f64 * HOURS_PER_FRONTEND
            + requirements.api_endpoints.len() as f64 * HOURS_PER_API_ENDPOINT;

        let estimated_weeks = ceil_units(total_hours, HOURS_PER_WEEK);
        let recommended_team_size = estimated_weeks.div_ceil(4);
        let base_cost = total_hours * hourly_rate;

        let mut role_hours = BTreeMap::new();
        for task in &requirements.task_breakdown {
            *role_hours.entry(role_key(&task.role)).or_insert(0.0) +=
                task.hours().unwrap_or(0.0);
        }

        Self {
            hourly_rate,
            total_hours,
            estimated_days: ceil_units(total_hours, HOURS_PER_DAY),
            estimated_weeks,
            estimated_months: ceil_units(total_hours, HOURS_PER_MONTH),
            base_cost,
            low_cost: base_cost * 0.8,
            high_cost: base_cost * 1.3,
            recommended_team_size,
            min_team_size: 1,
            max_team_size: recommended_team_size.min(MAX_TEAM_SIZE),
            role_hours,
        }
    }
}

// =============================================================================
// Comparison
// =============================================================================

/// One column of the side-by-side analysis comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRow {
    pub id: String,
    pub document_name: String,
    pub total_requirements: usize,
    pub functional_requirements: usize,
    pub non_functional_requirements: usize,
    pub frontend_requirements: usize,
    pub user_stories: usize,
    pub tasks: usize,
    pub estimated_hours: f64,
    pub estimated_days: u64,
    pub api_endpoints: usize,
}

impl ComparisonRow {
    pub fn new(id: String, document_name: String, requirements: &BrdRequirements) -> Self {
        let estimated_hours = requirements.task_hours();
        let total_requirements = requirements
            .metadata
            .as_ref()
            .map(|metadata| metadata.total_requirements)
            .unwrap_or_else(|| requirements.total_requirements());

        Self {
            id,
            document_name,
            total_requirements,
            functional_requirements: requirements.functional_requirements.len(),
            non_functional_requirements: requirements.non_functional_requirements.len(),
            frontend_requirements: requirements.frontend_requirements.len(),
            user_stories: requirements.user_stories.len(),
            tasks: requirements.task_breakdown.len(),
            estimated_hours,
            estimated_days: ceil_units(estimated_hours, HOURS_PER_DAY),
            api_endpoints: requirements.api_endpoints.len(),
        }
    }
}

// =============================================================================
// Exports
// =============================================================================

/// Export formats for `GET /api/analyses/{id}/export`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Markdown,
    Pdf,
}

impl ExportFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "csv" | "jira" | "trello" | "asana" => Some(Self::Csv),
            "markdown" | "md" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Markdown => "text/markdown; charset=utf-8",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Markdown => "md",
            Self::Pdf => "pdf",
        }
    }
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Quote only when the value would break the row
fn bare(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        quoted(value)
    } else {
        value.to_string()
    }
}

fn hours(value: Option<&serde_json::Number>) -> String {
    value
        .filter(|h| h.as_f64().is_some_and(|h| h > 0.0))
        .map(|h| h.to_string())
        .unwrap_or_default()
}

/// Flat CSV suitable for Jira/Trello/Asana import
pub fn to_csv(requirements: &BrdRequirements) -> String {
    let mut rows = vec!["Type,Title,Description,Priority,Role,Estimated Hours,Category".to_string()];

    for r in &requirements.functional_requirements {
        rows.push(format!(
            "Functional,{},{},{},,,{}",
            quoted(&r.title),
            quoted(&r.description),
            bare(r.priority.as_deref().unwrap_or_default()),
            quoted(r.category.as_deref().unwrap_or_default()),
        ));
    }

    for r in &requirements.frontend_requirements {
        rows.push(format!(
            "Frontend,{},{},{},,,{}",
            quoted(&r.title),
            quoted(&r.description),
            bare(r.priority.as_deref().unwrap_or_default()),
            quoted(r.component.as_deref().unwrap_or_default()),
        ));
    }

    for t in &requirements.task_breakdown {
        rows.push(format!(
            "Task,{},{},{},{},{},",
            quoted(&t.title),
            quoted(&t.description),
            bare(&t.priority),
            bare(&t.role),
            hours(t.estimated_hours.as_ref()),
        ));
    }

    for s in &requirements.user_stories {
        rows.push(format!(
            "User Story,{},{},{},,,",
            quoted(&s.story),
            quoted(&s.acceptance_criteria.join("; ")),
            bare(s.priority.as_deref().unwrap_or_default()),
        ));
    }

    rows.join("\n")
}

pub fn to_markdown(requirements: &BrdRequirements) -> String {
    let (document_name, processed_at) = requirements
        .metadata
        .as_ref()
        .map(|m| (m.document_name.as_str(), m.processed_at.as_str()))
        .unwrap_or(("Unknown", "Unknown"));

    let mut md = String::from("# Requirements Document\n\n");
    let _ = writeln!(md, "**Document:** {}", document_name);
    let _ = writeln!(md, "**Processed:** {}\n", processed_at);

    if !requirements.business_requirements_summary.is_empty() {
        let _ = writeln!(
            md,
            "## Business Requirements Summary\n\n{}\n",
            requirements.business_requirements_summary
        );
    }

    if !requirements.functional_requirements.is_empty() {
        md.push_str("## Functional Requirements\n\n");
        for (idx, r) in requirements.functional_requirements.iter().enumerate() {
            let _ = writeln!(md, "### {}. {}\n", idx + 1, r.title);
            let _ = writeln!(md, "{}\n", r.description);
            if let Some(priority) = r.priority.as_deref().filter(|p| !p.is_empty()) {
                let _ = writeln!(md, "**Priority:** {}\n", priority);
            }
        }
    }

    if !requirements.task_breakdown.is_empty() {
        md.push_str("## Task Breakdown\n\n");
        for (idx, t) in requirements.task_breakdown.iter().enumerate() {
            let _ = writeln!(md, "### {}. {}\n", idx + 1, t.title);
            let _ = writeln!(md, "{}\n", t.description);
            let _ = writeln!(md, "- **Priority:** {}", t.priority);
            let _ = writeln!(md, "- **Role:** {}", t.role);
            let estimate = hours(t.estimated_hours.as_ref());
            if !estimate.is_empty() {
                let _ = writeln!(md, "- **Estimated Hours:** {}", estimate);
            }
            md.push('\n');
        }
    }

    md
}
