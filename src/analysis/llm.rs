//! LLM client for requirements extraction
//!
//! Talks to an OpenAI-compatible chat-completion API (Groq by default).
//! One request per analysis, no retry.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;

use super::requirements::BrdRequirements;
use crate::config::LlmConfig;
use crate::error::AppError;

const SYSTEM_PROMPT: &str = r#"You are an expert business analyst and technical requirements extractor. Your task is to analyze Business Requirements Documents (BRD) and extract ALL requirements in a highly detailed and structured format.

IMPORTANT: All extracted data (titles, descriptions, summaries, business rules, use cases, etc.) MUST be in English.

Extract and categorize all requirements from the provided BRD text into the following categories:

1. Business Requirements Summary: overview of the business objectives, goals and overall system purpose
2. Functional Requirements: specific features and functionalities the system must provide
3. Non-Functional Requirements: performance, security, usability, scalability, maintainability, accessibility
4. Front-End Requirements: UI/UX requirements, components, pages, screens, forms, modals and frontend technologies
5. Role-Based Requirements: requirements per role (frontend, backend, business, ui-design, devops, qa, database, security, mobile, other)
6. User Stories: "As a [user type], I want [goal] so that [benefit]" with acceptance criteria
7. Task Breakdown: actionable tasks for all roles derived from the requirements
8. API Endpoints: every endpoint mentioned or implied, with method, path, request and response bodies
9. Business Rules: every rule, constraint, condition and validation, simplified for clarity
10. Contract/Entity States: every state with its description, transition conditions and allowed actions
11. Use Case Flows: numbered steps, actors, actions, pre-conditions, post-conditions and exception flows
12. Features: related requirements grouped and linked to user stories
13. Recommendations: best practices per requirement, categorized as best-practice, improvement, security, performance, usability, architecture or other

Return the result as a valid JSON object matching this exact schema:
{
  "businessRequirementsSummary": "string",
  "functionalRequirements": [{"id": "string", "title": "string", "description": "string", "priority": "high" | "medium" | "low", "category": "string"}],
  "nonFunctionalRequirements": [{"id": "string", "title": "string", "description": "string", "type": "performance" | "security" | "usability" | "scalability" | "maintainability" | "accessibility" | "other"}],
  "frontendRequirements": [{"id": "string", "title": "string", "description": "string", "component": "string", "page": "string", "technology": "string", "priority": "high" | "medium" | "low"}],
  "roleRequirements": [{"id": "string", "title": "string", "description": "string", "role": "frontend" | "backend" | "business" | "ui-design" | "devops" | "qa" | "database" | "security" | "mobile" | "other", "priority": "high" | "medium" | "low", "technology": "string", "component": "string", "page": "string", "estimatedHours": number}],
  "userStories": [{"id": "string", "story": "string", "acceptanceCriteria": ["string"], "frontendTasks": ["string"], "uiHints": ["string"], "priority": "high" | "medium" | "low"}],
  "taskBreakdown": [{"id": "string", "title": "string", "description": "string", "estimatedHours": number, "priority": "high" | "medium" | "low", "dependencies": ["string"], "frontendComponent": "string", "role": "frontend" | "backend" | "business" | "ui-design" | "devops" | "qa" | "database" | "security" | "mobile" | "other"}],
  "apiEndpoints": [{"id": "string", "method": "string", "path": "string", "description": "string", "requestBody": "string", "responseBody": "string"}],
  "recommendations": [{"id": "string", "requirementId": "string", "role": "string", "title": "string", "description": "string", "category": "best-practice" | "improvement" | "security" | "performance" | "usability" | "architecture" | "other", "priority": "high" | "medium" | "low", "rationale": "string"}],
  "businessRules": [{"id": "string", "title": "string", "description": "string", "category": "string", "priority": "high" | "medium" | "low"}],
  "contractStates": [{"id": "string", "name": "string", "description": "string", "conditions": ["string"], "allowedActions": ["string"]}],
  "useCaseFlows": [{"id": "string", "useCaseId": "string", "title": "string", "steps": [{"stepNumber": number, "description": "string", "actor": "string", "action": "string"}], "preConditions": ["string"], "postConditions": ["string"], "exceptionFlows": [{"condition": "string", "flow": ["string"]}]}],
  "features": [{"id": "string", "title": "string", "description": "string", "category": "string", "priority": "high" | "medium" | "low", "userStories": ["string"], "relatedRequirements": ["string"]}]
}

CRITICAL INSTRUCTIONS:
- Be extremely thorough and extract every detail from the BRD
- Categorize each roleRequirement by the appropriate role
- Provide recommendations for each requirement based on its type and role
- If a section is not found, return an empty array
- Always return valid JSON"#;

fn user_prompt(text: &str) -> String {
    format!(
        "Analyze the following BRD document. Extract all requirements and categorize them by \
         different roles (frontend, backend, business, ui-design, devops, qa, database, security, \
         mobile, other). Provide recommendations and best practices for each requirement.\n\n\
         **Important:** All extracted data must be in English.\n\nDocument:\n\n{}",
        text
    )
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Chat-completion client
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(http: reqwest::Client, config: LlmConfig) -> Self {
        Self { http, config }
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| AppError::NotConfigured("LLM API key is not configured".to_string()))
    }

    /// Extract structured requirements from document text
    ///
    /// The result has every section present and `metadata` stamped.
    pub async fn analyze(
        &self,
        text: &str,
        document_name: &str,
    ) -> Result<BrdRequirements, AppError> {
        let api_key = self.api_key()?;
        let started = Instant::now();

        let result = self.request_completion(api_key, text).await;
        let status = if result.is_ok() { "success" } else { "error" };
        crate::metrics::observe_llm_request(status, started.elapsed());

        let content = result?;
        let value = parse_completion_content(&content)?;
        let requirements = BrdRequirements::from_value(value)
            .map_err(|e| AppError::Upstream(format!("LLM JSON does not match schema: {}", e)))?
            .with_metadata(document_name);

        tracing::info!(
            document = %document_name,
            total_requirements = requirements.total_requirements(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Document analysed"
        );

        Ok(requirements)
    }

    async fn request_completion(&self, api_key: &str, text: &str) -> Result<String, AppError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(text)},
            ],
            "response_format": {"type": "json_object"},
            "temperature": self.config.temperature,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "LLM API returned {}: {}",
                status, detail
            )));
        }

        let completion: ChatCompletion = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::Upstream("No response from LLM API".to_string()))
    }
}

/// Parse model output as JSON, falling back to the first fenced code block
pub fn parse_completion_content(content: &str) -> Result<serde_json::Value, AppError> {
    if let Ok(value) = serde_json::from_str(content.trim()) {
        return Ok(value);
    }

    let fenced = extract_fenced_block(content, "```json").or_else(|| extract_fenced_block(content, "```"));
    match fenced {
        Some(block) => serde_json::from_str(block)
            .map_err(|e| AppError::Upstream(format!("Failed to parse JSON response: {}", e))),
        None => Err(AppError::Upstream(
            "Failed to parse JSON response".to_string(),
        )),
    }
}

fn extract_fenced_block<'a>(content: &'a str, opening: &str) -> Option<&'a str> {
    let start = content.find(opening)? + opening.len();
    let rest = &content[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_is_parsed() {
        let value = parse_completion_content(r#" {"functionalRequirements": []} "#).unwrap();
        assert!(value["functionalRequirements"].is_array());
    }

    #[test]
    fn fenced_json_block_is_used_as_fallback() {
        let content = "Here you go:\n```json\n{\"businessRequirementsSummary\": \"Shop\"}\n```\nDone.";
        let value = parse_completion_content(content).unwrap();
        assert_eq!(value["businessRequirementsSummary"], "Shop");

        let bare = "```\n{\"features\": []}\n```";
        assert!(parse_completion_content(bare).unwrap()["features"].is_array());
    }

    #[test]
    fn prose_is_rejected() {
        let error = parse_completion_content("I could not find any requirements.").unwrap_err();
        assert!(matches!(error, AppError::Upstream(_)));
    }

    #[tokio::test]
    async fn missing_api_key_is_reported_before_any_request() {
        let client = LlmClient::new(
            reqwest::Client::new(),
            LlmConfig {
                api_key: Some("   ".to_string()),
                base_url: "http://127.0.0.1:9".to_string(),
                model: "test-model".to_string(),
                temperature: 0.3,
                timeout_seconds: 1,
            },
        );
        let error = client.analyze("text", "doc.txt").await.unwrap_err();
        assert!(matches!(error, AppError::NotConfigured(_)));
    }
}
