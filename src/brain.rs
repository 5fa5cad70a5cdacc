use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::error::PlanError;
use crate::types::Plan;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SYSTEM_PROMPT: &str = r##"You are a browser automation planner.
Your job is to convert user instructions into structured browser commands.

RULES:
1. Return ONLY valid JSON
2. No explanations or markdown
3. Use only these actions: open, type, click, wait, screenshot
4. Selectors must be CSS selectors
5. Be specific and safe

Example output:
{
  "steps": [
    {"action": "open", "url": "https://example.com"},
    {"action": "type", "selector": "#username", "value": "user123"},
    {"action": "click", "selector": "button[type='submit']"},
    {"action": "wait", "seconds": 2}
  ]
}"##;

/// The planning boundary. `plan` turns an instruction into an ordered plan;
/// `refine` turns a failed plan plus failure context into a complete
/// replacement plan. Both fail terminally with `PlanError`.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, instruction: &str) -> Result<Plan, PlanError>;

    async fn refine(
        &self,
        prior: &Plan,
        failed_step: usize,
        error: &str,
        dom_sample: Option<&str>,
    ) -> Result<Plan, PlanError>;
}

/// OpenRouter-backed planner.
pub struct Brain {
    client: Client,
    api_key: String,
    model: String,
}

impl Brain {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn request_plan(&self, prompt: &str) -> Result<Plan, PlanError> {
        let response = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": prompt},
                ],
                "temperature": 0.3,
                "max_tokens": 2000,
            }))
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("unknown API error")
                .to_string();
            return Err(PlanError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(PlanError::MissingContent)?;

        debug!(reply = content, "planner replied");
        parse_plan(content)
    }
}

#[async_trait]
impl Planner for Brain {
    async fn plan(&self, instruction: &str) -> Result<Plan, PlanError> {
        self.request_plan(instruction).await
    }

    async fn refine(
        &self,
        prior: &Plan,
        failed_step: usize,
        error: &str,
        dom_sample: Option<&str>,
    ) -> Result<Plan, PlanError> {
        let failed = prior
            .steps
            .get(failed_step)
            .and_then(|step| serde_json::to_string(step).ok())
            .unwrap_or_else(|| "unknown".to_string());

        let mut context = format!(
            "Original plan failed at step {failed_step}.\nError: {error}\n\nOriginal step: {failed}\n"
        );
        if let Some(dom) = dom_sample {
            let snippet: String = dom.chars().take(500).collect();
            context.push_str(&format!("\nDOM context: {snippet}\n"));
        }
        context.push_str(
            "\nSuggest an alternative approach or selector. Return the complete plan with the fix.",
        );

        self.request_plan(&context).await
    }
}

/// Parse a planner reply into a plan, stripping the markdown fences models
/// sometimes add despite the prompt.
pub fn parse_plan(content: &str) -> Result<Plan, PlanError> {
    let cleaned = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(cleaned).map_err(|e| PlanError::InvalidPlan(e.to_string()))
}
