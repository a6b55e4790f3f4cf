//! Advisory planning over an OpenAI-compatible chat completions API

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::task::{CandidateTask, PlanningContext};
use crate::error::{OrchestratorError, PlanningError, Result};
use crate::workers::{CatalogEntry, CATALOG};

/// Serialized context handed to the advisor
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisoryRequest {
    pub context: PlanningContext,
    pub catalog: Vec<CatalogEntry>,
}

impl AdvisoryRequest {
    pub fn new(context: PlanningContext) -> Self {
        Self {
            context,
            catalog: CATALOG.to_vec(),
        }
    }
}

/// A planning strategy that may fail; failures are always recovered by the fallback table
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdvisoryPlanner: Send + Sync {
    async fn propose(&self, request: &AdvisoryRequest)
        -> std::result::Result<Vec<CandidateTask>, PlanningError>;
}

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// HTTP-level timeout; the planner applies its own tighter bound
    pub timeout: Duration,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl AdvisorConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

const SYSTEM_PROMPT: &str = r#"You are the orchestrator for a football squares board.

Given the game context and the capability catalog, decide which worker operations to run this cycle.
Only use capability/action pairs from the catalog. Priorities are integers 1-10, higher runs first.
A task may list the ids of tasks it depends on; dependencies must appear in the same list.
Notifications need arguments.kind (numbers_assigned, game_started, score_update, winner_announced, payout_sent).

Respond ONLY with JSON: {"tasks": [{"id": "...", "capability": "...", "action": "...", "arguments": {...}, "priority": 1-10, "dependencies": []}]}"#;

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TaskListReply {
    Wrapped { tasks: Vec<CandidateTask> },
    Bare(Vec<CandidateTask>),
}

/// Pull the JSON document out of a model reply
fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return text[start + 7..start + 7 + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        if let Some(end) = text[start + 3..].find("```") {
            let content = text[start + 3..start + 3 + end].trim();
            // drop a language tag on the fence line
            if let Some(newline) = content.find('\n') {
                if !content.starts_with(['{', '[']) {
                    return content[newline + 1..].trim();
                }
            }
            return content;
        }
    }

    let object = text.find('{').zip(text.rfind('}')).filter(|(s, e)| s < e);
    let array = text.find('[').zip(text.rfind(']')).filter(|(s, e)| s < e);
    match (object, array) {
        (Some((os, _)), Some((as_, ae))) if as_ < os => &text[as_..=ae],
        (Some((os, oe)), _) => &text[os..=oe],
        (None, Some((as_, ae))) => &text[as_..=ae],
        (None, None) => text.trim(),
    }
}

/// Parse a model reply into candidate tasks
pub fn parse_candidates(text: &str) -> std::result::Result<Vec<CandidateTask>, PlanningError> {
    let json = extract_json(text);
    let reply: TaskListReply = serde_json::from_str(json)
        .map_err(|e| PlanningError::Malformed(format!("{e}: {}", truncate(json, 200))))?;
    let tasks = match reply {
        TaskListReply::Wrapped { tasks } | TaskListReply::Bare(tasks) => tasks,
    };
    if tasks.is_empty() {
        return Err(PlanningError::Empty);
    }
    Ok(tasks)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Chat-completions backed advisor
pub struct ChatAdvisor {
    config: AdvisorConfig,
    http: Client,
}

impl ChatAdvisor {
    pub fn new(config: AdvisorConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                OrchestratorError::Internal(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, http })
    }
}

#[async_trait]
impl AdvisoryPlanner for ChatAdvisor {
    async fn propose(
        &self,
        request: &AdvisoryRequest,
    ) -> std::result::Result<Vec<CandidateTask>, PlanningError> {
        if !self.config.is_configured() {
            return Err(PlanningError::Unavailable("advisor API key not configured".into()));
        }

        let context = serde_json::to_string_pretty(request)
            .map_err(|e| PlanningError::Unavailable(format!("context serialization: {e}")))?;
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("## Game context\n\n```json\n{context}\n```"),
                },
            ],
            temperature: 0.2,
        };

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        debug!(game_id = request.context.game_id, "requesting advisory plan");

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| PlanningError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Advisor API error: {} - {}", status, body);
            return Err(PlanningError::Unavailable(format!(
                "advisor returned {status}"
            )));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| PlanningError::Malformed(e.to_string()))?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PlanningError::Malformed("no choices in response".into()))?;

        parse_candidates(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_reply() {
        let reply = r#"Here is the plan:
```json
{"tasks": [{"capability": "oracle", "action": "fetch_scores", "priority": 9}]}
```"#;
        let tasks = parse_candidates(reply).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].action, "fetch_scores");
    }

    #[test]
    fn test_parse_bare_array_and_raw_object() {
        let tasks =
            parse_candidates(r#"[{"capability":"board","action":"createBoard","priority":10}]"#)
                .unwrap();
        assert_eq!(tasks[0].capability, "board");

        let tasks = parse_candidates(
            r#"Sure. {"tasks":[{"capability":"winner","action":"settle_winner","priority":10}]} Done."#,
        )
        .unwrap();
        assert_eq!(tasks[0].action, "settle_winner");
    }

    #[test]
    fn test_parse_rejects_garbage_and_empty() {
        assert!(matches!(
            parse_candidates("I think you should wait."),
            Err(PlanningError::Malformed(_))
        ));
        assert_eq!(parse_candidates(r#"{"tasks": []}"#), Err(PlanningError::Empty));
    }

    #[tokio::test]
    async fn test_unconfigured_advisor_is_unavailable() {
        let advisor = ChatAdvisor::new(AdvisorConfig::default()).unwrap();
        let request = AdvisoryRequest::new(PlanningContext::unbootstrapped(1));
        assert!(matches!(
            advisor.propose(&request).await,
            Err(PlanningError::Unavailable(_))
        ));
    }

    #[test]
    fn test_request_carries_catalog() {
        let request = AdvisoryRequest::new(PlanningContext::unbootstrapped(3));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["context"]["gameId"], 3);
        assert_eq!(json["catalog"].as_array().map(Vec::len), Some(CATALOG.len()));
    }
}
