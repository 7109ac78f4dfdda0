use crate::config::Settings;
use crate::domain::article::{Article, RelevanceVerdict, SentimentVerdict, Target};
use crate::domain::contract::{LlmRelevanceVerdict, LlmSentimentVerdict};
use crate::error::ClassificationError;
use crate::llm::error::{into_classification_error, LlmDiagnosticsError};
use crate::llm::json;
use crate::llm::{Provider, RelevanceClassifier, SentimentClassifier};
use crate::time::backoff_delay;
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_MAX_TOKENS: u32 = 512;
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RETRIES: u32 = 2;
const MAX_RETRIES: u32 = 5;
const DEFAULT_BACKOFF_MS: u64 = 1_000;

const TOOL_NAME_EMIT_RELEVANCE: &str = "emit_relevance";
const TOOL_NAME_EMIT_SENTIMENT: &str = "emit_sentiment";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
    min_relevance_score: u8,
}

/// One classification request: which tool to force and what to ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Relevance,
    Sentiment,
}

impl Task {
    fn tool_name(self) -> &'static str {
        match self {
            Task::Relevance => TOOL_NAME_EMIT_RELEVANCE,
            Task::Sentiment => TOOL_NAME_EMIT_SENTIMENT,
        }
    }
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings, min_relevance_score: u8) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("ANTHROPIC_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .min(MAX_RETRIES);

        let timeout = Duration::from_secs(timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
            timeout,
            retries,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            min_relevance_score,
        })
    }

    /// Longest one request can take with every retry and backoff used.
    pub fn retry_budget(&self) -> Duration {
        retry_budget(self.timeout, self.retries, self.backoff)
    }

    async fn create_message_once(
        &self,
        req: &CreateMessageRequest,
    ) -> anyhow::Result<Result<CreateMessageResponse, (StatusCode, String)>> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            return Ok(Err((status, text)));
        }

        let parsed = serde_json::from_str::<CreateMessageResponse>(&text)
            .with_context(|| format!("failed to decode Anthropic response: {text}"))?;
        Ok(Ok(parsed))
    }

    /// Sends one request, retrying rate limits and server errors with exponential backoff.
    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> anyhow::Result<CreateMessageResponse> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.create_message_once(&req).await? {
                Ok(ok) => return Ok(ok),
                Err((status, text)) => {
                    if is_retryable(status) && attempt <= self.retries {
                        let backoff = backoff_delay(self.backoff, attempt);
                        tracing::warn!(attempt, %status, ?backoff, "Anthropic call failed; retrying");
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    return Err(LlmDiagnosticsError {
                        provider: Provider::Anthropic,
                        stage: "http",
                        detail: format!("status={status}"),
                        raw_output: Some(text),
                    }
                    .into());
                }
            }
        }
    }

    fn tool(task: Task) -> Tool {
        let (description, schema) = match task {
            Task::Relevance => (
                "Emit the relevance score of the article for the target stock",
                serde_json::json!({
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["relevance_score", "relevance_justification"],
                    "properties": {
                        "relevance_score": {"type": "integer", "minimum": 1, "maximum": 5},
                        "relevance_justification": {"type": "string"}
                    }
                }),
            ),
            Task::Sentiment => (
                "Emit the sentiment of the article for the target stock",
                serde_json::json!({
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["sentiment", "justification"],
                    "properties": {
                        "sentiment": {"type": "string", "enum": ["Positive", "Negative", "Neutral"]},
                        "strength": {"type": ["number", "null"], "minimum": 0, "maximum": 1},
                        "justification": {"type": "string"}
                    }
                }),
            ),
        };

        Tool {
            name: task.tool_name(),
            description,
            input_schema: schema,
        }
    }

    fn tool_choice(task: Task) -> ToolChoice {
        ToolChoice::Tool {
            name: task.tool_name(),
        }
    }

    fn system_prompt(task: Task) -> String {
        let lines: &[&str] = match task {
            Task::Relevance => &[
                "You grade how relevant a news article is to one specific listed company.",
                "Return ONLY valid JSON. Do not wrap in markdown. Do not include any extra keys.",
                "Output schema: {\"relevance_score\": 1, \"relevance_justification\": \"...\"}",
                "Scale:",
                "1 = not relevant (a different company or topic)",
                "2 = slightly relevant (mentions the industry, not the company)",
                "3 = moderately relevant (a competitor or a broad market trend)",
                "4 = relevant (directly discusses the company, its products or market situation)",
                "5 = highly relevant (earnings, major announcements, legal issues, analyst price targets for this stock)",
            ],
            Task::Sentiment => &[
                "You classify the sentiment of a news article for the stock of one specific company.",
                "Consider ONLY the direct implications for the stock's value or investor perception.",
                "Return ONLY valid JSON. Do not wrap in markdown. Do not include any extra keys.",
                "Output schema: {\"sentiment\": \"Positive|Negative|Neutral\", \"strength\": 0.0, \"justification\": \"...\"}",
                "- sentiment must be exactly one of Positive, Negative, Neutral",
                "- strength (optional) is in [0, 1]",
                "- justification is one short sentence",
            ],
        };
        lines.join("\n")
    }

    fn user_prompt(task: Task, article: &Article, target: &Target) -> String {
        let text = article.classification_text();
        match task {
            Task::Relevance => format!(
                "Is this news item DIRECTLY about {target} or its products, financials, market performance, leadership, or major partnerships?\n\nNews article:\n---\n{text}\n---"
            ),
            Task::Sentiment => format!(
                "Classify the sentiment of this news for the stock {target}.\n\nNews article:\n---\n{text}\n---"
            ),
        }
    }

    fn repair_prompt(task: Task, previous_output: &str) -> String {
        format!(
            "Your previous message was NOT valid JSON for the required schema.\n\n\
TASK: Output ONLY a single JSON object that exactly matches the schema.\n\
- Do NOT include any markdown, prose, or code fences.\n\
- Use double quotes for all JSON strings.\n\n\
SCHEMA:\n{}\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}",
            Self::tool(task).input_schema
        )
    }

    fn request(&self, task: Task, content: String) -> CreateMessageRequest {
        CreateMessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(Self::system_prompt(task)),
            messages: vec![Message {
                role: "user",
                content,
            }],
            tools: Some(vec![Self::tool(task)]),
            tool_choice: Some(Self::tool_choice(task)),
        }
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn response_tool_input<T: DeserializeOwned>(
        res: &CreateMessageResponse,
        task: Task,
    ) -> anyhow::Result<Option<T>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == task.tool_name() {
                    let parsed = serde_json::from_value::<T>(input.clone())
                        .with_context(|| format!("failed to decode tool_use.input for {name}"))?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }

    /// Asks the model for one contract value: tool output first, then text, then one repair.
    async fn run_contract<T: DeserializeOwned>(
        &self,
        task: Task,
        article: &Article,
        target: &Target,
    ) -> anyhow::Result<T> {
        let req = self.request(task, Self::user_prompt(task, article, target));
        let res = self.create_message(req).await?;

        match Self::response_tool_input::<T>(&res, task) {
            Ok(Some(parsed)) => return Ok(parsed),
            Ok(None) => {}
            Err(err) => {
                tracing::debug!(error = %err, tool = task.tool_name(), "tool input did not match contract");
            }
        }

        let text = Self::response_text(&res);
        let first_err = match json::parse_contract::<T>(&text) {
            Ok(parsed) => return Ok(parsed),
            Err(err) => err,
        };

        tracing::warn!(
            ticker = %target.ticker,
            tool = task.tool_name(),
            error = %first_err,
            "LLM output invalid; attempting repair"
        );

        let repair_req = self.request(task, Self::repair_prompt(task, &text));
        let repair_res = self.create_message(repair_req).await?;
        if let Ok(Some(parsed)) = Self::response_tool_input::<T>(&repair_res, task) {
            return Ok(parsed);
        }
        let repair_text = Self::response_text(&repair_res);
        json::parse_contract::<T>(&repair_text).map_err(|last_err| {
            LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "parse_after_repair",
                detail: format!("first_error={first_err}; final_error={last_err}"),
                raw_output: Some(repair_text.clone()),
            }
            .into()
        })
    }
}

fn retry_budget(timeout: Duration, retries: u32, backoff: Duration) -> Duration {
    let waits = (1..=retries).fold(Duration::ZERO, |acc, attempt| {
        acc.saturating_add(backoff_delay(backoff, attempt))
    });
    timeout.saturating_mul(retries + 1).saturating_add(waits)
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait::async_trait]
impl RelevanceClassifier for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn classify_relevance(
        &self,
        article: &Article,
        target: &Target,
    ) -> Result<RelevanceVerdict, ClassificationError> {
        let contract: LlmRelevanceVerdict = self
            .run_contract(Task::Relevance, article, target)
            .await
            .map_err(into_classification_error)?;
        contract
            .validate_and_into_verdict(self.min_relevance_score)
            .map_err(|e| ClassificationError::InvalidResponse(format!("{e:#}")))
    }
}

#[async_trait::async_trait]
impl SentimentClassifier for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn classify_sentiment(
        &self,
        article: &Article,
        target: &Target,
    ) -> Result<SentimentVerdict, ClassificationError> {
        let contract: LlmSentimentVerdict = self
            .run_contract(Task::Sentiment, article, target)
            .await
            .map_err(into_classification_error)?;
        contract
            .validate_and_into_verdict()
            .map_err(|e| ClassificationError::InvalidResponse(format!("{e:#}")))
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}
