//! AI summaries for blog posts.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::models::{ModelConfig, model_by_id};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that creates concise, engaging summaries of blog posts.

Your summaries should:
- Be 2-3 sentences long
- Capture the main argument or key insights
- Be written in a clear, accessible tone
- Avoid jargon and technical terms when possible
- Focus on the value proposition for the reader
- Add an HTML unordered list <ul> of the top five most relevant links from the footnotes to the summary, with the anchor text from the footnote as the link text. Format links as HTML: <a href=\"URL\" target=\"_blank\" rel=\"noopener noreferrer\">link text</a>. Place each link as a separate list item in the unordered list. The links should be a short, several-word summary of the link and context using the mention in the body content and the footnote text. In a new paragraph after the summary, add \"Top links from the footnotes:\" above the list. Do not format this as markdown.";

/// Body of `POST /api/summarize`. Fields are optional so that missing and
/// empty values are rejected with the same message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SummarizeCommand {
    pub content: Option<String>,
    pub title: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion transport failed: {0}")]
    Transport(String),
    #[error("completion gateway returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion response contained no text")]
    EmptyResponse,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Content, title, and model are required")]
    MissingFields,
    #[error("Model {0} not supported")]
    UnsupportedModel(String),
    #[error("AI Gateway not configured. Please set AI_GATEWAY_API_KEY environment variable.")]
    NotConfigured,
    #[error("Failed to generate summary")]
    Completion(#[source] CompletionError),
    #[error("Failed to generate summary")]
    UnreadableBody(#[source] serde_json::Error),
}

impl SummaryError {
    fn outcome_label(&self) -> &'static str {
        match self {
            SummaryError::MissingFields | SummaryError::UnsupportedModel(_) => "rejected",
            SummaryError::NotConfigured => "unconfigured",
            SummaryError::Completion(_) | SummaryError::UnreadableBody(_) => "error",
        }
    }
}

pub struct SummaryService {
    client: Option<Arc<dyn CompletionClient>>,
}

impl SummaryService {
    /// `client` is `None` when no gateway key is configured.
    pub fn new(client: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { client }
    }

    /// Parses a raw request body and summarizes it. The body is read as JSON
    /// whatever its declared content type.
    pub async fn summarize_json(&self, body: &[u8]) -> Result<String, SummaryError> {
        match serde_json::from_slice::<SummarizeCommand>(body) {
            Ok(command) => self.summarize(command).await,
            Err(err) => {
                warn!(
                    target = "weblog::summary",
                    error = %err,
                    "unreadable summary request body"
                );
                Self::record(Err(SummaryError::UnreadableBody(err)))
            }
        }
    }

    pub async fn summarize(&self, command: SummarizeCommand) -> Result<String, SummaryError> {
        Self::record(self.summarize_inner(command).await)
    }

    fn record(result: Result<String, SummaryError>) -> Result<String, SummaryError> {
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.outcome_label(),
        };
        counter!("weblog_summary_requests_total", "outcome" => outcome).increment(1);
        result
    }

    async fn summarize_inner(&self, command: SummarizeCommand) -> Result<String, SummaryError> {
        let (content, title, model_id) = match (
            present(command.content),
            present(command.title),
            present(command.model),
        ) {
            (Some(content), Some(title), Some(model)) => (content, title, model),
            _ => return Err(SummaryError::MissingFields),
        };

        let model = model_by_id(&model_id).ok_or(SummaryError::UnsupportedModel(model_id))?;
        let client = self.client.as_ref().ok_or(SummaryError::NotConfigured)?;

        let request = build_completion_request(model, &title, &content);
        match client.complete(request).await {
            Ok(summary) => {
                info!(
                    target = "weblog::summary",
                    model = model.id,
                    chars = summary.len(),
                    "generated post summary"
                );
                Ok(summary)
            }
            Err(err) => {
                error!(
                    target = "weblog::summary",
                    model = model.id,
                    error = %err,
                    "summary generation failed"
                );
                Err(SummaryError::Completion(err))
            }
        }
    }
}

pub fn build_completion_request(
    model: &ModelConfig,
    title: &str,
    content: &str,
) -> CompletionRequest {
    CompletionRequest {
        model: model.id.to_string(),
        system: SYSTEM_PROMPT.to_string(),
        prompt: format!("Please summarize this blog post titled \"{title}\":\n\n{content}"),
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
