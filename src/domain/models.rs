//! Language models offered by the post summary endpoint.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelConfig {
    pub key: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub provider: &'static str,
}

pub const MODELS: &[ModelConfig] = &[
    ModelConfig {
        key: "openai",
        id: "openai/gpt-5",
        name: "OpenAI",
        provider: "OpenAI",
    },
    ModelConfig {
        key: "anthropic",
        id: "anthropic/claude-sonnet-4",
        name: "Anthropic",
        provider: "Anthropic",
    },
    ModelConfig {
        key: "google",
        id: "google/gemini-2.5-pro",
        name: "Google",
        provider: "Google",
    },
    ModelConfig {
        key: "perplexity",
        id: "perplexity/sonar-pro",
        name: "Perplexity",
        provider: "Perplexity",
    },
    ModelConfig {
        key: "xai",
        id: "xai/grok-2",
        name: "xAI",
        provider: "xAI",
    },
];

/// Exact, case-sensitive lookup by gateway model id.
pub fn model_by_id(id: &str) -> Option<&'static ModelConfig> {
    MODELS.iter().find(|model| model.id == id)
}
