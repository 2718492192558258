//! Outbound analytics payloads and the sink they are delivered through.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub const EMAIL_OPENED_EVENT: &str = "Email Opened";
pub const EVENT_SOURCE: &str = "email_pixel";
pub const EVENT_TYPE: &str = "email_open";
/// The collector is expected to accumulate this server-side.
pub const OPEN_COUNT_HINT: u32 = 1;

/// Capture call body.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsEvent {
    pub api_key: String,
    pub event: &'static str,
    pub distinct_id: String,
    pub properties: EmailOpenProperties,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailOpenProperties {
    pub email_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub campaign: String,
    pub email_client: &'static str,
    pub user_agent: String,
    pub ip_address: String,
    pub referer: String,
    pub timestamp: String,
    pub event_source: &'static str,
    pub event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
}

/// Identify call body; only built when the recipient email is known.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityUpdate {
    pub api_key: String,
    pub distinct_id: String,
    pub properties: IdentityProperties,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    pub last_email_open: String,
    pub email_client: &'static str,
    pub total_email_opens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsCall {
    Capture,
    Identify,
}

impl AnalyticsCall {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsCall::Capture => "capture",
            AnalyticsCall::Identify => "identify",
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("analytics transport failed: {0}")]
    Transport(String),
    #[error("analytics collector returned status {status}")]
    Status { status: u16 },
}

impl DispatchError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Destination for tracking payloads. Implementations must not retry.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn capture(&self, event: &AnalyticsEvent) -> Result<(), DispatchError>;

    async fn identify(&self, update: &IdentityUpdate) -> Result<(), DispatchError>;
}
