//! PostHog ingestion adapter for tracking payloads.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::debug;

use crate::application::analytics::{
    AnalyticsCall, AnalyticsEvent, AnalyticsSink, DispatchError, IdentityUpdate,
};
use crate::config::AnalyticsSettings;

use super::error::InfraError;

const CAPTURE_PATH: &str = "capture/";
const IDENTIFY_PATH: &str = "identify/";

#[derive(Clone, Debug)]
pub struct PostHogSink {
    client: Client,
    capture_url: Url,
    identify_url: Url,
}

impl PostHogSink {
    pub fn new(settings: &AnalyticsSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(user_agent())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        let base = ensure_trailing_slash(settings.host.clone());
        let capture_url = base.join(CAPTURE_PATH).map_err(|err| {
            InfraError::configuration(format!("invalid analytics host `{base}`: {err}"))
        })?;
        let identify_url = base.join(IDENTIFY_PATH).map_err(|err| {
            InfraError::configuration(format!("invalid analytics host `{base}`: {err}"))
        })?;

        Ok(Self {
            client,
            capture_url,
            identify_url,
        })
    }

    async fn post<T: Serialize + Sync>(
        &self,
        call: AnalyticsCall,
        url: &Url,
        body: &T,
    ) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|err| DispatchError::transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Status {
                status: status.as_u16(),
            });
        }

        debug!(
            target = "weblog::posthog",
            call = call.as_str(),
            status = status.as_u16(),
            "analytics call accepted"
        );
        Ok(())
    }
}

#[async_trait]
impl AnalyticsSink for PostHogSink {
    async fn capture(&self, event: &AnalyticsEvent) -> Result<(), DispatchError> {
        self.post(AnalyticsCall::Capture, &self.capture_url, event)
            .await
    }

    async fn identify(&self, update: &IdentityUpdate) -> Result<(), DispatchError> {
        self.post(AnalyticsCall::Identify, &self.identify_url, update)
            .await
    }
}

fn user_agent() -> &'static str {
    concat!("weblog/", env!("CARGO_PKG_VERSION"))
}

pub(crate) fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
