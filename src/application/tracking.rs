use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, join_all};
use metrics::counter;
use thiserror::Error;
use time::{
    OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem, macros::format_description,
};
use tracing::{debug, error, warn};

use crate::domain::tracking::{EmailClient, TrackingRequest, resolve_distinct_id};

use super::analytics::{
    AnalyticsCall, AnalyticsEvent, AnalyticsSink, DispatchError, EMAIL_OPENED_EVENT, EVENT_SOURCE,
    EVENT_TYPE, EmailOpenProperties, IdentityProperties, IdentityUpdate, OPEN_COUNT_HINT,
};

/// UTC with exactly three fractional digits, e.g. `2024-03-01T12:00:00.000Z`.
const EVENT_TIMESTAMP: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
);

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("failed to format event timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// What happened to a pixel fetch. Callers only log this; the pixel response
/// never depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingOutcome {
    Suppressed,
    Disabled,
    Dispatched { attempted: usize, failed: usize },
    Failed,
}

/// Payloads derived from a single tracking request.
#[derive(Debug, Clone)]
pub struct TrackingPayloads {
    pub event: AnalyticsEvent,
    pub identity: Option<IdentityUpdate>,
}

pub struct TrackingService {
    sink: Arc<dyn AnalyticsSink>,
    api_key: Option<String>,
}

impl TrackingService {
    pub fn new(sink: Arc<dyn AnalyticsSink>, api_key: Option<String>) -> Self {
        Self { sink, api_key }
    }

    pub fn dispatch_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn track(&self, request: TrackingRequest) -> TrackingOutcome {
        counter!("weblog_pixel_requests_total").increment(1);

        if request.is_suppressed() {
            counter!("weblog_pixel_suppressed_total").increment(1);
            debug!(
                target = "weblog::tracking",
                user_agent = %request.user_agent,
                "suppressed pixel fetch from prefetching client"
            );
            return TrackingOutcome::Suppressed;
        }

        let Some(api_key) = self.api_key.as_deref() else {
            debug!(
                target = "weblog::tracking",
                "analytics api key not configured; skipping dispatch"
            );
            return TrackingOutcome::Disabled;
        };

        let payloads = match build_payloads(&request, api_key, OffsetDateTime::now_utc()) {
            Ok(payloads) => payloads,
            Err(err) => {
                error!(
                    target = "weblog::tracking",
                    error = %err,
                    "failed to build analytics payloads"
                );
                return TrackingOutcome::Failed;
            }
        };

        self.dispatch(&payloads).await
    }

    async fn dispatch(&self, payloads: &TrackingPayloads) -> TrackingOutcome {
        let mut calls: Vec<BoxFuture<'_, (AnalyticsCall, Result<(), DispatchError>)>> =
            Vec::with_capacity(2);
        calls.push(
            async { (AnalyticsCall::Capture, self.sink.capture(&payloads.event).await) }.boxed(),
        );
        if let Some(identity) = payloads.identity.as_ref() {
            calls.push(
                async { (AnalyticsCall::Identify, self.sink.identify(identity).await) }.boxed(),
            );
        }

        let results = join_all(calls).await;
        let attempted = results.len();
        let mut failed = 0;

        for (call, result) in results {
            match result {
                Ok(()) => {
                    counter!(
                        "weblog_analytics_dispatch_total",
                        "call" => call.as_str(),
                        "outcome" => "ok"
                    )
                    .increment(1);
                }
                Err(err) => {
                    failed += 1;
                    counter!(
                        "weblog_analytics_dispatch_total",
                        "call" => call.as_str(),
                        "outcome" => "error"
                    )
                    .increment(1);
                    warn!(
                        target = "weblog::tracking",
                        call = call.as_str(),
                        distinct_id = %payloads.event.distinct_id,
                        error = %err,
                        "analytics call failed"
                    );
                }
            }
        }

        TrackingOutcome::Dispatched { attempted, failed }
    }
}

pub fn build_payloads(
    request: &TrackingRequest,
    api_key: &str,
    now: OffsetDateTime,
) -> Result<TrackingPayloads, TrackingError> {
    let timestamp = now.to_offset(UtcOffset::UTC).format(EVENT_TIMESTAMP)?;
    let tracking_id = request.tracking_id(now);
    let distinct_id = resolve_distinct_id(request, &tracking_id).to_string();
    let email_client = EmailClient::detect(&request.user_agent, &request.referer);

    let event = AnalyticsEvent {
        api_key: api_key.to_string(),
        event: EMAIL_OPENED_EVENT,
        distinct_id,
        properties: EmailOpenProperties {
            email_id: tracking_id,
            recipient_name: request.recipient_name.clone(),
            recipient_email: request.recipient_email.clone(),
            subject: request.subject.clone(),
            campaign: request.campaign_or_default().to_string(),
            email_client: email_client.as_str(),
            user_agent: request.user_agent.clone(),
            ip_address: request.ip_address.clone(),
            referer: request.referer.clone(),
            timestamp: timestamp.clone(),
            event_source: EVENT_SOURCE,
            event_type: EVENT_TYPE,
            test: request.test.clone(),
        },
    };

    let identity = request
        .recipient_email
        .as_ref()
        .map(|email| IdentityUpdate {
            api_key: api_key.to_string(),
            distinct_id: email.clone(),
            properties: IdentityProperties {
                name: request.recipient_name.clone(),
                email: email.clone(),
                last_email_open: timestamp,
                email_client: email_client.as_str(),
                total_email_opens: OPEN_COUNT_HINT,
            },
        });

    Ok(TrackingPayloads { event, identity })
}
