use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Serialize;

use crate::{
    application::{
        error::ErrorReport,
        summary::SummaryError,
    },
    domain::models::{MODELS, ModelConfig},
};

use super::HttpState;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryBody {
    pub summary: String,
}

/// JSON error body plus the diagnostic chain, carried in an [`ErrorReport`]
/// so the response logger can pick it up.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        error: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                error: error.into(),
                details: None,
            },
            report: ErrorReport::from_message(source, status, detail),
        }
    }
}

impl From<SummaryError> for ApiError {
    fn from(error: SummaryError) -> Self {
        let source = "infra::http::api::summarize";
        let (status, details) = match &error {
            SummaryError::MissingFields | SummaryError::UnsupportedModel(_) => {
                (StatusCode::BAD_REQUEST, None)
            }
            SummaryError::NotConfigured => (StatusCode::INTERNAL_SERVER_ERROR, None),
            SummaryError::Completion(inner) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Some(inner.to_string()))
            }
            SummaryError::UnreadableBody(inner) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Some(inner.to_string()))
            }
        };

        Self {
            status,
            body: ApiErrorBody {
                error: error.to_string(),
                details,
            },
            report: ErrorReport::from_error(source, status, &error),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

/// `POST /api/summarize`. The body is parsed as JSON regardless of its
/// `Content-Type`.
pub(super) async fn summarize(
    State(state): State<HttpState>,
    body: Bytes,
) -> Result<Json<SummaryBody>, ApiError> {
    let summary = state.summary.summarize_json(&body).await?;
    Ok(Json(SummaryBody { summary }))
}

/// `GET /api/models`.
pub(super) async fn list_models() -> Json<&'static [ModelConfig]> {
    Json(MODELS)
}
