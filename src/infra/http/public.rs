use std::panic::AssertUnwindSafe;

use axum::{
    extract::{RawQuery, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::{
            ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA, REFERER,
            USER_AGENT,
        },
    },
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use futures::FutureExt;
use once_cell::sync::Lazy;
use tracing::{debug, error};
use url::form_urlencoded;

use crate::{
    application::tracking::TrackingOutcome,
    domain::tracking::{TrackingHeaders, TrackingQuery, TrackingRequest},
};

use super::{HttpState, api::ApiError};

const PIXEL_GIF_BASE64: &str = "R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";
const NO_STORE: &str = "no-store, no-cache, must-revalidate, proxy-revalidate";
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// The 1×1 transparent GIF served by `/api/img`.
pub static PIXEL_GIF: Lazy<Bytes> = Lazy::new(|| {
    Bytes::from(
        STANDARD
            .decode(PIXEL_GIF_BASE64)
            .expect("pixel constant is valid base64"),
    )
});

/// `GET /api/img`. Always answers 200 with the pixel; tracking problems are
/// only visible in logs.
pub(super) async fn tracking_pixel(
    State(state): State<HttpState>,
    RawQuery(raw): RawQuery,
    headers: HeaderMap,
) -> Response {
    let query = raw
        .map(|raw| TrackingQuery::from_pairs(form_urlencoded::parse(raw.as_bytes())))
        .unwrap_or_default();
    let request = TrackingRequest::from_parts(query, tracking_headers(&headers));

    match AssertUnwindSafe(state.tracking.track(request))
        .catch_unwind()
        .await
    {
        Ok(TrackingOutcome::Suppressed) => pixel_response(true),
        Ok(outcome) => {
            debug!(target = "weblog::http::pixel", outcome = ?outcome, "pixel served");
            pixel_response(false)
        }
        Err(_) => {
            error!(
                target = "weblog::http::pixel",
                "tracking handler panicked; serving pixel anyway"
            );
            pixel_response(false)
        }
    }
}

fn tracking_headers(headers: &HeaderMap) -> TrackingHeaders {
    let header = |name: &HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    TrackingHeaders {
        user_agent: header(&USER_AGENT),
        forwarded_for: header(&X_FORWARDED_FOR),
        real_ip: header(&X_REAL_IP),
        referer: header(&REFERER),
    }
}

pub fn pixel_response(allow_any_origin: bool) -> Response {
    let mut response = (StatusCode::OK, PIXEL_GIF.clone()).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/gif"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
    if allow_any_origin {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    }
    response
}

pub(super) async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub(super) async fn fallback() -> ApiError {
    ApiError::new(
        "infra::http::public::fallback",
        StatusCode::NOT_FOUND,
        "Not found",
        "no route matched",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_is_a_42_byte_gif() {
        assert_eq!(PIXEL_GIF.len(), 42);
        assert!(PIXEL_GIF.starts_with(b"GIF89a"));
    }

    #[test]
    fn suppression_response_adds_cors() {
        let response = pixel_response(true);
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("*"))
        );
        assert!(
            pixel_response(false)
                .headers()
                .get(ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }

    #[test]
    fn non_utf8_headers_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_bytes(&[0xff, 0xfe]).expect("opaque header"),
        );
        headers.insert(X_REAL_IP, HeaderValue::from_static("198.51.100.4"));

        let parsed = tracking_headers(&headers);
        assert_eq!(parsed.user_agent, None);
        assert_eq!(parsed.real_ip.as_deref(), Some("198.51.100.4"));
    }
}
