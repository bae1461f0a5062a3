// SPDX-License-Identifier: Apache-2.0

use crate::otlp::NormalizedSpan;
use crate::store::{DEFAULT_RECENT_LIMIT, SpanStore};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use http_body_util::Full;
use hyper::Response;
use hyper::body::Bytes;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

pub(crate) const JSON_CT: &str = "application/json";

pub const API_SPANS_PATH: &str = "/api/spans";
pub const API_STATS_PATH: &str = "/api/stats";
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, PartialEq)]
enum Limit {
    /// `limit` given without a value
    Recent,
    Count(usize),
}

/// Query parameters accepted by `GET /api/spans`.
#[derive(Debug, Default, PartialEq)]
struct SpanQuery {
    service: Option<String>,
    operation: Option<String>,
    limit: Option<Limit>,
}

impl SpanQuery {
    fn parse(query: Option<&str>) -> Result<Self, String> {
        let mut q = SpanQuery::default();
        let Some(query) = query else {
            return Ok(q);
        };

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "service" => q.service = Some(value.into_owned()),
                "operation" => q.operation = Some(value.into_owned()),
                "limit" if value.is_empty() => q.limit = Some(Limit::Recent),
                "limit" => {
                    let limit = value
                        .parse::<usize>()
                        .map_err(|_| format!("invalid limit: {}", value))?;
                    q.limit = Some(Limit::Count(limit));
                }
                _ => {}
            }
        }
        Ok(q)
    }
}

/// Service and operation filters return every match in insertion order. Without a filter the
/// most recent spans are returned, newest first: `limit` of them, [`DEFAULT_RECENT_LIMIT`] for
/// an empty `limit`, or `default_limit` when absent. Never more than `default_limit` are
/// returned unfiltered.
pub(crate) fn list_spans(
    store: &SpanStore,
    query: Option<&str>,
    default_limit: usize,
) -> Response<Full<Bytes>> {
    let q = match SpanQuery::parse(query) {
        Ok(q) => q,
        Err(msg) => return json_error(StatusCode::BAD_REQUEST, &msg),
    };

    let spans: Vec<NormalizedSpan> = match (q.service, q.operation) {
        (Some(service), Some(operation)) => {
            store.filter(|s| s.service_name == service && s.operation_name == operation)
        }
        (Some(service), None) => store.list_by_service(&service),
        (None, Some(operation)) => store.list_by_operation(&operation),
        (None, None) => match q.limit {
            None => store.list_recent(default_limit),
            Some(Limit::Recent) if DEFAULT_RECENT_LIMIT <= default_limit => {
                store.list_recent_default()
            }
            Some(Limit::Recent) => store.list_recent(default_limit),
            Some(Limit::Count(n)) => store.list_recent(n.min(default_limit)),
        },
    };

    json_response(StatusCode::OK, &spans)
}

pub(crate) fn stats(store: &SpanStore) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &store.stats())
}

pub(crate) fn clear(store: &SpanStore) -> Response<Full<Bytes>> {
    let cleared = store.clear();
    info!(cleared, "Cleared all spans.");
    json_response(StatusCode::OK, &json!({ "cleared": cleared }))
}

pub(crate) fn health(store: &SpanStore) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "ok",
            "spans": store.count(),
            "maxSpans": store.max_spans(),
        }),
    )
}

pub(crate) fn json_error(code: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(code, &json!({ "error": message }))
}

pub(crate) fn json_response<T: Serialize>(code: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(buf) => response(code, Some(JSON_CT), buf.into()),
        Err(e) => {
            error!(error = e.to_string(), "Failed to encode response body.");
            response(StatusCode::INTERNAL_SERVER_ERROR, None, Bytes::default())
        }
    }
}

pub(crate) fn response(
    code: StatusCode,
    content_type: Option<&'static str>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = code;
    if let Some(ct) = content_type {
        resp.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(ct));
    }
    resp
}
