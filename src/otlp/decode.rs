// SPDX-License-Identifier: Apache-2.0

//! Decoding of OTLP/JSON `ExportTraceServiceRequest` payloads into [`NormalizedSpan`]s.
//!
//! The payload is walked as a loose `serde_json::Value` rather than deserialized into the
//! protobuf types, because clients disagree on the encoding: identifiers show up as hex
//! strings or as raw byte arrays, nanosecond timestamps as numbers or decimal strings.

use crate::otlp::attr::decode_attributes;
use crate::otlp::error::{DecodeError, Result};
use crate::otlp::span::{
    NormalizedSpan, SpanEvent, SpanStatus, UNKNOWN_EVENT, UNKNOWN_OPERATION, UNKNOWN_SERVICE,
};
use chrono::{DateTime, SecondsFormat};
use serde_json::{Map, Value};
use tracing::warn;

const NANOS_PER_MILLI: u64 = 1_000_000;

// Largest instant, in either direction, that an ECMAScript Date can hold. Clients render our
// timestamps with it, so anything further out is treated as out of range.
const MAX_EPOCH_MILLIS: i64 = 8_640_000_000_000_000;

const SERVICE_NAME_KEY: &str = "service.name";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// The payload was not an object or had no `resourceSpans` array
    NoResourceSpans,
    Decoded { spans: usize },
}

/// Walk a traces payload, handing every decoded span to `on_span` in payload order.
///
/// Spans handed out before an error are not taken back, so a sink that appends to a store
/// keeps the prefix of a payload that fails part way through.
pub fn visit_spans<F>(payload: &Value, mut on_span: F) -> Result<DecodeOutcome>
where
    F: FnMut(NormalizedSpan),
{
    let Some(resource_spans) = payload.get("resourceSpans").and_then(Value::as_array) else {
        return Ok(DecodeOutcome::NoResourceSpans);
    };

    let mut spans = 0;
    for (i, rs) in resource_spans.iter().enumerate() {
        let rs = rs
            .as_object()
            .ok_or(DecodeError::ResourceSpans { index: i })?;
        let service_name = service_name(rs);

        // instrumentationLibrarySpans is the pre-1.0 name of scopeSpans
        let scope_spans = rs
            .get("scopeSpans")
            .or_else(|| rs.get("instrumentationLibrarySpans"))
            .and_then(Value::as_array);
        let Some(scope_spans) = scope_spans else {
            warn!(
                resource_spans = i,
                service_name = %service_name,
                "Resource spans without scopeSpans, skipping."
            );
            continue;
        };

        for (j, ss) in scope_spans.iter().enumerate() {
            let ss = ss.as_object().ok_or(DecodeError::ScopeSpans { index: j })?;
            let Some(raw_spans) = ss.get("spans").and_then(Value::as_array) else {
                warn!(
                    resource_spans = i,
                    scope_spans = j,
                    service_name = %service_name,
                    "Scope spans without spans, skipping."
                );
                continue;
            };

            for (k, raw) in raw_spans.iter().enumerate() {
                let raw = raw.as_object().ok_or(DecodeError::Span { index: k })?;
                on_span(decode_span(raw, &service_name)?);
                spans += 1;
            }
        }
    }

    Ok(DecodeOutcome::Decoded { spans })
}

/// Decode a whole traces payload. A payload without `resourceSpans` decodes to no spans.
pub fn decode_traces(payload: &Value) -> Result<Vec<NormalizedSpan>> {
    let mut spans = Vec::new();
    visit_spans(payload, |span| spans.push(span))?;
    Ok(spans)
}

pub fn decode_span(span: &Map<String, Value>, service_name: &str) -> Result<NormalizedSpan> {
    let trace_id = decode_id(span.get("traceId"), "traceId")?.unwrap_or_default();
    let span_id = decode_id(span.get("spanId"), "spanId")?.unwrap_or_default();
    let parent_span_id = decode_id(span.get("parentSpanId"), "parentSpanId")?;

    let start_time = nanos_to_millis(span.get("startTimeUnixNano"), "startTimeUnixNano")?;
    let end_time = nanos_to_millis(span.get("endTimeUnixNano"), "endTimeUnixNano")?;

    Ok(NormalizedSpan {
        trace_id,
        span_id,
        parent_span_id,
        operation_name: non_empty_str(span.get("name"))
            .unwrap_or(UNKNOWN_OPERATION)
            .to_string(),
        start_time,
        end_time,
        duration: end_time - start_time,
        status: decode_status(span.get("status")),
        attributes: decode_attributes(span.get("attributes")),
        events: decode_events(span.get("events"))?,
        service_name: service_name.to_string(),
        timestamp: iso_timestamp(start_time)?,
    })
}

fn service_name(resource_spans: &Map<String, Value>) -> String {
    resource_spans
        .get("resource")
        .and_then(|r| r.get("attributes"))
        .and_then(Value::as_array)
        .and_then(|attrs| {
            attrs
                .iter()
                .find(|kv| kv.get("key").and_then(Value::as_str) == Some(SERVICE_NAME_KEY))
        })
        .and_then(|kv| kv.get("value"))
        .and_then(|v| v.get("stringValue"))
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_SERVICE)
        .to_string()
}

fn decode_events(events: Option<&Value>) -> Result<Vec<SpanEvent>> {
    let Some(events) = events.and_then(Value::as_array) else {
        return Ok(vec![]);
    };

    events
        .iter()
        .enumerate()
        .map(|(i, event)| {
            let event = event.as_object().ok_or(DecodeError::Event { index: i })?;
            Ok(SpanEvent {
                name: non_empty_str(event.get("name"))
                    .unwrap_or(UNKNOWN_EVENT)
                    .to_string(),
                timestamp: nanos_to_millis(event.get("timeUnixNano"), "timeUnixNano")?,
                attributes: decode_attributes(event.get("attributes")),
            })
        })
        .collect()
}

/// Status codes come through as numbers; the proto enum names are accepted as well. A status
/// object without a code is the proto3 default, UNSET, and no status object at all is OK.
fn decode_status(status: Option<&Value>) -> SpanStatus {
    let Some(status) = status.and_then(Value::as_object) else {
        return SpanStatus::Ok;
    };

    match status.get("code") {
        None | Some(Value::Null) => SpanStatus::Unset,
        Some(Value::Number(n)) => n
            .as_i64()
            .map(SpanStatus::from_code)
            .unwrap_or(SpanStatus::Unknown),
        Some(Value::String(s)) => match s.parse::<i64>() {
            Ok(code) => SpanStatus::from_code(code),
            Err(_) => s.parse().unwrap_or(SpanStatus::Unknown),
        },
        Some(_) => SpanStatus::Unknown,
    }
}

/// Render an identifier as lowercase hex. Byte arrays (and Node.js `Buffer` JSON, which
/// wraps the array in `{"type": "Buffer", "data": [...]}`) are hex encoded, strings pass
/// through untouched. Absent or empty identifiers are `None`.
fn decode_id(value: Option<&Value>, field: &'static str) -> Result<Option<String>> {
    let bytes = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.is_empty() => return Ok(None),
        Some(Value::String(s)) => return Ok(Some(s.clone())),
        Some(Value::Array(bytes)) => bytes,
        Some(Value::Object(obj)) => match obj.get("data").and_then(Value::as_array) {
            Some(bytes) => bytes,
            None => {
                return Err(DecodeError::Identifier {
                    field,
                    reason: "object without a data array".to_string(),
                });
            }
        },
        Some(v) => {
            return Err(DecodeError::Identifier {
                field,
                reason: format!("unexpected value {}", v),
            });
        }
    };

    if bytes.is_empty() {
        return Ok(None);
    }

    let bytes = bytes
        .iter()
        .map(|b| {
            b.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| DecodeError::Identifier {
                    field,
                    reason: format!("{} is not a byte", b),
                })
        })
        .collect::<Result<Vec<u8>>>()?;

    Ok(Some(hex::encode(bytes)))
}

/// Convert a nanosecond timestamp to milliseconds, truncating. Absent timestamps are 0.
fn nanos_to_millis(value: Option<&Value>, field: &'static str) -> Result<i64> {
    let invalid = |v: &Value| DecodeError::Timestamp {
        field,
        value: v.to_string(),
    };

    match value {
        None | Some(Value::Null) => Ok(0),
        Some(v @ Value::Number(n)) => {
            if let Some(nanos) = n.as_u64() {
                Ok((nanos / NANOS_PER_MILLI) as i64)
            } else if let Some(nanos) = n.as_i64() {
                Ok(nanos / NANOS_PER_MILLI as i64)
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| (f / NANOS_PER_MILLI as f64).trunc() as i64)
                    .ok_or_else(|| invalid(v))
            }
        }
        Some(v @ Value::String(s)) => {
            let s = s.trim();
            if let Ok(nanos) = s.parse::<u64>() {
                Ok((nanos / NANOS_PER_MILLI) as i64)
            } else if let Ok(nanos) = s.parse::<i64>() {
                Ok(nanos / NANOS_PER_MILLI as i64)
            } else {
                Err(invalid(v))
            }
        }
        Some(v) => Err(invalid(v)),
    }
}

fn iso_timestamp(millis: i64) -> Result<String> {
    if !(-MAX_EPOCH_MILLIS..=MAX_EPOCH_MILLIS).contains(&millis) {
        return Err(DecodeError::TimestampRange { millis });
    }

    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or(DecodeError::TimestampRange { millis })
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}
