// SPDX-License-Identifier: Apache-2.0

use crate::otlp::attr::Attributes;
use serde::Serialize;
use std::fmt::Display;
use std::str::FromStr;

pub const UNKNOWN_OPERATION: &str = "unknown-operation";
pub const UNKNOWN_SERVICE: &str = "unknown-service";
pub const UNKNOWN_EVENT: &str = "unknown-event";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    Unset,
    Ok,
    Error,
    Unknown,
}

impl SpanStatus {
    /// Map an OTLP `Status.code`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => SpanStatus::Unset,
            1 => SpanStatus::Ok,
            2 => SpanStatus::Error,
            _ => SpanStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Unset => "UNSET",
            SpanStatus::Ok => "OK",
            SpanStatus::Error => "ERROR",
            SpanStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn is_error(&self) -> bool {
        self.as_str().eq_ignore_ascii_case("ERROR")
    }
}

impl Display for SpanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SpanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "UNSET" | "STATUS_CODE_UNSET" => Ok(SpanStatus::Unset),
            "OK" | "STATUS_CODE_OK" => Ok(SpanStatus::Ok),
            "ERROR" | "STATUS_CODE_ERROR" => Ok(SpanStatus::Error),
            "UNKNOWN" => Ok(SpanStatus::Unknown),
            _ => Err(format!("unknown span status: {}", s)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanEvent {
    pub name: String,
    /// Milliseconds since the epoch
    pub timestamp: i64,
    pub attributes: Attributes,
}

/// A flattened span, as held by the store and returned by the query API.
///
/// Times are milliseconds since the Unix epoch. `duration` is `end_time - start_time` and is
/// left negative when the client reported an end before the start.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSpan {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub operation_name: String,
    pub start_time: i64,
    pub end_time: i64,
    pub duration: i64,
    pub status: SpanStatus,
    pub attributes: Attributes,
    pub events: Vec<SpanEvent>,
    pub service_name: String,
    /// ISO-8601 UTC rendering of `start_time`
    pub timestamp: String,
}

#[cfg(test)]
impl NormalizedSpan {
    pub(crate) fn for_test(service_name: &str, operation_name: &str, start_time: i64) -> Self {
        let timestamp = chrono::DateTime::from_timestamp_millis(start_time)
            .unwrap()
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        NormalizedSpan {
            trace_id: format!("{:032x}", start_time),
            span_id: format!("{:016x}", start_time),
            parent_span_id: None,
            operation_name: operation_name.to_string(),
            start_time,
            end_time: start_time + 10,
            duration: 10,
            status: SpanStatus::Ok,
            attributes: Attributes::new(),
            events: vec![],
            service_name: service_name.to_string(),
            timestamp,
        }
    }

    pub(crate) fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = status;
        self
    }
}
