// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// A payload that has the OTLP nesting but carries a value of the wrong type somewhere
/// inside it. Missing structure is not an error, see `DecodeOutcome`.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("resourceSpans[{index}] is not an object")]
    ResourceSpans { index: usize },

    #[error("scopeSpans[{index}] is not an object")]
    ScopeSpans { index: usize },

    #[error("spans[{index}] is not an object")]
    Span { index: usize },

    #[error("events[{index}] is not an object")]
    Event { index: usize },

    #[error("invalid identifier in {field}: {reason}")]
    Identifier { field: &'static str, reason: String },

    #[error("invalid nanosecond timestamp in {field}: {value}")]
    Timestamp { field: &'static str, value: String },

    #[error("timestamp {millis}ms is outside the representable date range")]
    TimestampRange { millis: i64 },
}

pub type Result<T> = std::result::Result<T, DecodeError>;
