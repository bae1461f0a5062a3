// SPDX-License-Identifier: Apache-2.0

pub mod attr;
pub mod decode;
pub mod error;
pub mod span;

pub use decode::{DecodeOutcome, decode_traces, visit_spans};
pub use error::DecodeError;
pub use span::{NormalizedSpan, SpanEvent, SpanStatus};
