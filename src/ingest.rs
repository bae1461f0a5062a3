// SPDX-License-Identifier: Apache-2.0

use crate::otlp::{DecodeError, DecodeOutcome, visit_spans};
use crate::store::SpanStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Feeds decoded trace payloads into a [`SpanStore`].
#[derive(Clone)]
pub struct TraceIngester {
    store: Arc<SpanStore>,
}

impl TraceIngester {
    pub fn new(store: Arc<SpanStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<SpanStore> {
        &self.store
    }

    /// Decode an OTLP/JSON traces payload and append every span to the store, returning the
    /// number of spans appended.
    ///
    /// Spans are appended as they are decoded. When decoding fails part way through, the
    /// spans before the failing one stay in the store.
    pub fn process_traces(&self, payload: &Value) -> Result<usize, DecodeError> {
        match visit_spans(payload, |span| self.store.append(span))? {
            DecodeOutcome::NoResourceSpans => {
                warn!("Traces payload has no resourceSpans, ignoring.");
                Ok(0)
            }
            DecodeOutcome::Decoded { spans } => {
                debug!(spans, stored = self.store.count(), "Processed traces.");
                Ok(spans)
            }
        }
    }
}

/// Metrics are accepted but not decoded, only the payload size is logged. Returns the number
/// of resource metrics groups.
pub fn log_metrics(payload: &Value) -> usize {
    match payload.get("resourceMetrics").and_then(Value::as_array) {
        Some(resource_metrics) => {
            info!(
                data_type = "metrics",
                resource_metrics = resource_metrics.len(),
                "Received metrics."
            );
            resource_metrics.len()
        }
        None => {
            warn!("Metrics payload has no resourceMetrics, ignoring.");
            0
        }
    }
}
