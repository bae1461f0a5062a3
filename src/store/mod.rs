// SPDX-License-Identifier: Apache-2.0

mod stats;

pub use stats::{OperationCount, Stats, TOP_OPERATIONS_LIMIT, TimeRange};

use crate::otlp::NormalizedSpan;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEFAULT_MAX_SPANS: usize = 10_000;
pub const DEFAULT_RECENT_LIMIT: usize = 50;

// Upper bound on the up-front allocation, large stores grow on demand
const INITIAL_CAPACITY_LIMIT: usize = 1_024;

/// Bounded, insertion-ordered history of the most recently received spans.
///
/// Once `max_spans` is reached every append evicts the oldest span. All operations take the
/// same lock, so eviction and the statistics pass always see the whole collection at once.
pub struct SpanStore {
    max_spans: usize,
    spans: Mutex<VecDeque<NormalizedSpan>>,
}

impl Default for SpanStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SPANS)
    }
}

impl SpanStore {
    pub fn new(max_spans: usize) -> Self {
        Self {
            max_spans,
            spans: Mutex::new(VecDeque::with_capacity(
                max_spans.min(INITIAL_CAPACITY_LIMIT),
            )),
        }
    }

    pub fn max_spans(&self) -> usize {
        self.max_spans
    }

    pub fn append(&self, span: NormalizedSpan) {
        let mut spans = self.lock();
        spans.push_back(span);
        while spans.len() > self.max_spans {
            spans.pop_front();
        }
    }

    /// All spans, most recently appended first.
    pub fn list_all(&self) -> Vec<NormalizedSpan> {
        self.lock().iter().rev().cloned().collect()
    }

    /// The `limit` most recently appended spans, most recent first.
    pub fn list_recent(&self, limit: usize) -> Vec<NormalizedSpan> {
        self.lock().iter().rev().take(limit).cloned().collect()
    }

    /// The [`DEFAULT_RECENT_LIMIT`] most recently appended spans, most recent first.
    pub fn list_recent_default(&self) -> Vec<NormalizedSpan> {
        self.list_recent(DEFAULT_RECENT_LIMIT)
    }

    /// Spans of one service, in insertion order.
    pub fn list_by_service(&self, service_name: &str) -> Vec<NormalizedSpan> {
        self.filter(|s| s.service_name == service_name)
    }

    /// Spans of one operation, in insertion order.
    pub fn list_by_operation(&self, operation_name: &str) -> Vec<NormalizedSpan> {
        self.filter(|s| s.operation_name == operation_name)
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<NormalizedSpan>
    where
        P: Fn(&NormalizedSpan) -> bool,
    {
        self.lock().iter().filter(|s| predicate(s)).cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn stats(&self) -> Stats {
        Stats::compute(self.lock().iter())
    }

    /// Drop every span, returning how many were held.
    pub fn clear(&self) -> usize {
        let mut spans = self.lock();
        let cleared = spans.len();
        spans.clear();
        cleared
    }

    // A panic while holding the lock cannot leave the deque half-updated, so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<NormalizedSpan>> {
        self.spans.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
