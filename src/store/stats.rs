// SPDX-License-Identifier: Apache-2.0

use crate::otlp::NormalizedSpan;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

pub const TOP_OPERATIONS_LIMIT: usize = 10;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_spans: usize,
    pub unique_services: usize,
    pub unique_operations: usize,
    pub time_range: TimeRange,
    pub top_operations: Vec<OperationCount>,
    pub error_count: usize,
    pub success_count: usize,
}

/// Earliest and latest span `timestamp`. The timestamps are all ISO-8601 UTC with the same
/// precision, so comparing the strings orders them chronologically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub earliest: Option<String>,
    pub latest: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OperationCount {
    pub name: String,
    pub count: usize,
}

impl Stats {
    /// Compute statistics in a single pass over `spans`.
    ///
    /// `top_operations` holds the most frequent operations, ties ordered by which operation
    /// was seen first.
    pub fn compute<'a, I>(spans: I) -> Stats
    where
        I: IntoIterator<Item = &'a NormalizedSpan>,
    {
        let mut total_spans = 0;
        let mut error_count = 0;
        let mut services = HashSet::new();
        let mut operation_index: HashMap<&str, usize> = HashMap::new();
        let mut operations: Vec<(&str, usize)> = Vec::new();
        let mut earliest: Option<&str> = None;
        let mut latest: Option<&str> = None;

        for span in spans {
            total_spans += 1;
            if span.status.is_error() {
                error_count += 1;
            }

            services.insert(span.service_name.as_str());

            match operation_index.get(span.operation_name.as_str()) {
                Some(&idx) => operations[idx].1 += 1,
                None => {
                    operation_index.insert(span.operation_name.as_str(), operations.len());
                    operations.push((span.operation_name.as_str(), 1));
                }
            }

            let ts = span.timestamp.as_str();
            if earliest.is_none_or(|e| ts < e) {
                earliest = Some(ts);
            }
            if latest.is_none_or(|l| ts > l) {
                latest = Some(ts);
            }
        }

        let unique_operations = operations.len();

        // sort_by is stable, so equal counts stay in first-seen order
        operations.sort_by(|a, b| b.1.cmp(&a.1));
        operations.truncate(TOP_OPERATIONS_LIMIT);

        Stats {
            total_spans,
            unique_services: services.len(),
            unique_operations,
            time_range: TimeRange {
                earliest: earliest.map(str::to_string),
                latest: latest.map(str::to_string),
            },
            top_operations: operations
                .into_iter()
                .map(|(name, count)| OperationCount {
                    name: name.to_string(),
                    count,
                })
                .collect(),
            error_count,
            success_count: total_spans - error_count,
        }
    }
}
