// SPDX-License-Identifier: Apache-2.0

mod api;
mod http;

pub use self::api::{API_SPANS_PATH, API_STATS_PATH, HEALTH_PATH};
pub use self::http::{
    DEFAULT_LIST_LIMIT, DEFAULT_METRICS_PATH, DEFAULT_TRACES_PATH, HttpServer, HttpServerBuilder,
};
