
use crate::init::parse;
use crate::server::{DEFAULT_LIST_LIMIT, DEFAULT_METRICS_PATH, DEFAULT_TRACES_PATH};
use crate::store::DEFAULT_MAX_SPANS;
use clap::Args;
use std::net::SocketAddr;

#[derive(Debug, Args, Clone)]
pub struct AgentRun {
    /// Endpoint the HTTP server listens on
    #[arg(long, env = "SPANSCOPE_ENDPOINT", default_value = "localhost:4318", value_parser = parse::parse_endpoint)]
    pub endpoint: SocketAddr,

    /// Maximum number of spans kept in memory, the oldest are evicted first
    #[arg(long, env = "SPANSCOPE_MAX_SPANS", default_value_t = DEFAULT_MAX_SPANS)]
    pub max_spans: usize,

    /// OTLP/HTTP traces path
    #[arg(long, env = "SPANSCOPE_TRACES_PATH", default_value = DEFAULT_TRACES_PATH, value_parser = parse::parse_http_path)]
    pub traces_path: String,

    /// OTLP/HTTP metrics path
    #[arg(long, env = "SPANSCOPE_METRICS_PATH", default_value = DEFAULT_METRICS_PATH, value_parser = parse::parse_http_path)]
    pub metrics_path: String,

    /// Number of spans returned by the span listing when no filter or limit is given
    #[arg(long, env = "SPANSCOPE_LIST_LIMIT", default_value_t = DEFAULT_LIST_LIMIT)]
    pub list_limit: usize,
}
