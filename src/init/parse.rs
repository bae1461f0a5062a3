
use std::net::SocketAddr;
use tower::BoxError;

/// Parse an endpoint
pub fn parse_endpoint(s: &str) -> Result<SocketAddr, BoxError> {
    // Use actual localhost address instead of localhost name
    let sa: SocketAddr = match s.strip_prefix("localhost:") {
        Some(port) => format!("127.0.0.1:{}", port).parse()?,
        None => s.parse()?,
    };
    Ok(sa)
}

/// Parse an HTTP route path, which must be absolute
pub fn parse_http_path(s: &str) -> Result<String, BoxError> {
    if !s.starts_with('/') {
        return Err(format!("path must start with '/': {}", s).into());
    }
    if s.contains(['?', '#']) {
        return Err(format!("path must not contain a query or fragment: {}", s).into());
    }
    Ok(s.to_string())
}
