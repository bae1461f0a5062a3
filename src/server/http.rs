// SPDX-License-Identifier: Apache-2.0

use crate::ingest::{TraceIngester, log_metrics};
use crate::listener::Listener;
use crate::server::api::{self, API_SPANS_PATH, API_STATS_PATH, HEALTH_PATH, JSON_CT};
use crate::store::SpanStore;
use flate2::read::GzDecoder;
use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use http::{HeaderMap, Method};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::body::Bytes;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use opentelemetry_proto::tonic::collector::metrics::v1::{
    ExportMetricsServiceRequest, ExportMetricsServiceResponse,
};
use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use read_restrict::ReadExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::io::{ErrorKind, Read};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceBuilder};
use tower_http::compression::{Compression, CompressionLayer};
use tower_http::limit::{RequestBodyLimit, RequestBodyLimitLayer};
use tower_http::trace::{HttpMakeClassifier, Trace, TraceLayer};
use tower_http::validate_request::{
    ValidateRequest, ValidateRequestHeader, ValidateRequestHeaderLayer,
};
use tracing::{debug, error};

// 20MiB matches the OpenTelemetry collector's HTTP receiver limit
pub(crate) const MAX_BODY_SIZE: usize = 20 * 1024 * 1024;

const DEFAULT_HEADER_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_TRACES_PATH: &str = "/v1/traces";
pub const DEFAULT_METRICS_PATH: &str = "/v1/metrics";
pub const DEFAULT_LIST_LIMIT: usize = 100;

const PROTOBUF_CT: &str = "application/x-protobuf";

/// Layered tower service handed to hyper for every connection.
pub(crate) type HttpService = Trace<
    RequestBodyLimit<Compression<ValidateRequestHeader<SpanService, ValidatePayloadContentType>>>,
    HttpMakeClassifier,
>;

pub struct HttpServerBuilder {
    store: Arc<SpanStore>,
    traces_path: String,
    metrics_path: String,
    list_limit: usize,
    header_timeout: Option<Duration>,
}

impl HttpServerBuilder {
    pub fn with_traces_path(mut self, value: String) -> HttpServerBuilder {
        self.traces_path = value;
        self
    }
    pub fn with_metrics_path(mut self, value: String) -> HttpServerBuilder {
        self.metrics_path = value;
        self
    }
    pub fn with_list_limit(mut self, value: usize) -> HttpServerBuilder {
        self.list_limit = value;
        self
    }
    pub fn with_header_timeout(self, header_timeout: Duration) -> Self {
        Self {
            header_timeout: Some(header_timeout),
            ..self
        }
    }

    pub fn build(self) -> HttpServer {
        HttpServer {
            ingester: TraceIngester::new(self.store),
            traces_path: self.traces_path,
            metrics_path: self.metrics_path,
            list_limit: self.list_limit,
            header_timeout: self.header_timeout.unwrap_or(DEFAULT_HEADER_TIMEOUT),
        }
    }
}

pub struct HttpServer {
    ingester: TraceIngester,
    pub traces_path: String,
    pub metrics_path: String,
    pub list_limit: usize,
    header_timeout: Duration,
}

impl HttpServer {
    pub fn builder(store: Arc<SpanStore>) -> HttpServerBuilder {
        HttpServerBuilder {
            store,
            traces_path: DEFAULT_TRACES_PATH.to_string(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            list_limit: DEFAULT_LIST_LIMIT,
            header_timeout: None,
        }
    }

    pub async fn serve(
        &self,
        listener: Listener,
        cancellation: CancellationToken,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let svc = build_service(
            self.ingester.clone(),
            self.traces_path.clone(),
            self.metrics_path.clone(),
            self.list_limit,
        );

        // To bridge Tower->Hyper we must wrap the tower service
        let svc = TowerToHyperService::new(svc);

        let timer = hyper_util::rt::TokioTimer::new();
        let graceful = hyper_util::server::graceful::GracefulShutdown::new();

        let mut builder = Builder::new(TokioExecutor::new());
        builder
            .http1()
            .header_read_timeout(Some(self.header_timeout))
            .timer(timer.clone());
        builder.http2().timer(timer);

        let listener = listener.into_tokio()?;
        loop {
            let stream = tokio::select! {
                r = listener.accept() => {
                    match r {
                        Ok((stream, _)) => stream,
                        Err(e) => return Err(e.into()),
                    }
                },
                _ = cancellation.cancelled() => break
            };

            let io = TokioIo::new(stream);

            let conn = builder.serve_connection(io, svc.clone());
            let fut = graceful.watch(conn.into_owned());

            tokio::spawn(async move {
                let _ = fut.await.map_err(|e| {
                    if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
                        let err_str = format!("{:?}", hyper_err);

                        // Client went away mid-shutdown, or an idle keep-alive connection hit
                        // the header timeout. Neither is worth reporting.
                        let err_not_connected = err_str.contains("NotConnected");
                        let err_hdr_timeout = err_str.contains("HeaderTimeout");

                        if !err_not_connected && !err_hdr_timeout {
                            error!("error serving connection: {:?}", hyper_err);
                        }
                    } else {
                        error!("error serving connection: {:?}", e);
                    }
                });
            });
        }

        graceful.shutdown().await;

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum PayloadEncoding {
    Json,
    Protobuf,
}

impl PayloadEncoding {
    /// Matches on the media type only, so `application/json; charset=utf-8` is accepted.
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let ct = headers.get(CONTENT_TYPE)?.to_str().ok()?;
        let essence = ct.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case(JSON_CT) {
            Some(PayloadEncoding::Json)
        } else if essence.eq_ignore_ascii_case(PROTOBUF_CT) {
            Some(PayloadEncoding::Protobuf)
        } else {
            None
        }
    }

    fn content_type(&self) -> &'static str {
        match self {
            PayloadEncoding::Json => JSON_CT,
            PayloadEncoding::Protobuf => PROTOBUF_CT,
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct ValidatePayloadContentType {
    traces_path: String,
    metrics_path: String,
}

impl<B> ValidateRequest<B> for ValidatePayloadContentType {
    type ResponseBody = Full<Bytes>;

    fn validate(&mut self, request: &mut Request<B>) -> Result<(), Response<Self::ResponseBody>> {
        // Only ingest routes carry a payload, everything else falls through to routing so an
        // unknown path is a 404 rather than a 400.
        if request.method() != Method::POST
            || (request.uri().path() != self.traces_path
                && request.uri().path() != self.metrics_path)
        {
            return Ok(());
        }

        match PayloadEncoding::from_headers(request.headers()) {
            Some(_) => Ok(()),
            None => {
                debug!(content_type = ?request.headers().get(CONTENT_TYPE), "Unsupported content-type");
                Err(response_4xx(StatusCode::BAD_REQUEST))
            }
        }
    }
}

pub(crate) fn build_service(
    ingester: TraceIngester,
    traces_path: String,
    metrics_path: String,
    list_limit: usize,
) -> HttpService {
    ServiceBuilder::new()
        // Log requests at debug level
        .layer(TraceLayer::new_for_http())
        // Limit incoming body size
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        // Compress responses with gzip, if accept-encoding set
        .layer(CompressionLayer::new())
        .layer(ValidateRequestHeaderLayer::custom(
            ValidatePayloadContentType {
                traces_path: traces_path.clone(),
                metrics_path: metrics_path.clone(),
            },
        ))
        .service(SpanService {
            ingester,
            traces_path,
            metrics_path,
            list_limit,
        })
}

#[derive(Debug, PartialEq)]
enum Route {
    Traces,
    Metrics,
    ListSpans,
    ClearSpans,
    Stats,
    Health,
    MethodNotAllowed,
    NotFound,
}

#[derive(Clone)]
pub(crate) struct SpanService {
    ingester: TraceIngester,
    traces_path: String,
    metrics_path: String,
    list_limit: usize,
}

impl SpanService {
    fn route(&self, method: &Method, path: &str) -> Route {
        if path == self.traces_path || path == self.metrics_path {
            return match (method, path == self.traces_path) {
                (&Method::POST, true) => Route::Traces,
                (&Method::POST, false) => Route::Metrics,
                _ => Route::NotFound,
            };
        }

        match (method, path) {
            (&Method::GET, API_SPANS_PATH) => Route::ListSpans,
            (&Method::DELETE, API_SPANS_PATH) => Route::ClearSpans,
            (&Method::GET, API_STATS_PATH) => Route::Stats,
            (&Method::GET, HEALTH_PATH) => Route::Health,
            (_, API_SPANS_PATH | API_STATS_PATH | HEALTH_PATH) => Route::MethodNotAllowed,
            _ => Route::NotFound,
        }
    }
}

impl<H> Service<Request<H>> for SpanService
where
    H: Body + Send + Sync + 'static,
    <H as Body>::Data: Send + Sync + Clone,
    <H as Body>::Error: Display + Debug + Send + Sync + ToString,
{
    type Response = Response<Full<Bytes>>;
    type Error = hyper::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<H>) -> Self::Future {
        let store = self.ingester.store();
        let resp = match self.route(req.method(), req.uri().path()) {
            Route::Traces => return Box::pin(handle_traces(req, self.ingester.clone())),
            Route::Metrics => return Box::pin(handle_metrics(req)),
            Route::ListSpans => api::list_spans(store, req.uri().query(), self.list_limit),
            Route::ClearSpans => api::clear(store),
            Route::Stats => api::stats(store),
            Route::Health => api::health(store),
            Route::MethodNotAllowed => response_4xx(StatusCode::METHOD_NOT_ALLOWED),
            Route::NotFound => response_4xx(StatusCode::NOT_FOUND),
        };
        Box::pin(futures::future::ok(resp))
    }
}

async fn handle_traces<H: Body>(
    req: Request<H>,
    ingester: TraceIngester,
) -> Result<Response<Full<Bytes>>, hyper::Error>
where
    <H as Body>::Error: Display + Debug + Send + Sync + ToString,
{
    let (encoding, payload) = match read_payload::<H, ExportTraceServiceRequest>(req).await {
        Ok(r) => r,
        Err(code) => return Ok(response_4xx(code)),
    };

    match ingester.process_traces(&payload) {
        Ok(_) => Ok(ok_response::<ExportTraceServiceResponse>(encoding)),
        Err(e) => {
            error!(error = e.to_string(), "Failed to process traces.");
            Ok(api::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process traces",
            ))
        }
    }
}

async fn handle_metrics<H: Body>(req: Request<H>) -> Result<Response<Full<Bytes>>, hyper::Error>
where
    <H as Body>::Error: Display + Debug + Send + Sync + ToString,
{
    let (encoding, payload) = match read_payload::<H, ExportMetricsServiceRequest>(req).await {
        Ok(r) => r,
        Err(code) => return Ok(response_4xx(code)),
    };

    log_metrics(&payload);
    Ok(ok_response::<ExportMetricsServiceResponse>(encoding))
}

/// Reads the request body into an OTLP/JSON value. Protobuf payloads are decoded as `ExpReq`
/// and re-encoded through its serde representation, so both encodings reach the same decoder.
async fn read_payload<H: Body, ExpReq: prost::Message + Serialize + DeserializeOwned + Default>(
    req: Request<H>,
) -> Result<(PayloadEncoding, Value), StatusCode>
where
    <H as Body>::Error: Display + Debug + Send + Sync + ToString,
{
    let encoding = PayloadEncoding::from_headers(req.headers()).ok_or(StatusCode::BAD_REQUEST)?;
    let body = decode_body(req).await?;

    let payload = match encoding {
        PayloadEncoding::Json => serde_json::from_slice::<Value>(body.as_ref()).map_err(|e| {
            error!(
                error = e.to_string(),
                "Failed to decode OTLP HTTP/JSON request."
            );
            StatusCode::BAD_REQUEST
        })?,
        PayloadEncoding::Protobuf => {
            let decoded = ExpReq::decode(body).map_err(|e| {
                error!(
                    error = e.to_string(),
                    "Failed to decode OTLP HTTP/Protobuf request."
                );
                StatusCode::BAD_REQUEST
            })?;
            serde_json::to_value(&decoded).map_err(|e| {
                error!(
                    error = e.to_string(),
                    "Failed to convert OTLP HTTP/Protobuf request."
                );
                StatusCode::BAD_REQUEST
            })?
        }
    };

    Ok((encoding, payload))
}

async fn decode_body<H: Body>(req: Request<H>) -> Result<Bytes, StatusCode>
where
    <H as Body>::Error: Display + Debug + Send + Sync + ToString,
{
    let content_encoding = req
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_lowercase());

    let is_gzip = match content_encoding.as_deref() {
        None | Some("identity") => false,
        Some("gzip") => true,
        Some(other) => {
            debug!(content_encoding = other, "Unsupported content-encoding");
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let body_bytes = match req.collect().await {
        Ok(bytes) => bytes.to_bytes(),
        Err(e) => {
            // The limit error is boxed by the time it reaches us, match on the message
            if e.to_string().contains("length limit exceeded") {
                return Err(StatusCode::PAYLOAD_TOO_LARGE);
            }
            error!("Failed to read request body: {:?}", e);
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    if !is_gzip {
        return Ok(body_bytes);
    }

    decompress_gzip(&body_bytes).map_err(|e| {
        if ErrorKind::InvalidData == e.kind() {
            return StatusCode::PAYLOAD_TOO_LARGE;
        }
        error!("Failed to decompress gzip data: {}", e);
        StatusCode::BAD_REQUEST
    })
}

// DecompressionLayer has no limit on the inflated size
fn decompress_gzip(compressed: &[u8]) -> std::io::Result<Bytes> {
    let decoder = GzDecoder::new(compressed);
    let mut decoder = decoder.restrict(MAX_BODY_SIZE as u64);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(Bytes::from(decompressed))
}

fn response_4xx(code: StatusCode) -> Response<Full<Bytes>> {
    api::response(code, None, Bytes::default())
}

fn ok_response<T: prost::Message + Serialize + Default>(
    encoding: PayloadEncoding,
) -> Response<Full<Bytes>> {
    // No partial success, the default export response is empty
    let resp = T::default();

    let body = match encoding {
        PayloadEncoding::Json => match serde_json::to_vec(&resp) {
            Ok(buf) => buf,
            Err(e) => {
                error!(error = e.to_string(), "Failed to encode export response.");
                return api::response(StatusCode::INTERNAL_SERVER_ERROR, None, Bytes::default());
            }
        },
        PayloadEncoding::Protobuf => resp.encode_to_vec(),
    };

    api::response(StatusCode::OK, Some(encoding.content_type()), body.into())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use flate2::Compression as GZCompression;
    use flate2::read::GzEncoder;
    use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
    use http::{Method, Request, StatusCode};
    use http_body_util::{BodyExt, Full};
    use hyper::service::Service;
    use hyper_util::client::legacy::Client;
    use hyper_util::client::legacy::connect::HttpConnector;
    use hyper_util::rt::{TokioExecutor, TokioTimer};
    use serde_json::{Value, json};
    use std::io::Read;
    use std::sync::Arc;
    use std::time::Duration;

    extern crate utilities;
    use super::{HttpServer, HttpService, MAX_BODY_SIZE, PayloadEncoding, build_service};
    use crate::ingest::TraceIngester;
    use crate::listener::Listener;
    use crate::store::SpanStore;
    use hyper_util::service::TowerToHyperService;
    use prost::Message;
    use tokio::join;
    use tokio::time::sleep;
    use tokio_test::assert_ok;
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;
    use utilities::otlp::FakeOTLP;

    #[tokio::test]
    async fn invalid_requests() {
        let (svc, _) = new_svc();

        // Bad path
        let resp = svc.call(request(Method::POST, "/", None, Bytes::new())).await.unwrap();
        assert_eq!(StatusCode::NOT_FOUND, resp.status());

        // Wrong method on an ingest path
        let resp = svc
            .call(request(Method::GET, "/v1/traces", None, Bytes::new()))
            .await
            .unwrap();
        assert_eq!(StatusCode::NOT_FOUND, resp.status());

        // Wrong method on an API path
        let resp = svc
            .call(request(Method::POST, "/api/stats", None, Bytes::new()))
            .await
            .unwrap();
        assert_eq!(StatusCode::METHOD_NOT_ALLOWED, resp.status());

        // Invalid content type
        let resp = svc
            .call(request(
                Method::POST,
                "/v1/traces",
                Some("text/plain"),
                Bytes::new(),
            ))
            .await
            .unwrap();
        assert_eq!(StatusCode::BAD_REQUEST, resp.status());

        // Missing content type
        let resp = svc
            .call(request(Method::POST, "/v1/metrics", None, Bytes::new()))
            .await
            .unwrap();
        assert_eq!(StatusCode::BAD_REQUEST, resp.status());

        // Malformed JSON
        let resp = svc
            .call(request(
                Method::POST,
                "/v1/traces",
                Some("application/json"),
                Bytes::from_static(b"{\"resourceSpans\": ["),
            ))
            .await
            .unwrap();
        assert_eq!(StatusCode::BAD_REQUEST, resp.status());

        // Unsupported content encoding
        let req = Request::builder()
            .uri("/v1/traces")
            .method(Method::POST)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "br")
            .body(Full::new(Bytes::from_static(b"{}")))
            .unwrap();
        let resp = svc.call(req).await.unwrap();
        assert_eq!(StatusCode::BAD_REQUEST, resp.status());
    }

    #[tokio::test]
    async fn size_limits() {
        let (svc, _) = new_svc();

        let buf = Bytes::from(vec![0; MAX_BODY_SIZE + 1]);

        // Content too long
        let resp = svc
            .call(request(
                Method::POST,
                "/v1/traces",
                Some("application/x-protobuf"),
                buf,
            ))
            .await
            .unwrap();
        assert_eq!(StatusCode::PAYLOAD_TOO_LARGE, resp.status());

        let large_vec = vec![0; MAX_BODY_SIZE + 1];
        let mut gz_vec = Vec::new();
        let mut gz = GzEncoder::new(&large_vec[..], GZCompression::fast());
        gz.read_to_end(&mut gz_vec).unwrap();

        let buf = Bytes::from(gz_vec);
        assert!(buf.len() < MAX_BODY_SIZE);

        // Inflated content too long
        let req: Request<Full<Bytes>> = Request::builder()
            .uri("/v1/traces")
            .method(Method::POST)
            .header(CONTENT_TYPE, "application/x-protobuf")
            .header(CONTENT_ENCODING, "gzip")
            .body(Full::new(buf))
            .unwrap();
        let resp = svc.call(req).await.unwrap();
        assert_eq!(StatusCode::PAYLOAD_TOO_LARGE, resp.status());
    }

    #[tokio::test]
    async fn valid_trace_posts() {
        let (svc, store) = new_svc();

        let trace_req = FakeOTLP::trace_service_request_with_spans(1, 2);
        let mut buf = Vec::with_capacity(trace_req.encoded_len());
        assert_ok!(trace_req.encode(&mut buf));

        let resp = svc
            .call(request(
                Method::POST,
                "/v1/traces",
                Some("application/x-protobuf"),
                Bytes::from(buf),
            ))
            .await
            .unwrap();
        assert_eq!(StatusCode::OK, resp.status());
        assert_eq!(
            "application/x-protobuf",
            resp.headers().get(CONTENT_TYPE).unwrap()
        );

        let spans = store.list_all();
        assert_eq!(2, spans.len());
        assert_eq!("test-service", spans[0].service_name);
        assert_eq!("0101010101010101".repeat(2), spans[0].trace_id);
        assert_eq!(1, spans[0].duration);
    }

    #[tokio::test]
    async fn valid_trace_posts_json() {
        let (svc, store) = new_svc();

        let payload = FakeOTLP::traces_json(
            "checkout",
            vec![FakeOTLP::span_json("charge", 1_000_000_000, 1_020_000_000, 2)],
        );

        let resp = svc
            .call(request(
                Method::POST,
                "/v1/traces",
                Some("application/json; charset=utf-8"),
                Bytes::from(serde_json::to_vec(&payload).unwrap()),
            ))
            .await
            .unwrap();
        assert_eq!(StatusCode::OK, resp.status());
        assert_eq!(
            "application/json",
            resp.headers().get(CONTENT_TYPE).unwrap()
        );

        let spans = store.list_all();
        assert_eq!(1, spans.len());
        assert_eq!("charge", spans[0].operation_name);
        assert_eq!(20, spans[0].duration);
        assert!(spans[0].status.is_error());
    }

    #[tokio::test]
    async fn gzip_trace_posts() {
        let (svc, store) = new_svc();

        let payload = FakeOTLP::traces_json(
            "checkout",
            vec![FakeOTLP::span_json("charge", 1_000_000_000, 1_020_000_000, 1)],
        );
        let raw = serde_json::to_vec(&payload).unwrap();
        let mut gz_vec = Vec::new();
        let mut gz = GzEncoder::new(&raw[..], GZCompression::fast());
        gz.read_to_end(&mut gz_vec).unwrap();

        let req = Request::builder()
            .uri("/v1/traces")
            .method(Method::POST)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(Full::new(Bytes::from(gz_vec)))
            .unwrap();
        let resp = svc.call(req).await.unwrap();
        assert_eq!(StatusCode::OK, resp.status());
        assert_eq!(1, store.count());
    }

    #[traced_test]
    #[tokio::test]
    async fn decode_failure_is_server_error() {
        let (svc, store) = new_svc();

        let payload = json!({"resourceSpans": [
            {"scopeSpans": [{"spans": [{"name": "kept"}, {"name": "bad", "spanId": [1, 300]}]}]}
        ]});

        let resp = svc
            .call(request(
                Method::POST,
                "/v1/traces",
                Some("application/json"),
                Bytes::from(serde_json::to_vec(&payload).unwrap()),
            ))
            .await
            .unwrap();
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, resp.status());
        assert_eq!(
            json!({"error": "Failed to process traces"}),
            body_json(resp).await
        );
        assert!(logs_contain("Failed to process traces."));

        // Spans before the failure are kept
        assert_eq!(1, store.count());
    }

    #[traced_test]
    #[tokio::test]
    async fn valid_metrics_posts() {
        let (svc, store) = new_svc();

        let metrics_req = FakeOTLP::metrics_service_request();
        let mut buf = Vec::with_capacity(metrics_req.encoded_len());
        assert_ok!(metrics_req.encode(&mut buf));

        let resp = svc
            .call(request(
                Method::POST,
                "/v1/metrics",
                Some("application/x-protobuf"),
                Bytes::from(buf),
            ))
            .await
            .unwrap();
        assert_eq!(StatusCode::OK, resp.status());
        assert_eq!(
            "application/x-protobuf",
            resp.headers().get(CONTENT_TYPE).unwrap()
        );
        assert!(logs_contain("Received metrics."));
        assert_eq!(0, store.count());
    }

    #[tokio::test]
    async fn valid_metrics_posts_json() {
        let (svc, _) = new_svc();

        let metrics_req = FakeOTLP::metrics_service_request();
        let buf = serde_json::to_vec(&metrics_req).unwrap();

        let resp = svc
            .call(request(
                Method::POST,
                "/v1/metrics",
                Some("application/json"),
                Bytes::from(buf),
            ))
            .await
            .unwrap();
        assert_eq!(StatusCode::OK, resp.status());
        assert_eq!(
            "application/json",
            resp.headers().get(CONTENT_TYPE).unwrap()
        );
    }

    #[tokio::test]
    async fn query_routes() {
        let (svc, store) = new_svc();
        let payload = FakeOTLP::traces_json(
            "web",
            vec![
                FakeOTLP::span_json("GET /", 1_000_000, 2_000_000, 1),
                FakeOTLP::span_json("GET /cart", 3_000_000, 4_000_000, 2),
            ],
        );
        TraceIngester::new(store.clone())
            .process_traces(&payload)
            .unwrap();

        let resp = svc
            .call(request(Method::GET, "/api/spans?limit=1", None, Bytes::new()))
            .await
            .unwrap();
        assert_eq!(StatusCode::OK, resp.status());
        let body = body_json(resp).await;
        assert_eq!(1, body.as_array().unwrap().len());
        assert_eq!("GET /cart", body[0]["operationName"]);

        let resp = svc
            .call(request(Method::GET, "/api/stats", None, Bytes::new()))
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(2, body["totalSpans"]);
        assert_eq!(1, body["errorCount"]);

        let resp = svc
            .call(request(Method::GET, "/health", None, Bytes::new()))
            .await
            .unwrap();
        assert_eq!(2, body_json(resp).await["spans"]);

        let resp = svc
            .call(request(Method::DELETE, "/api/spans", None, Bytes::new()))
            .await
            .unwrap();
        assert_eq!(json!({"cleared": 2}), body_json(resp).await);
        assert_eq!(0, store.count());
    }

    #[traced_test]
    #[tokio::test]
    async fn does_not_log_header_timeout() {
        let store = Arc::new(SpanStore::new(100));
        let srv = HttpServer::builder(store.clone())
            .with_header_timeout(Duration::from_millis(50))
            .build();

        let cancel_token = CancellationToken::new();

        let listener = Listener::bind_async("[::1]:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let srv_fut = {
            let cancel_token = cancel_token.clone();
            async move { srv.serve(listener, cancel_token).await }
        };

        let trace_req = FakeOTLP::trace_service_request();
        let mut buf = Vec::with_capacity(trace_req.encoded_len());
        assert_ok!(trace_req.encode(&mut buf));
        let buf = Bytes::from(buf);

        let srv_hnd = tokio::spawn(srv_fut);

        let uri = format!("http://{addr}/v1/traces");
        let client = new_client();
        let req = hyper::Request::builder()
            .method(Method::POST)
            .header(CONTENT_TYPE, "application/x-protobuf")
            .uri(uri)
            .body(Full::new(buf))
            .unwrap();

        let resp = client.request(req.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // wait, ideally keeping the connection open
        sleep(Duration::from_millis(100)).await;

        // should reuse open connection
        let resp = client.request(req).await;
        assert_ok!(resp);
        assert_eq!(2, store.count());

        cancel_token.cancel();
        let r = join!(srv_hnd);
        assert_ok!(r.0.unwrap());

        assert!(!logs_contain("error serving connection"));
    }

    #[test]
    fn content_type_essence() {
        let mut headers = http::HeaderMap::new();
        assert_eq!(None, PayloadEncoding::from_headers(&headers));

        headers.insert(CONTENT_TYPE, "Application/JSON ; charset=utf-8".parse().unwrap());
        assert_eq!(
            Some(PayloadEncoding::Json),
            PayloadEncoding::from_headers(&headers)
        );

        headers.insert(CONTENT_TYPE, "application/x-protobuf".parse().unwrap());
        assert_eq!(
            Some(PayloadEncoding::Protobuf),
            PayloadEncoding::from_headers(&headers)
        );

        headers.insert(CONTENT_TYPE, "application/jsonl".parse().unwrap());
        assert_eq!(None, PayloadEncoding::from_headers(&headers));
    }

    fn request(
        method: Method,
        uri: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().uri(uri).method(method);
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        builder.body(Full::new(body)).unwrap()
    }

    async fn body_json<B>(resp: http::Response<B>) -> Value
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Debug,
    {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn new_svc() -> (TowerToHyperService<HttpService>, Arc<SpanStore>) {
        let store = Arc::new(SpanStore::new(100));
        let svc = build_service(
            TraceIngester::new(store.clone()),
            "/v1/traces".to_string(),
            "/v1/metrics".to_string(),
            100,
        );
        (TowerToHyperService::new(svc), store)
    }

    fn new_client() -> Client<HttpConnector, Full<Bytes>> {
        hyper_util::client::legacy::Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(2))
            .pool_max_idle_per_host(2)
            .timer(TokioTimer::new())
            .build::<_, Full<Bytes>>(HttpConnector::new())
    }
}
