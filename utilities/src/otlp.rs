use chrono::Utc;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::any_value::Value::StringValue;
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::metrics::v1::metric::Data;
use opentelemetry_proto::tonic::metrics::v1::number_data_point::Value;
use opentelemetry_proto::tonic::metrics::v1::{
    Gauge, Metric, NumberDataPoint, ResourceMetrics, ScopeMetrics,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1;
use opentelemetry_proto::tonic::trace::v1::span::SpanKind;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Status};
use serde_json::json;

pub struct FakeOTLP;

impl FakeOTLP {
    pub fn metrics_service_request() -> ExportMetricsServiceRequest {
        Self::metrics_service_request_with_metrics(1, 1)
    }

    pub fn metrics_service_request_with_metrics(
        num_resource_metrics: usize,
        num_metrics: usize,
    ) -> ExportMetricsServiceRequest {
        let mut exp = ExportMetricsServiceRequest {
            resource_metrics: Vec::with_capacity(num_resource_metrics),
        };
        for _i in 0..num_resource_metrics {
            exp.resource_metrics
                .push(Self::resource_metrics(num_metrics));
        }
        exp
    }

    fn resource_metrics(num_metrics: usize) -> ResourceMetrics {
        let mut metrics = Vec::with_capacity(num_metrics);
        let now_ns = Utc::now().timestamp_nanos_opt().unwrap();
        for _ in 0..num_metrics {
            let dp = vec![NumberDataPoint {
                attributes: vec![],
                start_time_unix_nano: now_ns as u64,
                time_unix_nano: now_ns as u64,
                exemplars: vec![],
                flags: 0,
                value: Some(Value::AsDouble(100.0)),
            }];
            let metric = Metric {
                name: "test-metric".to_string(),
                description: "An example OTLP Metric".to_string(),
                unit: "".to_string(),
                metadata: vec![],
                data: Some(Data::Gauge(Gauge { data_points: dp })),
            };
            metrics.push(metric)
        }

        ResourceMetrics {
            resource: Some(Self::resource()),
            scope_metrics: vec![ScopeMetrics {
                scope: None,
                metrics,
                schema_url: "https://opentelemetry.io/schemas/1.21.0".to_string(),
            }],
            schema_url: "https://opentelemetry.io/schemas/1.21.0".to_string(),
        }
    }

    pub fn trace_service_request() -> ExportTraceServiceRequest {
        Self::trace_service_request_with_spans(1, 1)
    }

    pub fn trace_service_request_with_spans(
        num_res_spans: usize,
        num_spans: usize,
    ) -> ExportTraceServiceRequest {
        let mut exp = ExportTraceServiceRequest {
            resource_spans: Vec::with_capacity(num_res_spans),
        };
        for _i in 0..num_res_spans {
            exp.resource_spans.push(Self::resource_spans(num_spans));
        }
        exp
    }

    fn resource_spans(num_spans: usize) -> ResourceSpans {
        let scope_spans = ScopeSpans {
            scope: Some(InstrumentationScope {
                name: "scope".to_string(),
                version: "0.0.1".to_string(),
                attributes: vec![string_attr("module", "api")],
                dropped_attributes_count: 0,
            }),
            spans: Self::trace_spans(num_spans),
            schema_url: "https://opentelemetry.io/schemas/1.21.0".to_string(),
        };
        ResourceSpans {
            resource: Some(Self::resource()),
            scope_spans: vec![scope_spans],
            schema_url: "https://opentelemetry.io/schemas/1.21.0".to_string(),
        }
    }

    fn resource() -> Resource {
        Resource {
            attributes: vec![
                string_attr("service.name", "test-service"),
                string_attr("telemetry.sdk.version", "1.13.0"),
                string_attr("telemetry.sdk.name", "open-telemetry"),
                string_attr("device.model.identifier", "iPhone15,2"),
            ],
            dropped_attributes_count: 0,
        }
    }

    /// Spans that start now and last exactly one millisecond.
    pub fn trace_spans(num_spans: usize) -> Vec<v1::Span> {
        let now_ns = Utc::now().timestamp_millis() * 1_000_000;
        let finish_ns = now_ns + 1_000_000;
        let mut spans = Vec::with_capacity(num_spans);
        for _ in 0..num_spans {
            let span = v1::Span {
                trace_id: vec![1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
                span_id: vec![2, 2, 2, 2, 2, 2, 2, 2],
                trace_state: "rojo=00f067aa0ba902b7".to_string(),
                parent_span_id: vec![1, 1, 1, 1, 1, 1, 1, 1],
                flags: 0,
                name: "foo".to_string(),
                kind: SpanKind::Internal.into(),
                start_time_unix_nano: now_ns as u64,
                end_time_unix_nano: finish_ns as u64,
                attributes: vec![
                    string_attr("http.method", "POST"),
                    string_attr("http.request.path", "/items"),
                ],
                dropped_attributes_count: 0,
                events: vec![],
                dropped_events_count: 0,
                links: vec![],
                dropped_links_count: 0,
                status: Some(Status::default()),
            };
            spans.push(span);
        }
        spans
    }

    /// A traces payload in the shape mobile SDKs post it: one resource, one scope.
    pub fn traces_json(service_name: &str, spans: Vec<serde_json::Value>) -> serde_json::Value {
        json!({
            "resourceSpans": [{
                "resource": {"attributes": [
                    {"key": "service.name", "value": {"stringValue": service_name}}
                ]},
                "scopeSpans": [{
                    "scope": {"name": "fake", "version": "0.0.1"},
                    "spans": spans
                }]
            }]
        })
    }

    /// A single span with raw byte-array ids and string nanosecond timestamps.
    pub fn span_json(name: &str, start_ns: u64, end_ns: u64, status_code: i64) -> serde_json::Value {
        let id = start_ns.to_be_bytes();
        let trace_id = [id, id].concat();
        json!({
            "traceId": trace_id,
            "spanId": id,
            "name": name,
            "kind": 1,
            "startTimeUnixNano": start_ns.to_string(),
            "endTimeUnixNano": end_ns.to_string(),
            "attributes": [
                {"key": "http.method", "value": {"stringValue": "GET"}},
                {"key": "http.status_code", "value": {"intValue": "200"}}
            ],
            "status": {"code": status_code}
        })
    }
}

pub fn string_attr(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(StringValue(value.to_string())),
        }),
    }
}
