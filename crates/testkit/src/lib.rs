use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Value, json};
use tracegraph_core::model::span::{AnomalyType, Span, Trace};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

pub fn span(
    trace_id: &str,
    span_id: &str,
    parent: Option<&str>,
    service: &str,
    operation: &str,
    offset_ms: i64,
    duration_ms: f64,
) -> Span {
    Span {
        trace_id: trace_id.to_string(),
        span_id: span_id.to_string(),
        parent_span_id: parent.map(str::to_string),
        children: Vec::new(),
        start_time: base_time() + Duration::milliseconds(offset_ms),
        duration: duration_ms,
        service_name: service.to_string(),
        operation_name: Some(operation.to_string()),
        status_code: Some("200".to_string()),
        anomaly: false,
        root_cause: None,
        latency: None,
        structure: None,
        extra: None,
    }
}

/// frontend -> orders -> postgres, plus a cache call hanging off the root.
pub fn sample_trace(trace_id: &str) -> Trace {
    let mut orders = span(trace_id, "orders", Some("root"), "orders", "gRPC Orders/List", 100, 700.0);
    orders.children.push(span(
        trace_id,
        "db",
        Some("orders"),
        "postgres",
        "SQL SELECT orders",
        300,
        200.0,
    ));

    let mut root = span(trace_id, "root", None, "frontend", "HTTP GET /orders", 0, 1800.0);
    root.children.push(orders);
    root.children.push(span(
        trace_id,
        "cache",
        Some("root"),
        "redis",
        "cache get",
        900,
        50.0,
    ));

    Trace {
        trace_id: trace_id.to_string(),
        root_span: Some(root),
        span_count: 4,
        anomaly_type: Some(AnomalyType::Normal),
    }
}

/// Child starts before its parent, so the parent edge and the time edge
/// point at each other.
pub fn cyclic_trace(trace_id: &str) -> Trace {
    let mut root = span(trace_id, "x", None, "gateway", "HTTP POST /pay", 1000, 40.0);
    root.children.push(span(trace_id, "y", Some("x"), "payments", "gRPC Pay", 0, 30.0));
    Trace {
        trace_id: trace_id.to_string(),
        root_span: Some(root),
        span_count: 2,
        anomaly_type: Some(AnomalyType::StructureOnly),
    }
}

/// `sample_trace` as flat span records, listed out of tree order.
pub fn flat_spans(trace_id: &str) -> Vec<Value> {
    let at = |offset_ms: i64| (base_time() + Duration::milliseconds(offset_ms)).to_rfc3339();
    vec![
        json!({
            "trace_id": trace_id, "span_id": "cache", "parent_span_id": "root",
            "start_time": at(900), "duration": 50.0,
            "service_name": "redis", "operation_name": "cache get",
        }),
        json!({
            "trace_id": trace_id, "span_id": "db", "parent_span_id": "orders",
            "start_time": at(300), "duration": 200.0,
            "service_name": "postgres", "operation_name": "SQL SELECT orders",
        }),
        json!({
            "trace_id": trace_id, "span_id": "root",
            "start_time": at(0), "duration": 1800.0,
            "service_name": "frontend", "operation_name": "HTTP GET /orders",
        }),
        json!({
            "trace_id": trace_id, "span_id": "orders", "parent_span_id": "root",
            "start_time": at(100), "duration": 700.0,
            "service_name": "orders", "operation_name": "gRPC Orders/List",
        }),
    ]
}
