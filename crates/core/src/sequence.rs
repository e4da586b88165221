use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::graph::DependencyGraph;
use crate::model::edge::{CommType, EXTERNAL_CALLER, EdgeRecord};
use crate::model::span::Span;

pub const TRACE_FILE_RULE_WIDTH: usize = 80;

/// The dependency graph was not a DAG; records were emitted in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleWarning {
    pub span_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Sequence {
    pub records: Vec<EdgeRecord>,
    pub cycle: Option<CycleWarning>,
}

impl Sequence {
    pub fn lines(&self) -> Vec<String> {
        self.records.iter().map(ToString::to_string).collect()
    }

    pub fn is_cyclic(&self) -> bool {
        self.cycle.is_some()
    }
}

pub fn serialize(graph: &DependencyGraph<'_>) -> Sequence {
    let (order, cycle) = match graph.topological_order() {
        Some(order) => (order, None),
        None => {
            let span_ids: Vec<String> = graph
                .cyclic_span_ids()
                .into_iter()
                .map(str::to_string)
                .collect();
            warn!(
                cyclic = ?span_ids,
                "dependency graph has a cycle; falling back to insertion order"
            );
            (graph.spans(), Some(CycleWarning { span_ids }))
        }
    };

    let records = order
        .into_iter()
        .map(|span| edge_record(span, graph.causal_parent(&span.span_id)))
        .collect();

    Sequence { records, cycle }
}

pub fn edge_record(span: &Span, caller: Option<&Span>) -> EdgeRecord {
    EdgeRecord {
        edge_id: span.span_id.clone(),
        source: caller
            .map(|c| c.service_name.clone())
            .unwrap_or_else(|| EXTERNAL_CALLER.to_string()),
        destination: span.service_name.clone(),
        comm_type: CommType::classify(span.operation_name.as_deref()),
        start_ms: span.start_ms(),
        finish_ms: span.finish_ms(),
    }
}

/// Frames serialized edge lines as a persisted trace file.
pub fn render_trace_file(trace_id: &str, lines: &[String]) -> String {
    let mut out = String::new();
    out.push_str(&format!("Trace ID is {trace_id}\n"));
    out.push_str("<Trace Sequence>\n");
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("</Trace Sequence>\n");
    out.push_str(&"=".repeat(TRACE_FILE_RULE_WIDTH));
    out.push('\n');
    out
}
