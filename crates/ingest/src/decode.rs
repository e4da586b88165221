use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracegraph_core::error::{Result, TraceGraphError};
use tracegraph_core::model::span::{AnomalyType, Span, Trace, flag};
use tracegraph_store::read::{read_records, read_traces};

/// How trace input files are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFormat {
    /// Serialized `Trace` values with nested span trees.
    #[default]
    Tree,
    /// Flat span records linked only by `parent_span_id`.
    Flat,
}

impl FromStr for InputFormat {
    type Err = TraceGraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tree" => Ok(Self::Tree),
            "flat" => Ok(Self::Flat),
            other => Err(TraceGraphError::Parse(format!("unknown input format: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlatSpan {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub duration: f64,
    pub service_name: String,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub status_code: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub anomaly: bool,
    #[serde(default)]
    pub root_cause: Option<bool>,
    #[serde(default)]
    pub latency: Option<u8>,
    #[serde(default)]
    pub structure: Option<u8>,
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

impl FlatSpan {
    fn into_span(self) -> Span {
        Span {
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_span_id: self.parent_span_id,
            children: Vec::new(),
            start_time: self.start_time,
            duration: self.duration,
            service_name: self.service_name,
            operation_name: self.operation_name,
            status_code: self.status_code,
            anomaly: self.anomaly,
            root_cause: self.root_cause,
            latency: self.latency,
            structure: self.structure,
            extra: self.extra,
        }
    }
}

/// Every trace in one input file, keyed by trace id. A trace that cannot be
/// assembled carries its own error; the rest of the file is unaffected.
pub fn load_traces(path: &Path, format: InputFormat) -> Result<Vec<(String, Result<Trace>)>> {
    match format {
        InputFormat::Tree => Ok(read_traces(path)?
            .into_iter()
            .map(|t| (t.trace_id.clone(), Ok(t)))
            .collect()),
        InputFormat::Flat => Ok(assemble(read_records::<FlatSpan>(path)?)),
    }
}

/// Groups flat spans by trace id, in order of first appearance.
pub fn assemble(spans: Vec<FlatSpan>) -> Vec<(String, Result<Trace>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<FlatSpan>> = HashMap::new();
    for span in spans {
        if !groups.contains_key(&span.trace_id) {
            order.push(span.trace_id.clone());
        }
        groups.entry(span.trace_id.clone()).or_default().push(span);
    }

    order
        .into_iter()
        .map(|trace_id| {
            let spans = groups.remove(&trace_id).unwrap_or_default();
            let trace = assemble_trace(&trace_id, spans);
            (trace_id, trace)
        })
        .collect()
}

/// Builds the ownership tree for one trace.
///
/// Spans whose parent is missing from the trace are orphans: the earliest one
/// becomes the root and the others are owned by it, keeping their declared
/// parent id so the dependency graph still treats them as roots.
pub fn assemble_trace(trace_id: &str, spans: Vec<FlatSpan>) -> Result<Trace> {
    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, span) in spans.iter().enumerate() {
        if index.insert(span.span_id.clone(), i).is_some() {
            return Err(TraceGraphError::Structural(format!(
                "duplicate span id {} in trace {trace_id}",
                span.span_id
            )));
        }
    }

    let mut orphans: Vec<usize> = Vec::new();
    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, span) in spans.iter().enumerate() {
        match span
            .parent_span_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .and_then(|p| index.get(p))
        {
            Some(&parent) => children.entry(parent).or_default().push(i),
            None => orphans.push(i),
        }
    }

    let by_start = |ids: &mut Vec<usize>| ids.sort_by_key(|&i| spans[i].start_time);
    by_start(&mut orphans);
    for ids in children.values_mut() {
        by_start(ids);
    }

    let Some((&root, rest)) = orphans.split_first() else {
        return Err(TraceGraphError::Structural(format!(
            "trace {trace_id} has no root span"
        )));
    };
    children.entry(root).or_default().extend(rest.iter().copied());

    let anomaly_type = anomaly_type(&spans);
    let span_count = spans.len();
    let mut slots: Vec<Option<Span>> = spans.into_iter().map(|s| Some(s.into_span())).collect();

    // Post-order: attach children before their parent is taken.
    let mut visited = 0;
    let mut stack = vec![(root, false)];
    while let Some((idx, expanded)) = stack.pop() {
        let kids = children.get(&idx).map(Vec::as_slice).unwrap_or_default();
        if !expanded {
            stack.push((idx, true));
            stack.extend(kids.iter().rev().map(|&k| (k, false)));
            continue;
        }
        let owned: Vec<Span> = kids.iter().filter_map(|&k| slots[k].take()).collect();
        if let Some(span) = slots[idx].as_mut() {
            span.children = owned;
        }
        visited += 1;
    }

    if visited != span_count {
        return Err(TraceGraphError::Structural(format!(
            "trace {trace_id}: {} spans unreachable from root (parent cycle)",
            span_count - visited
        )));
    }

    Ok(Trace {
        trace_id: trace_id.to_string(),
        root_span: slots[root].take(),
        span_count,
        anomaly_type: Some(anomaly_type),
    })
}

fn anomaly_type(spans: &[FlatSpan]) -> AnomalyType {
    let latency = spans.iter().any(|s| s.latency.is_some_and(|v| v > 0));
    let structure = spans.iter().any(|s| s.structure.is_some_and(|v| v > 0));
    match (latency, structure) {
        (false, false) => AnomalyType::Normal,
        (true, false) => AnomalyType::LatencyOnly,
        (false, true) => AnomalyType::StructureOnly,
        (true, true) => AnomalyType::Both,
    }
}
