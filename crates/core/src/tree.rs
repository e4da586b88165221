use std::collections::HashMap;

use crate::error::{Result, TraceGraphError};
use crate::model::span::{Span, Trace};

/// Pre-order walk of the ownership tree: parent first, children in stored order.
pub fn flatten(root: &Span) -> Vec<&Span> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(span) = stack.pop() {
        out.push(span);
        stack.extend(span.children.iter().rev());
    }
    out
}

/// Flattened view of one trace with parent back-references by index.
///
/// Parents here come from tree ownership, not from `parent_span_id`; the two
/// usually agree, but the dependency graph only trusts the declared id.
#[derive(Debug)]
pub struct SpanArena<'a> {
    spans: Vec<&'a Span>,
    parents: Vec<Option<usize>>,
    index: HashMap<&'a str, usize>,
}

impl<'a> SpanArena<'a> {
    pub fn from_trace(trace: &'a Trace) -> Result<Self> {
        let root = trace.root_span.as_ref().ok_or_else(|| {
            TraceGraphError::Structural(format!("trace {} has no root span", trace.trace_id))
        })?;
        Self::from_root(root)
    }

    pub fn from_root(root: &'a Span) -> Result<Self> {
        let mut arena = Self {
            spans: Vec::new(),
            parents: Vec::new(),
            index: HashMap::new(),
        };
        let mut stack: Vec<(&'a Span, Option<usize>)> = vec![(root, None)];
        while let Some((span, parent)) = stack.pop() {
            let idx = arena.spans.len();
            if arena.index.insert(span.span_id.as_str(), idx).is_some() {
                return Err(TraceGraphError::Structural(format!(
                    "duplicate span id {} in trace {}",
                    span.span_id, span.trace_id
                )));
            }
            arena.spans.push(span);
            arena.parents.push(parent);
            stack.extend(span.children.iter().rev().map(|c| (c, Some(idx))));
        }
        Ok(arena)
    }

    pub fn spans(&self) -> &[&'a Span] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn get(&self, span_id: &str) -> Option<&'a Span> {
        self.index.get(span_id).map(|&idx| self.spans[idx])
    }

    pub fn parent_of(&self, idx: usize) -> Option<usize> {
        self.parents.get(idx).copied().flatten()
    }

    pub fn depth_of(&self, idx: usize) -> usize {
        let mut depth = 0;
        let mut cur = self.parent_of(idx);
        while let Some(p) = cur {
            depth += 1;
            cur = self.parent_of(p);
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn span(id: &str, parent: Option<&str>, children: Vec<Span>) -> Span {
        Span {
            trace_id: "t1".into(),
            span_id: id.into(),
            parent_span_id: parent.map(str::to_string),
            children,
            start_time: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            duration: 1.0,
            service_name: format!("svc-{id}"),
            operation_name: None,
            status_code: None,
            anomaly: false,
            root_cause: None,
            latency: None,
            structure: None,
            extra: None,
        }
    }

    fn sample() -> Span {
        span(
            "a",
            None,
            vec![
                span("b", Some("a"), vec![span("d", Some("b"), vec![])]),
                span("c", Some("a"), vec![]),
            ],
        )
    }

    #[test]
    fn flattens_in_pre_order() {
        let root = sample();
        let ids: Vec<_> = flatten(&root).iter().map(|s| s.span_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "d", "c"]);
    }

    #[test]
    fn arena_tracks_parents_and_depth() {
        let root = sample();
        let arena = SpanArena::from_root(&root).unwrap();
        assert_eq!(arena.len(), 4);
        assert_eq!(arena.parent_of(0), None);
        assert_eq!(arena.parent_of(2), Some(1));
        assert_eq!(arena.depth_of(2), 2);
        assert_eq!(arena.get("c").map(|s| s.service_name.as_str()), Some("svc-c"));
        assert!(arena.get("zz").is_none());
    }

    #[test]
    fn rejects_null_root() {
        let trace = Trace {
            trace_id: "t1".into(),
            root_span: None,
            span_count: 0,
            anomaly_type: None,
        };
        let err = SpanArena::from_trace(&trace).unwrap_err();
        assert!(matches!(err, TraceGraphError::Structural(_)));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let root = span("a", None, vec![span("a", Some("a"), vec![])]);
        assert!(matches!(
            SpanArena::from_root(&root),
            Err(TraceGraphError::Structural(_))
        ));
    }
}
