use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::model::span::Span;

/// Consecutive spans (by start time) further apart than this get no `time` edge.
pub const TIME_EDGE_MAX_GAP_MS: i64 = 2_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Declared parent/child invocation.
    Parent,
    /// Chronological adjacency within [`TIME_EDGE_MAX_GAP_MS`].
    Time,
}

/// Call graph over one trace. Nodes borrow spans from the trace that owns them.
#[derive(Debug, Default)]
pub struct DependencyGraph<'a> {
    graph: DiGraph<&'a Span, EdgeKind>,
    index: HashMap<&'a str, NodeIndex>,
}

impl<'a> DependencyGraph<'a> {
    /// Builds the graph from a flattened span list.
    ///
    /// Span ids are expected to be unique; on a duplicate the later span
    /// replaces the earlier one on the same node.
    pub fn build(spans: &[&'a Span]) -> Self {
        let mut graph = Self::default();

        for &span in spans {
            match graph.index.get(span.span_id.as_str()) {
                Some(&idx) => graph.graph[idx] = span,
                None => {
                    let idx = graph.graph.add_node(span);
                    graph.index.insert(span.span_id.as_str(), idx);
                }
            }
        }

        for &span in spans {
            if let Some(parent_id) = span.parent_span_id.as_deref()
                && !parent_id.is_empty()
                && let Some(&parent) = graph.index.get(parent_id)
            {
                let child = graph.index[span.span_id.as_str()];
                graph.add_edge(parent, child, EdgeKind::Parent);
            }
        }

        let mut by_start = spans.to_vec();
        by_start.sort_by_key(|s| s.start_time);
        let max_gap = chrono::Duration::milliseconds(TIME_EDGE_MAX_GAP_MS);
        for pair in by_start.windows(2) {
            let gap = pair[1].start_time - pair[0].start_time;
            if gap > chrono::Duration::zero() && gap <= max_gap {
                let from = graph.index[pair[0].span_id.as_str()];
                let to = graph.index[pair[1].span_id.as_str()];
                graph.add_edge(from, to, EdgeKind::Time);
            }
        }

        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "built dependency graph"
        );
        graph
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeKind) {
        let exists = self
            .graph
            .edges_connecting(from, to)
            .any(|e| *e.weight() == kind);
        if !exists {
            self.graph.add_edge(from, to, kind);
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Spans in node insertion order.
    pub fn spans(&self) -> Vec<&'a Span> {
        self.graph.node_indices().map(|idx| self.graph[idx]).collect()
    }

    /// `(from, to, kind)` in edge insertion order.
    pub fn edges(&self) -> Vec<(&'a str, &'a str, EdgeKind)> {
        self.graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].span_id.as_str(),
                    self.graph[e.target()].span_id.as_str(),
                    *e.weight(),
                )
            })
            .collect()
    }

    /// `None` when `time` and `parent` edges close a cycle.
    pub fn topological_order(&self) -> Option<Vec<&'a Span>> {
        toposort(&self.graph, None)
            .ok()
            .map(|order| order.into_iter().map(|idx| self.graph[idx]).collect())
    }

    /// Span ids taking part in a cycle, in node insertion order.
    pub fn cyclic_span_ids(&self) -> Vec<&'a str> {
        let mut cyclic: Vec<NodeIndex> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || self.graph.find_edge(scc[0], scc[0]).is_some()
            })
            .flatten()
            .collect();
        cyclic.sort();
        cyclic
            .into_iter()
            .map(|idx| self.graph[idx].span_id.as_str())
            .collect()
    }

    /// Source of the first-inserted incoming `parent` edge, if any.
    pub fn causal_parent(&self, span_id: &str) -> Option<&'a Span> {
        let &idx = self.index.get(span_id)?;
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|e| *e.weight() == EdgeKind::Parent)
            .min_by_key(|e| e.id())
            .map(|e| self.graph[e.source()])
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
    }

    fn span(id: &str, parent: Option<&str>, offset_ms: i64) -> Span {
        Span {
            trace_id: "t1".into(),
            span_id: id.into(),
            parent_span_id: parent.map(str::to_string),
            children: vec![],
            start_time: base() + Duration::milliseconds(offset_ms),
            duration: 10.0,
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

    #[test]
    fn empty_input_gives_empty_graph() {
        let graph = DependencyGraph::build(&[]);
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn adds_parent_and_time_edges() {
        let a = span("a", None, 0);
        let b = span("b", Some("a"), 5);
        let c = span("c", Some("a"), 5_000);
        let graph = DependencyGraph::build(&[&a, &b, &c]);

        assert_eq!(graph.node_count(), 3);
        let edges = graph.edges();
        assert!(edges.contains(&("a", "b", EdgeKind::Parent)));
        assert!(edges.contains(&("a", "c", EdgeKind::Parent)));
        assert!(edges.contains(&("a", "b", EdgeKind::Time)));
        // 4995ms apart: no temporal edge
        assert!(!edges.contains(&("b", "c", EdgeKind::Time)));
        assert_eq!(edges.len(), 3);
    }

    #[test]
    fn time_gap_bounds() {
        let a = span("a", None, 0);
        let b = span("b", None, 0);
        let c = span("c", None, 2_000);
        let d = span("d", None, 4_001);
        let graph = DependencyGraph::build(&[&a, &b, &c, &d]);
        let edges = graph.edges();
        // equal start times: gap is zero
        assert!(!edges.contains(&("a", "b", EdgeKind::Time)));
        assert!(edges.contains(&("b", "c", EdgeKind::Time)));
        assert!(!edges.contains(&("c", "d", EdgeKind::Time)));
    }

    #[test]
    fn missing_parent_leaves_root() {
        let a = span("a", Some("elsewhere"), 0);
        let graph = DependencyGraph::build(&[&a]);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.causal_parent("a").is_none());
    }

    #[test]
    fn duplicate_id_last_write_wins() {
        let first = span("a", None, 0);
        let mut second = span("a", None, 0);
        second.service_name = "replacement".into();
        let graph = DependencyGraph::build(&[&first, &second]);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.spans()[0].service_name, "replacement");
    }

    #[test]
    fn detects_cycle_between_parent_and_time_edges() {
        // child starts before its parent: parent a->b, time b->a
        let a = span("a", None, 100);
        let b = span("b", Some("a"), 0);
        let graph = DependencyGraph::build(&[&a, &b]);
        assert!(graph.topological_order().is_none());
        assert_eq!(graph.cyclic_span_ids(), vec!["a", "b"]);
    }

    #[test]
    fn causal_parent_ignores_time_edges() {
        let a = span("a", None, 0);
        let b = span("b", None, 10);
        let graph = DependencyGraph::build(&[&a, &b]);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.causal_parent("b").is_none());
    }
}
