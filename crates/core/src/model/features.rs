use std::fmt;

use serde::{Deserialize, Serialize};

pub const HEADER_TITLE: &str = "# 统计特征";

/// Latency features recovered from a serialized edge sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeatureSet {
    pub num_edges: usize,
    pub total_latency_ms: i64,
    pub max_edge_latency_ms: i64,
    pub mean_edge_latency_ms: i64,
    pub p95_edge_latency_ms: i64,
    pub max_edge_ratio: f64,
    /// Encounter-order position of the first maximal edge, `-1` without edges.
    pub bottleneck_index: i64,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self {
            num_edges: 0,
            total_latency_ms: 0,
            max_edge_latency_ms: 0,
            mean_edge_latency_ms: 0,
            p95_edge_latency_ms: 0,
            max_edge_ratio: 0.0,
            bottleneck_index: -1,
        }
    }
}

impl FeatureSet {
    /// The statistics header, terminated by a newline after the last field.
    pub fn header(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{HEADER_TITLE}")?;
        writeln!(f, "num_edges={}", self.num_edges)?;
        writeln!(f, "total_latency_ms={}", self.total_latency_ms)?;
        writeln!(f, "max_edge_latency_ms={}", self.max_edge_latency_ms)?;
        writeln!(f, "mean_edge_latency_ms={}", self.mean_edge_latency_ms)?;
        writeln!(f, "p95_edge_latency_ms={}", self.p95_edge_latency_ms)?;
        writeln!(f, "max_edge_ratio={:.4}", self.max_edge_ratio)?;
        writeln!(f, "bottleneck_index={}", self.bottleneck_index)
    }
}
