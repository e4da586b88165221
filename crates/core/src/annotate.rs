//! Latency features computed from the textual edge protocol alone.
//!
//! Nothing here knows about spans or graphs: any text whose edge lines start
//! with `[` and carry `starts at <N> ms ... finishes at <N> ms` can be fed in.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::features::FeatureSet;

const P95: f64 = 0.95;

fn start_finish_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)starts\s+at\s*(\d+)\s*ms.*?finishes\s+at\s*(\d+)\s*ms")
            .expect("start/finish regex")
    })
}

fn duration_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(, duration=\d+ ms\]\.?| \(duration=\d+ ms\))\s*$")
            .expect("duration suffix regex")
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    /// Statistics header, a blank line, then every non-blank input line in order.
    pub text: String,
    pub features: FeatureSet,
    /// Per-edge durations in encounter order.
    pub durations: Vec<i64>,
}

pub fn annotate(text: &str) -> Annotation {
    let mut durations = Vec::new();
    let mut earliest: Option<i64> = None;
    let mut latest: Option<i64> = None;
    let mut lines = Vec::new();

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let Some((start, finish)) = edge_timing(line) else {
            lines.push(line.to_string());
            continue;
        };

        let duration = (finish - start).max(0);
        durations.push(duration);
        earliest = Some(earliest.map_or(start, |e| e.min(start)));
        latest = Some(latest.map_or(finish, |l| l.max(finish)));
        lines.push(with_duration(line, duration));
    }

    let features = compute_features(&durations, earliest, latest);
    let text = format!("{}\n{}", features.header(), lines.join("\n"));
    Annotation {
        text,
        features,
        durations,
    }
}

/// `(start, finish)` for a bracketed edge line; `None` is a parse miss.
fn edge_timing(line: &str) -> Option<(i64, i64)> {
    if !line.starts_with('[') {
        return None;
    }
    let caps = start_finish_re().captures(line)?;
    let start = caps[1].parse::<i64>().ok()?;
    let finish = caps[2].parse::<i64>().ok()?;
    Some((start, finish))
}

fn with_duration(line: &str, duration: i64) -> String {
    if duration_suffix_re().is_match(line) {
        return line.to_string();
    }
    let trimmed = line.trim_end();
    if let Some(body) = trimmed.strip_suffix("].") {
        format!("{body}, duration={duration} ms].")
    } else if let Some(body) = trimmed.strip_suffix(']') {
        format!("{body}, duration={duration} ms]")
    } else {
        format!("{line} (duration={duration} ms)")
    }
}

pub fn compute_features(
    durations: &[i64],
    earliest: Option<i64>,
    latest: Option<i64>,
) -> FeatureSet {
    if durations.is_empty() {
        return FeatureSet::default();
    }

    let sum = durations.iter().fold(0i64, |acc, &d| acc.saturating_add(d));
    let total_latency_ms = match (earliest, latest) {
        (Some(e), Some(l)) if l >= e => l.saturating_sub(e),
        _ => sum,
    };
    let max_edge_latency_ms = durations.iter().copied().max().unwrap_or(0);
    let mean_edge_latency_ms = sum / durations.len() as i64;
    let max_edge_ratio = if total_latency_ms > 0 {
        max_edge_latency_ms as f64 / total_latency_ms as f64
    } else {
        0.0
    };
    let bottleneck_index = durations
        .iter()
        .position(|&d| d == max_edge_latency_ms)
        .map_or(-1, |i| i as i64);

    FeatureSet {
        num_edges: durations.len(),
        total_latency_ms,
        max_edge_latency_ms,
        mean_edge_latency_ms,
        p95_edge_latency_ms: nearest_rank(durations, P95),
        max_edge_ratio,
        bottleneck_index,
    }
}

/// Nearest-rank percentile: no interpolation, index `ceil(q * n) - 1`.
pub fn nearest_rank(values: &[i64], q: f64) -> i64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let rank = (q * sorted.len() as f64).ceil() as i64 - 1;
    let idx = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[idx]
}
