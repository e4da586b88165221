use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracegraph_core::error::{Result, TraceGraphError};
use tracegraph_core::graph::DependencyGraph;
use tracegraph_core::model::span::Trace;
use tracegraph_core::sequence::{Sequence, serialize};
use tracegraph_core::tree::SpanArena;
use tracegraph_store::Store;
use tracing::{debug, info, warn};

use crate::decode::{InputFormat, load_traces};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workers: usize,
    pub format: InputFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            format: InputFormat::Tree,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WrittenTrace {
    pub trace_id: String,
    pub path: PathBuf,
    pub edges: usize,
    /// Span ids on a cycle; the sequence fell back to insertion order.
    pub cycle: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailedItem {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub written: Vec<WrittenTrace>,
    pub failed_traces: Vec<FailedItem>,
    pub skipped_files: Vec<FailedItem>,
}

impl BatchReport {
    pub fn cyclic(&self) -> impl Iterator<Item = &WrittenTrace> {
        self.written.iter().filter(|w| w.cycle.is_some())
    }
}

/// Span tree to edge sequence for one trace. Structural problems abort only
/// this trace.
pub fn sequence_trace(trace: &Trace) -> Result<Sequence> {
    let arena = SpanArena::from_trace(trace)?;
    let graph = DependencyGraph::build(arena.spans());
    let sequence = serialize(&graph);
    debug!(
        trace_id = %trace.trace_id,
        spans = arena.len(),
        edges = sequence.records.len(),
        "sequenced trace"
    );
    Ok(sequence)
}

fn write_trace(store: &Store, trace: &Trace) -> Result<WrittenTrace> {
    let sequence = sequence_trace(trace)?;
    let path = store.write_sequence(&trace.trace_id, &sequence.lines())?;
    Ok(WrittenTrace {
        trace_id: trace.trace_id.clone(),
        path,
        edges: sequence.records.len(),
        cycle: sequence.cycle.map(|c| c.span_ids),
    })
}

/// Sequences traces one per blocking task, at most `workers` at a time.
#[derive(Debug, Clone)]
pub struct Pipeline {
    store: Store,
    cfg: PipelineConfig,
}

impl Pipeline {
    pub fn new(store: Store, cfg: PipelineConfig) -> Self {
        Self { store, cfg }
    }

    pub async fn run_files(&self, files: &[PathBuf]) -> BatchReport {
        let mut report = BatchReport::default();
        let mut traces = Vec::new();

        for path in files {
            match load_traces(path, self.cfg.format) {
                Ok(items) => {
                    for (trace_id, item) in items {
                        match item {
                            Ok(trace) => traces.push(trace),
                            Err(err) => {
                                warn!(trace_id = %trace_id, error = %err, "skipping trace");
                                report.failed_traces.push(FailedItem {
                                    id: trace_id,
                                    error: err.to_string(),
                                });
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable input file");
                    report.skipped_files.push(FailedItem {
                        id: path.display().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        let traced = self.run(traces).await;
        report.written = traced.written;
        report.failed_traces.extend(traced.failed_traces);
        report
    }

    pub async fn run(&self, traces: Vec<Trace>) -> BatchReport {
        let permits = Arc::new(Semaphore::new(self.cfg.workers.max(1)));
        let mut handles = Vec::with_capacity(traces.len());

        for trace in traces {
            let trace_id = trace.trace_id.clone();
            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    handles.push((trace_id, Err(TraceGraphError::Internal(err.to_string()))));
                    continue;
                }
            };
            let store = self.store.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                write_trace(&store, &trace)
            });
            handles.push((trace_id, Ok(handle)));
        }

        let mut report = BatchReport::default();
        for (trace_id, handle) in handles {
            let outcome = match handle {
                Ok(handle) => handle.await.unwrap_or_else(|e| {
                    Err(TraceGraphError::Internal(format!("worker join failed: {e}")))
                }),
                Err(err) => Err(err),
            };
            match outcome {
                Ok(written) => report.written.push(written),
                Err(err) => {
                    warn!(trace_id = %trace_id, error = %err, "trace not sequenced");
                    report.failed_traces.push(FailedItem {
                        id: trace_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            written = report.written.len(),
            cyclic = report.cyclic().count(),
            failed = report.failed_traces.len(),
            "batch complete"
        );
        report
    }
}
