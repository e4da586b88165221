use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracegraph_core::error::{Result, TraceGraphError};

/// Output directory holding one `<trace_id>.txt` sequence file per trace.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub root: String,
    pub trace_files: usize,
    pub total_bytes: u64,
}

impl Store {
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| {
            TraceGraphError::Io(format!("failed to create {}: {e}", root.display()))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trace_path(&self, trace_id: &str) -> PathBuf {
        self.root.join(format!("{}.txt", file_stem(trace_id)))
    }

    pub fn status(&self) -> Result<StoreStatus> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            TraceGraphError::Io(format!("failed to list {}: {e}", self.root.display()))
        })?;

        let mut trace_files = 0;
        let mut total_bytes = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "txt") {
                trace_files += 1;
                total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }

        Ok(StoreStatus {
            root: self.root.display().to_string(),
            trace_files,
            total_bytes,
        })
    }
}

/// Trace ids come from input data; keep them from escaping the output dir.
fn file_stem(trace_id: &str) -> String {
    let stem: String = trace_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        stem
    }
}
