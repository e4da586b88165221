use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracegraph_core::error::{Result, TraceGraphError};
use tracegraph_core::sequence::render_trace_file;

use crate::Store;

impl Store {
    /// Writes the framed sequence file for one trace, replacing any previous one.
    pub fn write_sequence(&self, trace_id: &str, lines: &[String]) -> Result<PathBuf> {
        let path = self.trace_path(trace_id);
        fs::write(&path, render_trace_file(trace_id, lines))
            .map_err(|e| TraceGraphError::Io(format!("write {} failed: {e}", path.display())))?;
        Ok(path)
    }
}

/// One JSON object per line, non-ASCII kept as-is.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut out = create(path)?;
    for record in records {
        serde_json::to_writer(&mut out, record)
            .map_err(|e| TraceGraphError::Internal(format!("encode record failed: {e}")))?;
        out.write_all(b"\n")
            .map_err(|e| TraceGraphError::Io(format!("write {} failed: {e}", path.display())))?;
    }
    out.flush()
        .map_err(|e| TraceGraphError::Io(format!("flush {} failed: {e}", path.display())))
}

pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut out = create(path)?;
    serde_json::to_writer_pretty(&mut out, value)
        .map_err(|e| TraceGraphError::Internal(format!("encode json failed: {e}")))?;
    out.flush()
        .map_err(|e| TraceGraphError::Io(format!("flush {} failed: {e}", path.display())))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| {
            TraceGraphError::Io(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let file = File::create(path)
        .map_err(|e| TraceGraphError::Io(format!("failed to create {}: {e}", path.display())))?;
    Ok(BufWriter::new(file))
}
