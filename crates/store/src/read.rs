use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracegraph_core::error::{Result, TraceGraphError};
use tracegraph_core::model::span::Trace;

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Reads a whole file, transparently gunzipping `*.gz`.
pub fn read_text(path: &Path) -> Result<String> {
    let file = File::open(path)
        .map_err(|e| TraceGraphError::Io(format!("failed to open {}: {e}", path.display())))?;
    let mut reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut out = String::new();
    reader
        .read_to_string(&mut out)
        .map_err(|e| TraceGraphError::Io(format!("failed to read {}: {e}", path.display())))?;
    Ok(out)
}

/// `*.jsonl` holds one record per line; anything else is a JSON array or a
/// single JSON object.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = read_text(path)?;
    if is_jsonl(path) {
        return raw
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).map_err(|e| {
                    TraceGraphError::Parse(format!("{}:{}: {e}", path.display(), n + 1))
                })
            })
            .collect();
    }

    let parsed: OneOrMany<T> = serde_json::from_str(&raw)
        .map_err(|e| TraceGraphError::Parse(format!("{}: {e}", path.display())))?;
    Ok(match parsed {
        OneOrMany::Many(v) => v,
        OneOrMany::One(v) => vec![v],
    })
}

pub fn read_traces(path: &Path) -> Result<Vec<Trace>> {
    read_records(path)
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

fn is_jsonl(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    name.ends_with(".jsonl")
}
