use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceGraphError};

/// Source recorded for spans with no causal predecessor in the graph.
pub const EXTERNAL_CALLER: &str = "Client";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CommType {
    Http,
    Grpc,
    Database,
    Rpc,
    Unknown,
}

impl CommType {
    /// Priority order: HTTP, grpc, DB/SQL, then generic RPC.
    pub fn classify(operation_name: Option<&str>) -> Self {
        let Some(op) = operation_name else {
            return Self::Unknown;
        };
        let upper = op.to_uppercase();
        if upper.contains("HTTP") {
            Self::Http
        } else if op.to_lowercase().contains("grpc") {
            Self::Grpc
        } else if upper.contains("DB") || upper.contains("SQL") {
            Self::Database
        } else {
            Self::Rpc
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Grpc => "GRPC",
            Self::Database => "DATABASE",
            Self::Rpc => "RPC",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for CommType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommType {
    type Err = TraceGraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HTTP" => Ok(Self::Http),
            "GRPC" => Ok(Self::Grpc),
            "DATABASE" => Ok(Self::Database),
            "RPC" => Ok(Self::Rpc),
            "UNKNOWN" => Ok(Self::Unknown),
            other => Err(TraceGraphError::Parse(format!(
                "unknown communication type: {other}"
            ))),
        }
    }
}

/// One serialized call edge. `Display` produces the wire line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EdgeRecord {
    pub edge_id: String,
    pub source: String,
    pub destination: String,
    pub comm_type: CommType,
    pub start_ms: i64,
    pub finish_ms: i64,
}

impl fmt::Display for EdgeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Edge ID is {}, Source is {}, Destination is {}, Type is {}, \
             Communication starts at {} ms, Communication finishes at {} ms].",
            self.edge_id,
            self.source,
            self.destination,
            self.comm_type,
            self.start_ms,
            self.finish_ms
        )
    }
}

fn edge_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\[Edge ID is (?P<id>.*?), Source is (?P<src>.*?), Destination is (?P<dst>.*?), Type is (?P<ty>[A-Z]+), Communication starts at (?P<start>-?\d+) ms, Communication finishes at (?P<finish>-?\d+) ms",
        )
        .expect("edge line regex")
    })
}

impl FromStr for EdgeRecord {
    type Err = TraceGraphError;

    /// Accepts both plain and duration-annotated lines.
    fn from_str(line: &str) -> Result<Self> {
        let caps = edge_line_re()
            .captures(line)
            .ok_or_else(|| TraceGraphError::Parse(format!("not an edge record: {line}")))?;
        let int = |name: &str| {
            caps[name]
                .parse::<i64>()
                .map_err(|e| TraceGraphError::Parse(format!("bad {name} in edge record: {e}")))
        };

        Ok(Self {
            edge_id: caps["id"].to_string(),
            source: caps["src"].to_string(),
            destination: caps["dst"].to_string(),
            comm_type: caps["ty"].parse()?,
            start_ms: int("start")?,
            finish_ms: int("finish")?,
        })
    }
}
