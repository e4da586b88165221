use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TraceGraphError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    #[serde(default, alias = "children_span_list")]
    pub children: Vec<Span>,
    pub start_time: DateTime<Utc>,
    /// Milliseconds.
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

impl Span {
    pub fn start_ms(&self) -> i64 {
        self.start_time.timestamp_millis()
    }

    pub fn finish_ms(&self) -> i64 {
        self.start_ms() + self.duration as i64
    }
}

/// Source data writes flags as `0`/`1` as often as `false`/`true`; null is unset.
pub fn flag<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
    }
    Ok(match Option::<Raw>::deserialize(de)? {
        Some(Raw::Bool(b)) => b,
        Some(Raw::Int(n)) => n != 0,
        None => false,
    })
}

/// Accepts the numeric code or the snake_case name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", try_from = "AnomalyTypeRepr")]
pub enum AnomalyType {
    Normal,
    LatencyOnly,
    StructureOnly,
    Both,
}

impl TryFrom<u8> for AnomalyType {
    type Error = TraceGraphError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Normal),
            1 => Ok(Self::LatencyOnly),
            2 => Ok(Self::StructureOnly),
            3 => Ok(Self::Both),
            other => Err(TraceGraphError::Parse(format!(
                "unknown anomaly type code: {other}"
            ))),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnomalyTypeRepr {
    Code(u8),
    Name(String),
}

impl TryFrom<AnomalyTypeRepr> for AnomalyType {
    type Error = TraceGraphError;

    fn try_from(raw: AnomalyTypeRepr) -> Result<Self, Self::Error> {
        match raw {
            AnomalyTypeRepr::Code(code) => Self::try_from(code),
            AnomalyTypeRepr::Name(name) => match name.as_str() {
                "normal" => Ok(Self::Normal),
                "latency_only" => Ok(Self::LatencyOnly),
                "structure_only" => Ok(Self::StructureOnly),
                "both" => Ok(Self::Both),
                other => Err(TraceGraphError::Parse(format!(
                    "unknown anomaly type: {other}"
                ))),
            },
        }
    }
}

impl AnomalyType {
    pub fn code(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::LatencyOnly => 1,
            Self::StructureOnly => 2,
            Self::Both => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trace {
    pub trace_id: String,
    /// `None` when the source recorded a null root; rejected by the arena.
    pub root_span: Option<Span>,
    #[serde(default)]
    pub span_count: usize,
    #[serde(default)]
    pub anomaly_type: Option<AnomalyType>,
}
