use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceGraphError {
    #[error("structural error: {0}")]
    Structural(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, TraceGraphError>;
