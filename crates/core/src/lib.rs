pub mod annotate;
pub mod config;
pub mod error;
pub mod graph;
pub mod model;
pub mod sequence;
pub mod tree;

pub use error::{Result, TraceGraphError};
