pub mod edge;
pub mod features;
pub mod span;
