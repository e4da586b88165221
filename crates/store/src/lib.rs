pub mod discover;
pub mod layout;
pub mod read;
pub mod write;

pub use layout::Store;
