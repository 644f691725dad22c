//! CLI command implementations.

pub mod classify;
pub mod search;

pub use classify::ClassifyCommand;
pub use search::SearchCommand;
