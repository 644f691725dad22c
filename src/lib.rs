//! ml-harvester - Mercado Livre listing harvester
//!
//! Drives a headless browser through marketplace search results, classifies
//! each listing title and hands the classified records to a store.

pub mod classify;
pub mod commands;
pub mod config;
pub mod error;
pub mod format;
pub mod marketplace;
pub mod persist;

pub use classify::{ClassificationResult, HybridClassifier, ProductType};
pub use config::Config;
pub use error::HarvestError;
pub use marketplace::{Listing, MaxPages, SearchBatch, SearchConfig};
pub use persist::{PersistenceGate, SaveReport};
