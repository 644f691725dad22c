//! Turning harvested listings into stored records.

pub mod gate;
pub mod price;
pub mod slug;
pub mod store;

pub use gate::{PersistenceGate, SaveOutcome, SaveReport};
pub use price::to_minor_units;
pub use store::{JsonFileStore, ListingStore, MemoryStore, NewRecord, PersistedRecord};
