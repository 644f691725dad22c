//! Mercado Livre specific modules: browser automation, extraction rules,
//! the page extractor and the search session.

pub mod browser;
pub mod extractor;
pub mod models;
pub mod selectors;
pub mod session;

pub use browser::{ChromeLauncher, DriverLauncher, PageDriver};
pub use extractor::{ExtractedPage, Extractor, NextControl};
pub use models::{Listing, MaxPages, PaginationState, RawListing, SearchBatch, SearchConfig, TermResults};
pub use selectors::{ExtractionRules, RuleTable, RULES_VERSION};
pub use session::{harvest, MercadoLivreScraper, Scraper, SearchPhase};
