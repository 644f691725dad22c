//! Search command implementation.

use crate::config::{Config, OutputFormat};
use crate::format::Formatter;
use crate::marketplace::{harvest, MercadoLivreScraper, Scraper, SearchBatch};
use crate::persist::{JsonFileStore, MemoryStore, PersistenceGate, SaveReport};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// JSON shape of a search run that also saved its listings.
#[derive(Serialize)]
struct SavedResults<'a> {
    results: &'a SearchBatch,
    saved: SaveReport,
}

/// Harvests listings for a set of terms and optionally stores them.
pub struct SearchCommand {
    config: Config,
}

impl SearchCommand {
    /// Creates a new search command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Runs the search in a local browser and returns formatted output.
    /// Empty `terms` searches the configured default terms.
    pub async fn execute(&self, terms: &[String], save: bool) -> Result<String> {
        let rules = self.config.extraction_rules().context("Failed to load extraction rules")?;
        debug!("Using extraction rules {}", rules.version);

        let mut scraper = MercadoLivreScraper::new(self.config.search_config(), Arc::new(rules));
        self.execute_with_scraper(&mut scraper, terms, save).await
    }

    /// Runs the search with a provided scraper (for testing).
    pub async fn execute_with_scraper(
        &self,
        scraper: &mut impl Scraper,
        terms: &[String],
        save: bool,
    ) -> Result<String> {
        let terms = if terms.is_empty() { self.config.terms.clone() } else { terms.to_vec() };
        info!("Harvesting {} terms from {}", terms.len(), scraper.source());

        let batch = harvest(scraper, &terms)
            .await
            .with_context(|| format!("Harvest from {} aborted", scraper.source()))?;

        info!("Found {} listings", batch.total());

        let formatter = Formatter::new(self.config.format);
        if !save {
            return Ok(formatter.format_batch(&batch));
        }

        let report = self.save(&batch).await?;

        if self.config.format == OutputFormat::Json {
            let combined = SavedResults { results: &batch, saved: report };
            return serde_json::to_string_pretty(&combined).context("Failed to serialize results");
        }

        Ok(format!("{}\n\n{}", formatter.format_batch(&batch), formatter.format_report(&report)))
    }

    async fn save(&self, batch: &SearchBatch) -> Result<SaveReport> {
        let classifier = self.config.classifier();

        match &self.config.store_path {
            Some(path) => {
                let store = JsonFileStore::open(path)?;
                Ok(PersistenceGate::new(store, classifier).save_batch(batch).await)
            }
            None => {
                warn!("No store_path configured, saved records are kept in memory only");
                Ok(PersistenceGate::new(MemoryStore::new(), classifier).save_batch(batch).await)
            }
        }
    }
}
