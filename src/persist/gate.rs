//! Dedup, classify and store harvested listings.

use crate::classify::{quantity, HybridClassifier};
use crate::marketplace::{Listing, SearchBatch};
use crate::persist::price::to_minor_units;
use crate::persist::slug::{slugify, with_suffix};
use crate::persist::store::{ListingStore, NewRecord, PersistedRecord};
use anyhow::Result;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// What happened to one listing.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Inserted(PersistedRecord),
    /// A record with the same link already exists
    Duplicate,
    /// The listing could not be turned into a record, e.g. unparseable price
    Rejected(String),
}

/// Counts of a save run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    /// Store errors
    pub failed: usize,
}

impl SaveReport {
    pub fn total(&self) -> usize {
        self.inserted + self.duplicates + self.rejected + self.failed
    }

    fn record(&mut self, outcome: &SaveOutcome) {
        match outcome {
            SaveOutcome::Inserted(_) => self.inserted += 1,
            SaveOutcome::Duplicate => self.duplicates += 1,
            SaveOutcome::Rejected(_) => self.rejected += 1,
        }
    }
}

/// Hands classified, deduplicated listings to a [`ListingStore`].
pub struct PersistenceGate<S: ListingStore> {
    store: S,
    classifier: HybridClassifier,
}

impl<S: ListingStore> PersistenceGate<S> {
    pub fn new(store: S, classifier: HybridClassifier) -> Self {
        Self { store, classifier }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Saves one listing unless its link is already stored.
    pub async fn save_listing(&self, listing: &Listing) -> Result<SaveOutcome> {
        let price_minor_units = match to_minor_units(&listing.price) {
            Ok(price) => price,
            Err(e) => {
                warn!(op = "gate.price", recovered = true, link = %listing.link, "Skipping listing: {:#}", e);
                return Ok(SaveOutcome::Rejected(e.to_string()));
            }
        };

        if let Some(existing) = self.store.find_by_link(&listing.link).await? {
            info!("Listing {} already stored as {}, skipping", listing.link, existing.id);
            return Ok(SaveOutcome::Duplicate);
        }

        let classification = self.classifier.classify(&listing.title).await;
        let quantity =
            classification.extracted_info.quantity.or_else(|| quantity::first_number(&listing.title));
        let slug = self.unique_slug(&listing.title).await?;

        debug!(
            "Storing '{}' as {} ({}, quantity {:?})",
            listing.title, slug, classification.product_type, quantity
        );

        let record = self
            .store
            .insert(NewRecord {
                link: listing.link.clone(),
                title: listing.title.clone(),
                slug,
                price_minor_units,
                quantity,
                availability: true,
                source_provider: listing.source.clone(),
                product_type: classification.product_type,
            })
            .await?;

        Ok(SaveOutcome::Inserted(record))
    }

    /// Saves listings in order. A store error on one listing is counted and
    /// the rest are still attempted.
    pub async fn save_listings<'a>(&self, listings: impl IntoIterator<Item = &'a Listing>) -> SaveReport {
        let mut report = SaveReport::default();

        for listing in listings {
            match self.save_listing(listing).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    error!(op = "gate.save", recovered = true, link = %listing.link, "Failed to store listing: {:#}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Saved {} listings ({} duplicates, {} rejected, {} failed)",
            report.inserted, report.duplicates, report.rejected, report.failed
        );
        report
    }

    /// Saves every listing of a search batch.
    pub async fn save_batch(&self, batch: &SearchBatch) -> SaveReport {
        self.save_listings(batch.listings()).await
    }

    /// Slug of `title`, suffixed "-1", "-2", ... until it is free.
    async fn unique_slug(&self, title: &str) -> Result<String> {
        let base = slugify(title);
        if !self.store.slug_exists(&base).await? {
            return Ok(base);
        }

        let mut n = 1;
        loop {
            let candidate = with_suffix(&base, n);
            if !self.store.slug_exists(&candidate).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }
}
