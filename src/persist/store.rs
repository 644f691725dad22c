//! Record storage behind a lookup/insert seam.

use crate::classify::ProductType;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A stored, classified listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    pub id: String,
    /// Unique
    pub link: String,
    pub title: String,
    /// Unique, derived from the title
    pub slug: String,
    pub price_minor_units: i64,
    pub quantity: Option<u32>,
    pub availability: bool,
    pub source_provider: String,
    pub product_type: ProductType,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to create a record; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub link: String,
    pub title: String,
    pub slug: String,
    pub price_minor_units: i64,
    pub quantity: Option<u32>,
    pub availability: bool,
    pub source_provider: String,
    pub product_type: ProductType,
}

/// Trait for record storage - enables swapping backends and mocking.
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn find_by_link(&self, link: &str) -> Result<Option<PersistedRecord>>;

    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    /// Stores a record. Fails if its link or slug is already taken.
    async fn insert(&self, record: NewRecord) -> Result<PersistedRecord>;
}

/// Records plus the uniqueness rules both stores share.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordSet {
    records: Vec<PersistedRecord>,
}

impl RecordSet {
    fn find_by_link(&self, link: &str) -> Option<&PersistedRecord> {
        self.records.iter().find(|r| r.link == link)
    }

    fn slug_exists(&self, slug: &str) -> bool {
        self.records.iter().any(|r| r.slug == slug)
    }

    fn insert(&mut self, record: NewRecord) -> Result<PersistedRecord> {
        if self.find_by_link(&record.link).is_some() {
            bail!("A record with link {} already exists", record.link);
        }
        if self.slug_exists(&record.slug) {
            bail!("A record with slug {} already exists", record.slug);
        }

        let stored = PersistedRecord {
            id: format!("{:08}", self.records.len() + 1),
            link: record.link,
            title: record.title,
            slug: record.slug,
            price_minor_units: record.price_minor_units,
            quantity: record.quantity,
            availability: record.availability,
            source_provider: record.source_provider,
            product_type: record.product_type,
            created_at: Utc::now(),
        };

        self.records.push(stored.clone());
        Ok(stored)
    }
}

/// Process-local store, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<RecordSet>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records in insertion order.
    pub async fn records(&self) -> Vec<PersistedRecord> {
        self.inner.lock().await.records.clone()
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn find_by_link(&self, link: &str) -> Result<Option<PersistedRecord>> {
        Ok(self.inner.lock().await.find_by_link(link).cloned())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        Ok(self.inner.lock().await.slug_exists(slug))
    }

    async fn insert(&self, record: NewRecord) -> Result<PersistedRecord> {
        self.inner.lock().await.insert(record)
    }
}

/// Store backed by a JSON file, rewritten after every insert.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: Mutex<RecordSet>,
}

impl JsonFileStore {
    /// Opens the store, loading existing records if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let set = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store file: {}", path.display()))?;
            let set: RecordSet = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse store file: {}", path.display()))?;
            info!("Loaded {} records from {}", set.records.len(), path.display());
            set
        } else {
            debug!("Store file {} does not exist yet", path.display());
            RecordSet::default()
        };

        Ok(Self { path, inner: Mutex::new(set) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn records(&self) -> Vec<PersistedRecord> {
        self.inner.lock().await.records.clone()
    }
}

#[async_trait]
impl ListingStore for JsonFileStore {
    async fn find_by_link(&self, link: &str) -> Result<Option<PersistedRecord>> {
        Ok(self.inner.lock().await.find_by_link(link).cloned())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        Ok(self.inner.lock().await.slug_exists(slug))
    }

    async fn insert(&self, record: NewRecord) -> Result<PersistedRecord> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut set = self.inner.lock().await;
        let stored = set.insert(record)?;

        let written = match serde_json::to_string_pretty(&*set) {
            Ok(json) => tokio::fs::write(&self.path, json).await.map_err(anyhow::Error::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = written {
            // Keep memory and disk in step
            set.records.pop();
            return Err(e.context(format!("Failed to write store file: {}", self.path.display())));
        }

        Ok(stored)
    }
}
