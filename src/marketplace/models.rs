//! Data models for listings, pagination policy and batch results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

/// A listing as read off one results page, before run metadata is attached.
///
/// Only constructible with non-empty title, price and link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListing {
    title: String,
    price: String,
    link: String,
    image: Option<String>,
}

impl RawListing {
    /// Builds a raw listing, or `None` if any required field is blank.
    pub fn new(
        title: impl Into<String>,
        price: impl Into<String>,
        link: impl Into<String>,
        image: Option<String>,
    ) -> Option<Self> {
        let title = title.into().trim().to_string();
        let price = price.into().trim().to_string();
        let link = link.into().trim().to_string();

        if title.is_empty() || price.is_empty() || link.is_empty() {
            return None;
        }

        let image = image.map(|i| i.trim().to_string()).filter(|i| !i.is_empty());
        Some(Self { title, price, link, image })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn price(&self) -> &str {
        &self.price
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }
}

/// A harvested listing stamped with its source and extraction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Listing title as shown on the results page
    pub title: String,
    /// Localized price text, e.g. "R$ 1.234,56"
    pub price: String,
    /// Canonical listing URL, the natural dedup key
    pub link: String,
    /// Thumbnail URL if the card had one
    pub image: Option<String>,
    /// Marketplace tag, e.g. "mercadolivre"
    pub source: String,
    /// When the listing was read
    pub extracted_at: DateTime<Utc>,
}

impl Listing {
    /// Attaches run metadata to a raw listing.
    pub fn stamp(raw: RawListing, source: &str, extracted_at: DateTime<Utc>) -> Self {
        Self {
            title: raw.title,
            price: raw.price,
            link: raw.link,
            image: raw.image,
            source: source.to_string(),
            extracted_at,
        }
    }
}

/// How many result pages a search may visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxPages {
    Limit(NonZeroU32),
    All,
}

impl MaxPages {
    /// Creates a finite page cap. Returns `None` for zero.
    pub fn limit(pages: u32) -> Option<Self> {
        NonZeroU32::new(pages).map(MaxPages::Limit)
    }

    /// Returns true if visiting `page` (1-based) is within the policy.
    pub fn allows(&self, page: u32) -> bool {
        match self {
            MaxPages::All => true,
            MaxPages::Limit(max) => page <= max.get(),
        }
    }
}

impl Default for MaxPages {
    fn default() -> Self {
        MaxPages::Limit(NonZeroU32::new(3).unwrap_or(NonZeroU32::MIN))
    }
}

impl FromStr for MaxPages {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") || s.eq_ignore_ascii_case("allpages") {
            return Ok(MaxPages::All);
        }

        let pages: u32 =
            s.parse().map_err(|_| format!("Invalid max pages: {}. Use a positive number or 'all'", s))?;
        MaxPages::limit(pages).ok_or_else(|| "Max pages must be greater than zero".to_string())
    }
}

impl fmt::Display for MaxPages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxPages::All => write!(f, "all"),
            MaxPages::Limit(n) => write!(f, "{}", n),
        }
    }
}

impl Serialize for MaxPages {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MaxPages::All => serializer.serialize_str("all"),
            MaxPages::Limit(n) => serializer.serialize_u32(n.get()),
        }
    }
}

impl<'de> Deserialize<'de> for MaxPages {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => u32::try_from(n)
                .ok()
                .and_then(MaxPages::limit)
                .ok_or_else(|| serde::de::Error::custom("max_pages must be a positive integer")),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Settings one search session runs under.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub headless: bool,
    pub delay_ms: u64,
    pub delay_jitter_ms: u64,
    pub term_delay_ms: u64,
    pub max_pages: MaxPages,
    pub navigation_timeout: Duration,
    pub selector_timeout: Duration,
    pub base_url: String,
    pub listing_base_url: String,
    pub user_agent: String,
    pub chrome_executable: Option<std::path::PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            delay_ms: 1000,
            delay_jitter_ms: 500,
            term_delay_ms: 2000,
            max_pages: MaxPages::default(),
            navigation_timeout: Duration::from_secs(30),
            selector_timeout: Duration::from_secs(15),
            base_url: "https://www.mercadolivre.com.br".to_string(),
            listing_base_url: "https://lista.mercadolivre.com.br".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            chrome_executable: None,
        }
    }
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Where a search currently is in its page loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationState {
    pub current_page: u32,
    pub has_next: bool,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self { current_page: 1, has_next: false }
    }
}

/// Listings found for one search term.
#[derive(Debug, Clone, Serialize)]
pub struct TermResults {
    pub term: String,
    pub listings: Vec<Listing>,
    /// False when the term failed and was recorded empty
    pub succeeded: bool,
}

/// Results of a multi-term search, in term order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchBatch {
    pub terms: Vec<TermResults>,
}

impl SearchBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, term: impl Into<String>, listings: Vec<Listing>) {
        self.terms.push(TermResults { term: term.into(), listings, succeeded: true });
    }

    pub fn push_failed(&mut self, term: impl Into<String>) {
        self.terms.push(TermResults { term: term.into(), listings: Vec::new(), succeeded: false });
    }

    /// Listings for a term, if the term was searched.
    pub fn get(&self, term: &str) -> Option<&[Listing]> {
        self.terms.iter().find(|t| t.term == term).map(|t| t.listings.as_slice())
    }

    /// All listings across terms.
    pub fn listings(&self) -> impl Iterator<Item = &Listing> {
        self.terms.iter().flat_map(|t| t.listings.iter())
    }

    /// Total number of listings across terms.
    pub fn total(&self) -> usize {
        self.terms.iter().map(|t| t.listings.len()).sum()
    }

    pub fn failed_terms(&self) -> Vec<&str> {
        self.terms.iter().filter(|t| !t.succeeded).map(|t| t.term.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_raw(title: &str) -> RawListing {
        RawListing::new(title, "R$ 49,90", "https://produto.mercadolivre.com.br/MLB-1", None)
            .unwrap()
    }

    #[test]
    fn test_raw_listing_requires_fields() {
        assert!(RawListing::new("Frasco 300ml", "49", "https://x/1", None).is_some());
        assert!(RawListing::new("", "49", "https://x/1", None).is_none());
        assert!(RawListing::new("Frasco", "  ", "https://x/1", None).is_none());
        assert!(RawListing::new("Frasco", "49", "", None).is_none());
    }

    #[test]
    fn test_raw_listing_trims_and_drops_blank_image() {
        let raw = RawListing::new("  Frasco  ", " 49 ", " https://x/1 ", Some("  ".into())).unwrap();
        assert_eq!(raw.title(), "Frasco");
        assert_eq!(raw.price(), "49");
        assert_eq!(raw.link(), "https://x/1");
        assert!(raw.image().is_none());
    }

    #[test]
    fn test_listing_stamp() {
        let now = Utc::now();
        let listing = Listing::stamp(make_raw("Equipo"), "mercadolivre", now);
        assert_eq!(listing.title, "Equipo");
        assert_eq!(listing.source, "mercadolivre");
        assert_eq!(listing.extracted_at, now);
    }

    #[test]
    fn test_max_pages_allows() {
        let three = MaxPages::limit(3).unwrap();
        assert!(three.allows(1));
        assert!(three.allows(3));
        assert!(!three.allows(4));
        assert!(MaxPages::All.allows(10_000));
        assert!(MaxPages::limit(0).is_none());
    }

    #[test]
    fn test_max_pages_parsing() {
        assert_eq!("5".parse::<MaxPages>().unwrap(), MaxPages::limit(5).unwrap());
        assert_eq!("all".parse::<MaxPages>().unwrap(), MaxPages::All);
        assert_eq!("ALL".parse::<MaxPages>().unwrap(), MaxPages::All);
        assert_eq!("allPages".parse::<MaxPages>().unwrap(), MaxPages::All);
        assert!("0".parse::<MaxPages>().is_err());
        assert!("-2".parse::<MaxPages>().is_err());
        assert!("many".parse::<MaxPages>().unwrap_err().contains("Invalid max pages"));
    }

    #[test]
    fn test_max_pages_serde() {
        assert_eq!(serde_json::to_string(&MaxPages::All).unwrap(), "\"all\"");
        assert_eq!(serde_json::to_string(&MaxPages::limit(4).unwrap()).unwrap(), "4");

        let parsed: MaxPages = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, MaxPages::limit(7).unwrap());
        let parsed: MaxPages = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(parsed, MaxPages::All);
        assert!(serde_json::from_str::<MaxPages>("0").is_err());
    }

    #[test]
    fn test_search_batch() {
        let now = Utc::now();
        let mut batch = SearchBatch::new();
        batch.push("frasco", vec![Listing::stamp(make_raw("Frasco"), "mercadolivre", now)]);
        batch.push_failed("equipo");

        assert_eq!(batch.total(), 1);
        assert_eq!(batch.get("frasco").unwrap().len(), 1);
        assert_eq!(batch.get("equipo").unwrap().len(), 0);
        assert!(batch.get("seringa").is_none());
        assert_eq!(batch.failed_terms(), vec!["equipo"]);
        assert_eq!(batch.listings().count(), 1);
    }
}
