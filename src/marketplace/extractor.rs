//! Read-only extraction of listings from a loaded results page.

use crate::error::{HarvestError, Result};
use crate::marketplace::models::RawListing;
use crate::marketplace::selectors::ExtractionRules;
use anyhow::bail;
use scraper::{ElementRef, Html};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// The next-page control found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextControl {
    /// Selector that located the control, usable by the driver to click it
    pub selector: String,
    /// Resolved target of the control, if it is a link
    pub href: Option<String>,
}

/// Everything read from one results page.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub listings: Vec<RawListing>,
    /// Present only when the control exists, is visible and is enabled
    pub next_page: Option<NextControl>,
    /// Candidate item cards found on the page
    pub candidates: usize,
    /// Cards dropped for missing fields or extraction errors
    pub discarded: usize,
}

/// Pulls raw listings out of result page HTML using an [`ExtractionRules`] table.
#[derive(Debug, Clone)]
pub struct Extractor {
    rules: Arc<ExtractionRules>,
    base_url: String,
}

impl Extractor {
    /// Creates an extractor; relative links resolve against `base_url`.
    pub fn new(rules: Arc<ExtractionRules>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { rules, base_url }
    }

    pub fn rules(&self) -> &ExtractionRules {
        &self.rules
    }

    /// Extracts every complete listing on the page plus the next-page control.
    pub fn extract_page(&self, html: &str) -> Result<ExtractedPage> {
        let document = Html::parse_document(html);

        self.check_for_blocking(&document)?;

        let items = self.locate_items(&document);
        let mut page = ExtractedPage { candidates: items.len(), ..Default::default() };

        for (index, item) in items.into_iter().enumerate() {
            match self.extract_item(item) {
                Ok(Some(listing)) => {
                    trace!("Extracted item {}: {}", index + 1, listing.title());
                    page.listings.push(listing);
                }
                Ok(None) => {
                    trace!("Item {} is missing title, price or link, skipping", index + 1);
                    page.discarded += 1;
                }
                Err(e) => {
                    warn!(op = "extractor.item", recovered = true, "Failed to extract item {}: {}", index + 1, e);
                    page.discarded += 1;
                }
            }
        }

        page.next_page = self.find_next_control(&document);

        debug!(
            "Extracted {} of {} items (rules {}, has next: {})",
            page.listings.len(),
            page.candidates,
            self.rules.version,
            page.next_page.is_some()
        );

        Ok(page)
    }

    /// Returns true if a visible, enabled next-page control exists.
    pub fn has_next_page(&self, html: &str) -> bool {
        let document = Html::parse_document(html);
        self.find_next_control(&document).is_some()
    }

    /// Returns true if the page looks like a results view, including an
    /// empty "no results" view.
    pub fn is_results_page(&self, html: &str) -> bool {
        let document = Html::parse_document(html);
        self.rules.item.matches(&document) || self.rules.no_results.matches(&document)
    }

    fn check_for_blocking(&self, document: &Html) -> Result<()> {
        if let Some((selector, _)) = self.rules.blocked.locate(document.root_element()) {
            return Err(HarvestError::Blocked(format!(
                "verification page detected (matched `{}`)",
                selector
            )));
        }
        Ok(())
    }

    /// Items inside the results container, or anywhere on the page if no
    /// container selector matches.
    fn locate_items<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        if let Some(container) = self.rules.container.first_in(document.root_element()) {
            let items = self.rules.item.all_in(container);
            if !items.is_empty() {
                return items;
            }
            debug!("Container matched but held no items, searching whole page");
        }
        self.rules.item.all_in(document.root_element())
    }

    fn extract_item(&self, item: ElementRef) -> anyhow::Result<Option<RawListing>> {
        let title = self.rules.title.first_in(item).map(text_of).unwrap_or_default();
        let price = self.extract_price(item).unwrap_or_default();

        let link = match self.rules.link.first_in(item).and_then(|e| e.value().attr("href")) {
            Some(href) if !href.trim().is_empty() => self.resolve_link(href)?,
            _ => String::new(),
        };

        let image = self.extract_image(item);

        Ok(RawListing::new(title, price, link, image))
    }

    /// Composes "R$ 1.234,56" style text from symbol, fraction and cents.
    fn extract_price(&self, item: ElementRef) -> Option<String> {
        let fraction = self.rules.price_fraction.first_in(item).map(text_of)?;
        if fraction.is_empty() {
            return None;
        }

        let mut price = String::new();
        if let Some(symbol) = self.rules.currency_symbol.first_in(item).map(text_of) {
            if !symbol.is_empty() {
                price.push_str(&symbol);
                price.push(' ');
            }
        }
        price.push_str(&fraction);

        if let Some(cents) = self.rules.price_cents.first_in(item).map(text_of) {
            if !cents.is_empty() {
                price.push(',');
                price.push_str(&cents);
            }
        }

        Some(price)
    }

    fn extract_image(&self, item: ElementRef) -> Option<String> {
        let img = self.rules.image.first_in(item)?;
        let attrs = img.value();

        let src = attrs.attr("src").filter(|s| !s.starts_with("data:"));
        let lazy = attrs.attr("data-src");

        src.or(lazy).map(String::from)
    }

    /// Makes a link absolute and drops the tracking fragment.
    fn resolve_link(&self, href: &str) -> anyhow::Result<String> {
        let href = href.trim();
        let href = href.split('#').next().unwrap_or(href);

        let absolute = if href.starts_with("https://") || href.starts_with("http://") {
            href.to_string()
        } else if let Some(rest) = href.strip_prefix("//") {
            format!("https://{}", rest)
        } else if href.starts_with('/') {
            format!("{}{}", self.base_url, href)
        } else {
            bail!("unsupported link `{}`", href);
        };

        Ok(absolute)
    }

    fn find_next_control(&self, document: &Html) -> Option<NextControl> {
        let (selector, element) = self.rules.next_page.locate(document.root_element())?;

        if !control_is_available(element) {
            debug!("Next-page control `{}` present but hidden or disabled", selector);
            return None;
        }

        let href = element.value().attr("href").and_then(|h| self.resolve_link(h).ok());
        Some(NextControl { selector: selector.to_string(), href })
    }
}

/// Visible and enabled, judged from the markup of the control and its
/// ancestors.
pub fn control_is_available(element: ElementRef) -> bool {
    let hidden = std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .any(is_hidden);

    let disabled = std::iter::once(element)
        .chain(element.parent().and_then(ElementRef::wrap))
        .any(is_disabled);

    !hidden && !disabled
}

fn is_hidden(element: ElementRef) -> bool {
    let el = element.value();
    if el.attr("hidden").is_some() || el.attr("aria-hidden") == Some("true") {
        return true;
    }

    el.attr("style").is_some_and(|style| {
        let style: String = style.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase();
        style.contains("display:none") || style.contains("visibility:hidden")
    })
}

fn is_disabled(element: ElementRef) -> bool {
    let el = element.value();
    el.attr("disabled").is_some()
        || el.attr("aria-disabled") == Some("true")
        || el.classes().any(|c| c.contains("disabled"))
}

/// Element text with whitespace collapsed.
fn text_of(element: ElementRef) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}
