//! Extraction rules for Mercado Livre result pages.
//!
//! Every logical field has an ordered list of alternative CSS selectors.
//! The first selector that matches on the page wins, so more specific
//! selectors go first and broad fallbacks last.
//!
//! **Update process**: when extraction starts coming back empty, capture an
//! HTML sample, prepend the new selector to the affected chain, bump
//! `RULES_VERSION` and add the sample as a test fixture. A rules file with the
//! same shape as [`RuleTable`] can also be dropped in via `rules_path` in the
//! config without rebuilding.

use crate::error::{HarvestError, Result};
use anyhow::Context;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Version tag of the built-in rule table.
pub const RULES_VERSION: &str = "mercadolivre-2025.06";

/// Uncompiled selector table, as written in code or in a TOML rules file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    pub version: String,
    pub search_input: Vec<String>,
    pub container: Vec<String>,
    pub item: Vec<String>,
    pub title: Vec<String>,
    pub price_fraction: Vec<String>,
    #[serde(default)]
    pub price_cents: Vec<String>,
    #[serde(default)]
    pub currency_symbol: Vec<String>,
    pub link: Vec<String>,
    #[serde(default)]
    pub image: Vec<String>,
    pub next_page: Vec<String>,
    #[serde(default)]
    pub no_results: Vec<String>,
    #[serde(default)]
    pub blocked: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl RuleTable {
    /// The selector table shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            version: RULES_VERSION.to_string(),
            search_input: owned(&[
                "#cb1-edit",
                "input[name='as_word']",
                "input.nav-search-input",
                "header input[type='text']",
            ]),
            container: owned(&[
                "section.ui-search-results",
                "ol.ui-search-layout",
                "div.ui-search-main section",
                "#root-app section",
            ]),
            item: owned(&[
                "li.ui-search-layout__item",
                "div.ui-search-result__wrapper",
                "div.poly-card",
            ]),
            title: owned(&[
                ".poly-component__title",
                "h2.ui-search-item__title",
                ".ui-search-item__title",
                "h3 a",
            ]),
            price_fraction: owned(&[
                ".poly-price__current .andes-money-amount__fraction",
                ".andes-money-amount__fraction",
                ".price-tag-fraction",
            ]),
            price_cents: owned(&[
                ".poly-price__current .andes-money-amount__cents",
                ".andes-money-amount__cents",
                ".price-tag-cents",
            ]),
            currency_symbol: owned(&[
                ".poly-price__current .andes-money-amount__currency-symbol",
                ".andes-money-amount__currency-symbol",
                ".price-tag-symbol",
            ]),
            link: owned(&[
                ".poly-component__title-wrapper a",
                "a.poly-component__title",
                "a.ui-search-link",
                "a.ui-search-item__group__element",
                "a[href]",
            ]),
            image: owned(&[
                "img.poly-component__picture",
                "img.ui-search-result-image__element",
                "img",
            ]),
            next_page: owned(&[
                "li.andes-pagination__button--next a",
                "a.andes-pagination__link[title='Seguinte']",
                "a[title='Seguinte']",
                ".ui-search-pagination a[rel='next']",
            ]),
            no_results: owned(&[".ui-search-rescue", ".ui-search-rescue__info"]),
            blocked: owned(&[
                "form[action*='captcha']",
                "div.g-recaptcha",
                "iframe[src*='recaptcha']",
                "#account-verification",
            ]),
        }
    }

    /// Loads a rule table from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        debug!("Loading extraction rules from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse rules file: {}", path.display()))
    }

    /// Parses every selector, failing on the first invalid one.
    pub fn compile(&self) -> Result<ExtractionRules> {
        Ok(ExtractionRules {
            version: self.version.clone(),
            search_input: SelectorChain::required("search_input", &self.search_input)?,
            container: SelectorChain::optional("container", &self.container)?,
            item: SelectorChain::required("item", &self.item)?,
            title: SelectorChain::required("title", &self.title)?,
            price_fraction: SelectorChain::required("price_fraction", &self.price_fraction)?,
            price_cents: SelectorChain::optional("price_cents", &self.price_cents)?,
            currency_symbol: SelectorChain::optional("currency_symbol", &self.currency_symbol)?,
            link: SelectorChain::required("link", &self.link)?,
            image: SelectorChain::optional("image", &self.image)?,
            next_page: SelectorChain::required("next_page", &self.next_page)?,
            no_results: SelectorChain::optional("no_results", &self.no_results)?,
            blocked: SelectorChain::optional("blocked", &self.blocked)?,
        })
    }
}

/// Ordered fallback selectors for one field.
#[derive(Debug, Clone)]
pub struct SelectorChain {
    field: &'static str,
    candidates: Vec<(String, Selector)>,
}

impl SelectorChain {
    fn required(field: &'static str, raw: &[String]) -> Result<Self> {
        if raw.is_empty() {
            return Err(HarvestError::Rules(format!("{} has no selectors", field)));
        }
        Self::optional(field, raw)
    }

    fn optional(field: &'static str, raw: &[String]) -> Result<Self> {
        let candidates = raw
            .iter()
            .map(|expr| {
                Selector::parse(expr)
                    .map(|sel| (expr.clone(), sel))
                    .map_err(|e| HarvestError::Rules(format!("{} selector `{}`: {}", field, expr, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { field, candidates })
    }

    /// Field name this chain extracts.
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// Raw selector strings in priority order.
    pub fn expressions(&self) -> Vec<String> {
        self.candidates.iter().map(|(raw, _)| raw.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// First element matched by the highest-priority selector that matches
    /// anything under `scope`.
    pub fn first_in<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.candidates.iter().find_map(|(_, sel)| scope.select(sel).next())
    }

    /// All elements matched by the highest-priority selector that matches
    /// anything under `scope`.
    pub fn all_in<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        for (raw, sel) in &self.candidates {
            let found: Vec<_> = scope.select(sel).collect();
            if !found.is_empty() {
                debug!("{} matched {} element(s) via `{}`", self.field, found.len(), raw);
                return found;
            }
        }
        Vec::new()
    }

    /// Like [`first_in`](Self::first_in) but also reports which selector won.
    pub fn locate<'a>(&self, scope: ElementRef<'a>) -> Option<(&str, ElementRef<'a>)> {
        self.candidates
            .iter()
            .find_map(|(raw, sel)| scope.select(sel).next().map(|el| (raw.as_str(), el)))
    }

    /// Whether any selector matches anywhere in the document.
    pub fn matches(&self, document: &Html) -> bool {
        self.first_in(document.root_element()).is_some()
    }
}

/// Compiled rule table used by the extractor and the session.
#[derive(Debug, Clone)]
pub struct ExtractionRules {
    pub version: String,
    pub search_input: SelectorChain,
    pub container: SelectorChain,
    pub item: SelectorChain,
    pub title: SelectorChain,
    pub price_fraction: SelectorChain,
    pub price_cents: SelectorChain,
    pub currency_symbol: SelectorChain,
    pub link: SelectorChain,
    pub image: SelectorChain,
    pub next_page: SelectorChain,
    pub no_results: SelectorChain,
    pub blocked: SelectorChain,
}

impl ExtractionRules {
    /// Compiles the built-in rule table.
    pub fn builtin() -> Result<Self> {
        RuleTable::builtin().compile()
    }

    /// Compiles a rules file, or the built-in table when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let table = match path {
            Some(path) => RuleTable::from_file(path)?,
            None => RuleTable::builtin(),
        };
        let rules = table.compile()?;
        debug!("Using extraction rules {}", rules.version);
        Ok(rules)
    }

    /// Selectors that indicate the results view has rendered.
    pub fn results_markers(&self) -> Vec<String> {
        let mut markers = self.item.expressions();
        markers.extend(self.no_results.expressions());
        markers
    }
}
