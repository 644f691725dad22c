//! Search sessions: one browser context per run, sequential page loop.

use crate::error::{HarvestError, Result};
use crate::marketplace::browser::{ChromeLauncher, DriverLauncher, PageDriver};
use crate::marketplace::extractor::{Extractor, NextControl};
use crate::marketplace::models::{Listing, PaginationState, RawListing, SearchBatch, SearchConfig};
use crate::marketplace::selectors::ExtractionRules;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Source tag stamped on Mercado Livre listings.
pub const SOURCE: &str = "mercadolivre";

/// Capability surface every marketplace adapter implements.
#[async_trait]
pub trait Scraper: Send {
    /// Marketplace tag stamped on every listing.
    fn source(&self) -> &str;

    /// Acquires the automation context. Failure is fatal for the run.
    async fn initialize(&mut self) -> Result<()>;

    /// Searches one term and pages through its results.
    async fn search(&mut self, term: &str) -> Result<Vec<Listing>>;

    /// Releases the automation context. Safe to call at any time.
    async fn close(&mut self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// Pause between consecutive terms of a batch.
    fn term_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Searches each term in order. A failing term is recorded with no
    /// results and the batch moves on. If the automation context cannot be
    /// reacquired, the remaining terms are recorded as failed and the terms
    /// already harvested are returned.
    async fn search_multiple(&mut self, terms: &[String]) -> Result<SearchBatch> {
        let mut batch = SearchBatch::new();

        for (index, term) in terms.iter().enumerate() {
            if !self.is_initialized() {
                debug!("Reacquiring browser before term '{}'", term);
                if let Err(e) = self.initialize().await {
                    error!(
                        op = "session.initialize",
                        recovered = false,
                        term = %term,
                        "Could not restart browser, recording {} remaining terms as failed: {}",
                        terms.len() - index,
                        e
                    );
                    for remaining in &terms[index..] {
                        batch.push_failed(remaining.as_str());
                    }
                    return Ok(batch);
                }
            }

            info!("Searching term {}/{}: {}", index + 1, terms.len(), term);
            match self.search(term).await {
                Ok(listings) => batch.push(term.as_str(), listings),
                Err(e) => {
                    error!(
                        op = "session.search_multiple",
                        recovered = false,
                        term = %term,
                        "Search failed, recording no results: {}",
                        e
                    );
                    batch.push_failed(term.as_str());
                }
            }

            if index + 1 < terms.len() {
                let delay = self.term_delay();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Ok(batch)
    }
}

/// Runs a whole batch: initialize, search every term, close. The context is
/// released on every path.
pub async fn harvest<S: Scraper + ?Sized>(scraper: &mut S, terms: &[String]) -> Result<SearchBatch> {
    let result = match scraper.initialize().await {
        Ok(()) => scraper.search_multiple(terms).await,
        Err(e) => {
            error!(op = "session.initialize", recovered = false, "Could not start {}: {}", scraper.source(), e);
            Err(e)
        }
    };

    if let Err(e) = scraper.close().await {
        warn!(op = "session.close", recovered = true, "Failed to release browser: {}", e);
    }

    result
}

/// Where a search is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Idle,
    Searching,
    ExtractingPage,
    NavigatingNext,
    Done,
    Failed,
}

/// Mercado Livre adapter: drives the site search and the result pages.
pub struct MercadoLivreScraper<L: DriverLauncher = ChromeLauncher> {
    launcher: L,
    config: SearchConfig,
    extractor: Extractor,
    driver: Option<Box<dyn PageDriver>>,
    phase: SearchPhase,
    pagination: PaginationState,
}

impl MercadoLivreScraper<ChromeLauncher> {
    /// Creates a scraper backed by a local Chromium.
    pub fn new(config: SearchConfig, rules: Arc<ExtractionRules>) -> Self {
        Self::with_launcher(ChromeLauncher::new(), config, rules)
    }
}

impl<L: DriverLauncher> MercadoLivreScraper<L> {
    /// Creates a scraper with a custom automation backend.
    pub fn with_launcher(launcher: L, config: SearchConfig, rules: Arc<ExtractionRules>) -> Self {
        let extractor = Extractor::new(rules, config.base_url.clone());
        Self {
            launcher,
            config,
            extractor,
            driver: None,
            phase: SearchPhase::Idle,
            pagination: PaginationState::default(),
        }
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    /// Pagination state of the current or last search.
    pub fn pagination(&self) -> PaginationState {
        self.pagination
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    fn enter(&mut self, phase: SearchPhase) {
        debug!("Search phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Results URL used when the search box cannot be found.
    fn direct_url(&self, term: &str) -> String {
        let path = term.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("-");
        format!("{}/{}", self.config.listing_base_url.trim_end_matches('/'), urlencoding::encode(&path))
    }

    async fn run_search(&mut self, driver: &mut dyn PageDriver, term: &str) -> Result<Vec<RawListing>> {
        self.enter(SearchPhase::Searching);
        self.open_results(driver, term).await?;

        let mut collected = Vec::new();
        let mut page = 1;

        loop {
            self.enter(SearchPhase::ExtractingPage);
            self.pagination = PaginationState { current_page: page, has_next: false };
            self.await_results(driver).await;

            let html = driver.content().await?;
            let extracted = self.extractor.extract_page(&html)?;

            info!("Page {}: {} listings (total {})", page, extracted.listings.len(), collected.len() + extracted.listings.len());
            collected.extend(extracted.listings);
            self.pagination.has_next = extracted.next_page.is_some();

            let Some(next) = extracted.next_page else {
                debug!("No next page after page {}", page);
                break;
            };

            if !self.config.max_pages.allows(page + 1) {
                info!("Reached page limit ({}), stopping", self.config.max_pages);
                break;
            }

            self.enter(SearchPhase::NavigatingNext);
            match self.follow(driver, &next).await {
                Ok(()) => {
                    self.delay().await;
                    page += 1;
                }
                Err(e) => {
                    warn!(
                        op = "session.next_page",
                        recovered = true,
                        "Could not reach page {}, keeping {} listings: {}",
                        page + 1,
                        collected.len(),
                        e
                    );
                    break;
                }
            }
        }

        self.enter(SearchPhase::Done);
        Ok(collected)
    }

    /// Submits the query and confirms the results view is showing.
    async fn open_results(&mut self, driver: &mut dyn PageDriver, term: &str) -> Result<()> {
        if let Err(e) = driver.goto(&self.config.base_url).await {
            warn!(op = "session.home", recovered = true, "Home page did not load cleanly: {}", e);
        }

        let inputs = self.extractor.rules().search_input.expressions();
        match driver.submit_query(&inputs, term).await {
            Ok(selector) => debug!("Query submitted via `{}`", selector),
            Err(HarvestError::SelectorNotFound(_)) => {
                let url = self.direct_url(term);
                warn!(op = "session.submit", recovered = true, "Search box not found, opening {}", url);
                driver.goto(&url).await?;
            }
            Err(e) => return Err(e),
        }

        let markers = self.extractor.rules().results_markers();
        if driver.wait_for_any(&markers, self.config.selector_timeout).await.is_ok() {
            return Ok(());
        }

        // Surface a captcha wall before giving up on the view
        let html = driver.content().await?;
        self.extractor.extract_page(&html)?;
        if self.extractor.is_results_page(&html) {
            return Ok(());
        }

        let url = driver.current_url().await.ok().flatten().unwrap_or_default();
        Err(HarvestError::Navigation(format!("results view not reached for '{}' (at {})", term, url)))
    }

    /// Waits for result cards to render. A timeout is not an error here: the
    /// snapshot is extracted as it stands.
    async fn await_results(&self, driver: &mut dyn PageDriver) {
        let markers = self.extractor.rules().results_markers();
        if let Err(e) = driver.wait_for_any(&markers, self.config.selector_timeout).await {
            warn!(op = "session.wait_results", recovered = true, "Results did not render in time: {}", e);
        }
    }

    /// Clicks the next-page control, falling back to its link target.
    async fn follow(&self, driver: &mut dyn PageDriver, next: &NextControl) -> Result<()> {
        match driver.click_and_wait(&next.selector).await {
            Ok(()) => Ok(()),
            Err(e) => match &next.href {
                Some(href) => {
                    debug!("Click on next page failed ({}), opening {}", e, href);
                    driver.goto(href).await
                }
                None => Err(e),
            },
        }
    }

    /// Sleeps `delay_ms` plus random jitter between page loads.
    async fn delay(&self) {
        if self.config.delay_ms == 0 {
            return;
        }

        let jitter = if self.config.delay_jitter_ms > 0 {
            rand::rng().random_range(0..=self.config.delay_jitter_ms)
        } else {
            0
        };

        let total = self.config.delay_ms + jitter;
        debug!("Delaying {}ms", total);
        tokio::time::sleep(Duration::from_millis(total)).await;
    }

    async fn release(&mut self) -> Result<()> {
        match self.driver.take() {
            Some(mut driver) => driver.close().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<L: DriverLauncher> Scraper for MercadoLivreScraper<L> {
    fn source(&self) -> &str {
        SOURCE
    }

    async fn initialize(&mut self) -> Result<()> {
        if self.driver.is_some() {
            debug!("Scraper already initialized");
            return Ok(());
        }

        let mut driver = self.launcher.launch(&self.config).await?;

        if let Err(e) = driver.goto(&self.config.base_url).await {
            // A slow page that still landed on the site is good enough
            let landed = driver
                .current_url()
                .await
                .ok()
                .flatten()
                .is_some_and(|url| url.contains("mercadolivre.com.br"));

            if !landed {
                let _ = driver.close().await;
                return Err(HarvestError::Launch(format!("home page unreachable: {}", e)));
            }
            warn!(op = "session.initialize", recovered = true, "Home page loaded partially: {}", e);
        }

        self.driver = Some(driver);
        self.enter(SearchPhase::Idle);
        info!("Mercado Livre scraper initialized");
        Ok(())
    }

    async fn search(&mut self, term: &str) -> Result<Vec<Listing>> {
        let mut driver = self.driver.take().ok_or_else(|| HarvestError::NotInitialized(SOURCE.to_string()))?;

        info!("Searching Mercado Livre: {} (max pages: {})", term, self.config.max_pages);

        match self.run_search(driver.as_mut(), term).await {
            Ok(raw) => {
                self.driver = Some(driver);
                let extracted_at = Utc::now();
                let listings: Vec<Listing> =
                    raw.into_iter().map(|r| Listing::stamp(r, SOURCE, extracted_at)).collect();

                info!(
                    "Found {} listings for '{}' across {} page(s)",
                    listings.len(),
                    term,
                    self.pagination.current_page
                );
                Ok(listings)
            }
            Err(e) => {
                self.enter(SearchPhase::Failed);
                if let Err(close_err) = driver.close().await {
                    warn!(op = "session.search", recovered = true, "Failed to release browser after error: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let result = self.release().await;
        if result.is_ok() {
            debug!("Mercado Livre scraper closed");
        }
        result
    }

    fn is_initialized(&self) -> bool {
        self.driver.is_some()
    }

    fn term_delay(&self) -> Duration {
        Duration::from_millis(self.config.term_delay_ms)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Simulated marketplace for driving sessions without a browser.

    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    pub const BASE: &str = "https://www.mercadolivre.com.br";

    /// Mutable state shared between the launcher, its drivers and the test.
    #[derive(Debug, Default)]
    pub struct SiteState {
        /// Index of the result page being shown, `None` on the home page
        pub current: Option<usize>,
        pub launches: u32,
        pub closes: u32,
        pub submitted: Vec<String>,
        pub visited: Vec<usize>,
        pub direct_urls: Vec<String>,
        pub fail_launch: bool,
        pub no_search_box: bool,
        pub failing_terms: HashSet<String>,
        /// Clicking "next" from this page index fails
        pub broken_next_on: Option<usize>,
        /// Direct page links fail to load
        pub dead_links: bool,
    }

    /// A result set of `pages` pages with `per_page` listings each.
    pub fn result_pages(term: &str, pages: usize, per_page: usize) -> Vec<String> {
        (0..pages)
            .map(|p| {
                let cards: String = (0..per_page)
                    .map(|i| {
                        format!(
                            r#"<li class="ui-search-layout__item">
                                <a class="poly-component__title" href="https://produto.mercadolivre.com.br/MLB-{term}-{p}-{i}">{term} {p}-{i}</a>
                                <div class="poly-price__current"><span class="andes-money-amount__fraction">{price}</span></div>
                            </li>"#,
                            term = term.replace(' ', "_"),
                            price = 10 + p * 10 + i
                        )
                    })
                    .collect();

                let next = if p + 1 < pages {
                    format!(
                        r#"<ul><li class="andes-pagination__button--next"><a href="/page-{}">Seguinte</a></li></ul>"#,
                        p + 2
                    )
                } else {
                    String::new()
                };

                format!(
                    r#"<html><body><section class="ui-search-results"><ol>{}</ol>{}</section></body></html>"#,
                    cards, next
                )
            })
            .collect()
    }

    pub struct SimLauncher {
        pub pages: Vec<String>,
        pub state: Arc<Mutex<SiteState>>,
    }

    impl SimLauncher {
        pub fn new(pages: Vec<String>) -> Self {
            Self { pages, state: Arc::new(Mutex::new(SiteState::default())) }
        }
    }

    #[async_trait]
    impl DriverLauncher for SimLauncher {
        async fn launch(&self, _config: &SearchConfig) -> Result<Box<dyn PageDriver>> {
            let mut state = self.state.lock().unwrap();
            if state.fail_launch {
                return Err(HarvestError::Launch("no browser available".to_string()));
            }
            state.launches += 1;
            Ok(Box::new(SimDriver { pages: self.pages.clone(), state: self.state.clone() }))
        }
    }

    pub struct SimDriver {
        pages: Vec<String>,
        state: Arc<Mutex<SiteState>>,
    }

    #[async_trait]
    impl PageDriver for SimDriver {
        async fn goto(&mut self, url: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if url == BASE {
                state.current = None;
            } else if let Some(n) = url.rsplit("/page-").next().and_then(|n| n.parse::<usize>().ok()) {
                if state.dead_links {
                    return Err(HarvestError::Navigation(format!("{} did not load", url)));
                }
                state.current = Some(n - 1);
                state.visited.push(n - 1);
            } else {
                state.direct_urls.push(url.to_string());
                state.current = Some(0);
                state.visited.push(0);
            }
            Ok(())
        }

        async fn submit_query(&mut self, input_selectors: &[String], term: &str) -> Result<String> {
            let mut state = self.state.lock().unwrap();
            if state.no_search_box {
                return Err(HarvestError::SelectorNotFound("search input".to_string()));
            }
            state.submitted.push(term.to_string());
            if state.failing_terms.contains(term) {
                return Err(HarvestError::Navigation(format!("search for {} crashed", term)));
            }
            state.current = Some(0);
            state.visited.push(0);
            Ok(input_selectors[0].clone())
        }

        async fn wait_for_any(&mut self, selectors: &[String], timeout: Duration) -> Result<String> {
            let state = self.state.lock().unwrap();
            match state.current {
                Some(_) => Ok(selectors[0].clone()),
                None => Err(HarvestError::Timeout { op: "selector wait", secs: timeout.as_secs() }),
            }
        }

        async fn content(&mut self) -> Result<String> {
            let state = self.state.lock().unwrap();
            Ok(match state.current {
                Some(p) => self.pages.get(p).cloned().unwrap_or_default(),
                None => "<html><body><input id=\"cb1-edit\"></body></html>".to_string(),
            })
        }

        async fn current_url(&mut self) -> Result<Option<String>> {
            let state = self.state.lock().unwrap();
            Ok(Some(match state.current {
                Some(p) => format!("{}/page-{}", BASE, p + 1),
                None => BASE.to_string(),
            }))
        }

        async fn click_and_wait(&mut self, _selector: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            let current = state.current.unwrap_or(0);
            if state.broken_next_on == Some(current) {
                return Err(HarvestError::Timeout { op: "next page navigation", secs: 15 });
            }
            let next = current + 1;
            state.current = Some(next);
            state.visited.push(next);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.state.lock().unwrap().closes += 1;
            Ok(())
        }
    }

    pub fn quick_config(max_pages: crate::marketplace::models::MaxPages) -> SearchConfig {
        SearchConfig {
            delay_ms: 0,
            delay_jitter_ms: 0,
            term_delay_ms: 0,
            max_pages,
            selector_timeout: Duration::from_millis(10),
            ..SearchConfig::default()
        }
    }

    pub fn scraper(launcher: SimLauncher, max_pages: crate::marketplace::models::MaxPages) -> MercadoLivreScraper<SimLauncher> {
        let rules = Arc::new(ExtractionRules::builtin().unwrap());
        MercadoLivreScraper::with_launcher(launcher, quick_config(max_pages), rules)
    }
}
