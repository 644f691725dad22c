//! Browser automation seam and its Chromium implementation.

use crate::error::{HarvestError, Result};
use crate::marketplace::models::SearchConfig;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::Page;
use futures_util::stream::StreamExt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One open tab the session drives. Every call is a suspension point and
/// carries its own timeout.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigates to a URL and waits for the load to settle.
    async fn goto(&mut self, url: &str) -> Result<()>;

    /// Types `term` into the first matching input and submits it, waiting for
    /// the resulting navigation. Returns the selector that was used.
    async fn submit_query(&mut self, input_selectors: &[String], term: &str) -> Result<String>;

    /// Waits until any of the selectors matches. Returns the one that did.
    async fn wait_for_any(&mut self, selectors: &[String], timeout: Duration) -> Result<String>;

    /// Current page HTML.
    async fn content(&mut self) -> Result<String>;

    async fn current_url(&mut self) -> Result<Option<String>>;

    /// Clicks the element and waits for the navigation it triggers.
    async fn click_and_wait(&mut self, selector: &str) -> Result<()>;

    /// Releases the tab and the browser behind it.
    async fn close(&mut self) -> Result<()>;
}

/// Creates automation contexts.
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    async fn launch(&self, config: &SearchConfig) -> Result<Box<dyn PageDriver>>;
}

/// Runs a future under a timeout, mapping expiry to [`HarvestError::Timeout`].
pub async fn with_timeout<T, F>(op: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(HarvestError::Timeout { op, secs: timeout.as_secs() }),
    }
}

/// Checks the selectors in order every `interval` until one matches. The
/// whole wait, including a slow check, is bounded by `timeout`.
pub async fn poll_for_match<F, Fut>(
    selectors: &[String],
    timeout: Duration,
    interval: Duration,
    mut matches: F,
) -> Result<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = bool>,
{
    with_timeout("selector wait", timeout, async {
        loop {
            for selector in selectors {
                if matches(selector.clone()).await {
                    return Ok(selector.clone());
                }
            }
            tokio::time::sleep(interval).await;
        }
    })
    .await
}

/// The browser event loop. Aborted when dropped.
struct HandlerTask(JoinHandle<()>);

impl HandlerTask {
    fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(fut))
    }
}

impl Drop for HandlerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn driver_err(e: impl std::fmt::Display) -> HarvestError {
    HarvestError::Driver(e.to_string())
}

/// Launches Chromium through the DevTools protocol.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher;

impl ChromeLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DriverLauncher for ChromeLauncher {
    async fn launch(&self, config: &SearchConfig) -> Result<Box<dyn PageDriver>> {
        let driver = ChromeDriver::launch(config).await?;
        Ok(Box::new(driver))
    }
}

/// A Chromium instance with a single tab.
pub struct ChromeDriver {
    browser: Option<Browser>,
    page: Option<Page>,
    handler: Option<HandlerTask>,
    navigation_timeout: Duration,
    selector_timeout: Duration,
}

impl ChromeDriver {
    /// Starts the browser and opens a blank tab.
    pub async fn launch(config: &SearchConfig) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .request_timeout(config.navigation_timeout);

        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &config.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder.build().map_err(HarvestError::Launch)?;

        let (mut browser, mut handler) =
            Browser::launch(browser_config).await.map_err(|e| HarvestError::Launch(e.to_string()))?;

        let handler = HandlerTask::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match open_tab(&browser, &config.user_agent).await {
            Ok(page) => page,
            Err(e) => {
                // The handler must outlive the close, it carries the close command
                if let Err(close_err) = browser.close().await {
                    warn!(
                        op = "browser.launch",
                        recovered = false,
                        "Failed to close browser after launch error: {}",
                        close_err
                    );
                }
                let _ = browser.wait().await;
                drop(handler);
                return Err(e);
            }
        };

        info!("Browser launched (headless: {})", config.headless);

        Ok(Self {
            browser: Some(browser),
            page: Some(page),
            handler: Some(handler),
            navigation_timeout: config.navigation_timeout,
            selector_timeout: config.selector_timeout,
        })
    }

    fn page(&self) -> Result<&Page> {
        self.page.as_ref().ok_or_else(|| HarvestError::Driver("tab already closed".to_string()))
    }
}

async fn open_tab(browser: &Browser, user_agent: &str) -> Result<Page> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| HarvestError::Launch(format!("could not open tab: {}", e)))?;

    page.set_user_agent(SetUserAgentOverrideParams::new(user_agent.to_string()))
        .await
        .map_err(|e| HarvestError::Launch(format!("could not set user agent: {}", e)))?;

    Ok(page)
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn goto(&mut self, url: &str) -> Result<()> {
        debug!("GOTO {}", url);
        let page = self.page()?;
        with_timeout("page navigation", self.navigation_timeout, async {
            page.goto(url).await.map_err(|e| HarvestError::Navigation(format!("{}: {}", url, e)))?;
            Ok(())
        })
        .await
    }

    async fn submit_query(&mut self, input_selectors: &[String], term: &str) -> Result<String> {
        let page = self.page()?;

        let mut found = None;
        for selector in input_selectors {
            if let Ok(element) = page.find_element(selector.as_str()).await {
                found = Some((selector.clone(), element));
                break;
            }
        }
        let (selector, input) =
            found.ok_or_else(|| HarvestError::SelectorNotFound("search input".to_string()))?;

        debug!("Typing query into `{}`", selector);

        // Clear whatever the field holds from a previous term
        let clear = format!(
            "(() => {{ const el = document.querySelector({}); if (el) {{ el.value = ''; }} }})()",
            serde_json::to_string(&selector).map_err(driver_err)?
        );
        page.evaluate(clear).await.map_err(driver_err)?;

        input.click().await.map_err(driver_err)?;
        input.type_str(term).await.map_err(driver_err)?;
        input.press_key("Enter").await.map_err(driver_err)?;

        with_timeout("search submit", self.navigation_timeout, async {
            page.wait_for_navigation()
                .await
                .map_err(|e| HarvestError::Navigation(format!("search submit: {}", e)))?;
            Ok(())
        })
        .await?;

        Ok(selector)
    }

    async fn wait_for_any(&mut self, selectors: &[String], timeout: Duration) -> Result<String> {
        let page = self.page()?;
        poll_for_match(selectors, timeout, Duration::from_millis(250), move |selector| async move {
            page.find_element(selector).await.is_ok()
        })
        .await
    }

    async fn content(&mut self) -> Result<String> {
        let page = self.page()?;
        with_timeout("page content", self.selector_timeout, async {
            page.content().await.map_err(driver_err)
        })
        .await
    }

    async fn current_url(&mut self) -> Result<Option<String>> {
        self.page()?.url().await.map_err(driver_err)
    }

    async fn click_and_wait(&mut self, selector: &str) -> Result<()> {
        let page = self.page()?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|_| HarvestError::SelectorNotFound(selector.to_string()))?;

        element.click().await.map_err(driver_err)?;

        with_timeout("next page navigation", self.navigation_timeout, async {
            page.wait_for_navigation()
                .await
                .map_err(|e| HarvestError::Navigation(format!("next page: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!(op = "browser.close", recovered = true, "Failed to close tab: {}", e);
            }
        }

        let mut result = Ok(());
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                result = Err(driver_err(e));
            }
            let _ = browser.wait().await;
        }

        // Dropping the task aborts it
        drop(self.handler.take());

        debug!("Browser closed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result() {
        let value = with_timeout("noop", Duration::from_secs(1), async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout("slow op", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        match result {
            Err(HarvestError::Timeout { op, .. }) => assert_eq!(op, "slow op"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_with_timeout_keeps_inner_error() {
        let result: Result<()> = with_timeout("goto", Duration::from_secs(1), async {
            Err(HarvestError::Navigation("dns".to_string()))
        })
        .await;
        assert!(matches!(result, Err(HarvestError::Navigation(_))));
    }

    fn selectors() -> Vec<String> {
        vec![".results".to_string(), ".fallback".to_string()]
    }

    #[tokio::test]
    async fn test_poll_returns_first_matching_selector() {
        let mut checks = 0;
        let found = poll_for_match(&selectors(), Duration::from_secs(1), Duration::from_millis(1), |selector| {
            checks += 1;
            let hit = checks > 2 && selector == ".fallback";
            async move { hit }
        })
        .await
        .unwrap();

        assert_eq!(found, ".fallback");
        assert_eq!(checks, 4);
    }

    #[tokio::test]
    async fn test_poll_deadline_bounds_slow_checks() {
        let started = std::time::Instant::now();
        let result = poll_for_match(&selectors(), Duration::from_millis(50), Duration::from_millis(1), |_| async {
            tokio::time::sleep(Duration::from_millis(400)).await;
            false
        })
        .await;

        assert!(matches!(result, Err(HarvestError::Timeout { op: "selector wait", .. })));
        assert!(started.elapsed() < Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_handler_task_aborts_on_drop() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = HandlerTask::spawn(async move {
            let _keep = tx;
            std::future::pending::<()>().await;
        });

        drop(task);

        let closed = tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap();
        assert!(closed.is_err());
    }
}
