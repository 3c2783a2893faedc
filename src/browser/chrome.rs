//! Chromium driver over the DevTools protocol.

use super::{search_url, BrowserError, DetailPage, PageDriver};
use crate::pacing::jitter;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Hides the most obvious automation marker.
const STEALTH_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

const SCROLL_SCRIPT: &str = "window.scrollBy(0, 1000)";
const BODY_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";

/// Time for lazy content to appear after navigation or scrolling.
const SETTLE: Duration = Duration::from_secs(2);
const DETAIL_SETTLE: Duration = Duration::from_secs(1);

/// How to start the browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub user_agent: String,
    pub page_timeout: Duration,
}

impl From<&crate::config::BehaviorConfig> for LaunchOptions {
    fn from(config: &crate::config::BehaviorConfig) -> Self {
        Self {
            headless: config.headless,
            user_agent: config.user_agent().to_string(),
            page_timeout: Duration::from_secs(config.page_timeout_secs),
        }
    }
}

/// A running Chromium with one main tab.
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    options: LaunchOptions,
}

impl ChromeDriver {
    /// Launch Chromium and open the main tab.
    pub async fn launch(options: LaunchOptions) -> Result<Self, BrowserError> {
        info!("Launching browser (headless={})", options.headless);

        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .no_sandbox()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage");
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser event error: {}", e);
                }
            }
            debug!("Browser event stream closed");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let driver = Self {
            browser,
            page,
            handler_task,
            options,
        };
        driver.prepare(&driver.page).await;

        info!("✓ Browser ready");
        Ok(driver)
    }

    /// Apply the user agent and stealth script to a tab. Best effort.
    async fn prepare(&self, page: &Page) {
        if let Err(e) = page
            .execute(SetUserAgentOverrideParams::new(self.options.user_agent.clone()))
            .await
        {
            warn!("Failed to set user agent: {}", e);
        }
        if let Err(e) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
        {
            debug!("Failed to inject stealth script: {}", e);
        }
    }

    fn timeout_secs(&self) -> u64 {
        self.options.page_timeout.as_secs()
    }

    async fn read_detail(&self, tab: &Page, url: &str) -> Result<DetailPage, BrowserError> {
        tab.goto(url).await.map_err(|e| BrowserError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        tokio::time::sleep(DETAIL_SETTLE).await;

        let text: String = tab
            .evaluate(BODY_TEXT_SCRIPT)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::Script(e.to_string()))?;

        let html = tab
            .content()
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;

        Ok(DetailPage { text, html })
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn open_search(&mut self, keyword: &str) -> Result<(), BrowserError> {
        let url = search_url(keyword);
        info!("Opening search page: {}", keyword);

        match timeout(self.options.page_timeout, self.page.goto(url.as_str())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(BrowserError::Navigation {
                    url,
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(BrowserError::Timeout {
                    url,
                    secs: self.timeout_secs(),
                })
            }
        }

        tokio::time::sleep(SETTLE).await;
        info!("✓ Search page open");
        Ok(())
    }

    async fn scroll(&mut self, times: usize, delay_secs: f64) -> Result<(), BrowserError> {
        info!("Scrolling {} times to load more pins", times);

        for i in 0..times {
            self.page
                .evaluate(SCROLL_SCRIPT)
                .await
                .map_err(|e| BrowserError::Script(e.to_string()))?;

            let wait = jitter(delay_secs, &mut rand::rng());
            tokio::time::sleep(wait).await;
            debug!("Scroll {}/{} done", i + 1, times);
        }

        tokio::time::sleep(SETTLE).await;
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<String, BrowserError> {
        let html = self
            .page
            .content()
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        debug!("Snapshot taken ({} chars)", html.len());
        Ok(html)
    }

    async fn visit_detail(&mut self, url: &str) -> Result<DetailPage, BrowserError> {
        let tab = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        self.prepare(&tab).await;

        let result = match timeout(self.options.page_timeout, self.read_detail(&tab, url)).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs(),
            }),
        };

        if let Err(e) = tab.close().await {
            debug!("Failed to close detail tab: {}", e);
        }

        result
    }

    async fn close(&mut self) {
        info!("Closing browser");
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Failed to wait for browser exit: {}", e);
        }
        self.handler_task.abort();
        info!("✓ Browser closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BehaviorConfig;

    #[test]
    fn test_launch_options_from_config() {
        let mut behavior = BehaviorConfig::default();
        behavior.headless = false;
        behavior.page_timeout_secs = 7;
        behavior.user_agents = vec!["agent/1.0".to_string(), "agent/2.0".to_string()];

        let options = LaunchOptions::from(&behavior);
        assert!(!options.headless);
        assert_eq!(options.user_agent, "agent/1.0");
        assert_eq!(options.page_timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_launch_options_fallback_user_agent() {
        let mut behavior = BehaviorConfig::default();
        behavior.user_agents.clear();
        let options = LaunchOptions::from(&behavior);
        assert!(options.user_agent.starts_with("Mozilla/5.0"));
    }
}
