//! Browser automation.
//!
//! The crawler talks to the browser only through [`PageDriver`], so the
//! Chromium implementation can be swapped for a scripted one in tests.

pub mod chrome;

pub use chrome::{ChromeDriver, LaunchOptions};

use crate::extract::PINTEREST_ORIGIN;
use async_trait::async_trait;
use thiserror::Error;
use url::form_urlencoded;

/// Errors raised by a page driver.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("timed out after {secs}s loading {url}")]
    Timeout { url: String, secs: u64 },

    #[error("page script failed: {0}")]
    Script(String),
}

/// What a pin detail page gave us.
#[derive(Debug, Clone, Default)]
pub struct DetailPage {
    /// Visible text (`document.body.innerText`).
    pub text: String,
    /// Full HTML, for related pin links.
    pub html: String,
}

/// The operations the crawler needs from a browser.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate the main tab to the search page for `keyword`.
    async fn open_search(&mut self, keyword: &str) -> Result<(), BrowserError>;

    /// Scroll down `times` times, pausing about `delay_secs` after each.
    async fn scroll(&mut self, times: usize, delay_secs: f64) -> Result<(), BrowserError>;

    /// HTML of the main tab.
    async fn snapshot(&mut self) -> Result<String, BrowserError>;

    /// Open a pin detail page in its own tab and read it.
    async fn visit_detail(&mut self, url: &str) -> Result<DetailPage, BrowserError>;

    /// Shut the browser down. Errors are logged, not returned.
    async fn close(&mut self);
}

/// Search URL for a keyword.
pub fn search_url(keyword: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("q", keyword.trim())
        .finish();
    format!("{}/search/pins/?{}", PINTEREST_ORIGIN, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_encodes_keyword() {
        assert_eq!(
            search_url("UI design"),
            "https://www.pinterest.com/search/pins/?q=UI+design"
        );
        assert_eq!(
            search_url("café & bar"),
            "https://www.pinterest.com/search/pins/?q=caf%C3%A9+%26+bar"
        );
    }

    #[test]
    fn test_error_messages() {
        let err = BrowserError::Timeout {
            url: "https://www.pinterest.com/pin/1/".to_string(),
            secs: 15,
        };
        assert_eq!(
            err.to_string(),
            "timed out after 15s loading https://www.pinterest.com/pin/1/"
        );
    }
}
