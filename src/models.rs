//! Data models for the crawler.
//!
//! This module contains the core data structures passed between the
//! browser, the random walk, the exporters and the run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A single Pinterest item as scraped from a page snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    /// Numeric pin identifier taken from the `/pin/<id>/` link.
    pub id: String,
    /// Absolute URL of the pin detail page.
    pub url: String,
    /// Image URL as it appears in the grid (usually a thumbnail).
    pub image_url: String,
    /// Full-resolution image URL, when the thumbnail size could be rewritten.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url_hq: Option<String>,
    /// Alt text of the image.
    pub title: String,
    /// Like count, known only after the detail page has been visited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes: Option<u64>,
}

impl Pin {
    /// The URL worth downloading: the high-quality one when known.
    pub fn best_image_url(&self) -> &str {
        self.image_url_hq.as_deref().unwrap_or(&self.image_url)
    }

    /// Key used for de-duplication. Falls back to the image URL when
    /// the link carried no numeric id.
    pub fn key(&self) -> &str {
        if self.id.is_empty() {
            &self.image_url
        } else {
            &self.id
        }
    }
}

/// A pin that passed the like threshold and was recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinRecord {
    /// 1-based position in this run.
    pub index: usize,
    /// Search keyword that led to the pin.
    pub keyword: String,
    /// The pin itself (with `likes` filled in).
    pub pin: Pin,
    /// Like count at the time of the visit.
    pub likes: u64,
    /// Where the image was saved, in download mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// Where the pin came from in the random walk.
    pub source: PoolSource,
}

impl PinRecord {
    /// File name of the saved image, or an empty string in record mode.
    pub fn file_name(&self) -> String {
        self.local_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Which candidate pool produced a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolSource {
    /// Search results page.
    Primary,
    /// "More like this" links found on a detail page.
    Related,
}

impl fmt::Display for PoolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolSource::Primary => write!(f, "search"),
            PoolSource::Related => write!(f, "related"),
        }
    }
}

/// What happens to a pin that passes the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Save the image locally and record it.
    #[default]
    Download,
    /// Only record the pin in the spreadsheets.
    Record,
}

/// Ordering applied to candidates and exported rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Visit search results in page order.
    #[default]
    Relevance,
    /// Shuffle search results before visiting them.
    Random,
    /// Page order, but exported rows are sorted by likes (highest first).
    Likes,
}

/// Counters collected during a crawl.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlStats {
    /// Pins parsed from search snapshots (after de-duplication).
    pub found: usize,
    /// Detail pages visited for scoring.
    pub visited: usize,
    /// Detail pages revisited as idle browsing.
    pub revisited: usize,
    /// Pins that reached the like threshold.
    pub matched: usize,
    /// Images saved to disk.
    pub downloaded: usize,
    /// Candidates skipped because the history already had them.
    pub skipped_seen: usize,
    /// Candidates under the like threshold.
    pub below_threshold: usize,
    /// Matches whose image was a duplicate or below the minimum resolution.
    pub rejected_images: usize,
    /// Detail visits or downloads that failed.
    pub failed: usize,
    /// Whether the user interrupted the run.
    pub interrupted: bool,
}

/// Everything the run report needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub keywords: Vec<String>,
    pub min_likes: u64,
    pub max_results: usize,
    pub mode: OutputMode,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub task_folder: PathBuf,
    pub stats: CrawlStats,
    pub records: Vec<PinRecord>,
    /// Human-readable export destinations (workbook path, sheet URL).
    pub exports: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(id: &str) -> Pin {
        Pin {
            id: id.to_string(),
            url: format!("https://www.pinterest.com/pin/{}/", id),
            image_url: "https://i.pinimg.com/236x/aa/bb/cc.jpg".to_string(),
            image_url_hq: None,
            title: String::new(),
            likes: None,
        }
    }

    #[test]
    fn test_best_image_url_prefers_hq() {
        let mut p = pin("1");
        assert_eq!(p.best_image_url(), "https://i.pinimg.com/236x/aa/bb/cc.jpg");

        p.image_url_hq = Some("https://i.pinimg.com/originals/aa/bb/cc.jpg".to_string());
        assert_eq!(p.best_image_url(), "https://i.pinimg.com/originals/aa/bb/cc.jpg");
    }

    #[test]
    fn test_key_falls_back_to_image_url() {
        assert_eq!(pin("42").key(), "42");
        assert_eq!(pin("").key(), "https://i.pinimg.com/236x/aa/bb/cc.jpg");
    }

    #[test]
    fn test_record_file_name() {
        let record = PinRecord {
            index: 1,
            keyword: "ui".to_string(),
            pin: pin("7"),
            likes: 900,
            local_path: Some(PathBuf::from("/tmp/run/ui_900_0001.jpg")),
            source: PoolSource::Primary,
        };
        assert_eq!(record.file_name(), "ui_900_0001.jpg");

        let unsaved = PinRecord {
            local_path: None,
            ..record
        };
        assert_eq!(unsaved.file_name(), "");
    }
}
