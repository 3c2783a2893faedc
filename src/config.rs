//! Configuration file handling.
//!
//! This module handles loading, validating and merging configuration from
//! `config.json` (or a `.toml` file with the same layout).

use crate::models::{OutputMode, SortMode};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Download / output settings.
    #[serde(default)]
    pub download: DownloadConfig,

    /// Pacing and browser behaviour.
    #[serde(default)]
    pub behavior: BehaviorConfig,

    /// Spreadsheet exports.
    #[serde(default)]
    pub export: ExportConfig,

    /// Seen-pin history.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Debug artifacts.
    #[serde(default)]
    pub debug: DebugConfig,
}

/// Search and random-walk settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Keywords to search for. A single string is accepted too.
    #[serde(default = "default_keywords", deserialize_with = "one_or_many")]
    pub keywords: Vec<String>,

    /// Minimum like count for a pin to be kept.
    #[serde(default = "default_min_likes")]
    pub min_likes: u64,

    /// Stop after this many matching pins.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Base delay after each scroll, in seconds.
    #[serde(default = "default_scroll_delay")]
    pub scroll_delay: f64,

    /// Candidate / export ordering.
    #[serde(default)]
    pub sort: SortMode,

    /// Chance of following a related pin instead of the next search result.
    #[serde(default = "default_random_walk_probability")]
    pub random_walk_probability: f64,

    /// Chance of idly revisiting an already visited pin.
    #[serde(default = "default_revisit_probability")]
    pub revisit_probability: f64,

    /// Upper bound on detail pages visited. Defaults to ten per wanted result.
    #[serde(default)]
    pub max_candidates: Option<usize>,

    /// Capacity of each random-walk pool.
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            min_likes: default_min_likes(),
            max_results: default_max_results(),
            scroll_delay: default_scroll_delay(),
            sort: SortMode::default(),
            random_walk_probability: default_random_walk_probability(),
            revisit_probability: default_revisit_probability(),
            max_candidates: None,
            pool_capacity: default_pool_capacity(),
        }
    }
}

impl SearchConfig {
    /// Effective candidate budget.
    pub fn candidate_budget(&self) -> usize {
        self.max_candidates
            .unwrap_or_else(|| self.max_results.saturating_mul(10))
    }

    /// Number of scrolls needed for the wanted result count.
    /// One scroll loads roughly 25 pins.
    pub fn scroll_times(&self) -> usize {
        (self.max_results / 25 + 1).max(3)
    }
}

fn default_keywords() -> Vec<String> {
    vec!["UI design".to_string()]
}

fn default_min_likes() -> u64 {
    500
}

fn default_max_results() -> usize {
    100
}

fn default_scroll_delay() -> f64 {
    2.0
}

fn default_random_walk_probability() -> f64 {
    0.3
}

fn default_revisit_probability() -> f64 {
    0.1
}

fn default_pool_capacity() -> usize {
    200
}

/// Accept either `"kw"` or `["kw1", "kw2"]`.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Minimum image resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}

/// Where and how matches are saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Base folder; each run gets its own sub-folder.
    #[serde(default = "default_save_path")]
    pub save_path: String,

    /// File name template (`{category}`, `{likes}`, `{index}`, `{id}`).
    #[serde(default = "default_naming_format")]
    pub naming_format: String,

    /// Extension used for saved images.
    #[serde(default = "default_image_format")]
    pub image_format: String,

    /// Images smaller than this are skipped.
    #[serde(default)]
    pub min_resolution: Resolution,

    /// Download images or only record them.
    #[serde(default)]
    pub mode: OutputMode,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            save_path: default_save_path(),
            naming_format: default_naming_format(),
            image_format: default_image_format(),
            min_resolution: Resolution::default(),
            mode: OutputMode::default(),
        }
    }
}

fn default_save_path() -> String {
    "./downloads".to_string()
}

fn default_naming_format() -> String {
    "{category}_{likes}_{index}".to_string()
}

fn default_image_format() -> String {
    "jpg".to_string()
}

/// Pacing and browser behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Lower bound of the delay between pins, in seconds.
    #[serde(default = "default_delay_min")]
    pub random_delay_min: f64,

    /// Upper bound of the delay between pins, in seconds.
    #[serde(default = "default_delay_max")]
    pub random_delay_max: f64,

    /// User agents; the first one is used.
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,

    /// Run the browser without a window.
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Navigation timeout for a single page, in seconds.
    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            random_delay_min: default_delay_min(),
            random_delay_max: default_delay_max(),
            user_agents: default_user_agents(),
            headless: true,
            page_timeout_secs: default_page_timeout(),
        }
    }
}

impl BehaviorConfig {
    /// The user agent sent by the browser and the downloader.
    pub fn user_agent(&self) -> &str {
        self.user_agents
            .first()
            .map(String::as_str)
            .unwrap_or(FALLBACK_USER_AGENT)
    }
}

const FALLBACK_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn default_delay_min() -> f64 {
    1.0
}

fn default_delay_max() -> f64 {
    3.0
}

fn default_user_agents() -> Vec<String> {
    vec![FALLBACK_USER_AGENT.to_string()]
}

fn default_true() -> bool {
    true
}

fn default_page_timeout() -> u64 {
    15
}

/// Spreadsheet export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Write `download_report.xlsx` into the task folder.
    #[serde(default = "default_true")]
    pub excel: bool,

    /// Append rows to a Google Sheet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_sheets: Option<GoogleSheetsConfig>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            excel: true,
            google_sheets: None,
        }
    }
}

/// Google Sheets target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleSheetsConfig {
    /// Spreadsheet document id (from its URL).
    #[serde(default)]
    pub spreadsheet_id: String,

    /// Service-account key file.
    #[serde(default)]
    pub credentials_path: String,
}

/// Seen-pin history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Skip pins recorded in earlier runs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// History file. Defaults to `<save_path>/.download_history.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level name (`trace`, `debug`, `info`, `warn`, `error`).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file; empty disables file logging.
    #[serde(default = "default_log_file")]
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "pinscout.log".to_string()
}

/// Debug artifacts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Dump the raw search snapshot to `snapshot_debug.html`.
    #[serde(default)]
    pub dump_snapshot: bool,
}

impl Config {
    /// Load configuration from a file path.
    ///
    /// `.toml` files are parsed as TOML, everything else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

        let config: Config = if is_toml {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        };

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence, but only when explicitly given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if !args.keyword.is_empty() {
            self.search.keywords = args.keyword.clone();
        }
        if let Some(min_likes) = args.min_likes {
            self.search.min_likes = min_likes;
        }
        if let Some(max_results) = args.max_results {
            self.search.max_results = max_results;
        }
        if let Some(sort) = args.sort {
            self.search.sort = sort;
        }
        if let Some(ref save_path) = args.save_path {
            self.download.save_path = save_path.to_string_lossy().to_string();
        }
        if let Some(mode) = args.mode {
            self.download.mode = mode;
        }
        if args.headful {
            self.behavior.headless = false;
        }
        if args.no_excel {
            self.export.excel = false;
        }
        if args.dump_snapshot {
            self.debug.dump_snapshot = true;
        }
    }

    /// Check value ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let keywords: Vec<&String> = self
            .search
            .keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .collect();
        if keywords.is_empty() {
            bail!("search.keywords must contain at least one non-empty keyword");
        }

        if self.search.max_results == 0 {
            bail!("search.max_results must be a positive integer");
        }

        if self.search.scroll_delay < 0.0 {
            bail!("search.scroll_delay must not be negative");
        }

        let walk = self.search.random_walk_probability;
        let revisit = self.search.revisit_probability;
        if !(0.0..=1.0).contains(&walk) {
            bail!("search.random_walk_probability must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&revisit) {
            bail!("search.revisit_probability must be between 0.0 and 1.0");
        }
        if walk + revisit > 1.0 {
            bail!("search.random_walk_probability + search.revisit_probability must not exceed 1.0");
        }

        if self.search.pool_capacity == 0 {
            bail!("search.pool_capacity must be at least 1");
        }

        if self.download.save_path.trim().is_empty() {
            bail!("download.save_path must not be empty");
        }

        if self.behavior.random_delay_min < 0.0
            || self.behavior.random_delay_min > self.behavior.random_delay_max
        {
            bail!("behavior.random_delay_min must be between 0 and behavior.random_delay_max");
        }

        if self.behavior.page_timeout_secs == 0 {
            bail!("behavior.page_timeout_secs must be at least 1");
        }

        if let Some(ref sheets) = self.export.google_sheets {
            if sheets.spreadsheet_id.trim().is_empty() || sheets.credentials_path.trim().is_empty()
            {
                bail!("export.google_sheets needs both spreadsheet_id and credentials_path");
            }
        }

        Ok(())
    }

    /// Keywords with blank entries removed.
    pub fn keywords(&self) -> Vec<String> {
        self.search
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    }

    /// Resolved location of the history file.
    pub fn history_path(&self) -> PathBuf {
        match self.history.file {
            Some(ref file) => PathBuf::from(file),
            None => Path::new(&self.download.save_path).join(".download_history.json"),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_json() -> String {
        let config = Config::default();
        serde_json::to_string_pretty(&config).unwrap_or_default()
    }
}
