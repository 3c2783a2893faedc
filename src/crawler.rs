//! Crawl orchestration.
//!
//! For each keyword: open the search page, scroll, snapshot, seed the walker,
//! then visit candidates one at a time until enough matches are found. All
//! browser access goes through [`PageDriver`], so the whole loop runs against
//! a scripted driver in tests.

use crate::browser::PageDriver;
use crate::config::Config;
use crate::downloader::{sanitize_file_name, DownloadOutcome, Downloader};
use crate::export::Exporter;
use crate::extract::{max_like_count, parse_related_pins, parse_search_snapshot};
use crate::history::History;
use crate::models::{CrawlStats, OutputMode, Pin, PinRecord, PoolSource, SortMode};
use crate::pacing::Pacer;
use crate::utils::{estimate_remaining, format_duration};
use crate::walk::{Step, WalkConfig, Walker};
use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Name of the dumped search snapshot.
pub const SNAPSHOT_FILE: &str = "snapshot_debug.html";

const MAX_FOLDER_STEM_CHARS: usize = 60;

/// Per-run folder name: `<keywords>_<YYYYmmdd_HHMMSS>`, spaces replaced by `_`
/// and several keywords joined with `+`.
pub fn task_folder_name(keywords: &[String], started: NaiveDateTime) -> String {
    let joined = keywords
        .iter()
        .map(|k| k.trim().replace(' ', "_"))
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>()
        .join("+");
    let stem: String = sanitize_file_name(&joined)
        .chars()
        .take(MAX_FOLDER_STEM_CHARS)
        .collect();
    let stem = if stem.is_empty() { "pins".to_string() } else { stem };

    format!("{}_{}", stem, started.format("%Y%m%d_%H%M%S"))
}

/// Everything the crawl loop needs to know, resolved from the configuration.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub keywords: Vec<String>,
    pub min_likes: u64,
    pub max_results: usize,
    pub scroll_times: usize,
    pub scroll_delay: f64,
    /// Detail pages (visits and revisits) allowed per keyword.
    pub candidate_budget: usize,
    pub sort: SortMode,
    pub mode: OutputMode,
    pub walk: WalkConfig,
    pub dump_snapshot: bool,
    pub skip_seen: bool,
    pub task_dir: PathBuf,
}

impl CrawlSettings {
    pub fn from_config(config: &Config, task_dir: PathBuf) -> Self {
        Self {
            keywords: config.keywords(),
            min_likes: config.search.min_likes,
            max_results: config.search.max_results,
            scroll_times: config.search.scroll_times(),
            scroll_delay: config.search.scroll_delay,
            candidate_budget: config.search.candidate_budget(),
            sort: config.search.sort,
            mode: config.download.mode,
            walk: WalkConfig::from(&config.search),
            dump_snapshot: config.debug.dump_snapshot,
            skip_seen: config.history.enabled,
            task_dir,
        }
    }

    fn task_name(&self) -> String {
        self.task_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "pinscout".to_string())
    }
}

/// What a finished crawl produced.
#[derive(Debug)]
pub struct CrawlOutcome {
    pub stats: CrawlStats,
    pub records: Vec<PinRecord>,
    /// Locations reported by the exporters.
    pub exports: Vec<String>,
}

/// Drives one crawl over a page driver.
pub struct Crawler {
    settings: CrawlSettings,
    history: History,
    downloader: Option<Downloader>,
    exporters: Vec<Box<dyn Exporter>>,
    pacer: Pacer,
    stop: Arc<AtomicBool>,
    rng: StdRng,
    progress: ProgressBar,
    stats: CrawlStats,
    records: Vec<PinRecord>,
    started: Instant,
}

impl Crawler {
    /// `downloader` is only used in download mode.
    pub fn new(
        settings: CrawlSettings,
        history: History,
        downloader: Option<Downloader>,
        exporters: Vec<Box<dyn Exporter>>,
        pacer: Pacer,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let downloader = match settings.mode {
            OutputMode::Download => downloader,
            OutputMode::Record => None,
        };

        Self {
            settings,
            history,
            downloader,
            exporters,
            pacer,
            stop,
            rng: StdRng::from_os_rng(),
            progress: ProgressBar::hidden(),
            stats: CrawlStats::default(),
            records: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Use a fixed random source.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Show a progress bar of matches found.
    pub fn with_progress(mut self, show: bool) -> Self {
        if show {
            let pb = ProgressBar::new(self.settings.max_results as u64);
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .map(|s| s.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            self.progress = pb;
        }
        self
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn done(&self) -> bool {
        self.records.len() >= self.settings.max_results
    }

    /// Run every keyword, then finish the exporters.
    ///
    /// Never fails: errors are logged and counted so that whatever was found
    /// is still exported.
    pub async fn run(mut self, driver: &mut dyn PageDriver) -> CrawlOutcome {
        let task_name = self.settings.task_name();
        self.begin_exporters(&task_name).await;

        let keywords = self.settings.keywords.clone();
        for (i, keyword) in keywords.iter().enumerate() {
            if self.stopped() {
                self.stats.interrupted = true;
                break;
            }
            if self.done() {
                break;
            }
            self.crawl_keyword(driver, keyword, i).await;
        }

        self.progress.finish_and_clear();
        let exports = self.finish_exporters().await;

        if let Some(ref downloader) = self.downloader {
            debug!("{} images saved this run", downloader.count());
        }

        info!(
            "Crawl finished: {} visited, {} matched, {} recorded",
            self.stats.visited,
            self.stats.matched,
            self.records.len()
        );

        CrawlOutcome {
            stats: self.stats,
            records: self.records,
            exports,
        }
    }

    async fn begin_exporters(&mut self, task_name: &str) {
        let mut ready: Vec<Box<dyn Exporter>> = Vec::with_capacity(self.exporters.len());
        for mut exporter in self.exporters.drain(..) {
            match exporter.begin(task_name).await {
                Ok(()) => ready.push(exporter),
                Err(e) => warn!("{} export disabled: {}", exporter.name(), e),
            }
        }
        self.exporters = ready;
    }

    async fn finish_exporters(&mut self) -> Vec<String> {
        let mut exports = Vec::new();
        for exporter in self.exporters.iter_mut() {
            match exporter.finish().await {
                Ok(Some(location)) => exports.push(location),
                Ok(None) => {}
                Err(e) => warn!("{} export failed: {}", exporter.name(), e),
            }
        }
        exports
    }

    async fn crawl_keyword(&mut self, driver: &mut dyn PageDriver, keyword: &str, position: usize) {
        info!("Searching: {}", keyword);
        self.progress.set_message(keyword.to_string());

        if let Err(e) = driver.open_search(keyword).await {
            warn!("Could not open search for '{}': {}", keyword, e);
            self.stats.failed += 1;
            return;
        }

        if let Err(e) = driver
            .scroll(self.settings.scroll_times, self.settings.scroll_delay)
            .await
        {
            // Whatever loaded so far is still usable.
            warn!("Scrolling stopped early: {}", e);
        }

        let html = match driver.snapshot().await {
            Ok(html) => html,
            Err(e) => {
                warn!("Could not read search page for '{}': {}", keyword, e);
                self.stats.failed += 1;
                return;
            }
        };

        if self.settings.dump_snapshot {
            self.dump_snapshot(&html, position);
        }

        let pins = parse_search_snapshot(&html);
        self.stats.found += pins.len();
        if pins.is_empty() {
            warn!("No pins found for '{}'", keyword);
            return;
        }
        info!("Found {} pins for '{}'", pins.len(), keyword);

        let mut walker = Walker::new(self.settings.walk);
        walker.seed(pins);
        if self.settings.sort == SortMode::Random {
            walker.shuffle_primary(&mut self.rng);
        }
        let (primary, _, _) = walker.pool_sizes();
        debug!("{} candidates queued", primary);

        self.walk(driver, &mut walker, keyword).await;
    }

    async fn walk(&mut self, driver: &mut dyn PageDriver, walker: &mut Walker, keyword: &str) {
        let mut pages = 0;

        loop {
            if self.stopped() {
                info!("Stop requested");
                self.stats.interrupted = true;
                break;
            }
            if self.done() {
                info!("Reached {} results", self.settings.max_results);
                break;
            }
            if pages >= self.settings.candidate_budget {
                info!("Candidate budget of {} pages used up", self.settings.candidate_budget);
                break;
            }

            let Some(step) = walker.next(&mut self.rng) else {
                debug!("Candidate pools exhausted");
                break;
            };

            match step {
                Step::Revisit(pin) => {
                    pages += 1;
                    self.stats.revisited += 1;
                    debug!("Revisiting {}", pin.url);
                    if let Err(e) = driver.visit_detail(&pin.url).await {
                        debug!("Revisit failed: {}", e);
                    }
                }
                Step::Visit { pin, source } => {
                    if self.settings.skip_seen && self.history.contains(pin.key()) {
                        debug!("Already seen: {}", pin.key());
                        self.stats.skipped_seen += 1;
                        walker.mark_visited(&pin);
                        continue;
                    }

                    pages += 1;
                    self.visit(driver, walker, keyword, pin, source).await;
                }
            }

            self.pacer.pause().await;
        }
    }

    async fn visit(
        &mut self,
        driver: &mut dyn PageDriver,
        walker: &mut Walker,
        keyword: &str,
        mut pin: Pin,
        source: PoolSource,
    ) {
        self.stats.visited += 1;
        debug!("[{}] Visiting {} ({})", self.stats.visited, pin.url, source);

        let detail = match driver.visit_detail(&pin.url).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!("Could not read {}: {}", pin.url, e);
                self.stats.failed += 1;
                walker.mark_visited(&pin);
                return;
            }
        };

        let likes = max_like_count(&detail.text);
        pin.likes = Some(likes);
        walker.mark_visited(&pin);

        let related = walker.add_related(parse_related_pins(&detail.html, &pin.id));
        if related > 0 {
            debug!("Queued {} related pins", related);
        }

        if likes < self.settings.min_likes {
            debug!("{} likes < {}, skipping {}", likes, self.settings.min_likes, pin.url);
            self.stats.below_threshold += 1;
            return;
        }

        info!("✓ {} likes: {}", likes, pin.url);
        self.stats.matched += 1;
        self.accept(keyword, pin, likes, source).await;
    }

    /// Save or record a pin that passed the threshold.
    async fn accept(&mut self, keyword: &str, pin: Pin, likes: u64, source: PoolSource) {
        let local_path = match self.downloader {
            Some(ref mut downloader) => match downloader.download(&pin, keyword, likes).await {
                DownloadOutcome::Saved(path) => Some(path),
                DownloadOutcome::Duplicate | DownloadOutcome::TooSmall { .. } => {
                    self.stats.rejected_images += 1;
                    return;
                }
                DownloadOutcome::Failed => {
                    self.stats.failed += 1;
                    return;
                }
            },
            None => None,
        };

        if local_path.is_some() {
            self.stats.downloaded += 1;
        }
        self.history.insert(pin.key());

        let record = PinRecord {
            index: self.records.len() + 1,
            keyword: keyword.to_string(),
            pin,
            likes,
            local_path,
            source,
        };

        for exporter in self.exporters.iter_mut() {
            if let Err(e) = exporter.add_record(&record).await {
                warn!("{} export of pin {} failed: {}", exporter.name(), record.pin.key(), e);
            }
        }

        self.records.push(record);
        self.progress.set_position(self.records.len() as u64);

        let found = self.records.len();
        if let Some(eta) = estimate_remaining(self.started.elapsed(), found, self.settings.max_results) {
            info!(
                "{}/{} found, about {} to go",
                found,
                self.settings.max_results,
                format_duration(eta)
            );
        }
    }

    fn dump_snapshot(&self, html: &str, position: usize) {
        let path = snapshot_path(&self.settings.task_dir, position);
        match std::fs::write(&path, html) {
            Ok(()) => info!("Snapshot saved: {}", path.display()),
            Err(e) => warn!("Failed to save snapshot {}: {}", path.display(), e),
        }
    }
}

/// `snapshot_debug.html` for the first keyword, numbered after that.
pub fn snapshot_path(task_dir: &Path, position: usize) -> PathBuf {
    if position == 0 {
        task_dir.join(SNAPSHOT_FILE)
    } else {
        task_dir.join(format!("snapshot_debug_{}.html", position + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserError, DetailPage};
    use crate::export::ExportError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned pages and records what was visited.
    #[derive(Default)]
    struct FakeDriver {
        search_pages: HashMap<String, String>,
        details: HashMap<String, DetailPage>,
        visits: Vec<String>,
        searches: Vec<String>,
        current: Option<String>,
    }

    impl FakeDriver {
        fn with_search(self, keyword: &str, ids: &[&str]) -> Self {
            self.with_search_from(keyword, ids, "https://i.pinimg.com")
        }

        /// Search results whose thumbnails live under `image_host`.
        fn with_search_from(mut self, keyword: &str, ids: &[&str], image_host: &str) -> Self {
            let cards: String = ids
                .iter()
                .map(|id| {
                    format!(
                        r#"<div data-test-id="pin"><a href="/pin/{id}/"><img src="{image_host}/236x/{id}.jpg" alt="pin {id}"></a></div>"#
                    )
                })
                .collect();
            self.search_pages
                .insert(keyword.to_string(), format!("<html><body>{}</body></html>", cards));
            self
        }

        fn with_detail(mut self, id: &str, likes: &str, related: &[&str]) -> Self {
            let links: String = related
                .iter()
                .map(|r| format!(r#"<a href="/pin/{r}/"><img src="https://i.pinimg.com/236x/{r}.jpg"></a>"#))
                .collect();
            self.details.insert(
                pin_url(id),
                DetailPage {
                    text: format!("Save\nPin {}\n{}\nMore like this", id, likes),
                    html: format!("<html><body>{}</body></html>", links),
                },
            );
            self
        }
    }

    fn pin_url(id: &str) -> String {
        format!("https://www.pinterest.com/pin/{}/", id)
    }

    #[async_trait]
    impl PageDriver for FakeDriver {
        async fn open_search(&mut self, keyword: &str) -> Result<(), BrowserError> {
            self.searches.push(keyword.to_string());
            if !self.search_pages.contains_key(keyword) {
                return Err(BrowserError::Navigation {
                    url: keyword.to_string(),
                    message: "no such page".to_string(),
                });
            }
            self.current = Some(keyword.to_string());
            Ok(())
        }

        async fn scroll(&mut self, _times: usize, _delay_secs: f64) -> Result<(), BrowserError> {
            Ok(())
        }

        async fn snapshot(&mut self) -> Result<String, BrowserError> {
            Ok(self
                .current
                .as_ref()
                .and_then(|k| self.search_pages.get(k))
                .cloned()
                .unwrap_or_default())
        }

        async fn visit_detail(&mut self, url: &str) -> Result<DetailPage, BrowserError> {
            self.visits.push(url.to_string());
            self.details
                .get(url)
                .cloned()
                .ok_or_else(|| BrowserError::Timeout {
                    url: url.to_string(),
                    secs: 15,
                })
        }

        async fn close(&mut self) {}
    }

    /// Logs every exporter call.
    struct RecordingExporter {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Exporter for RecordingExporter {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn begin(&mut self, task_name: &str) -> Result<(), ExportError> {
            self.log.lock().unwrap().push(format!("begin {}", task_name));
            Ok(())
        }

        async fn add_record(&mut self, record: &PinRecord) -> Result<(), ExportError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("record {} {}", record.index, record.pin.id));
            Ok(())
        }

        async fn finish(&mut self) -> Result<Option<String>, ExportError> {
            self.log.lock().unwrap().push("finish".to_string());
            Ok(Some("memory".to_string()))
        }
    }

    fn settings(task_dir: &Path) -> CrawlSettings {
        CrawlSettings {
            keywords: vec!["ui".to_string()],
            min_likes: 500,
            max_results: 10,
            scroll_times: 3,
            scroll_delay: 0.0,
            candidate_budget: 100,
            sort: SortMode::Relevance,
            mode: OutputMode::Record,
            walk: WalkConfig {
                random_walk_probability: 0.0,
                revisit_probability: 0.0,
                capacity: 50,
            },
            dump_snapshot: false,
            skip_seen: true,
            task_dir: task_dir.join("ui_20240101_000000"),
        }
    }

    fn crawler(settings: CrawlSettings, history: History) -> (Crawler, Arc<Mutex<Vec<String>>>) {
        crawler_with(settings, history, None)
    }

    fn crawler_with(
        settings: CrawlSettings,
        history: History,
        downloader: Option<Downloader>,
    ) -> (Crawler, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let exporter = RecordingExporter { log: log.clone() };
        let crawler = Crawler::new(
            settings,
            history,
            downloader,
            vec![Box::new(exporter)],
            Pacer::instant(),
            Arc::new(AtomicBool::new(false)),
        )
        .with_rng(StdRng::seed_from_u64(11));
        (crawler, log)
    }

    fn standard_driver() -> FakeDriver {
        FakeDriver::default()
            .with_search("ui", &["1", "2", "3"])
            .with_detail("1", "1.2K", &[])
            .with_detail("2", "50", &[])
            .with_detail("3", "900", &[])
    }

    #[tokio::test]
    async fn test_records_pins_above_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = standard_driver();
        let (crawler, log) = crawler(settings(dir.path()), History::in_memory());

        let outcome = crawler.run(&mut driver).await;

        let ids: Vec<&str> = outcome.records.iter().map(|r| r.pin.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(outcome.records[0].likes, 1200);
        assert_eq!(outcome.records[1].index, 2);
        assert!(outcome.records.iter().all(|r| r.local_path.is_none()));

        assert_eq!(outcome.stats.found, 3);
        assert_eq!(outcome.stats.visited, 3);
        assert_eq!(outcome.stats.matched, 2);
        assert_eq!(outcome.stats.below_threshold, 1);
        assert_eq!(outcome.stats.downloaded, 0);
        assert!(!outcome.stats.interrupted);
        assert_eq!(outcome.exports, vec!["memory"]);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "begin ui_20240101_000000",
                "record 1 1",
                "record 2 3",
                "finish"
            ]
        );
    }

    /// A PNG header that declares the given dimensions.
    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0, 0, 0, 0, 0]);
        bytes
    }

    #[tokio::test]
    async fn test_download_mode_saves_and_counts() {
        use crate::config::Resolution;
        use crate::downloader::DownloadSettings;
        use httpmock::prelude::*;

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/originals/1.jpg");
                then.status(200).body(png(1024, 768));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/originals/2.jpg");
                then.status(200).body(png(120, 90));
            })
            .await;
        // Pin 3 is gone at both sizes.
        server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/3.jpg");
                then.status(404);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.mode = OutputMode::Download;
        let downloader = Downloader::new(DownloadSettings {
            save_dir: settings.task_dir.clone(),
            naming_format: "{category}_{likes}_{index}".to_string(),
            image_format: "png".to_string(),
            min_resolution: Resolution {
                width: 800,
                height: 600,
            },
            user_agent: "pinscout-test".to_string(),
        })
        .unwrap();

        let history_path = dir.path().join("history.json");
        let mut driver = FakeDriver::default()
            .with_search_from("ui", &["1", "2", "3"], &server.base_url())
            .with_detail("1", "1.2K", &[])
            .with_detail("2", "900", &[])
            .with_detail("3", "700", &[]);
        let (crawler, log) = crawler_with(settings, History::load(&history_path), Some(downloader));

        let outcome = crawler.run(&mut driver).await;

        assert_eq!(outcome.stats.matched, 3);
        assert_eq!(outcome.stats.downloaded, 1);
        assert_eq!(outcome.stats.rejected_images, 1);
        assert_eq!(outcome.stats.failed, 1);

        assert_eq!(outcome.records.len(), 1);
        let saved = outcome.records[0].local_path.as_ref().unwrap();
        assert_eq!(outcome.records[0].file_name(), "ui_1200_0001.png");
        assert_eq!(std::fs::read(saved).unwrap(), png(1024, 768));

        // Rejected and failed images leave no record and no history entry.
        let reloaded = History::load(&history_path);
        assert!(reloaded.contains("1"));
        assert!(!reloaded.contains("2"));
        assert!(!reloaded.contains("3"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["begin ui_20240101_000000", "record 1 1", "finish"]
        );
    }

    #[tokio::test]
    async fn test_history_skips_and_grows() {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("history.json");
        let mut history = History::load(&history_path);
        history.insert("1");

        let mut driver = standard_driver();
        let (crawler, _) = crawler(settings(dir.path()), history);
        let outcome = crawler.run(&mut driver).await;

        assert_eq!(outcome.stats.skipped_seen, 1);
        assert!(!driver.visits.contains(&pin_url("1")));
        assert_eq!(outcome.records.len(), 1);

        // Only matches are remembered.
        let reloaded = History::load(&history_path);
        assert!(reloaded.contains("1"));
        assert!(reloaded.contains("3"));
        assert!(!reloaded.contains("2"));
    }

    #[tokio::test]
    async fn test_stops_at_max_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.max_results = 1;

        let mut driver = standard_driver();
        let (crawler, _) = crawler(settings, History::in_memory());
        let outcome = crawler.run(&mut driver).await;

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(driver.visits, vec![pin_url("1")]);
    }

    #[tokio::test]
    async fn test_candidate_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.candidate_budget = 2;

        let mut driver = standard_driver();
        let (crawler, _) = crawler(settings, History::in_memory());
        let outcome = crawler.run(&mut driver).await;

        assert_eq!(outcome.stats.visited, 2);
        assert_eq!(outcome.records.len(), 1);
    }

    #[tokio::test]
    async fn test_follows_related_pins() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = FakeDriver::default()
            .with_search("ui", &["1"])
            .with_detail("1", "20", &["8", "9"])
            .with_detail("8", "3K", &[])
            .with_detail("9", "600", &["1"]);

        let (crawler, _) = crawler(settings(dir.path()), History::in_memory());
        let outcome = crawler.run(&mut driver).await;

        // Most recently discovered related pin first; pin 1 is never re-scored.
        assert_eq!(driver.visits, vec![pin_url("1"), pin_url("9"), pin_url("8")]);
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome
            .records
            .iter()
            .all(|r| r.source == PoolSource::Related));
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.keywords = vec!["missing".to_string(), "ui".to_string()];

        // Pin 2 has no detail page: the visit times out.
        let mut driver = FakeDriver::default()
            .with_search("ui", &["1", "2", "3"])
            .with_detail("1", "1.2K", &[])
            .with_detail("3", "900", &[]);

        let (crawler, _) = crawler(settings, History::in_memory());
        let outcome = crawler.run(&mut driver).await;

        assert_eq!(driver.searches, vec!["missing", "ui"]);
        assert_eq!(outcome.stats.failed, 2);
        assert_eq!(outcome.records.len(), 2);
    }

    #[tokio::test]
    async fn test_stop_flag_still_finishes_exports() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = standard_driver();
        let (crawler, log) = crawler(settings(dir.path()), History::in_memory());
        crawler.stop.store(true, Ordering::SeqCst);

        let outcome = crawler.run(&mut driver).await;

        assert!(outcome.stats.interrupted);
        assert!(driver.visits.is_empty());
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("finish"));
    }

    #[tokio::test]
    async fn test_revisits_are_not_rescored() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.walk.revisit_probability = 1.0;
        settings.candidate_budget = 5;

        let mut driver = standard_driver();
        let (crawler, _) = crawler(settings, History::in_memory());
        let outcome = crawler.run(&mut driver).await;

        // First step must be a visit (history empty), then only revisits.
        assert_eq!(outcome.stats.visited, 1);
        assert_eq!(outcome.stats.revisited, 4);
        assert_eq!(outcome.records.len(), 1);
        assert!(driver.visits.iter().all(|v| v == &pin_url("1")));
    }

    #[tokio::test]
    async fn test_dumps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.dump_snapshot = true;
        std::fs::create_dir_all(&settings.task_dir).unwrap();
        let task_dir = settings.task_dir.clone();

        let mut driver = standard_driver();
        let (crawler, _) = crawler(settings, History::in_memory());
        crawler.run(&mut driver).await;

        let dumped = std::fs::read_to_string(task_dir.join(SNAPSHOT_FILE)).unwrap();
        assert!(dumped.contains("/pin/1/"));
    }

    #[test]
    fn test_task_folder_name() {
        let started = chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(14, 5, 0))
            .unwrap();
        assert_eq!(
            task_folder_name(&["UI design".to_string()], started),
            "UI_design_20240309_140500"
        );
        assert_eq!(
            task_folder_name(&["logo".to_string(), "a/b".to_string()], started),
            "logo+a_b_20240309_140500"
        );
        assert_eq!(task_folder_name(&[], started), "pins_20240309_140500");
    }

    #[test]
    fn test_snapshot_path_numbering() {
        let dir = Path::new("/tmp/task");
        assert_eq!(snapshot_path(dir, 0), dir.join("snapshot_debug.html"));
        assert_eq!(snapshot_path(dir, 1), dir.join("snapshot_debug_2.html"));
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.search.keywords = vec!["a".to_string(), " ".to_string()];
        config.search.max_results = 30;
        config.history.enabled = false;

        let settings = CrawlSettings::from_config(&config, PathBuf::from("out/a_1"));
        assert_eq!(settings.keywords, vec!["a"]);
        assert_eq!(settings.scroll_times, 3);
        assert_eq!(settings.candidate_budget, 300);
        assert!(!settings.skip_seen);
        assert_eq!(settings.task_name(), "a_1");
    }
}
