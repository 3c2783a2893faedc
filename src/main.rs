//! Pinscout - find popular Pinterest pins
//!
//! A CLI tool that drives a browser through Pinterest search results,
//! reads each pin's like count and keeps the popular ones as downloaded
//! images, Excel rows and/or Google Sheets rows.
//!
//! Exit codes:
//!   0   - Success (also when the confirmation prompt is declined)
//!   1   - Runtime error (config, browser launch, etc.)
//!   130 - Interrupted with Ctrl-C; partial results were still written
//!         (a second Ctrl-C quits at once without writing them)

mod browser;
mod cli;
mod config;
mod crawler;
mod downloader;
mod export;
mod extract;
mod history;
mod models;
mod pacing;
mod report;
mod utils;
mod walk;

use anyhow::{Context, Result};
use browser::{ChromeDriver, LaunchOptions, PageDriver};
use chrono::{Local, Utc};
use cli::Args;
use config::{Config, LoggingConfig, DEFAULT_CONFIG_FILE};
use crawler::{CrawlSettings, Crawler};
use downloader::{DownloadSettings, Downloader};
use history::History;
use models::{OutputMode, RunReport};
use pacing::Pacer;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Exit code after Ctrl-C, as shells report SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config(&args);
    }

    // Load configuration before logging: it names the log file
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, &config.logging);

    info!("Pinscout v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    if args.config.is_none() && !Path::new(DEFAULT_CONFIG_FILE).exists() {
        warn!("No {} found, using default settings", DEFAULT_CONFIG_FILE);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        eprintln!("\n❌ Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let result = if args.clear_history {
        handle_clear_history(&config)
    } else if let Some(ref snapshot) = args.snapshot {
        handle_snapshot(snapshot)
    } else {
        run_crawl(&args, config).await
    };

    match result {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default config.json.
fn handle_init_config(args: &Args) -> Result<()> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            path.display()
        );
        std::process::exit(1);
    }

    let content = Config::default_json();
    std::fs::write(&path, &content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("✅ Created {} with default settings.", path.display());
    println!("   Edit it to set keywords, the like threshold, output and exports.");
    Ok(())
}

/// Initialize logging: console plus an optional plain-text log file.
///
/// `RUST_LOG` wins over `--verbose`/`--quiet`, which win over the config.
fn init_logging(args: &Args, logging: &LoggingConfig) {
    let level = args
        .log_level_override()
        .map(|l| l.to_string().to_lowercase())
        .unwrap_or_else(|| logging.level.clone());

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let file_layer = open_log_file(&logging.file).map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Warning: failed to set up logging: {}", e);
    }
}

/// Open the log file for appending. Empty path disables file logging.
fn open_log_file(path: &str) -> Option<std::fs::File> {
    if path.trim().is_empty() {
        return None;
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Warning: cannot create log directory {}: {}", parent.display(), e);
            return None;
        }
    }

    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Warning: cannot open log file {}: {}", path.display(), e);
            None
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location; a broken default file is an error too
    match Config::load_default()? {
        Some(config) => Ok(config),
        None => Ok(Config::default()),
    }
}

/// Handle --clear-history.
fn handle_clear_history(config: &Config) -> Result<i32> {
    let mut history = History::load(config.history_path());
    let count = history.len();
    history.clear()?;

    println!(
        "🧹 Cleared {} pins from history ({})",
        count,
        history.path().display()
    );
    Ok(0)
}

/// Handle --snapshot: parse a saved search page without a browser.
fn handle_snapshot(path: &Path) -> Result<i32> {
    println!("🔍 Parsing snapshot: {}\n", path.display());

    let html = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let pins = extract::parse_search_snapshot(&html);

    if pins.is_empty() {
        println!("   No pins found.");
    } else {
        for pin in &pins {
            let title = if pin.title.is_empty() {
                "(untitled)".to_string()
            } else {
                utils::truncate(&pin.title, 40)
            };
            println!("   📌 {:<20} {:<40} {}", pin.id, title, pin.best_image_url());
        }
        println!("\n   Total: {} pins", pins.len());
    }

    println!("\n✅ Snapshot parsed. No pages were visited.");
    Ok(0)
}

/// Raise the stop flag. Returns true if it was already raised.
fn request_stop(stop: &AtomicBool) -> bool {
    stop.swap(true, Ordering::SeqCst)
}

/// Ask a yes/no question on the terminal. Anything but "y"/"yes" is no.
fn confirm(question: &str) -> bool {
    print!("{} [y/N] ", question);
    if std::io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

/// Run the complete crawl workflow. Returns the exit code.
async fn run_crawl(args: &Args, config: Config) -> Result<i32> {
    let keywords = config.keywords();

    println!("📌 Pinscout");
    println!("   Keywords: {}", keywords.join(", "));
    println!(
        "   Min likes: {}",
        utils::format_number(config.search.min_likes)
    );
    println!("   Max results: {}", config.search.max_results);
    println!("   Mode: {:?}", config.download.mode);
    println!("   Save path: {}", config.download.save_path);
    println!("\n   For personal study only. Respect Pinterest's terms and the authors' rights.\n");

    if !args.yes && !confirm("Start crawling?") {
        println!("Cancelled.");
        return Ok(0);
    }

    let started_at = Utc::now();
    let start_time = Instant::now();

    // Per-run task folder
    let task_name = crawler::task_folder_name(&keywords, Local::now().naive_local());
    let task_dir = Path::new(&config.download.save_path).join(&task_name);
    std::fs::create_dir_all(&task_dir)
        .with_context(|| format!("Failed to create task folder {}", task_dir.display()))?;
    info!("Task folder: {}", task_dir.display());

    let history = if config.history.enabled {
        History::load(config.history_path())
    } else {
        History::in_memory()
    };

    let downloader = match config.download.mode {
        OutputMode::Download => Some(Downloader::new(DownloadSettings::from_config(
            &config,
            task_dir.clone(),
        ))?),
        OutputMode::Record => None,
    };

    let exporters = export::build_exporters(&config, &task_dir);

    // First Ctrl-C asks the crawl to stop and still writes results so far.
    // A second one quits on the spot.
    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = stop.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if request_stop(&stop_signal) {
                eprintln!("\n⛔ Interrupted twice, exiting without writing results.");
                std::process::exit(EXIT_INTERRUPTED);
            }
            warn!("Interrupt received, finishing up... (Ctrl-C again to quit now)");
        }
    });

    println!("🌐 Launching browser...");
    let mut driver = ChromeDriver::launch(LaunchOptions::from(&config.behavior))
        .await
        .context("Failed to launch the browser (is Chrome or Chromium installed?)")?;

    println!("\n🔬 Crawling...\n");
    let crawler = Crawler::new(
        CrawlSettings::from_config(&config, task_dir.clone()),
        history,
        downloader,
        exporters,
        Pacer::new(
            config.behavior.random_delay_min,
            config.behavior.random_delay_max,
        ),
        stop,
    )
    .with_progress(!args.quiet);

    let outcome = crawler.run(&mut driver).await;
    driver.close().await;

    let duration = start_time.elapsed();
    let report = RunReport {
        keywords,
        min_likes: config.search.min_likes,
        max_results: config.search.max_results,
        mode: config.download.mode,
        started_at,
        duration_seconds: duration.as_secs_f64(),
        task_folder: task_dir.clone(),
        stats: outcome.stats,
        records: outcome.records,
        exports: outcome.exports,
    };

    println!("\n📝 Writing report...");
    let report_path = report::write_report(&report, args.format, &task_dir)?;

    // Print summary
    let stats = &report.stats;
    println!("\n📊 Crawl Summary:");
    println!("   Pins found: {}", stats.found);
    println!(
        "   Visited: {} (revisits: {})",
        stats.visited, stats.revisited
    );
    println!(
        "   Matched: {} | Recorded: {} | Downloaded: {}",
        stats.matched,
        report.records.len(),
        stats.downloaded
    );
    println!(
        "   Skipped: {} seen | {} below threshold | {} rejected images | {} failed",
        stats.skipped_seen, stats.below_threshold, stats.rejected_images, stats.failed
    );
    println!("   Duration: {}", utils::format_duration(duration));
    for location in &report.exports {
        println!("   📄 {}", location);
    }

    if stats.interrupted {
        println!(
            "\n⛔ Interrupted. Partial results saved to: {}",
            task_dir.display()
        );
        return Ok(EXIT_INTERRUPTED);
    }

    println!(
        "\n✅ Crawl complete! Report saved to: {}",
        report_path.display()
    );
    Ok(0)
}
