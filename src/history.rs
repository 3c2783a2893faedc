//! Persistent record of pins already handled.
//!
//! The history file survives across runs so the same pin is never
//! downloaded or recorded twice.

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// On-disk layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    pins: Vec<String>,
    #[serde(default)]
    total_count: usize,
    #[serde(default)]
    last_updated: String,
}

/// Set of seen pin ids backed by a JSON file.
#[derive(Debug)]
pub struct History {
    path: PathBuf,
    pins: BTreeSet<String>,
    auto_save: bool,
}

impl History {
    /// Load the history, starting empty if the file is missing or unreadable.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let pins = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HistoryFile>(&content) {
                Ok(file) => file.pins.into_iter().filter(|p| !p.is_empty()).collect(),
                Err(e) => {
                    warn!(
                        "History file {} is corrupt ({}), starting empty",
                        path.display(),
                        e
                    );
                    BTreeSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No history at {}, a new one will be created", path.display());
                BTreeSet::new()
            }
            Err(e) => {
                warn!("Failed to read history {}: {}", path.display(), e);
                BTreeSet::new()
            }
        };

        info!("History loaded: {} pins already seen", pins.len());

        Self {
            path,
            pins,
            auto_save: true,
        }
    }

    /// An in-memory history that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            pins: BTreeSet::new(),
            auto_save: false,
        }
    }

    /// Whether the pin has been handled before.
    pub fn contains(&self, pin_id: &str) -> bool {
        self.pins.contains(pin_id)
    }

    /// Add a pin id, saving immediately. Returns true if it was new.
    ///
    /// A failed save is logged; the id stays in memory.
    pub fn insert(&mut self, pin_id: &str) -> bool {
        if pin_id.is_empty() || !self.pins.insert(pin_id.to_string()) {
            return false;
        }
        debug!("History: added {}", pin_id);

        if self.auto_save {
            if let Err(e) = self.save() {
                warn!("Failed to save history: {:#}", e);
            }
        }
        true
    }

    /// Number of ids recorded.
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    /// Forget everything and persist the empty history.
    pub fn clear(&mut self) -> Result<()> {
        self.pins.clear();
        self.save()?;
        info!("History cleared");
        Ok(())
    }

    /// Write the history file atomically (temp file + rename).
    pub fn save(&self) -> Result<()> {
        if !self.auto_save {
            return Ok(());
        }

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let file = HistoryFile {
            pins: self.pins.iter().cloned().collect(),
            total_count: self.pins.len(),
            last_updated: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        debug!("History saved: {} pins", self.pins.len());
        Ok(())
    }

    /// Location of the history file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
