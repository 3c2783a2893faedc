//! Spreadsheet exports of matched pins.
//!
//! Each exporter receives records as they are found. Failures are
//! reported to the caller, which logs them and carries on.

pub mod excel;
pub mod sheets;

pub use excel::ExcelExporter;
pub use sheets::SheetsExporter;

use crate::config::Config;
use crate::models::PinRecord;
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Errors raised while exporting.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("workbook error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid credentials: {0}")]
    Credentials(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("Sheets API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("exporter used before begin()")]
    NotStarted,
}

/// A destination for matched pins.
#[async_trait]
pub trait Exporter: Send {
    /// Short name for log lines.
    fn name(&self) -> &'static str;

    /// Prepare the destination for a new task.
    async fn begin(&mut self, task_name: &str) -> Result<(), ExportError>;

    /// Add one matched pin.
    async fn add_record(&mut self, record: &PinRecord) -> Result<(), ExportError>;

    /// Flush everything. Returns where the output can be found, if anywhere.
    async fn finish(&mut self) -> Result<Option<String>, ExportError>;
}

/// Build the exporters enabled in the configuration.
///
/// An exporter that cannot be set up is logged and left out.
pub fn build_exporters(config: &Config, task_dir: &Path) -> Vec<Box<dyn Exporter>> {
    let mut exporters: Vec<Box<dyn Exporter>> = Vec::new();

    if config.export.excel {
        exporters.push(Box::new(ExcelExporter::new(task_dir, config.search.sort)));
    }

    if let Some(ref sheets) = config.export.google_sheets {
        match SheetsExporter::from_config(sheets) {
            Ok(exporter) => exporters.push(Box::new(exporter)),
            Err(e) => warn!("Google Sheets export disabled: {}", e),
        }
    }

    exporters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GoogleSheetsConfig;

    #[test]
    fn test_build_exporters_defaults_to_excel() {
        let dir = tempfile::tempdir().unwrap();
        let exporters = build_exporters(&Config::default(), dir.path());
        let names: Vec<&str> = exporters.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["excel"]);
    }

    #[test]
    fn test_build_exporters_skips_broken_sheets_setup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.export.excel = false;
        config.export.google_sheets = Some(GoogleSheetsConfig {
            spreadsheet_id: "abc".to_string(),
            credentials_path: dir.path().join("missing.json").display().to_string(),
        });

        assert!(build_exporters(&config, dir.path()).is_empty());
    }

    #[test]
    fn test_error_messages() {
        let err = ExportError::Api {
            status: 403,
            message: "forbidden".to_string(),
        };
        assert_eq!(err.to_string(), "Sheets API returned 403: forbidden");
    }
}
