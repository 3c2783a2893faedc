//! Excel workbook export.

use super::{ExportError, Exporter};
use crate::models::{PinRecord, SortMode};
use async_trait::async_trait;
use rust_xlsxwriter::{Color, Format, FormatAlign, Image, Workbook, Worksheet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the workbook inside the task folder.
pub const WORKBOOK_FILE: &str = "download_report.xlsx";

const SHEET_NAME: &str = "Pinterest Pins";
const HEADERS: [&str; 6] = ["Preview", "Likes", "Title", "Pin URL", "Image URL", "Local File"];
const COLUMN_WIDTHS: [f64; 6] = [30.0, 12.0, 40.0, 45.0, 50.0, 30.0];
const HEADER_BLUE: u32 = 0x4472C4;

/// Thumbnail bounds in pixels.
const THUMB_WIDTH: u32 = 200;
const THUMB_HEIGHT: u32 = 150;
/// Row height (points) that fits a thumbnail.
const THUMB_ROW_HEIGHT: f64 = 115.0;

/// Collects records and writes `download_report.xlsx` on finish.
pub struct ExcelExporter {
    path: PathBuf,
    sort: SortMode,
    records: Vec<PinRecord>,
}

impl ExcelExporter {
    pub fn new(task_dir: &Path, sort: SortMode) -> Self {
        Self {
            path: task_dir.join(WORKBOOK_FILE),
            sort,
            records: Vec::new(),
        }
    }

    /// Records in output order.
    fn ordered(&self) -> Vec<&PinRecord> {
        let mut rows: Vec<&PinRecord> = self.records.iter().collect();
        if self.sort == SortMode::Likes {
            // Stable, so equal counts keep discovery order.
            rows.sort_by(|a, b| b.likes.cmp(&a.likes));
        }
        rows
    }

    fn write_workbook(&self) -> Result<(), ExportError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(SHEET_NAME)?;

        let header_format = Format::new()
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(Color::RGB(HEADER_BLUE))
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter);

        for (col, title) in HEADERS.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *title, &header_format)?;
            worksheet.set_column_width(col as u16, COLUMN_WIDTHS[col])?;
        }
        worksheet.set_freeze_panes(1, 0)?;

        for (i, record) in self.ordered().into_iter().enumerate() {
            write_row(worksheet, (i + 1) as u32, record)?;
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        workbook.save(&self.path)?;
        Ok(())
    }
}

fn write_row(worksheet: &mut Worksheet, row: u32, record: &PinRecord) -> Result<(), ExportError> {
    let mut has_thumbnail = false;
    if let Some(ref local) = record.local_path {
        match Image::new(local) {
            Ok(image) => {
                let image = image.set_scale_to_size(THUMB_WIDTH, THUMB_HEIGHT, true);
                worksheet.insert_image(row, 0, &image)?;
                worksheet.set_row_height(row, THUMB_ROW_HEIGHT)?;
                has_thumbnail = true;
            }
            Err(e) => debug!("No thumbnail for {}: {}", local.display(), e),
        }
    }
    if !has_thumbnail {
        worksheet.write_string(row, 0, "")?;
    }

    worksheet.write_number(row, 1, record.likes as f64)?;
    worksheet.write_string(row, 2, &record.pin.title)?;
    if !record.pin.url.is_empty() {
        worksheet.write_url(row, 3, record.pin.url.as_str())?;
    }
    if !record.pin.image_url.is_empty() {
        worksheet.write_url(row, 4, record.pin.best_image_url())?;
    }
    worksheet.write_string(row, 5, record.file_name())?;
    Ok(())
}

#[async_trait]
impl Exporter for ExcelExporter {
    fn name(&self) -> &'static str {
        "excel"
    }

    async fn begin(&mut self, _task_name: &str) -> Result<(), ExportError> {
        self.records.clear();
        Ok(())
    }

    async fn add_record(&mut self, record: &PinRecord) -> Result<(), ExportError> {
        self.records.push(record.clone());
        Ok(())
    }

    async fn finish(&mut self) -> Result<Option<String>, ExportError> {
        if self.records.is_empty() {
            debug!("No records, skipping workbook");
            return Ok(None);
        }

        self.write_workbook()?;
        info!(
            "✓ Workbook saved: {} ({} rows)",
            self.path.display(),
            self.records.len()
        );
        Ok(Some(self.path.display().to_string()))
    }
}
