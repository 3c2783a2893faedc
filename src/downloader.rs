//! Image downloading.
//!
//! Saves matched pins into the task folder. Every failure is logged and
//! skipped; a broken image never stops the crawl.

use crate::config::{Config, Resolution};
use crate::models::Pin;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const REFERER: &str = "https://www.pinterest.com/";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const INVALID_FILE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Naming and filtering rules for saved images.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub save_dir: PathBuf,
    pub naming_format: String,
    pub image_format: String,
    pub min_resolution: Resolution,
    pub user_agent: String,
}

impl DownloadSettings {
    /// Settings from the configuration, saving into `save_dir`.
    pub fn from_config(config: &Config, save_dir: PathBuf) -> Self {
        Self {
            save_dir,
            naming_format: config.download.naming_format.clone(),
            image_format: config.download.image_format.clone(),
            min_resolution: config.download.min_resolution,
            user_agent: config.behavior.user_agent().to_string(),
        }
    }
}

/// Result of one download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Saved to this path.
    Saved(PathBuf),
    /// The image was already saved this run.
    Duplicate,
    /// Smaller than the configured minimum resolution.
    TooSmall { width: usize, height: usize },
    /// Fetching, decoding or writing failed.
    Failed,
}

/// Downloads images and remembers which URLs were saved this run.
pub struct Downloader {
    client: reqwest::Client,
    settings: DownloadSettings,
    downloaded_urls: HashSet<String>,
    count: usize,
}

impl Downloader {
    pub fn new(settings: DownloadSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .user_agent(settings.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            settings,
            downloaded_urls: HashSet::new(),
            count: 0,
        })
    }

    /// Number of images saved so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Download a pin's image, trying the full-size URL first.
    pub async fn download(&mut self, pin: &Pin, category: &str, likes: u64) -> DownloadOutcome {
        let mut candidates = vec![pin.best_image_url().to_string()];
        if pin.image_url != candidates[0] {
            candidates.push(pin.image_url.clone());
        }

        if candidates.iter().any(|u| self.downloaded_urls.contains(u)) {
            debug!("Skipping duplicate image: {}", candidates[0]);
            return DownloadOutcome::Duplicate;
        }

        let mut fetched = None;
        for url in &candidates {
            match self.fetch(url).await {
                Ok(bytes) => {
                    fetched = Some((url.clone(), bytes));
                    break;
                }
                Err(e) => warn!("Download failed: {} - {:#}", url, e),
            }
        }
        let Some((url, bytes)) = fetched else {
            return DownloadOutcome::Failed;
        };

        match imagesize::blob_size(&bytes) {
            Ok(size) => {
                let min = self.settings.min_resolution;
                if (size.width as u64) < min.width as u64 || (size.height as u64) < min.height as u64 {
                    debug!(
                        "Resolution too low, skipping: {}x{} < {}x{}",
                        size.width, size.height, min.width, min.height
                    );
                    return DownloadOutcome::TooSmall {
                        width: size.width,
                        height: size.height,
                    };
                }
            }
            Err(e) => {
                warn!("Not a recognised image: {} ({:?})", url, e);
                return DownloadOutcome::Failed;
            }
        }

        let file_name = render_file_name(
            &self.settings.naming_format,
            category,
            likes,
            self.count + 1,
            &pin.id,
            &file_extension(&bytes, &self.settings.image_format),
        );
        let path = self.settings.save_dir.join(file_name);

        if let Err(e) = write_file(&path, &bytes).await {
            warn!("Failed to save {}: {:#}", path.display(), e);
            return DownloadOutcome::Failed;
        }

        self.downloaded_urls.insert(url);
        self.count += 1;
        info!("✓ Saved {} ({} likes)", path.display(), likes);
        DownloadOutcome::Saved(path)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching image: {}", url);
        let response = self
            .client
            .get(url)
            .header(reqwest::header::REFERER, REFERER)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Extension for the saved file. The configured format wins unless the
/// bytes are recognisably another format, since they are written as is.
pub fn file_extension(bytes: &[u8], configured: &str) -> String {
    let configured = configured.trim_start_matches('.').to_lowercase();
    match imagesize::image_type(bytes).ok().and_then(known_extensions) {
        Some(extensions) if !extensions.contains(&configured.as_str()) => {
            debug!(
                "Image is {} rather than {}, keeping its own format",
                extensions[0], configured
            );
            extensions[0].to_string()
        }
        _ => configured,
    }
}

fn known_extensions(kind: imagesize::ImageType) -> Option<&'static [&'static str]> {
    use imagesize::ImageType;

    let extensions: &'static [&'static str] = match kind {
        ImageType::Jpeg => &["jpg", "jpeg"],
        ImageType::Png => &["png"],
        ImageType::Gif => &["gif"],
        ImageType::Webp => &["webp"],
        ImageType::Bmp => &["bmp"],
        ImageType::Tiff => &["tif", "tiff"],
        ImageType::Heif(imagesize::Compression::Av1) => &["avif"],
        _ => return None,
    };
    Some(extensions)
}

/// Fill the naming template and append the extension.
///
/// Placeholders: `{category}` (spaces become `_`), `{likes}`, `{index}`
/// (zero-padded to 4 digits) and `{id}`.
pub fn render_file_name(
    template: &str,
    category: &str,
    likes: u64,
    index: usize,
    id: &str,
    extension: &str,
) -> String {
    let category = if category.trim().is_empty() {
        "pin".to_string()
    } else {
        category.trim().replace(' ', "_")
    };

    let stem = template
        .replace("{category}", &category)
        .replace("{likes}", &likes.to_string())
        .replace("{index}", &format!("{:04}", index))
        .replace("{id}", id);

    format!(
        "{}.{}",
        sanitize_file_name(&stem),
        extension.trim_start_matches('.')
    )
}

/// Replace characters that are not allowed in Windows file names.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if INVALID_FILE_CHARS.contains(&c) { '_' } else { c })
        .collect()
}
