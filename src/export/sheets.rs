//! Google Sheets export over the Sheets REST API (v4).
//!
//! Every task gets its own worksheet. Records are laid out in three side by
//! side panels of four columns so a screen shows three previews per row.

use super::{ExportError, Exporter};
use crate::config::GoogleSheetsConfig;
use crate::models::PinRecord;
use async_trait::async_trait;
use chrono::{Local, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const PANELS: usize = 3;
const PANEL_WIDTH: usize = 4;
const COLUMNS: usize = PANELS * PANEL_WIDTH;
const INITIAL_ROWS: usize = 100;
const PANEL_HEADER: [&str; PANEL_WIDTH] = ["#", "Preview", "Likes", "Pin URL"];
const PANEL_PIXEL_WIDTHS: [u32; PANEL_WIDTH] = [40, 120, 50, 200];
const RECORD_ROW_PIXELS: u32 = 140;
const MAX_TITLE_CHARS: usize = 100;

/// The fields we need from a service-account key file.
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

enum TokenSource {
    ServiceAccount {
        key: ServiceAccountKey,
        encoding_key: EncodingKey,
        cached: Option<(String, Instant)>,
    },
    #[cfg(test)]
    Static(String),
}

/// The worksheet created by `begin`.
#[derive(Debug, Clone)]
struct ActiveSheet {
    id: i64,
    title: String,
    row_count: usize,
}

/// Writes records into a fresh worksheet as they arrive.
pub struct SheetsExporter {
    client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    token: TokenSource,
    sheet: Option<ActiveSheet>,
    written: usize,
}

impl SheetsExporter {
    /// Set up from the configured spreadsheet and service-account key.
    pub fn from_config(config: &GoogleSheetsConfig) -> Result<Self, ExportError> {
        let key = load_service_account(Path::new(&config.credentials_path))?;
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| ExportError::Credentials(format!("private_key: {}", e)))?;

        Ok(Self::with_token_source(
            SHEETS_API,
            &config.spreadsheet_id,
            TokenSource::ServiceAccount {
                key,
                encoding_key,
                cached: None,
            },
        ))
    }

    fn with_token_source(base_url: &str, spreadsheet_id: &str, token: TokenSource) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            token,
            sheet: None,
            written: 0,
        }
    }

    #[cfg(test)]
    fn with_static_token(base_url: &str, spreadsheet_id: &str, token: &str) -> Self {
        Self::with_token_source(base_url, spreadsheet_id, TokenSource::Static(token.to_string()))
    }

    /// A bearer token, refreshed shortly before it expires.
    async fn access_token(&mut self) -> Result<String, ExportError> {
        match self.token {
            TokenSource::ServiceAccount {
                ref key,
                ref encoding_key,
                ref mut cached,
            } => {
                if let Some((ref token, expires)) = *cached {
                    if Instant::now() < expires {
                        return Ok(token.clone());
                    }
                }

                let (token, lifetime) = exchange_token(&self.client, key, encoding_key).await?;
                let refresh_at = Instant::now() + lifetime.saturating_sub(Duration::from_secs(60));
                *cached = Some((token.clone(), refresh_at));
                Ok(token)
            }
            #[cfg(test)]
            TokenSource::Static(ref token) => Ok(token.clone()),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ExportError> {
        let bad_url = || ExportError::Credentials(format!("bad API URL {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| bad_url())?;
        url.path_segments_mut()
            .map_err(|_| bad_url())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn batch_update(&mut self, requests: Vec<Value>) -> Result<Value, ExportError> {
        let segment = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = self.endpoint(&[segment.as_str()])?;
        let token = self.access_token().await?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "requests": requests }))
            .send()
            .await?;
        read_json(response).await
    }

    async fn put_values(&mut self, range: &str, row: Vec<Value>) -> Result<(), ExportError> {
        let mut url = self.endpoint(&[self.spreadsheet_id.as_str(), "values", range])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        let token = self.access_token().await?;

        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": [row] }))
            .send()
            .await?;
        read_json(response).await?;
        Ok(())
    }

    fn header_format_requests(sheet_id: i64) -> Vec<Value> {
        let mut requests = vec![
            json!({
                "repeatCell": {
                    "range": {
                        "sheetId": sheet_id,
                        "startRowIndex": 0,
                        "endRowIndex": 1,
                        "startColumnIndex": 0,
                        "endColumnIndex": COLUMNS
                    },
                    "cell": {
                        "userEnteredFormat": {
                            "backgroundColor": { "red": 0.27, "green": 0.45, "blue": 0.77 },
                            "horizontalAlignment": "CENTER",
                            "textFormat": {
                                "bold": true,
                                "foregroundColor": { "red": 1.0, "green": 1.0, "blue": 1.0 }
                            }
                        }
                    },
                    "fields": "userEnteredFormat(backgroundColor,horizontalAlignment,textFormat)"
                }
            }),
            json!({
                "updateSheetProperties": {
                    "properties": { "sheetId": sheet_id, "gridProperties": { "frozenRowCount": 1 } },
                    "fields": "gridProperties.frozenRowCount"
                }
            }),
        ];

        for col in 0..COLUMNS {
            requests.push(json!({
                "updateDimensionProperties": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "COLUMNS",
                        "startIndex": col,
                        "endIndex": col + 1
                    },
                    "properties": { "pixelSize": PANEL_PIXEL_WIDTHS[col % PANEL_WIDTH] },
                    "fields": "pixelSize"
                }
            }));
        }
        requests
    }
}

fn load_service_account(path: &Path) -> Result<ServiceAccountKey, ExportError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ExportError::Credentials(format!("{}: {}", path.display(), e)))?;
    let key: ServiceAccountKey = serde_json::from_str(&content)
        .map_err(|e| ExportError::Credentials(format!("{}: {}", path.display(), e)))?;
    if key.client_email.trim().is_empty() {
        return Err(ExportError::Credentials("client_email is empty".to_string()));
    }
    Ok(key)
}

/// Trade a signed JWT for an access token.
async fn exchange_token(
    client: &reqwest::Client,
    key: &ServiceAccountKey,
    encoding_key: &EncodingKey,
) -> Result<(String, Duration), ExportError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        iss: &key.client_email,
        scope: SCOPE,
        aud: &key.token_uri,
        iat: now,
        exp: now + 3600,
    };
    let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, encoding_key)
        .map_err(|e| ExportError::Auth(e.to_string()))?;

    debug!("Requesting access token from {}", key.token_uri);
    let response = client
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_GRANT_TYPE), ("assertion", assertion.as_str())])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ExportError::Auth(format!("{}: {}", status, body)));
    }

    let token: TokenResponse = response.json().await?;
    Ok((token.access_token, Duration::from_secs(token.expires_in)))
}

async fn read_json(response: reqwest::Response) -> Result<Value, ExportError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or(body);
        return Err(ExportError::Api {
            status: status.as_u16(),
            message,
        });
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| ExportError::Api {
        status: status.as_u16(),
        message: format!("unreadable response: {}", e),
    })
}

/// Panel (0-based) and sheet row (1-based) of the `n`th record.
pub fn slot(n: usize) -> (usize, usize) {
    let n = n.max(1);
    ((n - 1) % PANELS, (n - 1) / PANELS + 2)
}

fn column_letter(index: usize) -> char {
    (b'A' + index as u8) as char
}

/// A1 range covering one panel on one row.
pub fn panel_range(sheet_title: &str, panel: usize, row: usize) -> String {
    let first = column_letter(panel * PANEL_WIDTH);
    let last = column_letter(panel * PANEL_WIDTH + PANEL_WIDTH - 1);
    format!("{}!{}{}:{}{}", quote_title(sheet_title), first, row, last, row)
}

fn quote_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// `=IMAGE(...)` formula for a preview cell.
pub fn image_formula(url: &str) -> String {
    format!("=IMAGE(\"{}\", 1)", url.replace('"', "\"\""))
}

fn worksheet_title(task_name: &str) -> String {
    let title = format!("{}_{}", task_name, Local::now().format("%Y%m%d_%H%M%S"));
    title.chars().take(MAX_TITLE_CHARS).collect()
}

#[async_trait]
impl Exporter for SheetsExporter {
    fn name(&self) -> &'static str {
        "google-sheets"
    }

    async fn begin(&mut self, task_name: &str) -> Result<(), ExportError> {
        let title = worksheet_title(task_name);
        info!("Creating worksheet: {}", title);

        let reply = self
            .batch_update(vec![json!({
                "addSheet": {
                    "properties": {
                        "title": title,
                        "index": 0,
                        "gridProperties": { "rowCount": INITIAL_ROWS, "columnCount": COLUMNS }
                    }
                }
            })])
            .await?;
        let id = reply["replies"][0]["addSheet"]["properties"]["sheetId"]
            .as_i64()
            .ok_or_else(|| ExportError::Api {
                status: 200,
                message: "addSheet reply carried no sheetId".to_string(),
            })?;

        self.sheet = Some(ActiveSheet {
            id,
            title: title.clone(),
            row_count: INITIAL_ROWS,
        });
        self.written = 0;

        let header: Vec<Value> = (0..PANELS)
            .flat_map(|_| PANEL_HEADER.iter().map(|h| json!(h)))
            .collect();
        let range = format!(
            "{}!A1:{}1",
            quote_title(&title),
            column_letter(COLUMNS - 1)
        );
        self.put_values(&range, header).await?;
        self.batch_update(Self::header_format_requests(id)).await?;

        info!("✓ Worksheet ready: {}", title);
        Ok(())
    }

    async fn add_record(&mut self, record: &PinRecord) -> Result<(), ExportError> {
        let sheet = self.sheet.clone().ok_or(ExportError::NotStarted)?;
        let n = self.written + 1;
        let (panel, row) = slot(n);

        let mut layout = Vec::new();
        let grows = row > sheet.row_count;
        if grows {
            layout.push(json!({
                "appendDimension": { "sheetId": sheet.id, "dimension": "ROWS", "length": INITIAL_ROWS }
            }));
        }
        if panel == 0 {
            layout.push(json!({
                "updateDimensionProperties": {
                    "range": {
                        "sheetId": sheet.id,
                        "dimension": "ROWS",
                        "startIndex": row - 1,
                        "endIndex": row
                    },
                    "properties": { "pixelSize": RECORD_ROW_PIXELS },
                    "fields": "pixelSize"
                }
            }));
        }
        if !layout.is_empty() {
            self.batch_update(layout).await?;
        }
        // The grid only counts as grown once the append went through.
        if grows {
            if let Some(ref mut active) = self.sheet {
                active.row_count += INITIAL_ROWS;
            }
        }

        let values = vec![
            json!(record.index),
            json!(image_formula(record.pin.best_image_url())),
            json!(record.likes),
            json!(record.pin.url),
        ];
        self.put_values(&panel_range(&sheet.title, panel, row), values)
            .await?;

        self.written = n;
        debug!("Sheet row {} panel {} <- pin {}", row, panel + 1, record.pin.id);
        Ok(())
    }

    async fn finish(&mut self) -> Result<Option<String>, ExportError> {
        Ok(self.sheet.as_ref().map(|sheet| {
            format!(
                "https://docs.google.com/spreadsheets/d/{}/edit#gid={}",
                self.spreadsheet_id, sheet.id
            )
        }))
    }
}
