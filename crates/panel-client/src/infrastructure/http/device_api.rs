//! HTTP client for the device's web endpoints.
//!
//! | Request                              | Purpose                          |
//! |--------------------------------------|----------------------------------|
//! | `GET /status`                        | full status                      |
//! | `GET /status?q`                      | quick status refresh             |
//! | `GET /status?123456789<group>`       | config payload for a group       |
//! | `GET /control?<key>=<value>`         | set one value                    |
//! | `POST /update`                       | bulk update with `action`        |
//! | `GET /control?displayLog=1`          | stored log                       |
//! | `GET /web?log.txt`                   | log file                         |
//! | `GET /control?startOTA=1`            | arm the OTA server               |
//! | `POST http://host:<ota>/upload`      | multipart firmware upload        |
//!
//! Every non-OK response becomes a [`DeviceApiError::Status`].  Nothing is
//! retried except through [`DeviceApi::fetch_retry`].

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use panel_core::StatusMap;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::application::dispatch::DeviceControl;
use crate::infrastructure::storage::config::DeviceConfig;

/// Prefix of a config-group status query.
pub const CONFIG_QUERY_PREFIX: &str = "123456789";

/// Clock drift beyond which the device clock is reset.
pub const CLOCK_TOLERANCE_SECS: u64 = 5;

/// Name of the multipart field carrying the firmware image.
pub const OTA_FIELD: &str = "otafile";

#[derive(Debug, Error)]
pub enum DeviceApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    Status { status: StatusCode, url: String },

    #[error("invalid device URL {0}: {1}")]
    Url(String, #[source] url::ParseError),

    #[error("malformed JSON from {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gave up on {url} after {attempts} attempt(s)")]
    RetriesExhausted { url: String, attempts: u32 },
}

/// Which status the device should report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusQuery {
    Full,
    /// Cheap periodic refresh.
    Quick,
    /// Config table payload for one group.
    Group(String),
}

impl StatusQuery {
    pub fn path(&self) -> String {
        match self {
            Self::Full => "/status".to_string(),
            Self::Quick => "/status?q".to_string(),
            Self::Group(group) => format!("/status?{CONFIG_QUERY_PREFIX}{group}"),
        }
    }
}

/// Where the device log is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogSource {
    /// Log buffered by the firmware.
    #[default]
    Stored,
    /// Log file on the device's storage.
    File,
}

impl LogSource {
    pub fn path(self) -> &'static str {
        match self {
            Self::Stored => "/control?displayLog=1",
            Self::File => "/web?log.txt",
        }
    }
}

/// Cloneable handle; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct DeviceApi {
    client: Client,
    base: Url,
    ota: Url,
}

impl DeviceApi {
    /// # Errors
    ///
    /// [`DeviceApiError::Url`] if the configured host does not form a URL,
    /// [`DeviceApiError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &DeviceConfig) -> Result<Self, DeviceApiError> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self {
            client,
            base: parse_url(&config.base_url())?,
            ota: parse_url(&config.ota_url())?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `/control?<key>=<value>` with both parts percent-encoded.
    pub fn control_path(key: &str, value: &str) -> String {
        format!(
            "/control?{}={}",
            urlencoding::encode(key),
            urlencoding::encode(value)
        )
    }

    fn url(&self, path_and_query: &str) -> Result<Url, DeviceApiError> {
        self.base
            .join(path_and_query)
            .map_err(|e| DeviceApiError::Url(path_and_query.to_string(), e))
    }

    /// GETs `path_and_query` and returns the body of an OK response.
    async fn get_text(&self, path_and_query: &str) -> Result<String, DeviceApiError> {
        let url = self.url(path_and_query)?;
        debug!("GET {url}");
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("GET {url} returned {status}");
            return Err(DeviceApiError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }

    /// Reads a status snapshot.
    ///
    /// # Errors
    ///
    /// Network, status and JSON errors.
    pub async fn load_status(&self, query: &StatusQuery) -> Result<StatusMap, DeviceApiError> {
        let path = query.path();
        let body = self.get_text(&path).await?;
        parse_status(&path, &body)
    }

    /// Sends one control value, ignoring any response body.
    ///
    /// # Errors
    ///
    /// Network and status errors.
    pub async fn send_control(&self, key: &str, value: &str) -> Result<(), DeviceApiError> {
        self.get_text(&Self::control_path(key, value)).await?;
        Ok(())
    }

    /// Sends one control value and returns the status the device answers
    /// with, or `None` for an empty body.
    ///
    /// # Errors
    ///
    /// Network, status and JSON errors.
    pub async fn send_control_resp(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<StatusMap>, DeviceApiError> {
        let path = Self::control_path(key, value);
        let body = self.get_text(&path).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        parse_status(&path, &body).map(Some)
    }

    /// Posts the cached status plus `action` to `/update`.
    ///
    /// # Errors
    ///
    /// Network and status errors.
    pub async fn send_updates(&self, status: &StatusMap, action: &str) -> Result<(), DeviceApiError> {
        let url = self.url("/update")?;
        let body = status.to_update_body(action);
        debug!("POST {url} ({} field(s), action={action})", status.len());
        let response = self.client.post(url.clone()).json(&body).send().await?;
        let code = response.status();
        if !code.is_success() {
            warn!("POST {url} returned {code}");
            return Err(DeviceApiError::Status {
                status: code,
                url: url.to_string(),
            });
        }
        Ok(())
    }

    /// Fetches the device log as raw text.
    ///
    /// # Errors
    ///
    /// Network and status errors.
    pub async fn get_log(&self, source: LogSource) -> Result<String, DeviceApiError> {
        self.get_text(source.path()).await
    }

    /// GETs `path_and_query`, retrying failed requests up to `attempts` times
    /// in total with a fixed `delay` between them.
    ///
    /// # Errors
    ///
    /// [`DeviceApiError::RetriesExhausted`] once every attempt has failed.
    pub async fn fetch_retry(
        &self,
        path_and_query: &str,
        attempts: u32,
        delay: Duration,
    ) -> Result<String, DeviceApiError> {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            match self.get_text(path_and_query).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    debug!("attempt {attempt}/{attempts} for {path_and_query} failed: {e}");
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(DeviceApiError::RetriesExhausted {
            url: self.url(path_and_query)?.to_string(),
            attempts,
        })
    }

    /// Sets the device clock to the local time when the device reports a
    /// time more than [`CLOCK_TOLERANCE_SECS`] away.  Returns whether a
    /// correction was sent.
    ///
    /// # Errors
    ///
    /// Network and status errors from the correction request.
    pub async fn sync_clock(&self, device_epoch_secs: u64) -> Result<bool, DeviceApiError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if !clock_needs_sync(now, device_epoch_secs) {
            return Ok(false);
        }
        info!("device clock off by {}s; resetting", now.abs_diff(device_epoch_secs));
        self.send_control("clockUTC", &now.to_string()).await?;
        Ok(true)
    }

    /// Arms the OTA server and uploads `firmware` as the `otafile` field.
    /// Returns the upload server's response text.
    ///
    /// # Errors
    ///
    /// [`DeviceApiError::File`] if the image cannot be read, then network
    /// and status errors from either request.
    pub async fn ota_upload(&self, firmware: &Path) -> Result<String, DeviceApiError> {
        let bytes = tokio::fs::read(firmware)
            .await
            .map_err(|source| DeviceApiError::File {
                path: firmware.display().to_string(),
                source,
            })?;
        let file_name = firmware
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "firmware.bin".to_string());

        self.send_control("startOTA", "1").await?;
        info!("uploading {} ({} bytes) to {}", file_name, bytes.len(), self.ota);

        let form = Form::new().part(OTA_FIELD, Part::bytes(bytes).file_name(file_name));
        let response = self.client.post(self.ota.clone()).multipart(form).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(DeviceApiError::Status {
                status,
                url: self.ota.to_string(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl DeviceControl for DeviceApi {
    async fn send_control(&self, key: &str, value: &str) -> Result<(), DeviceApiError> {
        DeviceApi::send_control(self, key, value).await
    }

    async fn send_control_resp(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<StatusMap>, DeviceApiError> {
        DeviceApi::send_control_resp(self, key, value).await
    }

    async fn send_updates(&self, status: &StatusMap, action: &str) -> Result<(), DeviceApiError> {
        DeviceApi::send_updates(self, status, action).await
    }

    async fn load_status(&self, query: &StatusQuery) -> Result<StatusMap, DeviceApiError> {
        DeviceApi::load_status(self, query).await
    }

    async fn get_log(&self, source: LogSource) -> Result<String, DeviceApiError> {
        DeviceApi::get_log(self, source).await
    }

    async fn sync_clock(&self, device_epoch_secs: u64) -> Result<bool, DeviceApiError> {
        DeviceApi::sync_clock(self, device_epoch_secs).await
    }
}

fn parse_url(text: &str) -> Result<Url, DeviceApiError> {
    Url::parse(text).map_err(|e| DeviceApiError::Url(text.to_string(), e))
}

fn parse_status(path: &str, body: &str) -> Result<StatusMap, DeviceApiError> {
    StatusMap::from_json_str(body).map_err(|source| DeviceApiError::Json {
        url: path.to_string(),
        source,
    })
}

/// Whether two epoch times differ by more than [`CLOCK_TOLERANCE_SECS`].
pub fn clock_needs_sync(local_secs: u64, device_secs: u64) -> bool {
    local_secs.abs_diff(device_secs) > CLOCK_TOLERANCE_SECS
}

// ── Tests ─────────────────────────────────────────────────────────────────────
