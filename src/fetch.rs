use std::fs::{self, File};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::IngestError;
use crate::period::file_name;

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

pub trait SourceFetcher {
    fn fetch(&self, location: &str, destination: &Path) -> Result<u64, IngestError>;
}

pub fn is_remote(location: &str) -> bool {
    let lower = location.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

pub fn workbook_extension(location: &str) -> String {
    file_name(location)
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| WORKBOOK_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| "xlsx".to_string())
}

/// Suffixed from `location`, the file whose bytes are copied in. The workbook
/// reader picks its format from this suffix.
pub fn temp_workbook(location: &str) -> Result<NamedTempFile, IngestError> {
    tempfile::Builder::new()
        .prefix("bedocc-")
        .suffix(&format!(".{}", workbook_extension(location)))
        .tempfile()
        .map_err(|err| IngestError::Filesystem(err.to_string()))
}

fn copy_local(location: &str, destination: &Path) -> Result<u64, IngestError> {
    let bytes = fs::copy(location.trim(), destination)
        .map_err(|err| IngestError::Filesystem(format!("copy {location}: {err}")))?;
    debug!(source = location, bytes, "copied local source");
    Ok(bytes)
}

#[derive(Clone)]
pub struct HttpSourceFetcher {
    client: Client,
}

impl HttpSourceFetcher {
    pub fn new() -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("bedocc/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::Fetch(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| IngestError::Fetch(err.to_string()))?;

        Ok(Self { client })
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u64, IngestError> {
        let mut response = self
            .client
            .get(url.trim())
            .send()
            .map_err(|err| IngestError::Fetch(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "source request failed".to_string());
            return Err(IngestError::FetchStatus { status, message });
        }

        let mut file =
            File::create(destination).map_err(|err| IngestError::Filesystem(err.to_string()))?;
        let bytes = std::io::copy(&mut response, &mut file)
            .map_err(|err| IngestError::Fetch(err.to_string()))?;
        debug!(url, bytes, "downloaded source");
        Ok(bytes)
    }
}

impl SourceFetcher for HttpSourceFetcher {
    fn fetch(&self, location: &str, destination: &Path) -> Result<u64, IngestError> {
        if is_remote(location) {
            self.download(location, destination)
        } else {
            copy_local(location, destination)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileFetcher;

impl SourceFetcher for LocalFileFetcher {
    fn fetch(&self, location: &str, destination: &Path) -> Result<u64, IngestError> {
        if is_remote(location) {
            return Err(IngestError::Fetch(format!(
                "remote source not supported offline: {location}"
            )));
        }
        copy_local(location, destination)
    }
}
