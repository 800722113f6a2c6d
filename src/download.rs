use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::locator::{LocatorError, ResourceLocator, HTTP_CLIENT};

const MAX_UNIQUIFY_ATTEMPTS: u32 = 1000;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("invalid resource locator: {0}")]
    Locator(#[from] LocatorError),

    #[error("invalid filename {0:?}")]
    InvalidFilename(String),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP error {0} while downloading")]
    HttpStatus(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no free filename for {0:?} in the output directory")]
    NoFreeName(String),
}

/// Saves the resource behind a locator under a chosen filename.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Returns the path the resource was saved to.
    async fn download(&self, locator: &str, filename: &str) -> Result<PathBuf, DownloadError>;
}

/// Saves into a fixed directory without prompting. An existing file is
/// never overwritten; the new file gets a ` (n)` suffix instead.
pub struct DirectoryDownloader {
    output_dir: PathBuf,
    client: Client,
}

impl DirectoryDownloader {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            client: HTTP_CLIENT.clone(),
        }
    }

    /// Creates the first free target for `filename`, trying `name.pdf`,
    /// `name (1).pdf`, `name (2).pdf`, …
    async fn create_target(&self, filename: &str) -> Result<(File, PathBuf), DownloadError> {
        let (stem, ext) = match filename.rfind('.') {
            Some(dot) if dot > 0 => filename.split_at(dot),
            _ => (filename, ""),
        };

        for attempt in 0..MAX_UNIQUIFY_ATTEMPTS {
            let candidate = if attempt == 0 {
                filename.to_string()
            } else {
                format!("{} ({}){}", stem, attempt, ext)
            };
            let path = self.output_dir.join(&candidate);

            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((file, path)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Target exists; trying next name");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DownloadError::NoFreeName(filename.to_string()))
    }

    async fn write_resource(
        &self,
        locator: &ResourceLocator,
        file: &mut File,
    ) -> Result<u64, DownloadError> {
        let written = match locator {
            ResourceLocator::Remote(url) => {
                let response = self.client.get(url.as_str()).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(DownloadError::HttpStatus(status.as_u16()));
                }

                let mut written = 0u64;
                let mut stream = response.bytes_stream();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk?;
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                written
            }
            ResourceLocator::Local(path) => {
                let mut source = File::open(path).await?;
                tokio::io::copy(&mut source, file).await?
            }
        };
        file.flush().await?;
        Ok(written)
    }
}

/// Rejects names that would escape the output directory or that no
/// filesystem accepts.
pub fn validate_filename(filename: &str) -> Result<(), DownloadError> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(|c| c == '/' || c == '\\')
        || filename.chars().any(char::is_control)
        || Path::new(filename).is_absolute();

    if invalid {
        return Err(DownloadError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

#[async_trait]
impl Downloader for DirectoryDownloader {
    async fn download(&self, locator: &str, filename: &str) -> Result<PathBuf, DownloadError> {
        validate_filename(filename)?;
        let locator = ResourceLocator::parse(locator)?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let (mut file, path) = self.create_target(filename).await?;

        match self.write_resource(&locator, &mut file).await {
            Ok(bytes) => {
                info!(path = %path.display(), bytes, "Download completed");
                Ok(path)
            }
            Err(e) => {
                drop(file);
                if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %cleanup, "Could not remove partial download");
                }
                Err(e)
            }
        }
    }
}
