use std::fmt;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use reqwest::Client;
use thiserror::Error;
use url::Url;

pub const USER_AGENT: &str = concat!("pdfnamer/", env!("CARGO_PKG_VERSION"));

/// Shared client for fetching documents. No request timeout is set here; the
/// extraction round trip has its own budget.
pub static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(std::time::Duration::from_secs(15))
        .build()
        .expect("Failed to create HTTP client")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
    #[error("resource locator is empty")]
    Empty,

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("file URL does not name a local path: {0}")]
    InvalidFileUrl(String),
}

/// Where a document lives: a remote `http(s)` URL or a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocator {
    Remote(Url),
    Local(PathBuf),
}

impl ResourceLocator {
    /// Accepts `http://`, `https://` and `file://` URLs as well as plain paths.
    pub fn parse(raw: &str) -> Result<Self, LocatorError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(LocatorError::Empty);
        }

        match Url::parse(raw) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(ResourceLocator::Remote(url)),
                "file" => url
                    .to_file_path()
                    .map(ResourceLocator::Local)
                    .map_err(|_| LocatorError::InvalidFileUrl(raw.to_string())),
                // Drive letters (`C:\papers\a.pdf`) parse as one-letter schemes.
                scheme if scheme.len() == 1 => Ok(ResourceLocator::Local(PathBuf::from(raw))),
                scheme => Err(LocatorError::UnsupportedScheme(scheme.to_string())),
            },
            Err(_) => Ok(ResourceLocator::Local(PathBuf::from(raw))),
        }
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceLocator::Remote(url) => write!(f, "{}", url),
            ResourceLocator::Local(path) => write!(f, "{}", path.display()),
        }
    }
}
