//! Playbook content resolution.

use ansiblerun_core::AnsibleRun;
use ansiblerun_core::fs::Filesystem;
use ansiblerun_core::resource::ConfigurationSource;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid playbook locator {locator}: {message}")]
    InvalidLocator { locator: String, message: String },

    #[error("unsupported playbook locator scheme: {0}")]
    UnsupportedScheme(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Fetches playbook content for runs whose source is remote.
#[async_trait]
pub trait PlaybookFetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError>;
}

/// Fetches `http(s)://` locators over HTTP and `file://` locators from
/// the filesystem.
pub struct HttpFetcher {
    client: reqwest::Client,
    fs: Arc<dyn Filesystem>,
}

impl HttpFetcher {
    pub fn new(fs: Arc<dyn Filesystem>) -> Self {
        Self {
            client: reqwest::Client::new(),
            fs,
        }
    }

    pub fn with_client(client: reqwest::Client, fs: Arc<dyn Filesystem>) -> Self {
        Self { client, fs }
    }
}

#[async_trait]
impl PlaybookFetcher for HttpFetcher {
    async fn fetch(&self, locator: &str) -> Result<Bytes, FetchError> {
        let url = Url::parse(locator).map_err(|e| FetchError::InvalidLocator {
            locator: locator.to_string(),
            message: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => {
                debug!(url = %url, "Fetching remote playbook");
                let response = self
                    .client
                    .get(url.clone())
                    .header("User-Agent", "ansiblerun")
                    .send()
                    .await
                    .map_err(|e| FetchError::Request(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(FetchError::Status {
                        url: url.to_string(),
                        status: response.status().as_u16(),
                    });
                }

                response
                    .bytes()
                    .await
                    .map_err(|e| FetchError::Request(e.to_string()))
            }
            "file" => {
                let path = url.to_file_path().map_err(|_| FetchError::InvalidLocator {
                    locator: locator.to_string(),
                    message: "not a local file path".to_string(),
                })?;
                debug!(path = %path.display(), "Reading playbook from file");
                self.fs
                    .read_file(&path)
                    .await
                    .map(Bytes::from)
                    .map_err(|source| FetchError::Read {
                        path: path.display().to_string(),
                        source,
                    })
            }
            other => Err(FetchError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// The playbook text for `run`: its module for inline runs, the fetched
/// module locator for remote ones.
pub async fn playbook_content(
    run: &AnsibleRun,
    fetcher: &dyn PlaybookFetcher,
) -> Result<Bytes, FetchError> {
    let module = &run.spec.for_provider.module;
    match run.source() {
        ConfigurationSource::Inline => Ok(Bytes::copy_from_slice(module.as_bytes())),
        ConfigurationSource::Remote => fetcher.fetch(module).await,
    }
}
