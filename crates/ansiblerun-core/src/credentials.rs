//! Generic credential extraction.
//!
//! Resolves a [`CredentialsSource`] and its selectors to raw bytes. The
//! error messages are part of the contract: callers surface them verbatim.

use bytes::Bytes;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::fs::Filesystem;
use crate::resource::{CredentialSelectors, CredentialsSource};
use crate::secret::SecretStore;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("cannot extract from environment variable when none specified")]
    NoEnvironmentVariable,

    #[error("environment variable {0} is not set")]
    EnvironmentVariableUnset(String),

    #[error("cannot extract from filesystem when no path specified")]
    NoFilesystemPath,

    #[error("cannot read credentials from {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot extract from secret key when none specified")]
    NoSecretReference,

    #[error("cannot get credentials secret: {0}")]
    Secret(#[source] crate::Error),

    #[error("no inline credentials specified")]
    NoInlineData,
}

/// Resolve credentials from `source`.
///
/// `None` never fails: it yields the selectors' literal data, or nothing.
pub async fn extract_credentials(
    source: CredentialsSource,
    selectors: &CredentialSelectors,
    secrets: &dyn SecretStore,
    fs: &dyn Filesystem,
) -> Result<Bytes, ExtractionError> {
    match source {
        CredentialsSource::None => Ok(selectors
            .data
            .as_ref()
            .map(|d| Bytes::copy_from_slice(d.as_bytes()))
            .unwrap_or_default()),
        CredentialsSource::Inline => selectors
            .data
            .as_ref()
            .map(|d| Bytes::copy_from_slice(d.as_bytes()))
            .ok_or(ExtractionError::NoInlineData),
        CredentialsSource::Environment => {
            let name = selectors
                .env
                .as_ref()
                .map(|e| e.name.as_str())
                .filter(|n| !n.is_empty())
                .ok_or(ExtractionError::NoEnvironmentVariable)?;
            std::env::var_os(name)
                .map(|v| Bytes::from(v.into_encoded_bytes()))
                .ok_or_else(|| ExtractionError::EnvironmentVariableUnset(name.to_string()))
        }
        CredentialsSource::Filesystem => {
            let path = selectors
                .fs
                .as_ref()
                .map(|f| f.path.as_str())
                .filter(|p| !p.is_empty())
                .ok_or(ExtractionError::NoFilesystemPath)?;
            fs.read_file(Path::new(path))
                .await
                .map(Bytes::from)
                .map_err(|source| ExtractionError::ReadFile {
                    path: path.to_string(),
                    source,
                })
        }
        CredentialsSource::Secret => {
            let selector = selectors
                .secret_ref
                .as_ref()
                .ok_or(ExtractionError::NoSecretReference)?;
            secrets
                .get_key(selector)
                .await
                .map_err(ExtractionError::Secret)
        }
    }
}
