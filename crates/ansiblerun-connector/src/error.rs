//! Connect errors.
//!
//! Every step of the pipeline fails with its own variant, wrapping the
//! underlying cause as the error source.

use ansiblerun_core::credentials::ExtractionError;
use ansiblerun_runner::RunnerError;
use derive_more::Display;
use std::io;
use thiserror::Error;

use crate::credentials::GitCredentialsError;
use crate::playbook::FetchError;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("managed resource of kind {0} is not an AnsibleRun custom resource")]
    NotSupportedType(String),

    #[error("cannot make directory: {0}")]
    MkdirFailed(#[source] io::Error),

    #[error("cannot track ProviderConfig usage: {0}")]
    TrackUsageFailed(#[source] ansiblerun_core::Error),

    #[error("cannot get ProviderConfig: {0}")]
    GetConfigFailed(#[source] ansiblerun_core::Error),

    #[error("cannot get credentials: {0}")]
    ExtractionFailed(#[source] ExtractionError),

    #[error("cannot write credentials to {filename}: {source}")]
    WriteCredentialsFailed {
        filename: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot write .git-credentials: {0}")]
    WriteGitCredentialsFailed(#[source] GitCredentialsError),

    #[error("cannot fetch playbook: {0}")]
    FetchPlaybookFailed(#[source] FetchError),

    #[error("cannot write playbook: {0}")]
    WritePlaybookFailed(#[source] io::Error),

    #[error("cannot write galaxy requirements: {0}")]
    WriteRequirementsFailed(#[source] io::Error),

    #[error("cannot init ansible runner: {0}")]
    InitFailed(#[source] RunnerError),

    #[error("cannot install galaxy dependencies: {0}")]
    GalaxyInstallFailed(#[source] RunnerError),

    #[error("connect cancelled")]
    Cancelled,
}

/// Classification of a [`ConnectError`], one per pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ConnectErrorKind {
    NotSupportedType,
    MkdirFailed,
    TrackUsageFailed,
    GetConfigFailed,
    ExtractionFailed,
    WriteCredentialsFailed,
    WriteGitCredentialsFailed,
    FetchPlaybookFailed,
    WritePlaybookFailed,
    WriteRequirementsFailed,
    InitFailed,
    GalaxyInstallFailed,
    Cancelled,
}

impl ConnectError {
    pub fn kind(&self) -> ConnectErrorKind {
        match self {
            ConnectError::NotSupportedType(_) => ConnectErrorKind::NotSupportedType,
            ConnectError::MkdirFailed(_) => ConnectErrorKind::MkdirFailed,
            ConnectError::TrackUsageFailed(_) => ConnectErrorKind::TrackUsageFailed,
            ConnectError::GetConfigFailed(_) => ConnectErrorKind::GetConfigFailed,
            ConnectError::ExtractionFailed(_) => ConnectErrorKind::ExtractionFailed,
            ConnectError::WriteCredentialsFailed { .. } => ConnectErrorKind::WriteCredentialsFailed,
            ConnectError::WriteGitCredentialsFailed(_) => {
                ConnectErrorKind::WriteGitCredentialsFailed
            }
            ConnectError::FetchPlaybookFailed(_) => ConnectErrorKind::FetchPlaybookFailed,
            ConnectError::WritePlaybookFailed(_) => ConnectErrorKind::WritePlaybookFailed,
            ConnectError::WriteRequirementsFailed(_) => ConnectErrorKind::WriteRequirementsFailed,
            ConnectError::InitFailed(_) => ConnectErrorKind::InitFailed,
            ConnectError::GalaxyInstallFailed(_) => ConnectErrorKind::GalaxyInstallFailed,
            ConnectError::Cancelled => ConnectErrorKind::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_wraps_cause() {
        let err = ConnectError::ExtractionFailed(ExtractionError::NoEnvironmentVariable);

        assert_eq!(err.kind(), ConnectErrorKind::ExtractionFailed);
        assert_eq!(
            err.to_string(),
            "cannot get credentials: cannot extract from environment variable when none specified"
        );
        assert_eq!(
            err.source().map(|e| e.to_string()).as_deref(),
            Some("cannot extract from environment variable when none specified")
        );
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ConnectErrorKind::MkdirFailed.to_string(), "MkdirFailed");
        assert_eq!(ConnectError::Cancelled.kind(), ConnectErrorKind::Cancelled);
    }
}
