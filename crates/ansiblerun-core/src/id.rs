//! Resource identifiers.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// The control plane's unique identity for a managed resource.
///
/// Staging directories are keyed by this value, so it is expected to be a
/// single path segment. Use [`Uid::is_path_safe`] before joining it onto a
/// base directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the uid can be used as one directory name without escaping
    /// its parent.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && !self.0.contains(['/', '\\', '\0'])
    }
}

impl From<&str> for Uid {
    fn from(uid: &str) -> Self {
        Self(uid.to_string())
    }
}

impl From<String> for Uid {
    fn from(uid: String) -> Self {
        Self(uid)
    }
}

impl std::str::FromStr for Uid {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl AsRef<std::path::Path> for Uid {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}
