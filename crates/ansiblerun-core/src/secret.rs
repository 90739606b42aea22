//! Secret storage abstraction.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::resource::SecretKeySelector;
use crate::{Error, Result};

/// Trait for secret storage backends.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Get the value stored under one key of a secret.
    async fn get_key(&self, selector: &SecretKeySelector) -> Result<Bytes>;
}

/// A secret store backed by a map, keyed by `(namespace, name, key)`.
#[derive(Debug, Default)]
pub struct StaticSecretStore {
    values: Mutex<HashMap<(String, String, String), Bytes>>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, namespace: &str, name: &str, key: &str, value: impl Into<Bytes>) -> Self {
        self.insert(namespace, name, key, value);
        self
    }

    pub fn insert(&self, namespace: &str, name: &str, key: &str, value: impl Into<Bytes>) {
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                (namespace.to_string(), name.to_string(), key.to_string()),
                value.into(),
            );
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn get_key(&self, selector: &SecretKeySelector) -> Result<Bytes> {
        let values = self
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        values
            .get(&(
                selector.namespace.clone(),
                selector.name.clone(),
                selector.key.clone(),
            ))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("secret {selector}")))
    }
}
