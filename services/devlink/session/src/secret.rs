//! Device secret lookup collaborator.

use async_trait::async_trait;
use std::collections::HashMap;

/// Resolves the configured login secret for a device.
///
/// Lookup is the only suspension point inside the handshake; real
/// implementations typically sit in front of a registry or config store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns the secret for `device_id`, or `None` when the device is
    /// unknown or has no secret configured.
    async fn lookup_secret(&self, device_id: &str) -> Option<String>;
}

/// Fixed in-memory store, used by the binary's config-driven setup and by
/// tests.
#[derive(Debug, Default, Clone)]
pub struct StaticSecretStore {
    secrets: HashMap<String, String>,
}

impl StaticSecretStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the secret for `device_id`
    pub fn insert(&mut self, device_id: impl Into<String>, secret: impl Into<String>) {
        self.secrets.insert(device_id.into(), secret.into());
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn lookup_secret(&self, device_id: &str) -> Option<String> {
        self.secrets.get(device_id).cloned()
    }
}
