//! Explicit endpoint registry.
//!
//! Endpoints are registered once at startup with a factory that builds a
//! configured [`Client`] for a URL. The registry also caches one client per
//! endpoint and URL so that callers share a connection.

use std::fmt;
use std::sync::Arc;

use dashmap::{DashMap, Entry};
use futures::future::join_all;

use crate::Result;
use crate::error::Error;
use crate::ws::Client;

/// Builds a configured client for a URL.
pub type Factory = Arc<dyn Fn(&str) -> Result<Client> + Send + Sync>;

#[derive(Default)]
pub struct Registry {
    factories: DashMap<String, Factory>,
    /// Keyed by endpoint id and URL
    clients: DashMap<(String, String), Client>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("endpoints", &self.endpoints())
            .field("clients", &self.clients.len())
            .finish()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `endpoint`, replacing any previous one.
    pub fn register<S, F>(&self, endpoint: S, factory: F)
    where
        S: Into<String>,
        F: Fn(&str) -> Result<Client> + Send + Sync + 'static,
    {
        let endpoint = endpoint.into();

        #[cfg(feature = "tracing")]
        tracing::debug!(%endpoint, "Registered endpoint");

        self.factories.insert(endpoint, Arc::new(factory));
    }

    /// Registered endpoint ids, sorted.
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self
            .factories
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        endpoints.sort_unstable();
        endpoints
    }

    #[must_use]
    pub fn contains(&self, endpoint: &str) -> bool {
        self.factories.contains_key(endpoint)
    }

    /// Build a fresh, uncached client for `endpoint`.
    pub fn build(&self, endpoint: &str, url: &str) -> Result<Client> {
        let factory = self
            .factories
            .get(endpoint)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::validation(format!("unknown endpoint {endpoint}")))?;

        factory(url)
    }

    /// The cached client for `endpoint` and `url`, built on first use.
    ///
    /// A cached client that was closed or gave up reconnecting is replaced.
    pub fn client(&self, endpoint: &str, url: &str) -> Result<Client> {
        match self.clients.entry((endpoint.to_owned(), url.to_owned())) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_terminated() {
                    return Ok(entry.get().clone());
                }

                #[cfg(feature = "tracing")]
                tracing::debug!(%endpoint, %url, "Replacing terminated client");

                let client = self.build(endpoint, url)?;
                entry.insert(client.clone());
                Ok(client)
            }
            Entry::Vacant(entry) => {
                let client = self.build(endpoint, url)?;
                entry.insert(client.clone());
                Ok(client)
            }
        }
    }

    /// Number of cached clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Close every cached client and empty the cache.
    pub async fn close_all(&self) {
        let keys: Vec<(String, String)> = self
            .clients
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let clients: Vec<Client> = keys
            .iter()
            .filter_map(|key| self.clients.remove(key).map(|(_, client)| client))
            .collect();

        join_all(clients.iter().map(Client::close)).await;
    }
}
