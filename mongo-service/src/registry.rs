//! Connection registry.
//!
//! Owns every open database handle, at most one per connection identifier.
//! Handles are opened lazily on first use, reused across requests, and
//! replaced on an explicit reconnect. Nothing else opens or closes them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::errors::{AppError, AppResult};
use tokio::sync::{Mutex, RwLock};

use crate::client::{with_deadline, Connector, DocumentClient};
use crate::source::ConnectionSource;

/// An open, probed connection to one server.
///
/// Cloning is cheap and clones refer to the same underlying client; use
/// [`ConnectionHandle::same_as`] to compare identity.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    identifier: String,
    generation: u64,
    client: Box<dyn DocumentClient>,
}

impl ConnectionHandle {
    fn new(identifier: &str, generation: u64, client: Box<dyn DocumentClient>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                identifier: identifier.to_string(),
                generation,
                client,
            }),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    /// Registry-wide sequence number; a replacement always has a larger one.
    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    pub fn client(&self) -> &dyn DocumentClient {
        self.inner.client.as_ref()
    }

    /// Whether both handles wrap the same client instance.
    pub fn same_as(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    async fn close(&self) {
        self.inner.client.shutdown().await;
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("identifier", &self.inner.identifier)
            .field("generation", &self.inner.generation)
            .finish()
    }
}

/// Maps connection identifiers to live handles.
///
/// Resolve and reconnect for the same identifier are serialized by a
/// per-identifier lock, so concurrent first uses open a single handle.
/// Different identifiers never wait on each other except for the brief
/// map updates.
pub struct ConnectionRegistry {
    source: Arc<dyn ConnectionSource>,
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    /// Live handles indexed by identifier.
    handles: RwLock<HashMap<String, ConnectionHandle>>,
    /// Per-identifier locks guarding open/replace.
    guards: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    generation: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new(
        source: Arc<dyn ConnectionSource>,
        connector: Arc<dyn Connector>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            source,
            connector,
            connect_timeout,
            handles: RwLock::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &dyn ConnectionSource {
        self.source.as_ref()
    }

    /// Returns the live handle for `identifier`, opening one if needed.
    ///
    /// # Errors
    /// - `Configuration` when the identifier has no connection string
    /// - `Connection`/`ConnectionTimeout` when opening or probing fails; the
    ///   identifier is left without a handle so the next call retries
    pub async fn resolve(&self, identifier: &str) -> AppResult<ConnectionHandle> {
        if let Some(handle) = self.cached(identifier).await {
            return Ok(handle);
        }
        // Only configured identifiers get a guard entry.
        if self.source.connection_string(identifier).is_none() {
            return Err(missing_connection_string());
        }

        let guard = self.guard_for(identifier).await;
        let _lock = guard.lock().await;

        // Another request may have finished opening while we waited.
        if let Some(handle) = self.cached(identifier).await {
            return Ok(handle);
        }

        let handle = self.open(identifier).await?;
        self.handles
            .write()
            .await
            .insert(identifier.to_string(), handle.clone());
        tracing::info!(
            identifier = %identifier,
            generation = handle.generation(),
            "Connection opened"
        );
        Ok(handle)
    }

    /// Replaces the handle for `identifier` with a freshly opened one.
    ///
    /// Any existing handle is removed and closed first, close problems
    /// ignored. If opening the new one fails the identifier is left without
    /// a handle.
    pub async fn reconnect(&self, identifier: &str) -> AppResult<ConnectionHandle> {
        // Unknown identifiers are rejected before the current handle is touched.
        if self.source.connection_string(identifier).is_none() {
            return Err(missing_connection_string());
        }

        let guard = self.guard_for(identifier).await;
        let _lock = guard.lock().await;

        let previous = self.handles.write().await.remove(identifier);
        if let Some(previous) = previous {
            tracing::info!(
                identifier = %identifier,
                generation = previous.generation(),
                "Closing connection before reconnect"
            );
            previous.close().await;
        }

        let handle = self.open(identifier).await?;
        self.handles
            .write()
            .await
            .insert(identifier.to_string(), handle.clone());
        tracing::info!(
            identifier = %identifier,
            generation = handle.generation(),
            "Connection re-established"
        );
        Ok(handle)
    }

    /// Closes and forgets every handle. Called when the process stops.
    pub async fn close_all(&self) {
        let drained: Vec<ConnectionHandle> =
            self.handles.write().await.drain().map(|(_, h)| h).collect();
        for handle in drained {
            tracing::info!(identifier = %handle.identifier(), "Closing connection");
            handle.close().await;
        }
    }

    /// Number of live handles.
    pub async fn connection_count(&self) -> usize {
        self.handles.read().await.len()
    }

    /// Identifiers that currently have a live handle.
    pub async fn connected_identifiers(&self) -> HashSet<String> {
        self.handles.read().await.keys().cloned().collect()
    }

    async fn cached(&self, identifier: &str) -> Option<ConnectionHandle> {
        self.handles.read().await.get(identifier).cloned()
    }

    async fn guard_for(&self, identifier: &str) -> Arc<Mutex<()>> {
        self.guards
            .lock()
            .await
            .entry(identifier.to_string())
            .or_default()
            .clone()
    }

    /// Opens a client and probes it by listing databases. Both steps
    /// together must finish within the connect timeout.
    async fn open(&self, identifier: &str) -> AppResult<ConnectionHandle> {
        let uri = self
            .source
            .connection_string(identifier)
            .ok_or_else(missing_connection_string)?;

        let client = with_deadline(
            "connect",
            self.connect_timeout,
            self.open_and_probe(identifier, &uri),
        )
        .await?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ConnectionHandle::new(identifier, generation, client))
    }

    async fn open_and_probe(
        &self,
        identifier: &str,
        uri: &str,
    ) -> AppResult<Box<dyn DocumentClient>> {
        let client = self
            .connector
            .open(identifier, uri)
            .await
            .map_err(AppError::into_connection_error)?;

        if let Err(e) = client.list_database_names().await {
            tracing::warn!(identifier = %identifier, error = %e, "Connection probe failed");
            client.shutdown().await;
            return Err(e.into_connection_error());
        }
        Ok(client)
    }
}

fn missing_connection_string() -> AppError {
    AppError::Configuration("Connection string not found".into())
}
