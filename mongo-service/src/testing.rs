//! In-memory stand-ins for the driver, used by unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::{DeleteOutcome, UpdateOutcome};
use mongodb::bson::{oid::ObjectId, Bson, Document};

use crate::client::{Connector, DocumentClient};
use crate::documents::DocumentId;

type Databases = BTreeMap<String, BTreeMap<String, Vec<Document>>>;

/// Data shared by every client opened against the same fake server.
#[derive(Clone, Default)]
pub struct MemoryServer {
    databases: Arc<Mutex<Databases>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `documents` into `database.collection`.
    pub fn seed(&self, database: &str, collection: &str, documents: Vec<Document>) {
        self.databases
            .lock()
            .unwrap()
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
    }

    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.databases
            .lock()
            .unwrap()
            .get(database)
            .and_then(|db| db.get(collection))
            .cloned()
            .unwrap_or_default()
    }
}

/// Connector handing out [`MemoryClient`]s and recording them.
pub struct MemoryConnector {
    server: MemoryServer,
    open_delay: Duration,
    operation_delay: Duration,
    fail_probes: Arc<AtomicBool>,
    opens: AtomicUsize,
    closed_flags: Mutex<Vec<Arc<AtomicBool>>>,
}

impl MemoryConnector {
    pub fn new(server: MemoryServer) -> Self {
        Self {
            server,
            open_delay: Duration::ZERO,
            operation_delay: Duration::ZERO,
            fail_probes: Arc::new(AtomicBool::new(false)),
            opens: AtomicUsize::new(0),
            closed_flags: Mutex::new(Vec::new()),
        }
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Delays every call made through the opened clients, probes included.
    pub fn with_operation_delay(mut self, delay: Duration) -> Self {
        self.operation_delay = delay;
        self
    }

    /// Makes `list_database_names` fail on every client while set.
    pub fn fail_probes(&self, fail: bool) {
        self.fail_probes.store(fail, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Whether the `index`-th opened client has been shut down.
    pub fn is_closed(&self, index: usize) -> bool {
        self.closed_flags.lock().unwrap()[index].load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, _identifier: &str, _uri: &str) -> AppResult<Box<dyn DocumentClient>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        let closed = Arc::new(AtomicBool::new(false));
        self.closed_flags.lock().unwrap().push(closed.clone());
        Ok(Box::new(MemoryClient {
            server: self.server.clone(),
            delay: self.operation_delay,
            fail_probes: self.fail_probes.clone(),
            closed,
        }))
    }
}

/// Client operating on a [`MemoryServer`].
pub struct MemoryClient {
    server: MemoryServer,
    delay: Duration,
    fail_probes: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MemoryClient {
    async fn ensure_open(&self) -> AppResult<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::Connection("client has been shut down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentClient for MemoryClient {
    async fn list_database_names(&self) -> AppResult<Vec<String>> {
        self.ensure_open().await?;
        if self.fail_probes.load(Ordering::SeqCst) {
            return Err(AppError::Operation("Authentication failed.".into()));
        }
        Ok(self.server.databases.lock().unwrap().keys().cloned().collect())
    }

    async fn list_collection_names(&self, database: &str) -> AppResult<Vec<String>> {
        self.ensure_open().await?;
        Ok(self
            .server
            .databases
            .lock()
            .unwrap()
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_all(&self, database: &str, collection: &str) -> AppResult<Vec<Document>> {
        self.ensure_open().await?;
        Ok(self.server.documents(database, collection))
    }

    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        mut document: Document,
    ) -> AppResult<Bson> {
        self.ensure_open().await?;
        let id = match document.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                document.insert("_id", id.clone());
                id
            }
        };
        let mut databases = self.server.databases.lock().unwrap();
        let documents = databases
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        if documents.iter().any(|d| d.get("_id") == Some(&id)) {
            return Err(AppError::Operation("E11000 duplicate key error".into()));
        }
        documents.push(document);
        Ok(id)
    }

    async fn update_fields(
        &self,
        database: &str,
        collection: &str,
        id: &DocumentId,
        fields: Document,
    ) -> AppResult<UpdateOutcome> {
        self.ensure_open().await?;
        let mut databases = self.server.databases.lock().unwrap();
        let target = databases
            .get_mut(database)
            .and_then(|db| db.get_mut(collection))
            .and_then(|docs| {
                docs.iter_mut()
                    .find(|d| d.get("_id").map(|v| id.matches(v)).unwrap_or(false))
            });

        let Some(target) = target else {
            return Ok(UpdateOutcome {
                acknowledged: true,
                matched_count: 0,
                modified_count: 0,
            });
        };

        let mut modified = false;
        for (key, value) in fields {
            if target.get(&key) != Some(&value) {
                target.insert(key, value);
                modified = true;
            }
        }
        Ok(UpdateOutcome {
            acknowledged: true,
            matched_count: 1,
            modified_count: u64::from(modified),
        })
    }

    async fn delete_one(
        &self,
        database: &str,
        collection: &str,
        id: &DocumentId,
    ) -> AppResult<DeleteOutcome> {
        self.ensure_open().await?;
        let mut databases = self.server.databases.lock().unwrap();
        let deleted = databases
            .get_mut(database)
            .and_then(|db| db.get_mut(collection))
            .and_then(|docs| {
                let position = docs
                    .iter()
                    .position(|d| d.get("_id").map(|v| id.matches(v)).unwrap_or(false))?;
                Some(docs.remove(position))
            })
            .is_some();
        Ok(DeleteOutcome {
            acknowledged: true,
            deleted_count: u64::from(deleted),
        })
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
