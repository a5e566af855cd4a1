//! Database driver seam.
//!
//! [`Connector`] opens handles and [`DocumentClient`] performs operations on
//! one. The production implementations wrap the `mongodb` driver; tests swap
//! in an in-memory server.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::{DeleteOutcome, UpdateOutcome};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::ClientOptions;
use mongodb::Client;

use crate::documents::DocumentId;

/// Operations available on an open connection.
#[async_trait]
pub trait DocumentClient: Send + Sync {
    /// Database names in the order the server reports them.
    async fn list_database_names(&self) -> AppResult<Vec<String>>;

    async fn list_collection_names(&self, database: &str) -> AppResult<Vec<String>>;

    /// Every document in the collection: no filter, projection or limit.
    async fn find_all(&self, database: &str, collection: &str) -> AppResult<Vec<Document>>;

    /// Inserts `document` and returns its identity.
    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Document,
    ) -> AppResult<Bson>;

    /// Assigns `fields` on the document matching `id`, leaving other fields untouched.
    async fn update_fields(
        &self,
        database: &str,
        collection: &str,
        id: &DocumentId,
        fields: Document,
    ) -> AppResult<UpdateOutcome>;

    async fn delete_one(
        &self,
        database: &str,
        collection: &str,
        id: &DocumentId,
    ) -> AppResult<DeleteOutcome>;

    /// Releases network resources. Never fails; problems are logged.
    async fn shutdown(&self);
}

/// Opens handles from connection strings.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Creates a client for `uri`. Liveness is checked by the caller.
    async fn open(&self, identifier: &str, uri: &str) -> AppResult<Box<dyn DocumentClient>>;
}

/// Runs `future` with a deadline; a breach becomes a connection timeout.
pub async fn with_deadline<T, F>(operation: &str, limit: Duration, future: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(AppError::ConnectionTimeout {
            operation: operation.to_string(),
            limit_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Maps a driver error onto the error taxonomy.
///
/// Transport, DNS and authentication failures mean the connection is not
/// usable; anything else is a rejected operation.
pub fn classify(err: MongoError) -> AppError {
    match err.kind.as_ref() {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::Authentication { .. }
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => AppError::Connection(err.to_string()),
        _ => AppError::Operation(err.to_string()),
    }
}

/// Opens `mongodb` driver clients.
pub struct MongoConnector {
    app_name: String,
    connect_timeout: Duration,
}

impl MongoConnector {
    pub fn new(app_name: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            app_name: app_name.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn open(&self, identifier: &str, uri: &str) -> AppResult<Box<dyn DocumentClient>> {
        tracing::debug!(identifier = %identifier, "Parsing connection string");

        let mut options = ClientOptions::parse(uri).await.map_err(|e| match e.kind.as_ref() {
            ErrorKind::InvalidArgument { .. } => {
                AppError::Configuration(format!("Invalid connection string: {}", e))
            }
            _ => classify(e),
        })?;

        options.app_name = Some(self.app_name.clone());
        options.connect_timeout = Some(self.connect_timeout);
        options.server_selection_timeout = Some(self.connect_timeout);

        let client = Client::with_options(options).map_err(classify)?;
        Ok(Box::new(MongoDocumentClient { client }))
    }
}

/// [`DocumentClient`] backed by a driver [`Client`].
pub struct MongoDocumentClient {
    client: Client,
}

impl MongoDocumentClient {
    fn collection(&self, database: &str, collection: &str) -> mongodb::Collection<Document> {
        self.client.database(database).collection::<Document>(collection)
    }
}

#[async_trait]
impl DocumentClient for MongoDocumentClient {
    async fn list_database_names(&self) -> AppResult<Vec<String>> {
        self.client.list_database_names().await.map_err(classify)
    }

    async fn list_collection_names(&self, database: &str) -> AppResult<Vec<String>> {
        self.client
            .database(database)
            .list_collection_names()
            .await
            .map_err(classify)
    }

    async fn find_all(&self, database: &str, collection: &str) -> AppResult<Vec<Document>> {
        let cursor = self
            .collection(database, collection)
            .find(doc! {})
            .await
            .map_err(classify)?;
        cursor.try_collect().await.map_err(classify)
    }

    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Document,
    ) -> AppResult<Bson> {
        let result = self
            .collection(database, collection)
            .insert_one(document)
            .await
            .map_err(classify)?;
        Ok(result.inserted_id)
    }

    async fn update_fields(
        &self,
        database: &str,
        collection: &str,
        id: &DocumentId,
        fields: Document,
    ) -> AppResult<UpdateOutcome> {
        let result = self
            .collection(database, collection)
            .update_one(id.filter(), doc! { "$set": fields })
            .await
            .map_err(classify)?;
        Ok(UpdateOutcome {
            acknowledged: true,
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn delete_one(
        &self,
        database: &str,
        collection: &str,
        id: &DocumentId,
    ) -> AppResult<DeleteOutcome> {
        let result = self
            .collection(database, collection)
            .delete_one(id.filter())
            .await
            .map_err(classify)?;
        Ok(DeleteOutcome {
            acknowledged: true,
            deleted_count: result.deleted_count,
        })
    }

    async fn shutdown(&self) {
        self.client.clone().shutdown().immediate(true).await;
    }
}
