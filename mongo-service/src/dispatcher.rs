//! Action dispatcher.
//!
//! Turns raw action requests into typed [`Command`]s, resolves the
//! connection through the registry and runs exactly one database call per
//! command. Validation happens before any connection is touched.

use std::sync::Arc;
use std::time::Duration;

use common::errors::{AppError, AppResult};
use common::models::{
    non_empty, ActionKind, DbMutation, DbQuery, DeleteOutcome, InsertOutcome, UpdateOutcome,
};
use mongodb::bson::Document;
use serde::Serialize;

use crate::client::with_deadline;
use crate::documents::{bson_to_json, document_to_json, parse_document, parse_update, DocumentId};
use crate::registry::ConnectionRegistry;

const MISSING_CONNECTION: &str = "Connection identifier not specified";
const MISSING_NAMESPACE: &str = "Database or collection not specified";
const MISSING_PARAMETERS: &str = "Missing parameters";

/// One operation with its required parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    GetDatabases,
    GetCollections {
        database: String,
    },
    /// Loads the whole collection into memory. There is no paging.
    GetDocuments {
        database: String,
        collection: String,
    },
    InsertDocument {
        database: String,
        collection: String,
        document: Document,
    },
    /// Sets the given fields on the matching document; other fields stay.
    UpdateDocument {
        database: String,
        collection: String,
        id: DocumentId,
        update: Document,
    },
    DeleteDocument {
        database: String,
        collection: String,
        id: DocumentId,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::GetDatabases => ActionKind::GetDatabases,
            Action::GetCollections { .. } => ActionKind::GetCollections,
            Action::GetDocuments { .. } => ActionKind::GetDocuments,
            Action::InsertDocument { .. } => ActionKind::InsertDocument,
            Action::UpdateDocument { .. } => ActionKind::UpdateDocument,
            Action::DeleteDocument { .. } => ActionKind::DeleteDocument,
        }
    }
}

/// An action bound to the connection it runs against.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub connection: String,
    pub action: Action,
}

impl Command {
    /// Builds a read-only command from the `GET /db` query string.
    pub fn from_query(query: DbQuery) -> AppResult<Self> {
        let connection = query
            .connection()
            .ok_or_else(|| validation(MISSING_CONNECTION))?
            .to_string();
        let kind = parse_kind(query.action.as_deref(), true)?;

        let database = non_empty(&query.database).map(str::to_string);
        let collection = non_empty(&query.collection).map(str::to_string);

        let action = match kind {
            ActionKind::GetDatabases => Action::GetDatabases,
            ActionKind::GetCollections => Action::GetCollections {
                database: database.ok_or_else(|| validation(MISSING_NAMESPACE))?,
            },
            ActionKind::GetDocuments => match (database, collection) {
                (Some(database), Some(collection)) => Action::GetDocuments {
                    database,
                    collection,
                },
                _ => return Err(validation(MISSING_NAMESPACE)),
            },
            _ => return Err(validation("Invalid action")),
        };

        Ok(Self { connection, action })
    }

    /// Builds a mutation command from the `POST /db` body.
    pub fn from_mutation(body: DbMutation) -> AppResult<Self> {
        let connection = body
            .connection()
            .ok_or_else(|| validation(MISSING_CONNECTION))?
            .to_string();
        let kind = parse_kind(body.action.as_deref(), false)?;

        let (database, collection) = match (
            non_empty(&body.database).map(str::to_string),
            non_empty(&body.collection).map(str::to_string),
        ) {
            (Some(database), Some(collection)) => (database, collection),
            _ => return Err(validation(MISSING_PARAMETERS)),
        };

        let action = match kind {
            ActionKind::InsertDocument => Action::InsertDocument {
                database,
                collection,
                document: parse_document(required(body.document)?, "Document")?,
            },
            ActionKind::UpdateDocument => {
                let id = DocumentId::parse(required(body.id)?)?;
                let update = parse_update(required(body.update)?)?;
                Action::UpdateDocument {
                    database,
                    collection,
                    id,
                    update,
                }
            }
            ActionKind::DeleteDocument => Action::DeleteDocument {
                database,
                collection,
                id: DocumentId::parse(required(body.id)?)?,
            },
            _ => return Err(validation("Invalid action")),
        };

        Ok(Self { connection, action })
    }
}

fn validation(message: &str) -> AppError {
    AppError::Validation(message.to_string())
}

fn parse_kind(action: Option<&str>, query: bool) -> AppResult<ActionKind> {
    let kind: ActionKind = action.unwrap_or_default().parse()?;
    if kind.is_query() != query {
        return Err(validation("Invalid action"));
    }
    Ok(kind)
}

fn required(value: Option<serde_json::Value>) -> AppResult<serde_json::Value> {
    value
        .filter(|v| !v.is_null())
        .ok_or_else(|| validation(MISSING_PARAMETERS))
}

/// Result of a dispatched action, serialized as the response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionOutput {
    Names(Vec<String>),
    Documents(Vec<serde_json::Value>),
    Inserted(InsertOutcome),
    Updated(UpdateOutcome),
    Deleted(DeleteOutcome),
}

/// Runs commands against handles from the registry.
pub struct ActionDispatcher {
    registry: Arc<ConnectionRegistry>,
    operation_timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, operation_timeout: Duration) -> Self {
        Self {
            registry,
            operation_timeout,
        }
    }

    /// Resolves the connection and performs the action.
    pub async fn dispatch(&self, command: Command) -> AppResult<ActionOutput> {
        let kind = command.action.kind();
        let handle = self.registry.resolve(&command.connection).await?;
        let client = handle.client();
        let limit = self.operation_timeout;

        tracing::debug!(
            connection = %command.connection,
            action = %kind,
            generation = handle.generation(),
            "Dispatching action"
        );

        let output = match command.action {
            Action::GetDatabases => ActionOutput::Names(
                with_deadline(kind.name(), limit, client.list_database_names()).await?,
            ),
            Action::GetCollections { database } => ActionOutput::Names(
                with_deadline(kind.name(), limit, client.list_collection_names(&database))
                    .await?,
            ),
            Action::GetDocuments {
                database,
                collection,
            } => {
                let documents =
                    with_deadline(kind.name(), limit, client.find_all(&database, &collection))
                        .await?;
                tracing::debug!(
                    database = %database,
                    collection = %collection,
                    count = documents.len(),
                    "Loaded collection"
                );
                ActionOutput::Documents(documents.into_iter().map(document_to_json).collect())
            }
            Action::InsertDocument {
                database,
                collection,
                document,
            } => {
                let inserted_id = with_deadline(
                    kind.name(),
                    limit,
                    client.insert_one(&database, &collection, document),
                )
                .await?;
                tracing::info!(
                    database = %database,
                    collection = %collection,
                    "Document inserted"
                );
                ActionOutput::Inserted(InsertOutcome {
                    acknowledged: true,
                    inserted_id: bson_to_json(inserted_id),
                })
            }
            Action::UpdateDocument {
                database,
                collection,
                id,
                update,
            } => {
                let outcome = with_deadline(
                    kind.name(),
                    limit,
                    client.update_fields(&database, &collection, &id, update),
                )
                .await?;
                tracing::info!(
                    database = %database,
                    collection = %collection,
                    id = %id,
                    matched = outcome.matched_count,
                    modified = outcome.modified_count,
                    "Document updated"
                );
                ActionOutput::Updated(outcome)
            }
            Action::DeleteDocument {
                database,
                collection,
                id,
            } => {
                let outcome = with_deadline(
                    kind.name(),
                    limit,
                    client.delete_one(&database, &collection, &id),
                )
                .await?;
                tracing::info!(
                    database = %database,
                    collection = %collection,
                    id = %id,
                    deleted = outcome.deleted_count,
                    "Document deleted"
                );
                ActionOutput::Deleted(outcome)
            }
        };

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use crate::testing::{MemoryConnector, MemoryServer};
    use mongodb::bson::{doc, oid::ObjectId};
    use serde_json::json;

    const CONN: &str = "MONGODB_URI";

    fn dispatcher(server: MemoryServer) -> (ActionDispatcher, Arc<MemoryConnector>) {
        let connector = Arc::new(MemoryConnector::new(server));
        let source = StaticSource::new(CONN).with(CONN, "memory://primary");
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::new(source),
            connector.clone(),
            Duration::from_secs(1),
        ));
        (
            ActionDispatcher::new(registry, Duration::from_secs(1)),
            connector,
        )
    }

    fn query(action: &str, database: Option<&str>, collection: Option<&str>) -> DbQuery {
        DbQuery {
            action: Some(action.to_string()),
            connection_identifier: Some(CONN.to_string()),
            database: database.map(str::to_string),
            collection: collection.map(str::to_string),
            ..Default::default()
        }
    }

    fn mutation(value: serde_json::Value) -> DbMutation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_query_requires_connection_before_action() {
        let err = Command::from_query(DbQuery {
            action: Some("nope".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, validation(MISSING_CONNECTION));
    }

    #[test]
    fn test_get_collections_without_database() {
        let err = Command::from_query(query("getCollections", None, None)).unwrap_err();
        assert_eq!(
            err,
            AppError::Validation("Database or collection not specified".into())
        );
    }

    #[test]
    fn test_get_documents_without_collection() {
        let err = Command::from_query(query("getDocuments", Some("app"), Some(" "))).unwrap_err();
        assert_eq!(err, validation(MISSING_NAMESPACE));
    }

    #[test]
    fn test_query_surface_rejects_mutations_and_unknown_actions() {
        for action in ["insertDocument", "dropDatabase", ""] {
            let err = Command::from_query(query(action, Some("app"), Some("users"))).unwrap_err();
            assert_eq!(err, validation("Invalid action"));
        }
    }

    #[test]
    fn test_mutation_surface_rejects_queries() {
        let err = Command::from_mutation(mutation(json!({
            "action": "getDatabases",
            "connectionIdentifier": CONN,
            "database": "app",
            "collection": "users"
        })))
        .unwrap_err();
        assert_eq!(err, validation("Invalid action"));
    }

    #[test]
    fn test_mutations_require_their_fields() {
        for body in [
            json!({ "action": "insertDocument", "connectionIdentifier": CONN, "database": "app", "collection": "users" }),
            json!({ "action": "insertDocument", "connectionIdentifier": CONN, "database": "app", "document": {} }),
            json!({ "action": "updateDocument", "connectionIdentifier": CONN, "database": "app", "collection": "users", "id": "x" }),
            json!({ "action": "updateDocument", "connectionIdentifier": CONN, "database": "app", "collection": "users", "update": { "a": 1 } }),
            json!({ "action": "deleteDocument", "connectionIdentifier": CONN, "database": "app", "collection": "users", "id": null }),
        ] {
            let err = Command::from_mutation(mutation(body)).unwrap_err();
            assert_eq!(err, validation(MISSING_PARAMETERS));
        }
    }

    #[test]
    fn test_malformed_document_is_validation_error() {
        let err = Command::from_mutation(mutation(json!({
            "action": "insertDocument",
            "connectionIdentifier": CONN,
            "database": "app",
            "collection": "users",
            "document": [1, 2, 3]
        })))
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_update_command_is_typed() {
        let command = Command::from_mutation(mutation(json!({
            "action": "updateDocument",
            "connectionKey": CONN,
            "database": "app",
            "collection": "users",
            "id": "user-1",
            "update": { "_id": "user-1", "name": "ada" }
        })))
        .unwrap();
        assert_eq!(command.connection, CONN);
        assert_eq!(command.action.kind(), ActionKind::UpdateDocument);
        match command.action {
            Action::UpdateDocument { update, .. } => assert_eq!(update, doc! { "name": "ada" }),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validation_failure_opens_no_connection() {
        let (_, connector) = dispatcher(MemoryServer::new());
        assert!(Command::from_query(query("getDocuments", Some("app"), None)).is_err());
        assert_eq!(connector.open_count(), 0);
    }

    #[tokio::test]
    async fn test_listing_databases_and_collections() {
        let server = MemoryServer::new();
        server.seed("app", "users", vec![doc! { "_id": 1 }]);
        server.seed("app", "orders", vec![]);
        server.seed("logs", "events", vec![]);
        let (dispatcher, _) = dispatcher(server);

        let databases = dispatcher
            .dispatch(Command::from_query(query("getDatabases", None, None)).unwrap())
            .await
            .unwrap();
        assert_eq!(
            databases,
            ActionOutput::Names(vec!["app".into(), "logs".into()])
        );

        let collections = dispatcher
            .dispatch(Command::from_query(query("getCollections", Some("app"), None)).unwrap())
            .await
            .unwrap();
        assert_eq!(
            collections,
            ActionOutput::Names(vec!["orders".into(), "users".into()])
        );
    }

    #[tokio::test]
    async fn test_insert_then_list_round_trip() {
        let (dispatcher, _) = dispatcher(MemoryServer::new());

        let inserted = dispatcher
            .dispatch(
                Command::from_mutation(mutation(json!({
                    "action": "insertDocument",
                    "connectionIdentifier": CONN,
                    "database": "app",
                    "collection": "users",
                    "document": { "name": "ada", "langs": ["en", "fr"] }
                })))
                .unwrap(),
            )
            .await
            .unwrap();
        let inserted_id = match inserted {
            ActionOutput::Inserted(outcome) => outcome.inserted_id,
            other => panic!("unexpected output {:?}", other),
        };
        let oid = inserted_id["$oid"].as_str().unwrap();
        assert!(ObjectId::parse_str(oid).is_ok());

        let listed = dispatcher
            .dispatch(Command::from_query(query("getDocuments", Some("app"), Some("users"))).unwrap())
            .await
            .unwrap();
        assert_eq!(
            listed,
            ActionOutput::Documents(vec![json!({
                "name": "ada",
                "langs": ["en", "fr"],
                "_id": { "$oid": oid }
            })])
        );
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let server = MemoryServer::new();
        let oid = ObjectId::new();
        server.seed(
            "app",
            "users",
            vec![doc! { "_id": oid, "name": "ada", "age": 36 }],
        );
        let (dispatcher, _) = dispatcher(server.clone());

        let output = dispatcher
            .dispatch(
                Command::from_mutation(mutation(json!({
                    "action": "updateDocument",
                    "connectionIdentifier": CONN,
                    "database": "app",
                    "collection": "users",
                    "id": oid.to_hex(),
                    "update": { "age": 37 }
                })))
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            output,
            ActionOutput::Updated(UpdateOutcome {
                acknowledged: true,
                matched_count: 1,
                modified_count: 1
            })
        );
        assert_eq!(
            server.documents("app", "users"),
            vec![doc! { "_id": oid, "name": "ada", "age": 37 }]
        );
    }

    #[tokio::test]
    async fn test_missing_ids_yield_zero_counts() {
        let server = MemoryServer::new();
        server.seed("app", "users", vec![doc! { "_id": "present" }]);
        let (dispatcher, _) = dispatcher(server.clone());

        let updated = dispatcher
            .dispatch(
                Command::from_mutation(mutation(json!({
                    "action": "updateDocument",
                    "connectionIdentifier": CONN,
                    "database": "app",
                    "collection": "users",
                    "id": "absent",
                    "update": { "x": 1 }
                })))
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            updated,
            ActionOutput::Updated(UpdateOutcome {
                acknowledged: true,
                matched_count: 0,
                modified_count: 0
            })
        );

        let deleted = dispatcher
            .dispatch(
                Command::from_mutation(mutation(json!({
                    "action": "deleteDocument",
                    "connectionIdentifier": CONN,
                    "database": "app",
                    "collection": "users",
                    "id": "absent"
                })))
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            deleted,
            ActionOutput::Deleted(DeleteOutcome {
                acknowledged: true,
                deleted_count: 0
            })
        );
        assert_eq!(server.documents("app", "users").len(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_extended_json_id() {
        let server = MemoryServer::new();
        let oid = ObjectId::new();
        server.seed("app", "users", vec![doc! { "_id": oid }]);
        let (dispatcher, _) = dispatcher(server.clone());

        let deleted = dispatcher
            .dispatch(
                Command::from_mutation(mutation(json!({
                    "action": "deleteDocument",
                    "connectionIdentifier": CONN,
                    "database": "app",
                    "collection": "users",
                    "id": { "$oid": oid.to_hex() }
                })))
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            deleted,
            ActionOutput::Deleted(DeleteOutcome {
                acknowledged: true,
                deleted_count: 1
            })
        );
        assert!(server.documents("app", "users").is_empty());
    }

    #[tokio::test]
    async fn test_driver_errors_propagate() {
        let server = MemoryServer::new();
        server.seed("app", "users", vec![doc! { "_id": "dup" }]);
        let (dispatcher, _) = dispatcher(server);

        let err = dispatcher
            .dispatch(
                Command::from_mutation(mutation(json!({
                    "action": "insertDocument",
                    "connectionIdentifier": CONN,
                    "database": "app",
                    "collection": "users",
                    "document": { "_id": "dup" }
                })))
                .unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Operation(_)));
    }

    #[tokio::test]
    async fn test_unknown_connection_is_configuration_error() {
        let (dispatcher, connector) = dispatcher(MemoryServer::new());
        let mut command = Command::from_query(query("getDatabases", None, None)).unwrap();
        command.connection = "MONGODB_URI_NOPE".into();

        let err = dispatcher.dispatch(command).await.unwrap_err();
        assert_eq!(
            err,
            AppError::Configuration("Connection string not found".into())
        );
        assert_eq!(connector.open_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_action_times_out() {
        let server = MemoryServer::new();
        server.seed("app", "users", vec![doc! { "_id": "u-1" }]);
        let connector = Arc::new(
            MemoryConnector::new(server).with_operation_delay(Duration::from_millis(200)),
        );
        let source = StaticSource::new(CONN).with(CONN, "memory://primary");
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::new(source),
            connector,
            Duration::from_secs(5),
        ));
        let dispatcher = ActionDispatcher::new(registry.clone(), Duration::from_millis(20));

        let command =
            Command::from_query(query("getDocuments", Some("app"), Some("users"))).unwrap();
        let err = dispatcher.dispatch(command).await.unwrap_err();

        assert_eq!(
            err,
            AppError::ConnectionTimeout {
                operation: "getDocuments".into(),
                limit_ms: 20,
            }
        );
        // The handle itself stays usable.
        assert_eq!(registry.connection_count().await, 1);
    }
}
