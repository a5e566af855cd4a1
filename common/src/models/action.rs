//! Action request models.
//!
//! These are the raw wire shapes. Which fields are required depends on the
//! action; the service turns them into typed commands before touching any
//! connection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::non_empty;
use crate::errors::AppError;

/// The fixed set of operations the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    GetDatabases,
    GetCollections,
    GetDocuments,
    InsertDocument,
    UpdateDocument,
    DeleteDocument,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::GetDatabases,
        ActionKind::GetCollections,
        ActionKind::GetDocuments,
        ActionKind::InsertDocument,
        ActionKind::UpdateDocument,
        ActionKind::DeleteDocument,
    ];

    /// Wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::GetDatabases => "getDatabases",
            ActionKind::GetCollections => "getCollections",
            ActionKind::GetDocuments => "getDocuments",
            ActionKind::InsertDocument => "insertDocument",
            ActionKind::UpdateDocument => "updateDocument",
            ActionKind::DeleteDocument => "deleteDocument",
        }
    }

    /// Read-only actions are served by `GET /db`, the rest by `POST /db`.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            ActionKind::GetDatabases | ActionKind::GetCollections | ActionKind::GetDocuments
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| AppError::Validation("Invalid action".into()))
    }
}

/// Query string of `GET /db`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbQuery {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub connection_identifier: Option<String>,
    /// Legacy name for `connectionIdentifier`.
    #[serde(default)]
    pub connection_key: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
}

impl DbQuery {
    pub fn connection(&self) -> Option<&str> {
        non_empty(&self.connection_identifier).or_else(|| non_empty(&self.connection_key))
    }
}

/// Body of `POST /db`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DbMutation {
    /// One of `insertDocument`, `updateDocument`, `deleteDocument`.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub connection_identifier: Option<String>,
    /// Legacy name for `connectionIdentifier`.
    #[serde(default)]
    pub connection_key: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    /// Document to insert.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub document: Option<serde_json::Value>,
    /// Fields to set on the matched document.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub update: Option<serde_json::Value>,
    /// Identity of the target document (string or extended JSON).
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub id: Option<serde_json::Value>,
}

impl DbMutation {
    pub fn connection(&self) -> Option<&str> {
        non_empty(&self.connection_identifier).or_else(|| non_empty(&self.connection_key))
    }
}
