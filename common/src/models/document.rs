//! Results of document mutations.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result of `insertDocument`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InsertOutcome {
    pub acknowledged: bool,
    /// Identity assigned to the new document, as extended JSON.
    #[schema(value_type = Object)]
    pub inserted_id: serde_json::Value,
}

/// Result of `updateDocument`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Result of `deleteDocument`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub acknowledged: bool,
    pub deleted_count: u64,
}
