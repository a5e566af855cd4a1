//! Connection models.
//!
//! Connections are not stored anywhere: every listing is derived from the
//! environment keys that carry the configured prefix.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::non_empty;

/// Display name of the connection whose key equals the prefix.
pub const PRIMARY_DISPLAY_NAME: &str = "Primary Database";

/// A selectable connection, as shown to the operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ConnectionDescriptor {
    /// Display name.
    #[serde(rename = "name")]
    pub display_name: String,

    /// Configuration key; doubles as the connection identifier.
    #[serde(rename = "envKey")]
    pub identifier: String,

    /// Whether a live handle is currently held for this connection.
    pub connected: bool,
}

impl ConnectionDescriptor {
    /// Builds the descriptor for `key`, naming the primary key specially.
    pub fn new(key: &str, primary_key: &str, connected: bool) -> Self {
        Self {
            display_name: display_name_for(key, primary_key),
            identifier: key.to_string(),
            connected,
        }
    }
}

/// `MONGODB_URI` -> "Primary Database", `MONGODB_URI_STAGING` -> "Database STAGING".
pub fn display_name_for(key: &str, primary_key: &str) -> String {
    if key == primary_key {
        return PRIMARY_DISPLAY_NAME.to_string();
    }
    let suffix = key.rsplit('_').next().unwrap_or(key);
    format!("Database {}", suffix)
}

/// Request body for `POST /connect`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    /// Connection identifier (configuration key).
    #[serde(default)]
    pub connection_identifier: Option<String>,

    /// Legacy name for `connectionIdentifier`.
    #[serde(default)]
    pub connection_key: Option<String>,
}

impl ConnectRequest {
    /// The requested identifier, whichever field carried it.
    pub fn identifier(&self) -> Option<&str> {
        non_empty(&self.connection_identifier).or_else(|| non_empty(&self.connection_key))
    }
}
