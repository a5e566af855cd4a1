//! Wire models shared by the services.

pub mod action;
pub mod connection;
pub mod document;

pub use action::{ActionKind, DbMutation, DbQuery};
pub use connection::{ConnectRequest, ConnectionDescriptor};
pub use document::{DeleteOutcome, InsertOutcome, UpdateOutcome};

/// Treats `None` and blank strings alike.
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
