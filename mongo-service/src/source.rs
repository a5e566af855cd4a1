//! Where connection strings come from.
//!
//! A connection is any configuration key carrying the recognized prefix; the
//! key doubles as the connection identifier. Keys without the prefix are
//! never resolved, so callers cannot read unrelated variables.

use std::collections::BTreeMap;

use common::models::ConnectionDescriptor;

/// Named connection strings.
pub trait ConnectionSource: Send + Sync {
    /// Prefix a key must carry to be a connection.
    fn prefix(&self) -> &str;

    /// Every key carrying the prefix, in no particular order.
    fn keys(&self) -> Vec<String>;

    /// Raw lookup of a key; prefix checks happen in [`ConnectionSource::connection_string`].
    fn lookup(&self, key: &str) -> Option<String>;

    /// Connection string for `identifier`, if it is a recognized and non-empty key.
    fn connection_string(&self, identifier: &str) -> Option<String> {
        if !identifier.starts_with(self.prefix()) {
            return None;
        }
        self.lookup(identifier).filter(|v| !v.trim().is_empty())
    }

    /// Descriptors for every configured connection: the primary key first,
    /// then the rest sorted by key. `is_connected` reports live handles.
    fn descriptors(&self, is_connected: &dyn Fn(&str) -> bool) -> Vec<ConnectionDescriptor> {
        let primary = self.prefix().to_string();
        let mut keys: Vec<String> = self
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(&primary))
            .collect();
        keys.sort_by(|a, b| (a != &primary, a).cmp(&(b != &primary, b)));
        keys.dedup();
        keys.iter()
            .map(|k| ConnectionDescriptor::new(k, &primary, is_connected(k)))
            .collect()
    }
}

/// Reads connections from the process environment.
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl ConnectionSource for EnvSource {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars_os()
            .filter_map(|(k, _)| k.into_string().ok())
            .filter(|k| k.starts_with(&self.prefix))
            .collect()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed set of connections, mainly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    prefix: String,
    entries: BTreeMap<String, String>,
}

impl StaticSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, uri: impl Into<String>) -> Self {
        self.entries.insert(key.into(), uri.into());
        self
    }
}

impl ConnectionSource for StaticSource {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}
