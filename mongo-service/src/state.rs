//! Application state for the mongo service.

use std::sync::Arc;

use common::config::AppConfig;

use crate::client::{Connector, MongoConnector};
use crate::dispatcher::ActionDispatcher;
use crate::registry::ConnectionRegistry;
use crate::source::{ConnectionSource, EnvSource};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<ActionDispatcher>,
}

impl AppState {
    /// Creates the state backed by the environment and the MongoDB driver.
    pub fn new(config: AppConfig) -> Self {
        let source = Arc::new(EnvSource::new(config.connection_prefix.clone()));
        let connector = Arc::new(MongoConnector::new(
            config.app_name.clone(),
            config.connect_timeout(),
        ));
        Self::with_parts(config, source, connector)
    }

    /// Creates the state from explicit parts.
    pub fn with_parts(
        config: AppConfig,
        source: Arc<dyn ConnectionSource>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(
            source,
            connector,
            config.connect_timeout(),
        ));
        let dispatcher = Arc::new(ActionDispatcher::new(
            registry.clone(),
            config.operation_timeout(),
        ));
        Self {
            config,
            registry,
            dispatcher,
        }
    }
}
