use std::sync::Arc;

use tracing::debug;

use crate::config::{ConnectionConfig, ConnectionDescriptor};
use crate::error::{AdapterError, Result};
use crate::listeners::{connection_error_logger, pool_error_logger, ListenerRegistry};
use crate::traits::NativeConnector;
use crate::types::ConnectionHandle;

/// Opens connections described by a [`ConnectionDescriptor`].
pub struct Acquirer {
    connector: Arc<dyn NativeConnector>,
    registry: Arc<ListenerRegistry>,
}

impl Acquirer {
    pub fn new(connector: Arc<dyn NativeConnector>, registry: Arc<ListenerRegistry>) -> Self {
        Self {
            connector,
            registry,
        }
    }

    /// Registry guarding the one-time pool listener for this acquirer's connector.
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Resolve the descriptor and open a live handle.
    ///
    /// # Errors
    /// `MalformedDescriptor` when the descriptor cannot be parsed (no
    /// connect attempt is made), `FailedToConnect` carrying the native error
    /// when the connect call fails.
    pub async fn get_connection(&self, descriptor: &ConnectionDescriptor) -> Result<ConnectionHandle> {
        let config = ConnectionConfig::resolve(descriptor)?;
        debug!(
            host = %config.host,
            port = config.port,
            database = ?config.database,
            "acquiring connection"
        );

        let handle = match self.connector.connect(&config).await {
            Ok(handle) => handle,
            Err(err) => {
                // A failed connect hands out no lease, so there is nothing to release.
                debug!(error = %err, "connect failed");
                return Err(AdapterError::FailedToConnect(err));
            }
        };

        if self
            .registry
            .bind_once(|| self.connector.on_pool_error(pool_error_logger()))
        {
            debug!("bound pool error listener");
        }
        handle.client()?.on_error(connection_error_logger());

        Ok(handle)
    }
}
