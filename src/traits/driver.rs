use async_trait::async_trait;

use crate::config::ConnectionConfig;
use crate::error::NativeError;
use crate::listeners::ErrorListener;
use crate::types::{ConnectionHandle, RawQueryResult, SqlValue};

/// A live native connection.
/// Implementations are responsible for:
/// - Converting SqlValue parameters to native types
/// - Executing queries and converting results to RawQueryResult
/// - Reporting unexpected disconnects to listeners bound with `on_error`
#[async_trait]
pub trait NativeClient: Send + Sync {
    /// Execute a SQL query with the given parameters.
    /// Parameters use PostgreSQL-style placeholders ($1, $2, etc.)
    async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<RawQueryResult, NativeError>;

    /// Bind a listener for errors raised by this connection outside of any query.
    fn on_error(&self, listener: ErrorListener);
}

/// Opens native connections, directly or through a pool it owns.
#[async_trait]
pub trait NativeConnector: Send + Sync {
    /// Open a connection and return it as a live handle.
    async fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> std::result::Result<ConnectionHandle, NativeError>;

    /// Bind a listener for errors raised by idle pooled connections.
    fn on_pool_error(&self, listener: ErrorListener);
}
