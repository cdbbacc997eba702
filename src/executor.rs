use serde_json::Value;
use tracing::debug;

use crate::error::{AdapterError, Result};
use crate::types::{ConnectionHandle, NativeQuery, QueryOutcome};

/// Send a query over a live handle.
///
/// The handle and the query are checked before anything reaches the native
/// client. A native failure comes back untouched as [`AdapterError::Native`];
/// run it through [`crate::normalize`] to classify it.
pub async fn send_native_query(
    handle: &ConnectionHandle,
    query: impl Into<NativeQuery>,
) -> Result<QueryOutcome> {
    let client = handle.client()?;
    let query = query.into().into_compiled();
    query.validate()?;

    debug!(sql = %query.sql, bindings = query.bindings.len(), "sending native query");
    let raw = client
        .query(&query.sql, &query.bindings)
        .await
        .map_err(AdapterError::Native)?;

    Ok(QueryOutcome::from_raw(raw))
}

/// Like [`send_native_query`], for a query given as JSON: either a SQL
/// string or a `{"sql": ..., "bindings": [...]}` object.
pub async fn send_json_query(handle: &ConnectionHandle, query: &Value) -> Result<QueryOutcome> {
    handle.client()?;
    let query = NativeQuery::from_json(query)?;
    send_native_query(handle, query).await
}
