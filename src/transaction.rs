//! Transaction control over a caller-held handle.
//!
//! No state is kept here: the caller brackets its queries with
//! begin/commit-or-rollback on one handle. Whatever the server rejects comes
//! back as an ordinary native error.

use tracing::debug;

use crate::error::Result;
use crate::executor::send_native_query;
use crate::types::ConnectionHandle;

async fn control(handle: &ConnectionHandle, keyword: &'static str) -> Result<()> {
    send_native_query(handle, keyword).await?;
    debug!(keyword, "transaction control");
    Ok(())
}

pub async fn begin_transaction(handle: &ConnectionHandle) -> Result<()> {
    control(handle, "BEGIN").await
}

pub async fn commit_transaction(handle: &ConnectionHandle) -> Result<()> {
    control(handle, "COMMIT").await
}

pub async fn rollback_transaction(handle: &ConnectionHandle) -> Result<()> {
    control(handle, "ROLLBACK").await
}
