use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::error::{AdapterError, NativeError, Result};
use crate::types::ConnectionHandle;

/// Hand a connection back to where it came from.
///
/// The handle is emptied before the release capability runs, so it can
/// never be queried or released again. A failing or panicking release
/// capability is reported as [`AdapterError::Unexpected`].
pub fn release_connection(handle: &mut ConnectionHandle) -> Result<()> {
    let release = handle.take_release()?;

    let outcome = panic::catch_unwind(AssertUnwindSafe(release))
        .unwrap_or_else(|_| Err(NativeError::message("release capability panicked")));
    if let Err(err) = outcome {
        warn!(error = %err, "could not release connection");
        return Err(AdapterError::Unexpected(err));
    }

    debug!("released connection");
    Ok(())
}
