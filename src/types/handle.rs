use std::fmt;
use std::sync::Arc;

use crate::error::{AdapterError, NativeError, Result};
use crate::traits::NativeClient;

/// Capability that hands a native client back to wherever it came from.
pub type ReleaseFn = Box<dyn FnOnce() -> std::result::Result<(), NativeError> + Send + Sync>;

/// An exclusively owned lease on a native connection.
///
/// A handle is live while it carries both its client and its release
/// capability. Releasing takes both out, after which every operation on the
/// handle fails with [`AdapterError::BadConnection`].
pub struct ConnectionHandle {
    client: Option<Arc<dyn NativeClient>>,
    release: Option<ReleaseFn>,
}

impl ConnectionHandle {
    pub fn new(client: Arc<dyn NativeClient>, release: ReleaseFn) -> Self {
        Self {
            client: Some(client),
            release: Some(release),
        }
    }

    /// Builds a handle from parts that may be missing, as a foreign caller
    /// might hand one over.
    pub fn from_parts(client: Option<Arc<dyn NativeClient>>, release: Option<ReleaseFn>) -> Self {
        Self { client, release }
    }

    pub fn is_live(&self) -> bool {
        self.client.is_some() && self.release.is_some()
    }

    /// The client, provided the handle is structurally valid.
    pub(crate) fn client(&self) -> Result<&Arc<dyn NativeClient>> {
        match (&self.client, &self.release) {
            (Some(client), Some(_)) => Ok(client),
            (None, _) => Err(AdapterError::BadConnection(
                "handle carries no client".to_string(),
            )),
            (_, None) => Err(AdapterError::BadConnection(
                "handle carries no release capability".to_string(),
            )),
        }
    }

    /// Takes the release capability and drops the client reference.
    pub(crate) fn take_release(&mut self) -> Result<ReleaseFn> {
        let release = self.release.take().ok_or_else(|| {
            AdapterError::BadConnection("handle carries no release capability".to_string())
        })?;
        self.client = None;
        Ok(release)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("live", &self.is_live())
            .finish()
    }
}
