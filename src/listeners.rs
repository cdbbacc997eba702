//! Error listeners for connections that fail outside of a query.
//!
//! Idle pooled connections can drop at any time (server restart, network
//! loss). Those failures are reported to listeners, which log them and never
//! propagate anything back into the connection task or the caller.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::warn;

use crate::error::NativeError;

/// Callback invoked with an error raised outside of any query.
pub type ErrorListener = Arc<dyn Fn(&NativeError) + Send + Sync>;

/// Listener that logs a dropped pooled connection.
pub fn pool_error_logger() -> ErrorListener {
    Arc::new(|err: &NativeError| {
        warn!(error = %err, code = ?err.code, "idle pooled connection failed");
    })
}

/// Listener that logs a failure on a leased connection.
pub fn connection_error_logger() -> ErrorListener {
    Arc::new(|err: &NativeError| {
        warn!(error = %err, code = ?err.code, "connection failed while leased");
    })
}

/// An ordered set of listeners sharing one event source.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<ErrorListener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: ErrorListener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn clear(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every listener. A panicking listener is logged and skipped.
    pub fn emit(&self, err: &NativeError) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(err))).is_err() {
                warn!(error = %err, "error listener panicked");
            }
        }
    }
}

/// Write-once guard for the process-wide pool listener.
///
/// The acquirer consults this before binding its pool listener, so the
/// listener is installed at most once no matter how many connections are
/// opened. Tests inject their own registry instead of the global one.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    bound: AtomicBool,
}

impl ListenerRegistry {
    pub const fn new() -> Self {
        Self {
            bound: AtomicBool::new(false),
        }
    }

    /// The registry shared by the whole process.
    pub fn global() -> Arc<ListenerRegistry> {
        static GLOBAL: OnceLock<Arc<ListenerRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ListenerRegistry::new())))
    }

    /// Runs `bind` only for the first caller. Returns whether it ran.
    pub fn bind_once(&self, bind: impl FnOnce()) -> bool {
        if self
            .bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            bind();
            true
        } else {
            false
        }
    }

    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.bound.store(false, Ordering::Release);
    }
}
