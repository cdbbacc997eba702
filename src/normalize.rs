//! Mapping of native query errors onto footprints.
//!
//! Normalization is total: every input yields exactly one footprint, and
//! anything not understood degrades to [`Footprint::Catchall`].

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::{AdapterError, NativeError};
use crate::types::{ErrorReport, Footprint, QueryKind};

/// SQLSTATE for `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";

lazy_static! {
    static ref UNIQUE_DETAIL: Regex =
        Regex::new(r"Key \((.+?)\)=\((.*)\) already exists\.$").expect("static regex");
}

/// Column list and offending value read from a unique-violation detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueViolation {
    pub columns: String,
    pub value: String,
}

/// Reads `Key (<columns>)=(<value>) already exists.`; `None` on any other text.
pub fn parse_unique_violation(detail: &str) -> Option<UniqueViolation> {
    let captures = UNIQUE_DETAIL.captures(detail)?;
    Some(UniqueViolation {
        columns: captures.get(1)?.as_str().to_string(),
        value: captures.get(2)?.as_str().to_string(),
    })
}

/// Normalize a native error raised by a query of the given kind.
///
/// Only the error and the query kind decide the footprint. Callers with
/// their own context use [`report`], which carries it alongside.
pub fn normalize(err: &NativeError, kind: QueryKind) -> Footprint {
    let Some(code) = err.code.as_deref() else {
        return Footprint::Catchall;
    };

    let footprint = match kind {
        QueryKind::Select | QueryKind::Delete => Footprint::Catchall,
        QueryKind::Insert | QueryKind::Update if code == UNIQUE_VIOLATION => {
            let keys = err
                .detail
                .as_deref()
                .and_then(parse_unique_violation)
                .map(|violation| vec![violation.columns])
                .unwrap_or_default();
            Footprint::NotUnique { keys }
        }
        QueryKind::Insert | QueryKind::Update => Footprint::Catchall,
    };

    debug!(%kind, code, identity = footprint.identity(), "normalized native error");
    footprint
}

/// Normalize whatever an adapter operation returned.
/// Only native errors are inspected; every other failure is a catchall.
pub fn parse_native_query_error(err: &AdapterError, kind: QueryKind) -> Footprint {
    match err {
        AdapterError::Native(native) => normalize(native, kind),
        _ => Footprint::Catchall,
    }
}

/// Normalize `err` and return the footprint together with `meta`, which is
/// passed through as given.
pub fn report(err: &AdapterError, kind: QueryKind, meta: Option<Value>) -> ErrorReport {
    ErrorReport {
        footprint: parse_native_query_error(err, kind),
        meta,
    }
}
