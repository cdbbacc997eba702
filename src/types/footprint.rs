use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AdapterError;

/// The operation a failed native query was performing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Select => "select",
            QueryKind::Insert => "insert",
            QueryKind::Update => "update",
            QueryKind::Delete => "delete",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "select" => Ok(QueryKind::Select),
            "insert" => Ok(QueryKind::Insert),
            "update" => Ok(QueryKind::Update),
            "delete" => Ok(QueryKind::Delete),
            other => Err(AdapterError::MalformedQuery(format!(
                "unknown query kind `{other}`"
            ))),
        }
    }
}

/// Normalized classification of a native query error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "identity", rename_all = "camelCase")]
pub enum Footprint {
    /// Anything not otherwise recognized.
    Catchall,
    /// A unique constraint was violated; `keys` names the offending column(s)
    /// when the server's detail text could be read.
    NotUnique { keys: Vec<String> },
}

impl Footprint {
    pub fn identity(&self) -> &'static str {
        match self {
            Footprint::Catchall => "catchall",
            Footprint::NotUnique { .. } => "notUnique",
        }
    }
}

/// A footprint plus the caller's own context, handed back untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub footprint: Footprint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}
