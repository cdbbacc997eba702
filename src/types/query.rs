use serde_json::Value;

use crate::error::{AdapterError, Result};
use crate::types::SqlValue;

/// SQL text with `$n` placeholders plus the values bound to them by
/// 1-based position.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub bindings: Vec<SqlValue>,
}

impl CompiledQuery {
    pub fn new(sql: impl Into<String>, bindings: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            bindings,
        }
    }

    /// Checks that every placeholder has a binding.
    /// Excess bindings are left for the server to judge.
    pub fn validate(&self) -> Result<()> {
        let highest = highest_placeholder(&self.sql);
        if highest > self.bindings.len() {
            return Err(AdapterError::MalformedQuery(format!(
                "placeholder ${highest} has no binding ({} provided)",
                self.bindings.len()
            )));
        }
        Ok(())
    }
}

/// A query as accepted at the executor boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeQuery {
    RawSql(String),
    Parameterized(CompiledQuery),
}

impl NativeQuery {
    /// Accepts either a JSON string or an object shaped like
    /// `{"sql": "...", "bindings": [...]}`. `query` is accepted in place of
    /// `sql`.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(sql) => Ok(NativeQuery::RawSql(sql.clone())),
            Value::Object(map) => {
                let sql = map
                    .get("sql")
                    .or_else(|| map.get("query"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AdapterError::MalformedQuery("missing string `sql` field".to_string())
                    })?;
                let bindings = match map.get("bindings") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items.iter().map(SqlValue::from_json).collect(),
                    Some(_) => {
                        return Err(AdapterError::MalformedQuery(
                            "`bindings` must be an array".to_string(),
                        ))
                    }
                };
                Ok(NativeQuery::Parameterized(CompiledQuery::new(sql, bindings)))
            }
            _ => Err(AdapterError::MalformedQuery(
                "expected a SQL string or a {sql, bindings} object".to_string(),
            )),
        }
    }

    pub fn into_compiled(self) -> CompiledQuery {
        match self {
            NativeQuery::RawSql(sql) => CompiledQuery::new(sql, Vec::new()),
            NativeQuery::Parameterized(query) => query,
        }
    }
}

impl From<&str> for NativeQuery {
    fn from(sql: &str) -> Self {
        NativeQuery::RawSql(sql.to_string())
    }
}

impl From<String> for NativeQuery {
    fn from(sql: String) -> Self {
        NativeQuery::RawSql(sql)
    }
}

impl From<CompiledQuery> for NativeQuery {
    fn from(query: CompiledQuery) -> Self {
        NativeQuery::Parameterized(query)
    }
}

#[derive(Clone)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment(u32),
    DollarQuoted(String),
}

fn scan_digits(bytes: &[u8], start: usize) -> (usize, usize) {
    let mut idx = start;
    let mut value: usize = 0;
    while idx < bytes.len() && bytes[idx].is_ascii_digit() {
        value = value
            .saturating_mul(10)
            .saturating_add(usize::from(bytes[idx] - b'0'));
        idx += 1;
    }
    (idx, value)
}

/// Reads a dollar-quote opener (`$$` or `$tag$`) starting at `start`.
fn scan_dollar_tag(bytes: &[u8], start: usize) -> Option<(usize, String)> {
    let mut idx = start + 1;
    while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
        idx += 1;
    }
    if idx < bytes.len() && bytes[idx] == b'$' {
        let tag = String::from_utf8_lossy(&bytes[start..=idx]).into_owned();
        Some((idx + 1, tag))
    } else {
        None
    }
}

/// Highest `$n` index used outside literals, identifiers and comments.
fn highest_placeholder(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut state = State::Normal;
    let mut highest = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        let next = bytes.get(idx + 1).copied();
        match state.clone() {
            State::Normal => match (b, next) {
                (b'\'', _) => state = State::SingleQuoted,
                (b'"', _) => state = State::DoubleQuoted,
                (b'-', Some(b'-')) => {
                    state = State::LineComment;
                    idx += 1;
                }
                (b'/', Some(b'*')) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                (b'$', Some(d)) if d.is_ascii_digit() => {
                    let (end, value) = scan_digits(bytes, idx + 1);
                    highest = highest.max(value);
                    idx = end;
                    continue;
                }
                (b'$', _) => {
                    if let Some((end, tag)) = scan_dollar_tag(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = end;
                        continue;
                    }
                }
                _ => {}
            },
            State::SingleQuoted => {
                if b == b'\'' {
                    state = State::Normal;
                }
            }
            State::DoubleQuoted => {
                if b == b'"' {
                    state = State::Normal;
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => match (b, next) {
                (b'*', Some(b'/')) => {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
                (b'/', Some(b'*')) => {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                }
                _ => {}
            },
            State::DollarQuoted(tag) => {
                if bytes[idx..].starts_with(tag.as_bytes()) {
                    state = State::Normal;
                    idx += tag.len();
                    continue;
                }
            }
        }
        idx += 1;
    }

    highest
}
