//! Catalog queries run over a caller-held handle.
//!
//! Table names are bound as parameters; the only place a name is spliced
//! into SQL is the `COUNT(*)` target, which is quoted as an identifier.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{AdapterError, Result};
use crate::executor::send_native_query;
use crate::types::{CompiledQuery, ConnectionHandle, SqlValue};

const LIST_TABLES: &str = "SELECT tablename::text AS tablename FROM pg_catalog.pg_tables \
     WHERE schemaname != 'pg_catalog' AND schemaname != 'information_schema'";

const DESCRIBE_COLUMNS: &str = "SELECT c.column_name::text AS column_name, \
     c.data_type::text AS data_type, \
     c.column_default::text AS column_default, \
     (c.is_identity::text = 'YES') AS is_identity \
     FROM information_schema.columns c \
     WHERE c.table_name = $1::text \
     AND c.table_schema NOT IN ('pg_catalog', 'information_schema') \
     ORDER BY c.ordinal_position";

const DESCRIBE_CONSTRAINTS: &str = "SELECT kcu.column_name::text AS column_name, \
     tc.constraint_type::text AS constraint_type \
     FROM information_schema.table_constraints tc \
     JOIN information_schema.key_column_usage kcu \
     ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
     WHERE tc.table_name = $1::text AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')";

const DESCRIBE_INDEXES: &str = "SELECT a.attname::text AS column_name \
     FROM pg_class t \
     JOIN pg_index ix ON t.oid = ix.indrelid \
     JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
     WHERE t.relkind = 'r' AND t.relname = $1::text";

/// Attribute type a column maps onto for the calling query layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Number,
    String,
    Boolean,
    Dictionary,
    Array,
}

impl AttributeType {
    /// Map an `information_schema` data type name.
    pub fn from_db_type(db_type: &str) -> Self {
        match db_type.to_ascii_lowercase().as_str() {
            "smallint" | "integer" | "bigint" | "decimal" | "numeric" | "real"
            | "double precision" | "smallserial" | "serial" | "bigserial" => {
                AttributeType::Number
            }
            "boolean" => AttributeType::Boolean,
            "json" | "jsonb" => AttributeType::Dictionary,
            "array" => AttributeType::Array,
            _ => AttributeType::String,
        }
    }
}

/// One column of a described table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescription {
    pub field_name: String,
    #[serde(rename = "type")]
    pub column_type: AttributeType,
    pub db_type: String,
    pub indexed: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
}

/// Names of all user tables.
pub async fn list_tables(handle: &ConnectionHandle) -> Result<Vec<String>> {
    let outcome = send_native_query(handle, LIST_TABLES).await?;
    let mut names = Vec::with_capacity(outcome.rows.len());
    for row in &outcome.rows {
        if let Some(name) = row.get_str("tablename")? {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

fn by_table(sql: &str, table: &str) -> CompiledQuery {
    CompiledQuery::new(sql, vec![SqlValue::from(table)])
}

/// Describe the columns of `table`. An unknown table yields no columns.
pub async fn describe_table(
    handle: &ConnectionHandle,
    table: &str,
) -> Result<Vec<ColumnDescription>> {
    let columns = send_native_query(handle, by_table(DESCRIBE_COLUMNS, table)).await?;
    if columns.is_empty() {
        return Ok(Vec::new());
    }

    let constraints = send_native_query(handle, by_table(DESCRIBE_CONSTRAINTS, table)).await?;
    let mut primary = HashSet::new();
    let mut unique = HashSet::new();
    for row in &constraints.rows {
        let column = row.get_str("column_name")?.unwrap_or_default().to_string();
        match row.get_str("constraint_type")? {
            Some("PRIMARY KEY") => primary.insert(column),
            Some("UNIQUE") => unique.insert(column),
            _ => false,
        };
    }

    let indexes = send_native_query(handle, by_table(DESCRIBE_INDEXES, table)).await?;
    let mut indexed = HashSet::new();
    for row in &indexes.rows {
        if let Some(column) = row.get_str("column_name")? {
            indexed.insert(column.to_string());
        }
    }

    let mut described = Vec::with_capacity(columns.rows.len());
    for row in &columns.rows {
        let field_name = row.get_str("column_name")?.unwrap_or_default().to_string();
        let db_type = row.get_str("data_type")?.unwrap_or_default().to_string();
        let default = row.get_str("column_default")?.unwrap_or_default();
        let identity = row.get_bool("is_identity")?.unwrap_or(false);

        let primary_key = primary.contains(&field_name);
        let is_unique = primary_key || unique.contains(&field_name);
        described.push(ColumnDescription {
            column_type: AttributeType::from_db_type(&db_type),
            indexed: is_unique || indexed.contains(&field_name),
            unique: is_unique,
            primary_key,
            auto_increment: identity || default.starts_with("nextval("),
            field_name,
            db_type,
        });
    }
    Ok(described)
}

/// Quote a possibly schema-qualified name as an identifier.
fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Number of rows in `table`.
pub async fn count_records(handle: &ConnectionHandle, table: &str) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) AS count FROM {}", quote_ident(table));
    let row = send_native_query(handle, sql).await?.single_row()?;
    let count = row
        .get_i64("count")?
        .ok_or_else(|| AdapterError::ColumnNotFound("count".to_string()))?;
    Ok(u64::try_from(count).unwrap_or_default())
}
