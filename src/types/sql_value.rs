use std::error::Error;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio_postgres::types::{to_sql_checked, Format, IsNull, ToSql, Type};
use tokio_util::bytes;

type BoxError = Box<dyn Error + Sync + Send>;

/// A positional binding value in a driver-agnostic form.
/// The native driver converts these to wire values for the parameter type
/// the server declared for each placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Text(String),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Json(Value),
    Timestamp(NaiveDateTime),
    Bytes(Vec<u8>),
}

/// A binding that has no encoding for the parameter type the server declared.
#[derive(Debug, Error)]
#[error("cannot bind a {value} value to a parameter of type {ty}")]
pub struct BindingTypeMismatch {
    pub value: &'static str,
    pub ty: Type,
}

impl SqlValue {
    /// Convert a JSON value into a binding. Scalars map onto their natural
    /// variant; arrays and objects bind as JSON documents.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => SqlValue::Int32(small),
                        Err(_) => SqlValue::Int64(i),
                    }
                } else {
                    SqlValue::Float64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Json(other.clone()),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Text(_) => "text",
            SqlValue::Int32(_) => "int4",
            SqlValue::Int64(_) => "int8",
            SqlValue::Float64(_) => "float8",
            SqlValue::Bool(_) => "bool",
            SqlValue::Json(_) => "json",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Bytes(_) => "bytea",
        }
    }

    fn mismatch(&self, ty: &Type) -> BoxError {
        Box::new(BindingTypeMismatch {
            value: self.kind_name(),
            ty: ty.clone(),
        })
    }

    /// Whether the value travels in text format for `ty`, leaving the server
    /// to parse it as that type.
    fn sends_text(&self, ty: &Type) -> bool {
        match self {
            SqlValue::Text(_) => !is_text_type(ty),
            SqlValue::Int32(_) | SqlValue::Int64(_) | SqlValue::Float64(_) => *ty == Type::NUMERIC,
            _ => false,
        }
    }
}

fn is_text_type(ty: &Type) -> bool {
    <String as ToSql>::accepts(ty)
}

/// Text-format values and text-typed binary values are both plain UTF-8.
fn write_text(text: &str, out: &mut bytes::BytesMut) -> Result<IsNull, BoxError> {
    out.extend_from_slice(text.as_bytes());
    Ok(IsNull::No)
}

fn int_to_sql(value: &SqlValue, int: i64, ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(int)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(int)?.to_sql(ty, out),
        Type::INT8 => int.to_sql(ty, out),
        Type::OID => u32::try_from(int)?.to_sql(ty, out),
        Type::FLOAT4 => (int as f32).to_sql(ty, out),
        Type::FLOAT8 => (int as f64).to_sql(ty, out),
        Type::NUMERIC => write_text(&int.to_string(), out),
        _ if is_text_type(ty) => write_text(&int.to_string(), out),
        _ => Err(value.mismatch(ty)),
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, BoxError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Text(s) => write_text(s, out),
            SqlValue::Int32(i) => int_to_sql(self, i64::from(*i), ty, out),
            SqlValue::Int64(i) => int_to_sql(self, *i, ty, out),
            SqlValue::Float64(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::FLOAT8 => f.to_sql(ty, out),
                Type::NUMERIC => write_text(&f.to_string(), out),
                _ if is_text_type(ty) => write_text(&f.to_string(), out),
                _ => Err(self.mismatch(ty)),
            },
            SqlValue::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                _ if is_text_type(ty) => write_text(if *b { "true" } else { "false" }, out),
                _ => Err(self.mismatch(ty)),
            },
            SqlValue::Json(v) => match *ty {
                Type::JSON | Type::JSONB => v.to_sql(ty, out),
                _ if is_text_type(ty) => write_text(&v.to_string(), out),
                _ => Err(self.mismatch(ty)),
            },
            SqlValue::Timestamp(ts) => match *ty {
                Type::TIMESTAMP => ts.to_sql(ty, out),
                Type::TIMESTAMPTZ => DateTime::<Utc>::from_naive_utc_and_offset(*ts, Utc).to_sql(ty, out),
                Type::DATE => ts.date().to_sql(ty, out),
                _ if is_text_type(ty) => write_text(&ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string(), out),
                _ => Err(self.mismatch(ty)),
            },
            SqlValue::Bytes(b) => match *ty {
                Type::BYTEA => b.as_slice().to_sql(ty, out),
                _ => Err(self.mismatch(ty)),
            },
        }
    }

    /// Every parameter type is accepted here; a variant that cannot encode
    /// the declared type fails in `to_sql` with [`BindingTypeMismatch`].
    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, ty: &Type) -> Format {
        if self.sends_text(ty) {
            Format::Text
        } else {
            Format::Binary
        }
    }

    to_sql_checked!();
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int32(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int64(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float64(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Bytes(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;
    use serde_json::json;

    fn bind(value: &SqlValue, ty: &Type) -> (Result<IsNull, BoxError>, Vec<u8>) {
        let mut buf = bytes::BytesMut::new();
        let result = value.to_sql_checked(ty, &mut buf);
        (result, buf.to_vec())
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(SqlValue::from_json(&json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from_json(&json!(true)), SqlValue::Bool(true));
        assert_eq!(SqlValue::from_json(&json!(42)), SqlValue::Int32(42));
        assert_eq!(
            SqlValue::from_json(&json!(5_000_000_000_i64)),
            SqlValue::Int64(5_000_000_000)
        );
        assert_eq!(SqlValue::from_json(&json!(1.5)), SqlValue::Float64(1.5));
        assert_eq!(SqlValue::from_json(&json!("x")), SqlValue::Text("x".into()));
    }

    #[test]
    fn test_from_json_nested_binds_as_json() {
        let doc = json!({"a": [1, 2]});
        assert_eq!(SqlValue::from_json(&doc), SqlValue::Json(doc.clone()));
    }

    #[test]
    fn test_int_narrows_to_declared_type() {
        let (result, buf) = bind(&SqlValue::Int64(7), &Type::INT4);
        assert!(result.is_ok());
        assert_eq!(buf, 7_i32.to_be_bytes());

        let (result, buf) = bind(&SqlValue::Int32(7), &Type::INT8);
        assert!(result.is_ok());
        assert_eq!(buf, 7_i64.to_be_bytes());

        let (result, _) = bind(&SqlValue::Int64(i64::MAX), &Type::INT2);
        assert!(result.is_err());
    }

    #[rstest]
    #[case(Type::TIMESTAMPTZ)]
    #[case(Type::DATE)]
    #[case(Type::NUMERIC)]
    #[case(Type::UUID)]
    #[case(Type::BYTEA)]
    #[case(Type::INT4_ARRAY)]
    fn test_null_binds_to_any_type(#[case] ty: Type) {
        let (result, buf) = bind(&SqlValue::Null, &ty);
        assert!(matches!(result.unwrap(), IsNull::Yes));
        assert!(buf.is_empty());
    }

    #[rstest]
    #[case(Type::INT4, "1234")]
    #[case(Type::INT8, "1234")]
    #[case(Type::DATE, "2024-01-01")]
    #[case(Type::TIMESTAMPTZ, "2024-01-01T12:00:00Z")]
    #[case(Type::NUMERIC, "12.50")]
    #[case(Type::UUID, "67e55044-10b1-426f-9247-bb680e5fe0c8")]
    #[case(Type::JSONB, "{\"a\":1}")]
    fn test_text_is_parsed_by_the_server_for_other_types(#[case] ty: Type, #[case] text: &str) {
        let value = SqlValue::from(text);
        assert!(matches!(value.encode_format(&ty), Format::Text));
        let (result, buf) = bind(&value, &ty);
        assert!(matches!(result.unwrap(), IsNull::No));
        assert_eq!(buf, text.as_bytes());
    }

    #[test]
    fn test_text_for_text_types_is_binary_utf8() {
        let value = SqlValue::from("hello");
        assert!(matches!(value.encode_format(&Type::VARCHAR), Format::Binary));
        let (result, buf) = bind(&value, &Type::VARCHAR);
        assert!(result.is_ok());
        assert_eq!(buf, b"hello");
    }

    #[rstest]
    #[case(SqlValue::Float64(1.5), Type::INT8)]
    #[case(SqlValue::Float64(1.5), Type::INT4)]
    #[case(SqlValue::Float64(1.5), Type::BOOL)]
    #[case(SqlValue::Bool(true), Type::INT4)]
    #[case(SqlValue::Bool(true), Type::INT8)]
    #[case(SqlValue::Bool(true), Type::NUMERIC)]
    #[case(SqlValue::Int32(1), Type::BOOL)]
    #[case(SqlValue::Int32(1), Type::TIMESTAMPTZ)]
    #[case(SqlValue::Json(json!([1])), Type::INT4)]
    #[case(SqlValue::Bytes(vec![1, 2]), Type::TEXT)]
    #[case(SqlValue::Timestamp(noon()), Type::INT8)]
    fn test_mismatched_types_are_rejected(#[case] value: SqlValue, #[case] ty: Type) {
        let (result, buf) = bind(&value, &ty);
        let err = result.err().expect("expected a binding error");
        assert!(err.downcast_ref::<BindingTypeMismatch>().is_some(), "{err}");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_numbers_into_numeric_travel_as_text() {
        let value = SqlValue::Float64(12.5);
        assert!(matches!(value.encode_format(&Type::NUMERIC), Format::Text));
        let (result, buf) = bind(&value, &Type::NUMERIC);
        assert!(result.is_ok());
        assert_eq!(buf, b"12.5");

        let value = SqlValue::Int64(-40);
        assert!(matches!(value.encode_format(&Type::NUMERIC), Format::Text));
        assert_eq!(bind(&value, &Type::NUMERIC).1, b"-40");

        // Floats into float columns stay binary
        assert!(matches!(SqlValue::Float64(1.0).encode_format(&Type::FLOAT8), Format::Binary));
    }

    #[test]
    fn test_timestamp_binds_to_date_and_time_types() {
        let value = SqlValue::from(noon());
        for ty in [Type::TIMESTAMP, Type::TIMESTAMPTZ] {
            let (result, buf) = bind(&value, &ty);
            assert!(result.is_ok());
            assert_eq!(buf.len(), 8);
        }
        let (result, buf) = bind(&value, &Type::DATE);
        assert!(result.is_ok());
        assert_eq!(buf.len(), 4);
        assert_eq!(bind(&value, &Type::TEXT).1, b"2024-01-01T12:00:00");
    }

    #[test]
    fn test_bytes_bind_to_bytea() {
        let (result, buf) = bind(&SqlValue::from(vec![0xde, 0xad]), &Type::BYTEA);
        assert!(result.is_ok());
        assert_eq!(buf, [0xde, 0xad]);
    }
}
