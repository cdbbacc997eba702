//! Column decoding from tokio-postgres rows into JSON values.
//!
//! A non-NULL value always decodes to a non-NULL JSON value. Types with no
//! JSON counterpart become strings in PostgreSQL's own text notation, and a
//! type that cannot be decoded at all fails the query instead of reading as
//! NULL.

use std::error::Error;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::{Number, Value};
use tokio_postgres::types::{FromSql, Kind, Type};
use uuid::Uuid;

use crate::error::NativeError;

type BoxError = Box<dyn Error + Sync + Send>;

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// A NUMERIC value in its exact decimal notation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericText(pub String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        numeric_to_string(raw).map(NumericText)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Label of a user-defined enum value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumLabel(pub String);

impl<'a> FromSql<'a> for EnumLabel {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(EnumLabel(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
    }
}

fn word(raw: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([raw[at], raw[at + 1]])
}

/// Binary NUMERIC: ndigits, weight, sign, dscale, then base-10000 digits.
fn numeric_to_string(raw: &[u8]) -> Result<String, BoxError> {
    if raw.len() < 8 {
        return Err("numeric value too short".into());
    }
    let ndigits = usize::from(word(raw, 0));
    let weight = i32::from(word(raw, 2) as i16);
    let sign = word(raw, 4);
    let dscale = usize::from(word(raw, 6));
    if raw.len() != 8 + 2 * ndigits {
        return Err("numeric value has a bad digit count".into());
    }

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digit = |i: i32| -> u16 {
        usize::try_from(i)
            .ok()
            .filter(|&i| i < ndigits)
            .map_or(0, |i| word(raw, 8 + 2 * i))
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit(0).to_string());
        for i in 1..=weight {
            out.push_str(&format!("{:04}", digit(i)));
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

fn float_json(value: f64) -> Value {
    Number::from_f64(value).map_or_else(|| Value::String(value.to_string()), Value::Number)
}

fn bytea_json(bytes: Vec<u8>) -> Value {
    let mut hex = String::with_capacity(2 + bytes.len() * 2);
    hex.push_str("\\x");
    for byte in bytes {
        hex.push_str(&format!("{byte:02x}"));
    }
    Value::String(hex)
}

fn string_json<T: ToString>(value: T) -> Value {
    Value::String(value.to_string())
}

/// Read one column, element-wise when it is an array.
fn column<'a, T: FromSql<'a>>(
    row: &'a tokio_postgres::Row,
    index: usize,
    array: bool,
    to_json: fn(T) -> Value,
) -> Result<Value, NativeError> {
    if array {
        let items: Option<Vec<Option<T>>> = row.try_get(index)?;
        Ok(items.map_or(Value::Null, |items| {
            Value::Array(
                items
                    .into_iter()
                    .map(|item| item.map_or(Value::Null, to_json))
                    .collect(),
            )
        }))
    } else {
        let item: Option<T> = row.try_get(index)?;
        Ok(item.map_or(Value::Null, to_json))
    }
}

/// Convert a column value to JSON.
pub(crate) fn decode_value(row: &tokio_postgres::Row, index: usize) -> Result<Value, NativeError> {
    let column_meta = &row.columns()[index];
    let ty = column_meta.type_();
    let (base, array) = match ty.kind() {
        Kind::Array(element) => (element, true),
        _ => (ty, false),
    };

    match *base {
        Type::BOOL => column::<bool>(row, index, array, Value::from),
        Type::INT2 => column::<i16>(row, index, array, Value::from),
        Type::INT4 => column::<i32>(row, index, array, Value::from),
        Type::INT8 => column::<i64>(row, index, array, Value::from),
        Type::OID => column::<u32>(row, index, array, Value::from),
        Type::FLOAT4 => column::<f32>(row, index, array, |f| float_json(f64::from(f))),
        Type::FLOAT8 => column::<f64>(row, index, array, float_json),
        Type::NUMERIC => column::<NumericText>(row, index, array, |n| Value::String(n.0)),
        Type::JSON | Type::JSONB => column::<Value>(row, index, array, std::convert::identity),
        Type::TIMESTAMP => column::<NaiveDateTime>(row, index, array, |ts| {
            Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }),
        Type::TIMESTAMPTZ => column::<DateTime<Utc>>(row, index, array, |ts| {
            Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }),
        Type::DATE => column::<NaiveDate>(row, index, array, string_json),
        Type::TIME => column::<NaiveTime>(row, index, array, string_json),
        Type::UUID => column::<Uuid>(row, index, array, string_json),
        Type::BYTEA => column::<Vec<u8>>(row, index, array, bytea_json),
        _ if <String as FromSql>::accepts(base) => column::<String>(row, index, array, Value::String),
        _ if matches!(base.kind(), Kind::Enum(_)) => {
            column::<EnumLabel>(row, index, array, |label| Value::String(label.0))
        }
        _ => Err(NativeError::message(format!(
            "column \"{}\" has type {} which cannot be decoded; cast it to text in the query",
            column_meta.name(),
            ty
        ))),
    }
}
