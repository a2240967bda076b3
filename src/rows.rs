//! Render result rows as JSON text.

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::types::{PgInterval, PgTimeTz};
use sqlx::postgres::{PgHasArrayType, PgRow, PgValueFormat};
use sqlx::{Column, Decode, Postgres, Row, Type, TypeInfo, ValueRef};
use tracing::debug;
use uuid::Uuid;

const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Serialize rows as a JSON array of `{column: value}` objects.
pub fn rows_to_json(rows: &[PgRow]) -> Result<String, serde_json::Error> {
    let values: Vec<Value> = rows.iter().map(row_to_object).collect();
    serde_json::to_string(&values)
}

fn row_to_object(row: &PgRow) -> Value {
    let mut object = Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = column_value(row, index, column.type_info().name());
        object.insert(column.name().to_string(), value);
    }
    Value::Object(object)
}

fn column_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let raw = match row.try_get_raw(index) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(index, error = %e, "Cannot read column");
            return Value::Null;
        }
    };
    if raw.is_null() {
        return Value::Null;
    }
    let format = raw.format();
    let bytes = raw.as_bytes().ok();

    // Types unknown to sqlx (Materialize's own) are reported by catalog name.
    let decoded: Result<Value, sqlx::Error> = match type_name.to_ascii_uppercase().as_str() {
        "BOOL" => row.try_get::<bool, _>(index).map(Value::from),
        "INT2" => row.try_get::<i16, _>(index).map(Value::from),
        "INT4" => row.try_get::<i32, _>(index).map(Value::from),
        "INT8" => row.try_get::<i64, _>(index).map(Value::from),
        "UINT2" | "UINT4" | "UINT8" => Ok(bytes
            .and_then(|b| decode_unsigned(format, b))
            .unwrap_or(Value::Null)),
        "FLOAT4" => row.try_get::<f32, _>(index).map(|v| Value::from(f64::from(v))),
        "FLOAT8" => row.try_get::<f64, _>(index).map(Value::from),
        "NUMERIC" => match bytes.and_then(numeric_special) {
            Some(special) => Ok(Value::from(special)),
            None => row
                .try_get::<BigDecimal, _>(index)
                .map(|v| Value::from(v.to_string())),
        },
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => {
            row.try_get::<String, _>(index).map(Value::from)
        }
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|v| Value::from(bytea_hex(&v))),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index),
        "UUID" => row.try_get::<Uuid, _>(index).map(|v| Value::from(v.to_string())),
        "DATE" => row.try_get::<NaiveDate, _>(index).map(|v| Value::from(v.to_string())),
        "TIME" => row.try_get::<NaiveTime, _>(index).map(|v| Value::from(v.to_string())),
        "TIMETZ" => row
            .try_get::<PgTimeTz<NaiveTime, FixedOffset>, _>(index)
            .map(|v| Value::from(format!("{}{}", v.time, v.offset))),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(index)
            .map(|v| Value::from(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(index)
            .map(|v| Value::from(v.to_rfc3339())),
        "INTERVAL" => row
            .try_get::<PgInterval, _>(index)
            .map(|v| Value::from(format_interval(v.months, v.days, v.microseconds))),
        "BOOL[]" => array::<bool>(row, index, Value::from),
        "INT2[]" => array::<i16>(row, index, Value::from),
        "INT4[]" => array::<i32>(row, index, Value::from),
        "INT8[]" => array::<i64>(row, index, Value::from),
        "FLOAT4[]" => array::<f32>(row, index, |v| Value::from(f64::from(v))),
        "FLOAT8[]" => array::<f64>(row, index, Value::from),
        "TEXT[]" | "VARCHAR[]" | "NAME[]" => array::<String>(row, index, Value::from),
        "UUID[]" => array::<Uuid>(row, index, |v| Value::from(v.to_string())),
        _ => Ok(decode_unknown(format, bytes)),
    };

    decoded.unwrap_or_else(|e| {
        debug!(index, type_name, error = %e, "Cannot decode column");
        Value::Null
    })
}

fn array<T>(row: &PgRow, index: usize, render: impl Fn(T) -> Value) -> Result<Value, sqlx::Error>
where
    T: for<'r> Decode<'r, Postgres> + Type<Postgres> + PgHasArrayType,
{
    row.try_get::<Vec<Option<T>>, _>(index).map(|items| {
        Value::Array(
            items
                .into_iter()
                .map(|item| item.map_or(Value::Null, &render))
                .collect(),
        )
    })
}

/// Materialize's unsigned integers: big-endian in binary, digits in text.
pub fn decode_unsigned(format: PgValueFormat, bytes: &[u8]) -> Option<Value> {
    match format {
        PgValueFormat::Text => std::str::from_utf8(bytes).ok()?.parse::<u64>().ok().map(Value::from),
        PgValueFormat::Binary => match bytes.len() {
            2 => Some(Value::from(u16::from_be_bytes([bytes[0], bytes[1]]))),
            4 => Some(Value::from(u32::from_be_bytes(bytes.try_into().ok()?))),
            8 => Some(Value::from(u64::from_be_bytes(bytes.try_into().ok()?))),
            _ => None,
        },
    }
}

/// Values of types with no decoder. Only text-format values are readable;
/// binary ones become `null`.
pub fn decode_unknown(format: PgValueFormat, bytes: Option<&[u8]>) -> Value {
    match (format, bytes) {
        (PgValueFormat::Text, Some(b)) => std::str::from_utf8(b)
            .map_or(Value::Null, |s| Value::from(s.to_string())),
        (PgValueFormat::Binary, Some(b)) => {
            debug!(len = b.len(), "Dropping binary value of unsupported type");
            Value::Null
        }
        (_, None) => Value::Null,
    }
}

/// `NaN` and infinities have no `BigDecimal` form; read them off the sign word.
fn numeric_special(bytes: &[u8]) -> Option<&'static str> {
    let sign = u16::from_be_bytes(bytes.get(4..6)?.try_into().ok()?);
    match sign {
        NUMERIC_NAN => Some("NaN"),
        NUMERIC_PINF => Some("Infinity"),
        NUMERIC_NINF => Some("-Infinity"),
        _ => None,
    }
}

/// Postgres hex form, `\x` followed by two lowercase digits per byte.
pub fn bytea_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// ISO 8601 duration, e.g. `P1M2DT3.5S`.
pub fn format_interval(months: i32, days: i32, microseconds: i64) -> String {
    let sign = if microseconds < 0 { "-" } else { "" };
    let abs = microseconds.unsigned_abs();
    let whole = abs / 1_000_000;
    let fraction = abs % 1_000_000;
    let seconds = if fraction == 0 {
        format!("{sign}{whole}")
    } else {
        let digits = format!("{fraction:06}");
        format!("{sign}{whole}.{}", digits.trim_end_matches('0'))
    };
    format!("P{months}M{days}DT{seconds}S")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_binary_is_big_endian() {
        let v = decode_unsigned(PgValueFormat::Binary, &[0, 0, 0, 65]).unwrap();
        assert_eq!(v, Value::from(65u32));
        let v = decode_unsigned(PgValueFormat::Binary, &[1, 0]).unwrap();
        assert_eq!(v, Value::from(256u16));
        let v = decode_unsigned(PgValueFormat::Binary, &u64::MAX.to_be_bytes()).unwrap();
        assert_eq!(v, Value::from(u64::MAX));
        assert!(decode_unsigned(PgValueFormat::Binary, &[1, 2, 3]).is_none());
    }

    #[test]
    fn unsigned_text_is_parsed() {
        let v = decode_unsigned(PgValueFormat::Text, b"42").unwrap();
        assert_eq!(v, Value::from(42u64));
        assert!(decode_unsigned(PgValueFormat::Text, b"x").is_none());
    }

    #[test]
    fn unknown_binary_never_becomes_text() {
        assert_eq!(decode_unknown(PgValueFormat::Binary, Some(&[0, 0, 0, 65])), Value::Null);
        assert_eq!(decode_unknown(PgValueFormat::Binary, Some(b"abc")), Value::Null);
        assert_eq!(decode_unknown(PgValueFormat::Text, None), Value::Null);
    }

    #[test]
    fn unknown_text_is_kept() {
        assert_eq!(
            decode_unknown(PgValueFormat::Text, Some(b"1 day")),
            Value::from("1 day")
        );
        assert_eq!(decode_unknown(PgValueFormat::Text, Some(&[0xff, 0xfe])), Value::Null);
    }

    #[test]
    fn numeric_special_values() {
        let word = |sign: u16| {
            let mut b = vec![0, 0, 0, 0];
            b.extend_from_slice(&sign.to_be_bytes());
            b.extend_from_slice(&[0, 0]);
            b
        };
        assert_eq!(numeric_special(&word(0xC000)), Some("NaN"));
        assert_eq!(numeric_special(&word(0xF000)), Some("-Infinity"));
        assert_eq!(numeric_special(&word(0x4000)), None);
        assert_eq!(numeric_special(&[0, 1]), None);
    }

    #[test]
    fn bytea_renders_as_hex() {
        assert_eq!(bytea_hex(&[0xde, 0xad, 0x01]), "\\xdead01");
        assert_eq!(bytea_hex(&[]), "\\x");
    }

    #[test]
    fn interval_renders_as_iso_duration() {
        assert_eq!(format_interval(1, 2, 3_500_000), "P1M2DT3.5S");
        assert_eq!(format_interval(0, 0, 0), "P0M0DT0S");
        assert_eq!(format_interval(0, -1, -250_000), "P0M-1DT-0.25S");
    }
}
