//! Conversions between MySQL cells and JSON values.

use base64::{Engine, engine::general_purpose::STANDARD};
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row};

pub type RowMap = Map<String, Value>;

/// Key of the single-entry object that carries non-UTF-8 bytes as base64,
/// both in rows sent out and in row values sent back.
pub const BASE64_TAG: &str = "$base64";

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Decodes one cell by probing the driver types from most to least specific.
pub fn cell_to_json(row: &MySqlRow, idx: usize) -> Value {
    // u64 first for BIGINT UNSIGNED columns
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u32>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u16>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i8>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u8>, _>(idx) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v
            .and_then(|f| Number::from_f64(f64::from(f)))
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    // decimals keep their exact textual form
    if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
        return v.map(|d| Value::String(d.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| Value::String(format_datetime(&dt)))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v
            .map(|dt| Value::String(format_datetime(&dt.naive_utc())))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return v
            .map(|t| Value::String(t.format(TIME_FORMAT).to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(bytes_to_json).unwrap_or(Value::Null);
    }

    Value::Null
}

/// Fractional seconds are kept so `DATETIME(6)` keys still match when sent
/// back; whole seconds print without a fraction.
pub fn format_datetime(dt: &chrono::NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// UTF-8 payloads stay readable; anything else becomes `{"$base64": ...}`.
pub fn bytes_to_json(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(s) => Value::String(s),
        Err(e) => {
            let mut tagged = Map::new();
            tagged.insert(
                BASE64_TAG.to_string(),
                Value::String(STANDARD.encode(e.into_bytes())),
            );
            Value::Object(tagged)
        }
    }
}

/// The raw bytes behind a `{"$base64": ...}` value, if it is one.
pub fn tagged_bytes(value: &Value) -> Option<Vec<u8>> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    let encoded = obj.get(BASE64_TAG)?.as_str()?;
    STANDARD.decode(encoded).ok()
}

/// Column name to value, in result-set column order.
pub fn row_to_map(row: &MySqlRow) -> RowMap {
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), cell_to_json(row, col.ordinal())))
        .collect()
}

pub fn column_names(row: &MySqlRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

/// Reads a textual cell from introspection results. Depending on server
/// version these columns come back as VARCHAR or VARBINARY.
pub fn text_cell<I>(row: &MySqlRow, index: I) -> Result<Option<String>, sqlx::Error>
where
    I: sqlx::ColumnIndex<MySqlRow> + Copy,
{
    match row.try_get::<Option<String>, _>(index) {
        Ok(v) => Ok(v),
        Err(_) => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .map(|v| v.map(|b| String::from_utf8_lossy(&b).into_owned())),
    }
}

/// Binds a client-supplied JSON value as a statement parameter.
pub fn bind_json<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &'q Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(u)
            } else {
                query.bind(n.as_f64())
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        Value::Object(_) => match tagged_bytes(value) {
            Some(bytes) => query.bind(bytes),
            None => query.bind(value.to_string()),
        },
        Value::Array(_) => query.bind(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::json;

    fn at(h: u32, m: u32, s: u32, micros: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_micro_opt(h, m, s, micros)
            .unwrap()
    }

    #[test]
    fn non_utf8_binary_is_tagged_and_decodes_back_to_the_same_bytes() {
        assert_eq!(bytes_to_json(b"plain".to_vec()), json!("plain"));

        let cell = bytes_to_json(vec![0xff, 0x00, 0xfe]);
        assert_eq!(cell, json!({"$base64": "/wD+"}));
        assert_eq!(tagged_bytes(&cell), Some(vec![0xff, 0x00, 0xfe]));
    }

    #[test]
    fn ordinary_objects_are_not_mistaken_for_bytes() {
        assert_eq!(tagged_bytes(&json!("/wD+")), None);
        assert_eq!(tagged_bytes(&json!({"$base64": "/wD+", "other": 1})), None);
        assert_eq!(tagged_bytes(&json!({"$base64": "not base64!"})), None);
        assert_eq!(tagged_bytes(&json!({"a": 1})), None);
    }

    #[test]
    fn datetimes_keep_their_fraction() {
        assert_eq!(format_datetime(&at(3, 4, 5, 123_456)), "2024-01-02 03:04:05.123456");
        assert_eq!(format_datetime(&at(3, 4, 5, 0)), "2024-01-02 03:04:05");
    }
}
