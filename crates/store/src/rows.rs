//! Column decoding helpers.
//!
//! Ids are stored as TEXT, timestamps as fixed-width RFC 3339 TEXT (so they
//! sort lexically), JSON objects as TEXT.

use agentcanvas_core::error::StoreError;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

pub(crate) type JsonMap = serde_json::Map<String, serde_json::Value>;

pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now() -> String {
    timestamp(Utc::now())
}

pub(crate) fn text(row: &SqliteRow, col: &str) -> Result<String, StoreError> {
    row.try_get(col)
        .map_err(|e| StoreError::Corrupt(format!("{col} column: {e}")))
}

pub(crate) fn opt_text(row: &SqliteRow, col: &str) -> Result<Option<String>, StoreError> {
    row.try_get(col)
        .map_err(|e| StoreError::Corrupt(format!("{col} column: {e}")))
}

pub(crate) fn uuid(row: &SqliteRow, col: &str) -> Result<Uuid, StoreError> {
    let raw = text(row, col)?;
    Uuid::parse_str(&raw).map_err(|e| StoreError::Corrupt(format!("{col} '{raw}': {e}")))
}

pub(crate) fn opt_uuid(row: &SqliteRow, col: &str) -> Result<Option<Uuid>, StoreError> {
    opt_text(row, col)?
        .map(|raw| {
            Uuid::parse_str(&raw).map_err(|e| StoreError::Corrupt(format!("{col} '{raw}': {e}")))
        })
        .transpose()
}

pub(crate) fn time(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw = text(row, col)?;
    parse_time(col, &raw)
}

pub(crate) fn opt_time(row: &SqliteRow, col: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    opt_text(row, col)?.map(|raw| parse_time(col, &raw)).transpose()
}

fn parse_time(col: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{col} '{raw}': {e}")))
}

pub(crate) fn json_map(row: &SqliteRow, col: &str) -> Result<JsonMap, StoreError> {
    let raw = text(row, col)?;
    serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(format!("{col}: {e}")))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt(format!("encode: {e}")))
}

/// Maps a driver error, with the failing operation as context.
pub(crate) fn db(context: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| StoreError::Database(format!("{context}: {e}"))
}

pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}
