use super::{CatalogEntry, ResultSet, query_error};
use crate::{
    CoreError,
    domain::{DateRange, LocalClock, UserId},
};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::MySqlPool;

#[derive(sqlx::FromRow)]
struct EventRecord {
    id: i64,
    eventtype: Option<String>,
    payload: Option<String>,
    creation_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogRow {
    pub id: i64,
    pub eventtype: Option<String>,
    pub creation_date: Option<DateTime<FixedOffset>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub request_path: Option<String>,
}

/// Reads a dotted path out of a JSON payload. Numbers and booleans are
/// rendered as text; objects, arrays and unparsable payloads yield `None`.
pub fn payload_field(payload: Option<&str>, path: &str) -> Option<String> {
    let root: Value = serde_json::from_str(payload?).ok()?;
    let mut node = &root;
    for key in path.split('.') {
        node = node.get(key)?;
    }
    match node {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Events whose type mentions "error", newest first.
pub async fn error_log(
    conn: Option<&MySqlPool>,
    clock: &LocalClock,
    user_id: UserId,
    range: &DateRange,
) -> Result<ResultSet<ErrorLogRow>, CoreError> {
    let entry = CatalogEntry::ErrorLog;
    let Some(pool) = conn else {
        return Ok(ResultSet::unavailable(entry));
    };
    let (from, to) = range.utc_bounds(clock)?;

    let records = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, eventtype, CAST(payload AS CHAR) AS payload, creation_date
        FROM EVT_EVENT_LOG
        WHERE userid = ?
          AND eventtype LIKE '%error%'
          AND creation_date BETWEEN ? AND ?
        ORDER BY creation_date DESC
        "#,
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .map_err(|e| query_error(entry, e))?;

    let rows = records
        .into_iter()
        .map(|r| {
            let payload = r.payload.as_deref();
            ErrorLogRow {
                error_code: payload_field(payload, "error.code"),
                error_message: payload_field(payload, "error.message"),
                request_path: payload_field(payload, "request.path"),
                id: r.id,
                eventtype: r.eventtype,
                creation_date: clock.to_local_opt(r.creation_date),
            }
        })
        .collect();
    Ok(ResultSet::live(entry, rows))
}
