use super::{CatalogEntry, ResultSet, query_error};
use crate::{
    CoreError,
    domain::{LocalClock, PhoneNumber},
};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;

#[derive(sqlx::FromRow)]
struct AccessRecord {
    id: i64,
    event: Option<String>,
    ip_address: Option<String>,
    creation_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogRow {
    pub id: i64,
    pub event: Option<String>,
    pub ip_address: Option<String>,
    pub creation_date: Option<DateTime<FixedOffset>>,
}

/// Access history kept in the auxiliary database, keyed by phone number.
pub async fn access_log(
    conn: Option<&MySqlPool>,
    clock: &LocalClock,
    phone: &PhoneNumber,
) -> Result<ResultSet<AccessLogRow>, CoreError> {
    let entry = CatalogEntry::AccessLog;
    let Some(pool) = conn else {
        return Ok(ResultSet::unavailable(entry));
    };

    let records = sqlx::query_as::<_, AccessRecord>(
        r#"
        SELECT id, event, ip_address, creation_date
        FROM ACCESS_LOG
        WHERE phonenumber = ?
        ORDER BY creation_date DESC
        "#,
    )
    .bind(phone.as_str())
    .fetch_all(pool)
    .await
    .map_err(|e| query_error(entry, e))?;

    let rows = records
        .into_iter()
        .map(|r| AccessLogRow {
            id: r.id,
            event: r.event,
            ip_address: r.ip_address,
            creation_date: clock.to_local_opt(r.creation_date),
        })
        .collect();
    Ok(ResultSet::live(entry, rows))
}
