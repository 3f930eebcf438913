use super::{CatalogEntry, ResultSet, query_error};
use crate::{
    CoreError,
    domain::{DateRange, LocalClock, UserId, payment_label},
};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;

/// Whole minutes between check-in and check-out. A missing side or a
/// check-out recorded before the check-in counts as zero.
pub fn paid_minutes(checkin: Option<NaiveDateTime>, checkout: Option<NaiveDateTime>) -> i64 {
    match (checkin, checkout) {
        (Some(start), Some(end)) => (end - start).num_minutes().max(0),
        _ => 0,
    }
}

#[derive(sqlx::FromRow)]
struct LotRecord {
    transactionid: String,
    parkinglotname: Option<String>,
    total: Option<f64>,
    paymenttype: Option<i64>,
    paymentdate: Option<NaiveDateTime>,
    checkindate: Option<NaiveDateTime>,
    checkoutdate: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotTransactionRow {
    pub transactionid: String,
    pub parkinglotname: Option<String>,
    pub total: Option<f64>,
    pub paymenttype: String,
    pub paymentdate: Option<DateTime<FixedOffset>>,
    pub checkindate: Option<DateTime<FixedOffset>>,
    pub checkoutdate: Option<DateTime<FixedOffset>>,
    pub paidtimeminutes: i64,
}

/// Parking-lot payments inside the local date range, newest first.
pub async fn lot_transactions(
    conn: Option<&MySqlPool>,
    clock: &LocalClock,
    user_id: UserId,
    range: &DateRange,
) -> Result<ResultSet<LotTransactionRow>, CoreError> {
    let entry = CatalogEntry::LotTransactions;
    let Some(pool) = conn else {
        return Ok(ResultSet::unavailable(entry));
    };
    let (from, to) = range.utc_bounds(clock)?;

    let records = sqlx::query_as::<_, LotRecord>(
        r#"
        SELECT T.transactionid, Z.parkinglotname, CAST(T.total AS DOUBLE) AS total,
               T.paymenttype, T.paymentdate, I.checkindate, O.checkoutdate
        FROM PKM_SMART_QR_TRANSACTIONS T
        LEFT JOIN PKM_SMART_QR_CHECKIN I ON T.checkinid = I.id
        LEFT JOIN PKM_SMART_QR_CHECKOUT O ON T.checkoutid = O.id
        LEFT JOIN PKM_PARKING_LOT_CAT Z ON T.parkinglotid = Z.id
        WHERE T.userid = ? AND T.paymentdate BETWEEN ? AND ?
        ORDER BY T.paymentdate DESC
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
        .map(|r| LotTransactionRow {
            paidtimeminutes: paid_minutes(r.checkindate, r.checkoutdate),
            paymenttype: payment_label(r.paymenttype).to_string(),
            transactionid: r.transactionid,
            parkinglotname: r.parkinglotname,
            total: r.total,
            paymentdate: clock.to_local_opt(r.paymentdate),
            checkindate: clock.to_local_opt(r.checkindate),
            checkoutdate: clock.to_local_opt(r.checkoutdate),
        })
        .collect();
    Ok(ResultSet::live(entry, rows))
}

#[derive(sqlx::FromRow)]
struct MeterRecord {
    id: i64,
    meterid: Option<String>,
    plate: Option<String>,
    total: Option<f64>,
    paymenttype: Option<i64>,
    minutes: Option<i64>,
    paymentdate: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterTransactionRow {
    pub id: i64,
    pub meterid: Option<String>,
    pub plate: Option<String>,
    pub total: Option<f64>,
    pub paymenttype: String,
    pub minutes: Option<i64>,
    pub paymentdate: Option<DateTime<FixedOffset>>,
}

/// Street-meter payments inside the local date range, newest first.
pub async fn meter_transactions(
    conn: Option<&MySqlPool>,
    clock: &LocalClock,
    user_id: UserId,
    range: &DateRange,
) -> Result<ResultSet<MeterTransactionRow>, CoreError> {
    let entry = CatalogEntry::MeterTransactions;
    let Some(pool) = conn else {
        return Ok(ResultSet::unavailable(entry));
    };
    let (from, to) = range.utc_bounds(clock)?;

    let records = sqlx::query_as::<_, MeterRecord>(
        r#"
        SELECT id, meterid, plate, CAST(total AS DOUBLE) AS total, paymenttype,
               CAST(minutes AS SIGNED) AS minutes, paymentdate
        FROM PKM_METER_TRANSACTIONS
        WHERE userid = ? AND paymentdate BETWEEN ? AND ?
        ORDER BY paymentdate DESC
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
        .map(|r| MeterTransactionRow {
            paymenttype: payment_label(r.paymenttype).to_string(),
            id: r.id,
            meterid: r.meterid,
            plate: r.plate,
            total: r.total,
            minutes: r.minutes,
            paymentdate: clock.to_local_opt(r.paymentdate),
        })
        .collect();
    Ok(ResultSet::live(entry, rows))
}
