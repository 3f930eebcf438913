use super::{CatalogEntry, ResultSet, query_error};
use crate::{
    CoreError,
    domain::{LocalClock, PhoneNumber},
};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlPool, Row, mysql::MySqlRow};

const WALLET_KIND: &str = "WALLET";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn of(amount: f64) -> Self {
        if amount >= 0.0 { Direction::Credit } else { Direction::Debit }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRow {
    pub movementdate: Option<DateTime<FixedOffset>>,
    pub concept: Option<String>,
    pub amount: f64,
    pub balance: Option<f64>,
    pub direction: Direction,
}

/// Wallet balance changes for a phone number, oldest first so the rows can
/// be charted as they come.
///
/// The rows come from the `account_movements` procedure, which reports
/// amounts as DECIMAL.
pub async fn ledger_movements(
    conn: Option<&MySqlPool>,
    clock: &LocalClock,
    phone: &PhoneNumber,
) -> Result<ResultSet<LedgerRow>, CoreError> {
    let entry = CatalogEntry::LedgerMovements;
    let Some(pool) = conn else {
        return Ok(ResultSet::unavailable(entry));
    };

    let records = sqlx::query("CALL account_movements(?, ?)")
        .bind(WALLET_KIND)
        .bind(phone.as_str())
        .fetch_all(pool)
        .await
        .map_err(|e| query_error(entry, e))?;

    let mut rows = records
        .iter()
        .map(|row| ledger_row(row, clock))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| query_error(entry, e))?;
    sort_chronologically(&mut rows);

    Ok(ResultSet::live(entry, rows))
}

fn ledger_row(row: &MySqlRow, clock: &LocalClock) -> Result<LedgerRow, sqlx::Error> {
    let movementdate: Option<NaiveDateTime> = row.try_get("movementdate")?;
    let amount = decimal_column(row, "amount")?.unwrap_or(0.0);
    Ok(LedgerRow {
        movementdate: clock.to_local_opt(movementdate),
        concept: row.try_get("concept")?,
        amount,
        balance: decimal_column(row, "balance")?,
        direction: Direction::of(amount),
    })
}

// DOUBLE decodes directly; DECIMAL arrives as its text form.
fn decimal_column(row: &MySqlRow, column: &str) -> Result<Option<f64>, sqlx::Error> {
    if let Ok(value) = row.try_get::<Option<f64>, _>(column) {
        return Ok(value);
    }
    let text: Option<String> = row.try_get_unchecked(column)?;
    text.map(|t| {
        t.trim().parse::<f64>().map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
    })
    .transpose()
}

// Undated rows go first; equal timestamps keep procedure order.
fn sort_chronologically(rows: &mut [LedgerRow]) {
    rows.sort_by_key(|r| r.movementdate);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::test_support::{mexico_city, start_store},
        domain::PhoneInput,
    };

    fn row(date: Option<&str>, amount: f64) -> LedgerRow {
        LedgerRow {
            movementdate: date.map(|d| DateTime::parse_from_rfc3339(d).unwrap()),
            concept: None,
            amount,
            balance: None,
            direction: Direction::of(amount),
        }
    }

    #[test]
    fn direction_follows_sign() {
        assert_eq!(Direction::of(0.0), Direction::Credit);
        assert_eq!(Direction::of(12.5), Direction::Credit);
        assert_eq!(Direction::of(-0.01), Direction::Debit);
        assert_eq!(serde_json::to_value(Direction::Debit).unwrap(), serde_json::json!("debit"));
    }

    #[test]
    fn sorts_ascending_by_date() {
        let mut rows = vec![
            row(Some("2025-01-10T12:00:00-06:00"), -45.0),
            row(Some("2025-01-02T12:00:00-06:00"), 200.0),
            row(None, 1.0),
        ];
        sort_chronologically(&mut rows);
        let amounts: Vec<_> = rows.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![1.0, 200.0, -45.0]);
    }

    #[tokio::test]
    async fn wallet_movements_through_procedure() {
        let (pool, _node) = start_store().await;
        let phone = PhoneInput::parse("2213500061").unwrap().number().cloned().unwrap();

        let result = ledger_movements(Some(&pool), &mexico_city(), &phone).await.unwrap();
        let amounts: Vec<_> = result.rows.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![200.0, -45.0, -5.0]);

        let directions: Vec<_> = result.rows.iter().map(|r| r.direction).collect();
        assert_eq!(
            directions,
            vec![Direction::Credit, Direction::Debit, Direction::Debit]
        );
        assert_eq!(result.rows[2].balance, Some(150.5));
        assert_eq!(
            result.rows[0].movementdate.unwrap().to_rfc3339(),
            "2025-01-02T12:00:00-06:00"
        );
    }
}
