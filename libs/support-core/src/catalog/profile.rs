use super::{CatalogEntry, ResultSet, query_error};
use crate::{
    CoreError,
    domain::{LocalClock, UserId},
};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;

// One row expected per user.
#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct AccountRow {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub phonenumber: Option<String>,
    pub facebookemail: Option<String>,
    pub accountnumber: Option<String>,
    pub funds: Option<f64>,
    pub currency: Option<String>,
}

pub async fn account_info(
    conn: Option<&MySqlPool>,
    user_id: UserId,
) -> Result<ResultSet<AccountRow>, CoreError> {
    let entry = CatalogEntry::Account;
    let Some(pool) = conn else {
        return Ok(ResultSet::unavailable(entry));
    };

    let rows = sqlx::query_as::<_, AccountRow>(
        r#"
        SELECT UP.firstname, UP.lastname, UP.phonenumber, UP.facebookemail,
               CDU.accountnumber, CAST(CDU.funds AS DOUBLE) AS funds, CDU.currency
        FROM CDX_USER_ACCOUNT CDU
        JOIN SEC_USER_PROFILE UP ON CDU.userid = UP.userid
        WHERE CDU.userid = ?
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| query_error(entry, e))?;

    Ok(ResultSet::live(entry, rows))
}

#[derive(sqlx::FromRow)]
struct CardRecord {
    brand: Option<String>,
    last_4: Option<String>,
    card_status: Option<String>,
    gateway: Option<String>,
    creation_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardRow {
    pub brand: Option<String>,
    pub last_4: Option<String>,
    pub card_status: Option<String>,
    pub gateway: Option<String>,
    pub creation_date: Option<DateTime<FixedOffset>>,
}

pub async fn payment_cards(
    conn: Option<&MySqlPool>,
    clock: &LocalClock,
    user_id: UserId,
) -> Result<ResultSet<CardRow>, CoreError> {
    let entry = CatalogEntry::Cards;
    let Some(pool) = conn else {
        return Ok(ResultSet::unavailable(entry));
    };

    let records = sqlx::query_as::<_, CardRecord>(
        r#"
        SELECT brand, last_4, CAST(card_status AS CHAR) AS card_status, gateway, creation_date
        FROM uc_users_cards
        WHERE user_id = ?
        ORDER BY creation_date DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| query_error(entry, e))?;

    let rows = records
        .into_iter()
        .map(|r| CardRow {
            brand: r.brand,
            last_4: r.last_4,
            card_status: r.card_status,
            gateway: r.gateway,
            creation_date: clock.to_local_opt(r.creation_date),
        })
        .collect();
    Ok(ResultSet::live(entry, rows))
}

#[derive(sqlx::FromRow)]
struct VehicleRecord {
    id: i64,
    plate: Option<String>,
    brand: Option<String>,
    model: Option<String>,
    color: Option<String>,
    status: Option<String>,
    creation_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleRow {
    pub id: i64,
    pub plate: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub status: Option<String>,
    pub creation_date: Option<DateTime<FixedOffset>>,
}

/// Ordered by status, newest first within a status.
pub async fn vehicles(
    conn: Option<&MySqlPool>,
    clock: &LocalClock,
    user_id: UserId,
) -> Result<ResultSet<VehicleRow>, CoreError> {
    let entry = CatalogEntry::Vehicles;
    let Some(pool) = conn else {
        return Ok(ResultSet::unavailable(entry));
    };

    let records = sqlx::query_as::<_, VehicleRecord>(
        r#"
        SELECT id, plate, brand, model, color, CAST(status AS CHAR) AS status, creation_date
        FROM VHC_USER_VEHICLES
        WHERE userid = ?
        ORDER BY VHC_USER_VEHICLES.status ASC, creation_date DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| query_error(entry, e))?;

    let rows = records
        .into_iter()
        .map(|r| VehicleRow {
            id: r.id,
            plate: r.plate,
            brand: r.brand,
            model: r.model,
            color: r.color,
            status: r.status,
            creation_date: clock.to_local_opt(r.creation_date),
        })
        .collect();
    Ok(ResultSet::live(entry, rows))
}

#[derive(sqlx::FromRow)]
struct PensionRecord {
    id: i64,
    parkinglotname: Option<String>,
    status: Option<String>,
    start_date: Option<NaiveDateTime>,
    end_date: Option<NaiveDateTime>,
    amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PensionRow {
    pub id: i64,
    pub parkinglotname: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<DateTime<FixedOffset>>,
    pub end_date: Option<DateTime<FixedOffset>>,
    pub amount: Option<f64>,
}

pub async fn pensions(
    conn: Option<&MySqlPool>,
    clock: &LocalClock,
    user_id: UserId,
) -> Result<ResultSet<PensionRow>, CoreError> {
    let entry = CatalogEntry::Pensions;
    let Some(pool) = conn else {
        return Ok(ResultSet::unavailable(entry));
    };

    let records = sqlx::query_as::<_, PensionRecord>(
        r#"
        SELECT P.id, Z.parkinglotname, CAST(P.status AS CHAR) AS status,
               P.start_date, P.end_date, CAST(P.amount AS DOUBLE) AS amount
        FROM PKM_PENSIONS P
        LEFT JOIN PKM_PARKING_LOT_CAT Z ON P.parkinglotid = Z.id
        WHERE P.userid = ?
        ORDER BY P.start_date DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| query_error(entry, e))?;

    let rows = records
        .into_iter()
        .map(|r| PensionRow {
            id: r.id,
            parkinglotname: r.parkinglotname,
            status: r.status,
            start_date: clock.to_local_opt(r.start_date),
            end_date: clock.to_local_opt(r.end_date),
            amount: r.amount,
        })
        .collect();
    Ok(ResultSet::live(entry, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_support::{mexico_city, start_store};

    #[tokio::test]
    async fn profile_entries_read_seeded_user() {
        let (pool, _node) = start_store().await;
        let clock = mexico_city();

        let account = account_info(Some(&pool), 1001).await.unwrap();
        assert_eq!(account.rows.len(), 1);
        assert_eq!(account.rows[0].firstname.as_deref(), Some("Ana"));
        assert_eq!(account.rows[0].funds, Some(150.5));

        let cards = payment_cards(Some(&pool), &clock, 1001).await.unwrap();
        assert_eq!(cards.rows.len(), 2);
        assert_eq!(cards.rows[0].last_4.as_deref(), Some("4242"));
        assert_eq!(
            cards.rows[0].creation_date.unwrap().to_rfc3339(),
            "2025-01-10T09:00:00-06:00"
        );

        let vehicles = vehicles(Some(&pool), &clock, 1001).await.unwrap();
        let statuses: Vec<_> = vehicles.rows.iter().map(|v| v.status.clone().unwrap()).collect();
        assert_eq!(statuses, vec!["0", "1", "2"]);

        let pensions = pensions(Some(&pool), &clock, 1001).await.unwrap();
        assert_eq!(pensions.rows.len(), 1);
        assert_eq!(pensions.rows[0].parkinglotname.as_deref(), Some("Plaza Centro"));
    }

    #[tokio::test]
    async fn user_without_rows_gets_live_empty_sets() {
        let (pool, _node) = start_store().await;
        let result = account_info(Some(&pool), 424242).await.unwrap();
        assert!(result.is_live());
        assert!(result.rows.is_empty());
    }
}
