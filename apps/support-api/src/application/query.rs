use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use support_core::{
    CoreError,
    catalog::{CatalogEntry, ENTER_VALID_PHONE, Resolution, ResultSet},
    domain::{DateRange, LocalClock, PhoneInput, PhoneNumber, UserId},
};
use tracing::info;

use super::{ApplicationError, middleware::AuthenticatedOperator};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl RangeQuery {
    fn range(&self, clock: &LocalClock) -> Result<DateRange, ApplicationError> {
        Ok(DateRange::from_query(
            self.from.as_deref(),
            self.to.as_deref(),
            clock.today(),
        )?)
    }
}

#[derive(Serialize)]
struct Envelope<'a, R> {
    status: &'static str,
    entry: CatalogEntry,
    phone: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<DateRange>,
    fetched_at: DateTime<Utc>,
    from_cache: bool,
    data: Vec<R>,
}

fn respond<R: Serialize>(
    set: ResultSet<R>,
    phone: &PhoneNumber,
    user_id: Option<UserId>,
    range: Option<DateRange>,
) -> Result<Response, ApplicationError> {
    if !set.is_live() {
        return Err(ApplicationError::Unavailable(set.entry));
    }
    Ok(Json(Envelope {
        status: "ok",
        entry: set.entry,
        phone: phone.as_str(),
        user_id,
        range,
        fetched_at: set.fetched_at,
        from_cache: set.from_cache,
        data: set.rows,
    })
    .into_response())
}

fn parse_phone(raw: &str) -> Result<PhoneNumber, ApplicationError> {
    match PhoneInput::parse(raw)? {
        PhoneInput::Provided(number) => Ok(number),
        PhoneInput::NoInput => Err(ApplicationError::Validation(ENTER_VALID_PHONE.into())),
    }
}

/// Phone number to user id, mapping every non-resolved outcome to the
/// response the operator should see for `entry`.
async fn resolve_user(
    app_state: &AppState,
    raw: &str,
    entry: Option<CatalogEntry>,
) -> Result<(PhoneNumber, UserId), ApplicationError> {
    let number = parse_phone(raw)?;
    let resolution = app_state
        .catalog
        .resolve(&PhoneInput::Provided(number.clone()))
        .await?;
    match resolution {
        Resolution::Resolved(user_id) => Ok((number, user_id)),
        Resolution::NotFound => Err(ApplicationError::NotFound(format!(
            "no user is registered with phone number {number}"
        ))),
        Resolution::Unavailable => Err(match entry {
            Some(entry) => ApplicationError::Unavailable(entry),
            None => ApplicationError::Core(CoreError::Connection(
                "primary database not connected".into(),
            )),
        }),
        Resolution::NoInput => Err(ApplicationError::Validation(ENTER_VALID_PHONE.into())),
    }
}

// GET /api/users/{phone}
pub async fn handle_resolve_user(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedOperator>,
    Path(phone): Path<String>,
) -> Result<impl IntoResponse, ApplicationError> {
    let (number, user_id) = resolve_user(&app_state, &phone, None).await?;
    info!(operator = %ctx.key_id, user_id, "phone number resolved");
    Ok(Json(serde_json::json!({
        "status": "ok",
        "phone": number,
        "user_id": user_id,
    })))
}

// GET /api/users/{phone}/account
pub async fn handle_account(
    State(app_state): State<AppState>,
    Path(phone): Path<String>,
) -> Result<Response, ApplicationError> {
    let (number, user_id) =
        resolve_user(&app_state, &phone, Some(CatalogEntry::Account)).await?;
    let set = app_state.catalog.account_info(user_id).await?;
    respond(set, &number, Some(user_id), None)
}

// GET /api/users/{phone}/cards
pub async fn handle_cards(
    State(app_state): State<AppState>,
    Path(phone): Path<String>,
) -> Result<Response, ApplicationError> {
    let (number, user_id) = resolve_user(&app_state, &phone, Some(CatalogEntry::Cards)).await?;
    let set = app_state.catalog.payment_cards(user_id).await?;
    respond(set, &number, Some(user_id), None)
}

// GET /api/users/{phone}/vehicles
pub async fn handle_vehicles(
    State(app_state): State<AppState>,
    Path(phone): Path<String>,
) -> Result<Response, ApplicationError> {
    let (number, user_id) =
        resolve_user(&app_state, &phone, Some(CatalogEntry::Vehicles)).await?;
    let set = app_state.catalog.vehicles(user_id).await?;
    respond(set, &number, Some(user_id), None)
}

// GET /api/users/{phone}/pensions
pub async fn handle_pensions(
    State(app_state): State<AppState>,
    Path(phone): Path<String>,
) -> Result<Response, ApplicationError> {
    let (number, user_id) =
        resolve_user(&app_state, &phone, Some(CatalogEntry::Pensions)).await?;
    let set = app_state.catalog.pensions(user_id).await?;
    respond(set, &number, Some(user_id), None)
}

// GET /api/users/{phone}/lot-transactions?from=&to=
pub async fn handle_lot_transactions(
    State(app_state): State<AppState>,
    Path(phone): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, ApplicationError> {
    let range = query.range(app_state.catalog.clock())?;
    let (number, user_id) =
        resolve_user(&app_state, &phone, Some(CatalogEntry::LotTransactions)).await?;
    let set = app_state.catalog.lot_transactions(user_id, &range).await?;
    respond(set, &number, Some(user_id), Some(range))
}

// GET /api/users/{phone}/meter-transactions?from=&to=
pub async fn handle_meter_transactions(
    State(app_state): State<AppState>,
    Path(phone): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, ApplicationError> {
    let range = query.range(app_state.catalog.clock())?;
    let (number, user_id) =
        resolve_user(&app_state, &phone, Some(CatalogEntry::MeterTransactions)).await?;
    let set = app_state.catalog.meter_transactions(user_id, &range).await?;
    respond(set, &number, Some(user_id), Some(range))
}

// GET /api/users/{phone}/ledger-movements
pub async fn handle_ledger_movements(
    State(app_state): State<AppState>,
    Path(phone): Path<String>,
) -> Result<Response, ApplicationError> {
    let (number, user_id) =
        resolve_user(&app_state, &phone, Some(CatalogEntry::LedgerMovements)).await?;
    let set = app_state.catalog.ledger_movements(&number).await?;
    respond(set, &number, Some(user_id), None)
}

// GET /api/users/{phone}/error-log?from=&to=
pub async fn handle_error_log(
    State(app_state): State<AppState>,
    Path(phone): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, ApplicationError> {
    let range = query.range(app_state.catalog.clock())?;
    let (number, user_id) =
        resolve_user(&app_state, &phone, Some(CatalogEntry::ErrorLog)).await?;
    let set = app_state.catalog.error_log(user_id, &range).await?;
    respond(set, &number, Some(user_id), Some(range))
}

// GET /api/users/{phone}/access-log
// Keyed by phone number alone; the primary database is not consulted.
pub async fn handle_access_log(
    State(app_state): State<AppState>,
    Path(phone): Path<String>,
) -> Result<Response, ApplicationError> {
    let number = parse_phone(&phone)?;
    let set = app_state.catalog.access_log(&number).await?;
    respond(set, &number, None, None)
}

// GET /api/users/{phone}/overview?from=&to=
pub async fn handle_overview(
    State(app_state): State<AppState>,
    Extension(ctx): Extension<AuthenticatedOperator>,
    Path(phone): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, ApplicationError> {
    let range = query.range(app_state.catalog.clock())?;
    let input = PhoneInput::parse(&phone)?;
    let overview = app_state.catalog.overview(&input, &range).await?;
    info!(
        operator = %ctx.key_id,
        phone = %overview.phone,
        "overview served"
    );
    Ok(Json(overview))
}
