use super::{CatalogEntry, ENTER_VALID_PHONE, QueryCatalog, Resolution, ResultSet};
use crate::{
    CoreError,
    domain::{DateRange, PhoneInput, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Ok,
    ConnectionUnavailable,
    /// The phone number did not resolve to a user.
    NotResolved,
    Failed,
}

/// One catalog entry inside an overview. Rows are kept as JSON so every
/// entry fits the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub entry: CatalogEntry,
    pub status: SectionStatus,
    pub rows: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    pub from_cache: bool,
}

impl Section {
    fn empty(entry: CatalogEntry, status: SectionStatus, message: Option<String>) -> Self {
        Self {
            entry,
            status,
            rows: Vec::new(),
            message,
            fetched_at: None,
            from_cache: false,
        }
    }

    fn failed(entry: CatalogEntry, err: &CoreError) -> Self {
        warn!("overview section {} failed: {}", entry.as_str(), err);
        Self::empty(entry, SectionStatus::Failed, Some(err.to_string()))
    }

    fn from_result<R: Serialize>(entry: CatalogEntry, result: Result<ResultSet<R>, CoreError>) -> Self {
        let set = match result {
            Ok(set) => set,
            Err(e) => return Self::failed(entry, &e),
        };
        if !set.is_live() {
            return Self::empty(entry, SectionStatus::ConnectionUnavailable, None);
        }
        let rows = match set
            .rows
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()
        {
            Ok(rows) => rows,
            Err(e) => return Self::failed(entry, &CoreError::from(e)),
        };
        Self {
            entry,
            status: SectionStatus::Ok,
            rows,
            message: None,
            fetched_at: Some(set.fetched_at),
            from_cache: set.from_cache,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overview {
    pub phone: String,
    pub range: DateRange,
    pub resolution: Option<Resolution>,
    pub sections: Vec<Section>,
}

impl Overview {
    pub fn section(&self, entry: CatalogEntry) -> Option<&Section> {
        self.sections.iter().find(|s| s.entry == entry)
    }
}

async fn for_user<R, F, Fut>(
    entry: CatalogEntry,
    resolution: &Result<Resolution, CoreError>,
    load: F,
) -> Section
where
    R: Serialize,
    F: FnOnce(UserId) -> Fut,
    Fut: Future<Output = Result<ResultSet<R>, CoreError>>,
{
    match resolution {
        Ok(Resolution::Resolved(user_id)) => Section::from_result(entry, load(*user_id).await),
        Ok(Resolution::Unavailable) => {
            Section::empty(entry, SectionStatus::ConnectionUnavailable, None)
        }
        Ok(Resolution::NotFound | Resolution::NoInput) => Section::empty(
            entry,
            SectionStatus::NotResolved,
            Some("no user is registered with this phone number".into()),
        ),
        Err(e) => Section::failed(entry, e),
    }
}

/// Resolves once, then runs every entry concurrently. The access log is
/// keyed by phone number and does not wait on resolution.
pub(crate) async fn build(
    catalog: &QueryCatalog,
    phone: &PhoneInput,
    range: &DateRange,
) -> Result<Overview, CoreError> {
    let Some(number) = phone.number() else {
        return Err(CoreError::Validation(ENTER_VALID_PHONE.into()));
    };

    let resolution = catalog.resolve(phone).await;
    let res = &resolution;

    let (account, cards, vehicles, pensions, lots, meters, ledger, errors, access) = tokio::join!(
        for_user(CatalogEntry::Account, res, |id| catalog.account_info(id)),
        for_user(CatalogEntry::Cards, res, |id| catalog.payment_cards(id)),
        for_user(CatalogEntry::Vehicles, res, |id| catalog.vehicles(id)),
        for_user(CatalogEntry::Pensions, res, |id| catalog.pensions(id)),
        for_user(CatalogEntry::LotTransactions, res, |id| {
            catalog.lot_transactions(id, range)
        }),
        for_user(CatalogEntry::MeterTransactions, res, |id| {
            catalog.meter_transactions(id, range)
        }),
        for_user(CatalogEntry::LedgerMovements, res, |_| {
            catalog.ledger_movements(number)
        }),
        for_user(CatalogEntry::ErrorLog, res, |id| catalog.error_log(id, range)),
        async {
            Section::from_result(CatalogEntry::AccessLog, catalog.access_log(number).await)
        },
    );

    Ok(Overview {
        phone: number.to_string(),
        range: *range,
        resolution: resolution.ok(),
        sections: vec![
            account, cards, vehicles, pensions, lots, meters, ledger, errors, access,
        ],
    })
}
