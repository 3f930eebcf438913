//! Read-only query catalog.
//!
//! Each entry is a free function taking an optional pool plus its own
//! parameters. A missing pool short-circuits to an unavailable, empty result
//! set without touching the network. [`QueryCatalog`] bundles the shared
//! connections, the display clock and the result cache for the HTTP layer.

use crate::{
    Cache, CoreError,
    adapters::connection_manager::{Connections, SharedConnections},
    domain::{DateRange, LocalClock, PhoneInput, PhoneNumber, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::sync::Arc;

pub mod access_log;
pub mod cached;
pub mod events;
pub mod ledger;
pub mod overview;
pub mod profile;
pub mod resolver;
pub mod transactions;

#[cfg(test)]
pub(crate) mod test_support;

pub use access_log::AccessLogRow;
pub use cached::CachedQueries;
pub use events::ErrorLogRow;
pub use ledger::{Direction, LedgerRow};
pub use overview::{Overview, Section, SectionStatus};
pub use profile::{AccountRow, CardRow, PensionRow, VehicleRow};
pub use resolver::Resolution;
pub use transactions::{LotTransactionRow, MeterTransactionRow};

/// Shown whenever the phone field still holds the sentinel.
pub const ENTER_VALID_PHONE: &str = "enter a valid phone number";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogEntry {
    Account,
    Cards,
    Vehicles,
    Pensions,
    LotTransactions,
    MeterTransactions,
    LedgerMovements,
    ErrorLog,
    AccessLog,
}

impl CatalogEntry {
    pub const ALL: [CatalogEntry; 9] = [
        CatalogEntry::Account,
        CatalogEntry::Cards,
        CatalogEntry::Vehicles,
        CatalogEntry::Pensions,
        CatalogEntry::LotTransactions,
        CatalogEntry::MeterTransactions,
        CatalogEntry::LedgerMovements,
        CatalogEntry::ErrorLog,
        CatalogEntry::AccessLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogEntry::Account => "account",
            CatalogEntry::Cards => "cards",
            CatalogEntry::Vehicles => "vehicles",
            CatalogEntry::Pensions => "pensions",
            CatalogEntry::LotTransactions => "lot_transactions",
            CatalogEntry::MeterTransactions => "meter_transactions",
            CatalogEntry::LedgerMovements => "ledger_movements",
            CatalogEntry::ErrorLog => "error_log",
            CatalogEntry::AccessLog => "access_log",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Live,
    ConnectionUnavailable,
}

/// Rows produced by one catalog entry for one parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSet<R> {
    pub entry: CatalogEntry,
    pub availability: Availability,
    pub rows: Vec<R>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub from_cache: bool,
}

impl<R> ResultSet<R> {
    pub fn live(entry: CatalogEntry, rows: Vec<R>) -> Self {
        Self {
            entry,
            availability: Availability::Live,
            rows,
            fetched_at: Utc::now(),
            from_cache: false,
        }
    }

    pub fn unavailable(entry: CatalogEntry) -> Self {
        Self {
            entry,
            availability: Availability::ConnectionUnavailable,
            rows: Vec::new(),
            fetched_at: Utc::now(),
            from_cache: false,
        }
    }

    pub fn is_live(&self) -> bool {
        self.availability == Availability::Live
    }
}

pub(crate) fn query_error(entry: CatalogEntry, err: sqlx::Error) -> CoreError {
    tracing::warn!("DB error in {}: {}", entry.as_str(), err);
    CoreError::Query(format!("{} query failed: {}", entry.as_str(), err))
}

#[derive(Serialize)]
struct UserParams<'a> {
    user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<&'a DateRange>,
}

#[derive(Serialize)]
struct PhoneParams<'a> {
    phone: &'a str,
}

/// Facade over the catalog used by request handlers: connections, display
/// clock and result cache in one cloneable value.
#[derive(Clone)]
pub struct QueryCatalog {
    connections: SharedConnections,
    clock: LocalClock,
    cached: CachedQueries,
}

impl QueryCatalog {
    pub fn new(
        connections: impl Into<SharedConnections>,
        clock: LocalClock,
        cache: Arc<dyn Cache>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            connections: connections.into(),
            clock,
            cached: CachedQueries::new(cache, ttl_seconds),
        }
    }

    pub fn clock(&self) -> &LocalClock {
        &self.clock
    }

    /// Current connections, re-opening any configured side that dropped.
    pub async fn connections(&self) -> Connections {
        self.connections.current().await
    }

    async fn primary(&self) -> Option<MySqlPool> {
        self.connections().await.primary.map(|c| c.pool().clone())
    }

    async fn auxiliary(&self) -> Option<MySqlPool> {
        self.connections().await.auxiliary.map(|c| c.pool().clone())
    }

    pub async fn resolve(&self, phone: &PhoneInput) -> Result<Resolution, CoreError> {
        let PhoneInput::Provided(number) = phone else {
            return Ok(Resolution::NoInput);
        };
        let params = PhoneParams { phone: number.as_str() };
        self.cached
            .resolution(&params, || async {
                let pool = self.primary().await;
                resolver::resolve(phone, pool.as_ref()).await
            })
            .await
    }

    pub async fn account_info(&self, user_id: UserId) -> Result<ResultSet<AccountRow>, CoreError> {
        let params = UserParams { user_id, range: None };
        self.cached
            .result_set(CatalogEntry::Account, &params, || async {
                let pool = self.primary().await;
                profile::account_info(pool.as_ref(), user_id).await
            })
            .await
    }

    pub async fn payment_cards(&self, user_id: UserId) -> Result<ResultSet<CardRow>, CoreError> {
        let params = UserParams { user_id, range: None };
        self.cached
            .result_set(CatalogEntry::Cards, &params, || async {
                let pool = self.primary().await;
                profile::payment_cards(pool.as_ref(), &self.clock, user_id).await
            })
            .await
    }

    pub async fn vehicles(&self, user_id: UserId) -> Result<ResultSet<VehicleRow>, CoreError> {
        let params = UserParams { user_id, range: None };
        self.cached
            .result_set(CatalogEntry::Vehicles, &params, || async {
                let pool = self.primary().await;
                profile::vehicles(pool.as_ref(), &self.clock, user_id).await
            })
            .await
    }

    pub async fn pensions(&self, user_id: UserId) -> Result<ResultSet<PensionRow>, CoreError> {
        let params = UserParams { user_id, range: None };
        self.cached
            .result_set(CatalogEntry::Pensions, &params, || async {
                let pool = self.primary().await;
                profile::pensions(pool.as_ref(), &self.clock, user_id).await
            })
            .await
    }

    pub async fn lot_transactions(
        &self,
        user_id: UserId,
        range: &DateRange,
    ) -> Result<ResultSet<LotTransactionRow>, CoreError> {
        let params = UserParams { user_id, range: Some(range) };
        self.cached
            .result_set(CatalogEntry::LotTransactions, &params, || async {
                let pool = self.primary().await;
                transactions::lot_transactions(pool.as_ref(), &self.clock, user_id, range).await
            })
            .await
    }

    pub async fn meter_transactions(
        &self,
        user_id: UserId,
        range: &DateRange,
    ) -> Result<ResultSet<MeterTransactionRow>, CoreError> {
        let params = UserParams { user_id, range: Some(range) };
        self.cached
            .result_set(CatalogEntry::MeterTransactions, &params, || async {
                let pool = self.primary().await;
                transactions::meter_transactions(pool.as_ref(), &self.clock, user_id, range).await
            })
            .await
    }

    pub async fn ledger_movements(&self, phone: &PhoneNumber) -> Result<ResultSet<LedgerRow>, CoreError> {
        let params = PhoneParams { phone: phone.as_str() };
        self.cached
            .result_set(CatalogEntry::LedgerMovements, &params, || async {
                let pool = self.primary().await;
                ledger::ledger_movements(pool.as_ref(), &self.clock, phone).await
            })
            .await
    }

    pub async fn error_log(
        &self,
        user_id: UserId,
        range: &DateRange,
    ) -> Result<ResultSet<ErrorLogRow>, CoreError> {
        let params = UserParams { user_id, range: Some(range) };
        self.cached
            .result_set(CatalogEntry::ErrorLog, &params, || async {
                let pool = self.primary().await;
                events::error_log(pool.as_ref(), &self.clock, user_id, range).await
            })
            .await
    }

    pub async fn access_log(&self, phone: &PhoneNumber) -> Result<ResultSet<AccessLogRow>, CoreError> {
        let params = PhoneParams { phone: phone.as_str() };
        self.cached
            .result_set(CatalogEntry::AccessLog, &params, || async {
                let pool = self.auxiliary().await;
                access_log::access_log(pool.as_ref(), &self.clock, phone).await
            })
            .await
    }

    /// Every entry for one operator query. Sections succeed or fail on their
    /// own; only a missing phone number fails the whole call.
    pub async fn overview(&self, phone: &PhoneInput, range: &DateRange) -> Result<Overview, CoreError> {
        overview::build(self, phone, range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory_cache::InMemoryCache;
    use chrono::NaiveDate;

    fn offline_catalog() -> QueryCatalog {
        QueryCatalog::new(
            Connections::default(),
            LocalClock::new(chrono_tz::America::Mexico_City),
            Arc::new(InMemoryCache::default()),
            60,
        )
    }

    fn january() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        )
        .unwrap()
    }

    fn phone() -> PhoneNumber {
        PhoneInput::parse("2213500061").unwrap().number().cloned().unwrap()
    }

    #[test]
    fn entry_names_are_stable() {
        let names: Vec<_> = CatalogEntry::ALL.iter().map(|e| e.as_str()).collect();
        assert_eq!(names.len(), 9);
        assert_eq!(
            serde_json::to_value(CatalogEntry::LotTransactions).unwrap(),
            serde_json::json!("lot_transactions")
        );
    }

    #[tokio::test]
    async fn absent_connection_yields_empty_unavailable_sets() {
        let catalog = offline_catalog();
        let range = january();

        let results = vec![
            catalog.account_info(1).await.unwrap().availability,
            catalog.payment_cards(1).await.unwrap().availability,
            catalog.vehicles(1).await.unwrap().availability,
            catalog.pensions(1).await.unwrap().availability,
            catalog.lot_transactions(1, &range).await.unwrap().availability,
            catalog.meter_transactions(1, &range).await.unwrap().availability,
            catalog.ledger_movements(&phone()).await.unwrap().availability,
            catalog.error_log(1, &range).await.unwrap().availability,
            catalog.access_log(&phone()).await.unwrap().availability,
        ];
        assert!(results.iter().all(|a| *a == Availability::ConnectionUnavailable));
        assert!(catalog.lot_transactions(1, &range).await.unwrap().rows.is_empty());
    }

    #[tokio::test]
    async fn sentinel_never_reaches_the_store() {
        let catalog = offline_catalog();
        // With no pool a real lookup would report Unavailable
        assert_eq!(
            catalog.resolve(&PhoneInput::NoInput).await.unwrap(),
            Resolution::NoInput
        );
        assert_eq!(
            catalog.resolve(&PhoneInput::Provided(phone())).await.unwrap(),
            Resolution::Unavailable
        );
    }
}
