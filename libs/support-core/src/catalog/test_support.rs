use crate::{
    adapters::connection_manager::{ConnectionHandle, ConnectionManager},
    config::{ConnectSettings, DatabaseCredentials},
    domain::{DateRange, LocalClock},
};
use chrono::NaiveDate;
use sqlx::MySqlPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::mysql::Mysql;

const STORE_FIXTURE: &str = include_str!("../../testdata/store.sql");

/// Starts a throwaway MySQL with the reporting schema and seed rows loaded.
/// Keep the container alive for as long as the handle is used.
pub(crate) async fn connected_store() -> (ConnectionHandle, ContainerAsync<Mysql>) {
    let node = Mysql::default().start().await.expect("start mysql");
    let port = node.get_host_port_ipv4(3306).await.expect("mysql port");
    let credentials = DatabaseCredentials {
        host: "127.0.0.1".into(),
        port,
        user: "root".into(),
        password: String::new(),
        database: "test".into(),
    };
    let handle = ConnectionManager::new(ConnectSettings::default())
        .open_direct_connection(&credentials)
        .await
        .expect("connect to mysql");
    sqlx::raw_sql(STORE_FIXTURE)
        .execute(handle.pool())
        .await
        .expect("load store fixture");
    (handle, node)
}

pub(crate) async fn start_store() -> (MySqlPool, ContainerAsync<Mysql>) {
    let (handle, node) = connected_store().await;
    (handle.pool().clone(), node)
}

pub(crate) fn mexico_city() -> LocalClock {
    LocalClock::new(chrono_tz::America::Mexico_City)
}

pub(crate) fn january_2025() -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
    )
    .unwrap()
}
