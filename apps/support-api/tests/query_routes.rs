use axum_test::TestServer;
use http::{HeaderName, HeaderValue, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use support_api::{AppState, application::middleware::OperatorKeys, create_app};
use support_core::{
    adapters::{
        connection_manager::{ConnectionManager, Connections},
        in_memory_cache::InMemoryCache,
    },
    catalog::QueryCatalog,
    config::{ConnectSettings, DatabaseCredentials},
    domain::LocalClock,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::mysql::Mysql;

const OPERATOR_KEY: &str = "operator-test-key";
const STORE_FIXTURE: &str = include_str!("../../../libs/support-core/testdata/store.sql");
const JANUARY: &str = "from=2025-01-01&to=2025-01-31";

/// MySQL container with the reporting schema, wired in as both the primary
/// and the auxiliary database.
async fn setup_app() -> (TestServer, ContainerAsync<Mysql>) {
    let node = Mysql::default().start().await.expect("start mysql");
    let port = node.get_host_port_ipv4(3306).await.expect("mysql port");
    let credentials = DatabaseCredentials {
        host: "127.0.0.1".into(),
        port,
        user: "root".into(),
        password: String::new(),
        database: "test".into(),
    };
    let manager = ConnectionManager::new(ConnectSettings::default());
    let handle = manager
        .open_direct_connection(&credentials)
        .await
        .expect("connect mysql");
    sqlx::raw_sql(STORE_FIXTURE)
        .execute(handle.pool())
        .await
        .expect("load store fixture");

    let catalog = QueryCatalog::new(
        Connections {
            primary: Some(handle.clone()),
            auxiliary: Some(handle),
        },
        LocalClock::new(chrono_tz::America::Mexico_City),
        Arc::new(InMemoryCache::default()),
        60,
    );
    let app_state = AppState {
        catalog,
        operator_keys: Arc::new(OperatorKeys::from_plain(&[OPERATOR_KEY])),
    };
    let server = TestServer::new(create_app(app_state)).expect("Failed to create TestServer");
    (server, node)
}

async fn get_json(server: &TestServer, path: &str) -> (StatusCode, Value) {
    let response = server
        .get(path)
        .add_header(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&format!("Bearer {OPERATOR_KEY}")).unwrap(),
        )
        .await;
    (response.status_code(), response.json::<Value>())
}

#[tokio::test]
async fn resolves_phone_numbers() {
    let (server, _node) = setup_app().await;

    let (status, body) = get_json(&server, "/api/users/2213500061").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], 1001);

    // Shared number: the lowest userid wins.
    let (_, body) = get_json(&server, "/api/users/5550000000").await;
    assert_eq!(body["user_id"], 2001);

    let (status, body) = get_json(&server, "/api/users/9999999999/cards").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "not_found");
}

#[tokio::test]
async fn lot_transactions_for_january() {
    let (server, _node) = setup_app().await;
    let (status, body) = get_json(
        &server,
        &format!("/api/users/2213500061/lot-transactions?{JANUARY}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entry"], "lot_transactions");
    assert_eq!(body["user_id"], 1001);
    assert_eq!(body["range"]["start"], "2025-01-01");

    let rows = body["data"].as_array().unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r["transactionid"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["tx3", "tx2", "tx1", "tx5"]);
    assert!(rows.iter().all(|r| r["paidtimeminutes"].as_i64().unwrap() >= 0));
    assert_eq!(rows[2]["paymenttype"], "TC/TD");
    assert_eq!(rows[0]["paymentdate"], "2025-01-20T14:00:00-06:00");
}

#[tokio::test]
async fn repeated_query_is_served_from_cache() {
    let (server, _node) = setup_app().await;
    let path = format!("/api/users/2213500061/meter-transactions?{JANUARY}");

    let (_, first) = get_json(&server, &path).await;
    let (_, second) = get_json(&server, &path).await;
    assert_eq!(first["from_cache"], false);
    assert_eq!(second["from_cache"], true);
    assert_eq!(first["fetched_at"], second["fetched_at"]);
    assert_eq!(second["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn profile_and_log_entries() {
    let (server, _node) = setup_app().await;

    let (status, body) = get_json(&server, "/api/users/2213500061/account").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["accountnumber"], "ACC-1001");

    let (_, body) = get_json(&server, "/api/users/2213500061/vehicles").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let (_, body) = get_json(&server, "/api/users/2213500061/pensions").await;
    assert_eq!(body["data"][0]["parkinglotname"], "Plaza Centro");

    let (_, body) = get_json(&server, "/api/users/2213500061/ledger-movements").await;
    let directions: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["direction"].as_str().unwrap())
        .collect();
    assert_eq!(directions, vec!["credit", "debit", "debit"]);

    let (_, body) = get_json(
        &server,
        &format!("/api/users/2213500061/error-log?{JANUARY}"),
    )
    .await;
    assert_eq!(body["data"][1]["error_message"], "card declined");

    // Keyed by phone number, so it answers without a registered user too.
    let (status, body) = get_json(&server, "/api/users/9999999999/access-log").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], serde_json::json!([]));
}

#[tokio::test]
async fn overview_collects_every_section() {
    let (server, _node) = setup_app().await;
    let (status, body) = get_json(
        &server,
        &format!("/api/users/2213500061/overview?{JANUARY}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolution"]["status"], "resolved");
    assert_eq!(body["resolution"]["user_id"], 1001);

    let sections = body["sections"].as_array().unwrap();
    assert_eq!(sections.len(), 9);
    assert!(sections.iter().all(|s| s["status"] == "ok"));
    let access = sections
        .iter()
        .find(|s| s["entry"] == "access_log")
        .unwrap();
    assert_eq!(access["rows"].as_array().unwrap().len(), 2);
}
