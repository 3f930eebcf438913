use axum::{Router, middleware, routing::get};
use std::sync::Arc;
use support_core::catalog::QueryCatalog;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod application;

use application::{
    health::handle_health,
    middleware::{OperatorKeys, operator_auth},
    query::{
        handle_access_log, handle_account, handle_cards, handle_error_log,
        handle_ledger_movements, handle_lot_transactions, handle_meter_transactions,
        handle_overview, handle_pensions, handle_resolve_user, handle_vehicles,
    },
};

// Holds shared dependencies
#[derive(Clone)]
pub struct AppState {
    pub catalog: QueryCatalog,
    pub operator_keys: Arc<OperatorKeys>,
}

pub fn create_app(app_state: AppState) -> Router {
    // Every data route sits behind operator authentication
    let user_routes = Router::new()
        .route("/{phone}", get(handle_resolve_user))
        .route("/{phone}/account", get(handle_account))
        .route("/{phone}/cards", get(handle_cards))
        .route("/{phone}/vehicles", get(handle_vehicles))
        .route("/{phone}/pensions", get(handle_pensions))
        .route("/{phone}/lot-transactions", get(handle_lot_transactions))
        .route("/{phone}/meter-transactions", get(handle_meter_transactions))
        .route("/{phone}/ledger-movements", get(handle_ledger_movements))
        .route("/{phone}/error-log", get(handle_error_log))
        .route("/{phone}/access-log", get(handle_access_log))
        .route("/{phone}/overview", get(handle_overview))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            operator_auth,
        ));

    let api_routes = Router::new()
        .route("/health", get(handle_health))
        .nest("/users", user_routes);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}
