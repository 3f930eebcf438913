use axum::{Json, extract::State, response::IntoResponse};
use http::StatusCode;
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::warn;

use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Up,
    Down,
    NotConfigured,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub primary: Liveness,
    pub auxiliary: Liveness,
}

async fn ping(name: &str, pool: Option<&MySqlPool>) -> Liveness {
    let Some(pool) = pool else {
        return Liveness::NotConfigured;
    };
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => Liveness::Up,
        Err(e) => {
            warn!("{} database failed health check: {}", name, e);
            Liveness::Down
        }
    }
}

// GET /api/health. Always 200; the body reports each database.
pub async fn handle_health(State(app_state): State<AppState>) -> impl IntoResponse {
    let connections = app_state.catalog.connections().await;
    let (primary, auxiliary) = tokio::join!(
        ping("primary", connections.primary.as_ref().map(|c| c.pool())),
        ping("auxiliary", connections.auxiliary.as_ref().map(|c| c.pool()))
    );
    let status = if primary == Liveness::Up && auxiliary == Liveness::Up {
        "ok"
    } else {
        "degraded"
    };
    (
        StatusCode::OK,
        Json(HealthReport {
            status,
            primary,
            auxiliary,
        }),
    )
}
