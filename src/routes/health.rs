use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use color_eyre::eyre::eyre;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::AppState;

#[allow(clippy::unused_async)]
pub async fn index() -> &'static str {
    "Welcome to the eBay wishlist item service!"
}

#[allow(clippy::unused_async)]
pub async fn health() -> impl IntoResponse {
    info!("Health check");
    Json(json!({ "status": "healthy" }))
}

async fn check_database(pool: &SqlitePool) -> color_eyre::Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    let table: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'wishlist'")
            .fetch_optional(pool)
            .await?;

    table
        .map(|_| ())
        .ok_or_else(|| eyre!("table wishlist does not exist"))
}

/// Checks the database connection and that the wishlist table exists.
pub async fn db_check(State(state): State<AppState>) -> impl IntoResponse {
    info!("Checking database connection");
    match check_database(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "database_status": "healthy" })),
        ),
        Err(err) => {
            warn!("database check failed: {err}");
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": err.to_string() })),
            )
        }
    }
}
