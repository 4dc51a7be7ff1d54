use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{error::AppError, AppState};

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub async fn token(State(state): State<AppState>) -> Result<Json<TokenResponse>, AppError> {
    let credential = state.catalog.credentials().credential().await?;

    Ok(Json(TokenResponse {
        token: credential.token().to_string(),
        expires_at: credential.expires_at(),
    }))
}
