use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use metrics::increment_counter;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::search::cached_lookup;
use crate::{
    entities::WishlistEntry,
    error::{AppError, WishlistError},
    util::{fetch_wishlist_entry, fetch_wishlist_row},
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRequest {
    #[validate(length(min = 1, message = "ebay_item_id is required"))]
    pub ebay_item_id: String,
    pub alert_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct AlertPriceRequest {
    pub alert_price: f64,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: u64,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub entry: WishlistEntry,
    pub price_alert: bool,
}

fn check_alert_price(alert_price: f64) -> Result<f64, WishlistError> {
    if alert_price.is_finite() && alert_price > 0.0 {
        Ok(alert_price)
    } else {
        Err(WishlistError::Invalid(format!(
            "Invalid alert price: {alert_price} (must be a positive number)"
        )))
    }
}

/// Looks the item up on eBay and starts tracking it.
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateRequest>,
) -> Result<(StatusCode, Json<WishlistEntry>), AppError> {
    payload.validate()?;
    let alert_price = check_alert_price(payload.alert_price)?;

    let item = cached_lookup(&state, &payload.ebay_item_id).await?;

    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM wishlist WHERE ebay_item_id = ? AND deleted = 0")
            .bind(&item.ebay_item_id)
            .fetch_optional(&state.pool)
            .await?;
    if existing.is_some() {
        return Err(WishlistError::Duplicate(item.ebay_item_id).into());
    }

    let now = Utc::now();
    let id = sqlx::query(
        "INSERT INTO wishlist (
            ebay_item_id, title, price, available_quantity, sold_quantity,
            alert_price, deleted, created_at, updated_at)
        VALUES (?,?,?,?,?,?,0,?,?)",
    )
    .bind(&item.ebay_item_id)
    .bind(&item.title)
    .bind(item.price)
    .bind(item.available_quantity)
    .bind(item.sold_quantity)
    .bind(alert_price)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(|err| match err {
        sqlx::Error::Database(db) if db.message().contains("UNIQUE") => {
            AppError::from(WishlistError::Duplicate(item.ebay_item_id.clone()))
        }
        other => AppError::from(other),
    })?
    .last_insert_rowid();

    increment_counter!("wishlist_update", "type" => "create");
    info!("Added item {} to the wishlist as entry {id}", item.ebay_item_id);

    let entry = fetch_wishlist_entry(id, &state.pool).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<WishlistEntry>>, AppError> {
    let entries = sqlx::query_as::<_, WishlistEntry>(
        "SELECT * FROM wishlist WHERE deleted = 0 ORDER BY id ASC",
    )
    .fetch_all(&state.pool)
    .await?;

    if entries.is_empty() {
        info!("The wishlist is empty");
    }

    Ok(Json(entries))
}

pub async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<WishlistEntry>, AppError> {
    Ok(Json(fetch_wishlist_entry(id, &state.pool).await?))
}

/// Soft delete, rows are only ever flagged.
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let result =
        sqlx::query("UPDATE wishlist SET deleted = 1, updated_at = ? WHERE id = ? AND deleted = 0")
            .bind(Utc::now())
            .bind(id)
            .execute(&state.pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(match fetch_wishlist_row(id, &state.pool).await? {
            Some(_) => WishlistError::AlreadyDeleted(id),
            None => WishlistError::NotFound(id),
        }
        .into());
    }

    increment_counter!("wishlist_update", "type" => "delete");
    info!("Wishlist entry {id} marked as deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Soft deletes every active entry and reports how many were flagged.
pub async fn clear(State(state): State<AppState>) -> Result<Json<ClearResponse>, AppError> {
    let cleared = sqlx::query("UPDATE wishlist SET deleted = 1, updated_at = ? WHERE deleted = 0")
        .bind(Utc::now())
        .execute(&state.pool)
        .await?
        .rows_affected();

    increment_counter!("wishlist_update", "type" => "clear");
    info!("Cleared {cleared} wishlist entries");

    Ok(Json(ClearResponse { cleared }))
}

pub async fn update_alert_price(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<AlertPriceRequest>,
) -> Result<Json<WishlistEntry>, AppError> {
    let alert_price = check_alert_price(payload.alert_price)?;

    let result = sqlx::query(
        "UPDATE wishlist SET alert_price = ?, updated_at = ? WHERE id = ? AND deleted = 0",
    )
    .bind(alert_price)
    .bind(Utc::now())
    .bind(id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(WishlistError::NotFound(id).into());
    }

    increment_counter!("wishlist_update", "type" => "alert_price");

    Ok(Json(fetch_wishlist_entry(id, &state.pool).await?))
}

/// Pulls the current price and quantities from eBay, skipping the lookup cache.
pub async fn refresh(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RefreshResponse>, AppError> {
    let entry = fetch_wishlist_entry(id, &state.pool).await?;

    let item = state.catalog.lookup_by_id(&entry.ebay_item_id).await?;
    state
        .item_lookup_cache
        .insert(entry.ebay_item_id.clone(), item.clone())
        .await;

    // The entry may have been deleted while the lookup was in flight.
    let result = sqlx::query(
        "UPDATE wishlist
        SET title = ?, price = ?, available_quantity = ?, sold_quantity = ?, updated_at = ?
        WHERE id = ? AND deleted = 0",
    )
    .bind(&item.title)
    .bind(item.price)
    .bind(item.available_quantity)
    .bind(item.sold_quantity)
    .bind(Utc::now())
    .bind(id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(WishlistError::NotFound(id).into());
    }

    increment_counter!("wishlist_update", "type" => "refresh");

    let entry = fetch_wishlist_entry(id, &state.pool).await?;
    let price_alert = entry.price_alert();
    if price_alert {
        info!(
            "Price alert for {}: {} <= {}",
            entry.ebay_item_id, entry.price, entry.alert_price
        );
    }

    Ok(Json(RefreshResponse { entry, price_alert }))
}
