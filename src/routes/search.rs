use axum::{
    extract::{Query, State},
    Json,
};
use metrics::increment_counter;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    entities::SearchResultItem,
    error::{AppError, UpstreamError},
    AppState,
};

const DEFAULT_LIMIT: u32 = 5;

#[derive(Debug, Deserialize, Validate)]
pub struct SearchQuery {
    #[validate(required, length(min = 1, message = "Query parameter is required"))]
    pub query: Option<String>,
    #[validate(range(min = 1, max = 200, message = "limit must be between 1 and 200"))]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ItemIdQuery {
    #[validate(required, length(min = 1, message = "Ebay item id parameter is required"))]
    pub ebay_item_id: Option<String>,
}

impl ItemIdQuery {
    fn id(&self) -> Result<&str, AppError> {
        self.validate()?;
        Ok(self.ebay_item_id.as_deref().unwrap_or_default())
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub items: Vec<SearchResultItem>,
}

#[derive(Debug, Serialize)]
pub struct ItemSummary {
    pub ebay_item_id: String,
    pub title: String,
    pub price: f64,
}

#[derive(Debug, Serialize)]
pub struct TopSearchResponse {
    pub top_item: ItemSummary,
}

#[derive(Debug, Serialize)]
pub struct SoldQuantityResponse {
    pub ebay_item_id: String,
    pub title: String,
    pub sold_quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct AvailableQuantityResponse {
    pub ebay_item_id: String,
    pub title: String,
    pub available_quantity: i64,
}

/// Looks an item up through the short-lived lookup cache.
pub async fn cached_lookup(
    state: &AppState,
    ebay_item_id: &str,
) -> Result<SearchResultItem, UpstreamError> {
    increment_counter!("wishlist_item_lookup_request");

    // Key on the same id the catalog sees, so padded ids share an entry.
    let ebay_item_id = ebay_item_id.trim();
    state
        .item_lookup_cache
        .try_get_with(ebay_item_id.to_string(), async {
            increment_counter!("wishlist_item_lookup_request_cache_miss");
            state.catalog.lookup_by_id(ebay_item_id).await
        })
        .await
        .map_err(|err| UpstreamError::clone(&err))
}

async fn run_search(state: &AppState, query: &SearchQuery) -> Result<Vec<SearchResultItem>, AppError> {
    query.validate()?;
    let items = state
        .catalog
        .search(
            query.query.as_deref().unwrap_or_default(),
            query.limit.unwrap_or(DEFAULT_LIMIT),
        )
        .await?;

    Ok(items)
}

pub async fn summary(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    increment_counter!("wishlist_search_request", "type" => "summary");
    let items = run_search(&state, &query).await?;

    Ok(Json(SearchResponse { items }))
}

/// Returns only the first result of a search.
pub async fn top_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<TopSearchResponse>, AppError> {
    increment_counter!("wishlist_search_request", "type" => "top");
    let top = run_search(&state, &query)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| UpstreamError::NotFound("no items found for the given query".into()))?;

    Ok(Json(TopSearchResponse {
        top_item: ItemSummary {
            ebay_item_id: top.ebay_item_id,
            title: top.title,
            price: top.price,
        },
    }))
}

pub async fn item_by_id(
    State(state): State<AppState>,
    Query(query): Query<ItemIdQuery>,
) -> Result<Json<SearchResultItem>, AppError> {
    let item = cached_lookup(&state, query.id()?).await?;

    Ok(Json(item))
}

pub async fn sold_quantity(
    State(state): State<AppState>,
    Query(query): Query<ItemIdQuery>,
) -> Result<Json<SoldQuantityResponse>, AppError> {
    let item = cached_lookup(&state, query.id()?).await?;

    Ok(Json(SoldQuantityResponse {
        ebay_item_id: item.ebay_item_id,
        title: item.title,
        sold_quantity: item.sold_quantity,
    }))
}

pub async fn available_quantity(
    State(state): State<AppState>,
    Query(query): Query<ItemIdQuery>,
) -> Result<Json<AvailableQuantityResponse>, AppError> {
    let item = cached_lookup(&state, query.id()?).await?;

    Ok(Json(AvailableQuantityResponse {
        ebay_item_id: item.ebay_item_id,
        title: item.title,
        available_quantity: item.available_quantity,
    }))
}
