#![forbid(unsafe_code)]
#![deny(clippy::missing_const_for_fn)]
#![deny(clippy::nursery)]
#![deny(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

use axum::{
    routing::{get, post, put},
    Router,
};
use moka::future::Cache;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{str::FromStr, sync::Arc};
use tower_http::trace::TraceLayer;

use crate::{
    config::Settings,
    entities::SearchResultItem,
    upstream::{CatalogClient, CredentialCache, HttpTokenIssuer},
};

pub use sqlx::SqlitePool;

pub mod config;
pub mod entities;
pub mod error;
pub mod routes;
pub mod upstream;
pub mod util;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub catalog: Arc<CatalogClient>,
    // Item lookups are cached for a short TTL; searches always go upstream.
    pub item_lookup_cache: Cache<String, SearchResultItem>,
}

impl AppState {
    pub fn new(settings: &Settings, pool: SqlitePool) -> color_eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.upstream_timeout)
            .build()?;

        let issuer = HttpTokenIssuer::new(
            http.clone(),
            settings.token_url(),
            settings.client_id.clone(),
            settings.client_secret.clone(),
            settings.scope.clone(),
        );
        let credentials = Arc::new(CredentialCache::new(
            Arc::new(issuer),
            settings.token_refresh_margin,
        ));
        let catalog = CatalogClient::new(
            http,
            settings.api_base_url.clone(),
            settings.marketplace_id.clone(),
            credentials,
        );

        Ok(Self {
            pool,
            catalog: Arc::new(catalog),
            item_lookup_cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(settings.lookup_cache_ttl)
                .build(),
        })
    }
}

/// Opens the SQLite pool, creating the file if needed, and runs migrations.
pub async fn connect_database(url: &str, max_connections: u32) -> color_eyre::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::health::index))
        .route("/api/health", get(routes::health::health))
        .route("/api/db-check", get(routes::health::db_check))
        .route("/api/token", get(routes::token::token))
        .route("/api/search/summary", get(routes::search::summary))
        .route("/api/search/top-search", get(routes::search::top_search))
        .route("/api/search/item/ebay_id", get(routes::search::item_by_id))
        .route(
            "/api/search/item/sold_quantity",
            get(routes::search::sold_quantity),
        )
        .route(
            "/api/search/item/available_quantity",
            get(routes::search::available_quantity),
        )
        .route(
            "/api/wishlist",
            post(routes::wishlist::create)
                .get(routes::wishlist::list)
                .delete(routes::wishlist::clear),
        )
        .route(
            "/api/wishlist/:id",
            get(routes::wishlist::get_entry).delete(routes::wishlist::remove),
        )
        .route(
            "/api/wishlist/:id/alert-price",
            put(routes::wishlist::update_alert_price),
        )
        .route("/api/wishlist/:id/refresh", post(routes::wishlist::refresh))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
