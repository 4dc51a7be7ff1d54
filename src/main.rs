#![forbid(unsafe_code)]
#![deny(clippy::missing_const_for_fn)]
#![deny(clippy::nursery)]
#![deny(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use ebay_wishlist::{app, config::Settings, connect_database, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    dotenvy::from_filename("secrets.env").ok();

    // initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::from_env()?;
    info!(
        environment = ?settings.environment,
        base_url = %settings.api_base_url,
        "starting eBay wishlist service"
    );

    let pool = connect_database(&settings.database_url, settings.database_max_connections).await?;
    let state = AppState::new(&settings, pool)?;

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
    let app = app(state)
        .route("/metrics", get(move || std::future::ready(metric_handle.render())))
        .layer(prometheus_layer);

    info!("listening on {}", settings.bind_addr);
    axum::Server::bind(&settings.bind_addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
