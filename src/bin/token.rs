#![forbid(unsafe_code)]
#![deny(clippy::missing_const_for_fn)]
#![deny(clippy::nursery)]
#![deny(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

use ebay_wishlist::{
    config::Settings,
    upstream::{HttpTokenIssuer, TokenIssuer},
    util::mask_secret,
};
use tracing::info;

// Issues one application token and prints it, handy for poking the Browse API with curl.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    dotenvy::from_filename("secrets.env").ok();
    std::env::set_var(
        "RUST_LOG",
        std::env::var("RUST_LOG").unwrap_or_else(|_| String::from("info")),
    );

    // initialize tracing
    tracing_subscriber::fmt::init();

    let settings = Settings::from_env()?;
    info!(
        "Requesting token from {} with client id {} and secret {}",
        settings.token_url(),
        settings.client_id,
        mask_secret(&settings.client_secret)
    );

    let http = reqwest::Client::builder()
        .timeout(settings.upstream_timeout)
        .build()?;
    let issuer = HttpTokenIssuer::new(
        http,
        settings.token_url(),
        settings.client_id.clone(),
        settings.client_secret.clone(),
        settings.scope.clone(),
    );

    let credential = issuer.issue().await?;
    info!("Token valid until {}", credential.expires_at());
    println!("{}", credential.token());

    Ok(())
}
