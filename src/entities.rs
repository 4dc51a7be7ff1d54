use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog item after normalization. Every field has been validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub ebay_item_id: String,
    pub title: String,
    pub price: f64,
    pub currency: Option<String>,
    pub available_quantity: i64,
    pub sold_quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct WishlistEntry {
    pub id: i64,
    pub ebay_item_id: String,
    pub title: String,
    pub price: f64,
    pub available_quantity: i64,
    pub sold_quantity: i64,
    pub alert_price: f64,
    #[serde(skip)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WishlistEntry {
    /// True once the tracked price has dropped to the alert threshold.
    #[must_use]
    pub fn price_alert(&self) -> bool {
        self.price <= self.alert_price
    }
}
