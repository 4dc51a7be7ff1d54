use sqlx::SqlitePool;

use crate::{entities::WishlistEntry, error::WishlistError};

/// Keeps the first five characters of a secret for log correlation.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(5).collect();
    if prefix.len() == secret.len() {
        "***".to_string()
    } else {
        format!("{prefix}***")
    }
}

/// Fetches a wishlist row regardless of its deleted flag.
pub async fn fetch_wishlist_row(
    id: i64,
    db: &SqlitePool,
) -> color_eyre::Result<Option<WishlistEntry>> {
    Ok(
        sqlx::query_as::<_, WishlistEntry>("SELECT * FROM wishlist WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?,
    )
}

/// Fetches an active wishlist entry, deleted rows count as missing.
pub async fn fetch_wishlist_entry(id: i64, db: &SqlitePool) -> color_eyre::Result<WishlistEntry> {
    match fetch_wishlist_row(id, db).await? {
        Some(entry) if !entry.deleted => Ok(entry),
        _ => Err(WishlistError::NotFound(id).into()),
    }
}
