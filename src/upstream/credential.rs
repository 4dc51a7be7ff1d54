use chrono::{DateTime, Duration, Utc};
use metrics::increment_counter;
use std::{fmt, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::issuer::TokenIssuer;
use crate::{error::UpstreamError, util::mask_secret};

/// An access token together with the window it is valid for.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Fails when the lifetime is zero or negative, such a token is expired on arrival,
    /// or when the expiry instant cannot be represented.
    pub fn new(
        token: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Result<Self, UpstreamError> {
        if lifetime <= Duration::zero() {
            return Err(UpstreamError::UpstreamAuth(format!(
                "token lifetime must be positive, got {}s",
                lifetime.num_seconds()
            )));
        }

        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .ok_or_else(|| UpstreamError::UpstreamAuth("token lifetime out of range".into()))?;

        Ok(Self {
            token: token.into(),
            issued_at,
            expires_at,
        })
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Usable iff `now + margin` is still before the expiry instant.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now.checked_add_signed(margin)
            .is_some_and(|deadline| deadline < self.expires_at)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &mask_secret(&self.token))
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Process-wide holder of the upstream credential.
///
/// Refresh is lazy: the first caller that finds the slot empty or expired
/// issues a new credential while holding the lock, so concurrent callers wait
/// for that one exchange instead of starting their own.
pub struct CredentialCache {
    issuer: Arc<dyn TokenIssuer>,
    refresh_margin: Duration,
    current: Mutex<Option<Credential>>,
}

impl CredentialCache {
    #[must_use]
    pub fn new(issuer: Arc<dyn TokenIssuer>, refresh_margin: Duration) -> Self {
        Self {
            issuer,
            refresh_margin,
            current: Mutex::new(None),
        }
    }

    /// Returns a usable token, issuing a new one when needed.
    pub async fn token(&self) -> Result<String, UpstreamError> {
        self.credential().await.map(|c| c.token)
    }

    /// Same as [`Self::token`] but hands back the whole credential.
    pub async fn credential(&self) -> Result<Credential, UpstreamError> {
        let mut current = self.current.lock().await;

        if let Some(credential) = current.as_ref() {
            if credential.is_valid_at(Utc::now(), self.refresh_margin) {
                return Ok(credential.clone());
            }
            debug!(expires_at = %credential.expires_at, "cached token is stale");
        }

        // A failed exchange leaves the slot as it was; the stale value is never handed out.
        let credential = self.issuer.issue().await.map_err(|err| {
            warn!("token issue failed: {err}");
            err
        })?;

        increment_counter!("upstream_token_issued");
        info!(expires_at = %credential.expires_at, "issued new upstream access token");

        *current = Some(credential.clone());
        Ok(credential)
    }

    pub async fn invalidate(&self) {
        self.current.lock().await.take();
    }
}
