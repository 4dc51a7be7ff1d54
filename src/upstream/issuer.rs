use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{debug, error};

use super::credential::Credential;
use crate::{error::UpstreamError, util::mask_secret};

/// Lifetime assumed when the identity endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 7200;

/// Performs the credential exchange. Implementations never retry.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self) -> Result<Credential, UpstreamError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

/// OAuth2 client-credentials grant against the eBay identity endpoint.
pub struct HttpTokenIssuer {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl HttpTokenIssuer {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
        }
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue(&self) -> Result<Credential, UpstreamError> {
        debug!(
            url = %self.token_url,
            client_id = %self.client_id,
            client_secret = %mask_secret(&self.client_secret),
            "requesting access token"
        );

        let issued_at = Utc::now();
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await
            .map_err(|err| UpstreamError::UpstreamAuth(format!("token request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "token endpoint rejected the exchange");
            return Err(UpstreamError::UpstreamAuth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let body: TokenResponse = response.json().await.map_err(|err| {
            UpstreamError::UpstreamAuth(format!("undecodable token response: {err}"))
        })?;

        let token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                UpstreamError::UpstreamAuth("token response lacks `access_token`".into())
            })?;
        let expires_in = body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        let lifetime = Duration::try_seconds(expires_in)
            .ok_or_else(|| UpstreamError::UpstreamAuth("token lifetime out of range".into()))?;

        Credential::new(token, issued_at, lifetime)
    }
}
