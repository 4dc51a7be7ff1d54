use metrics::{histogram, increment_counter};
use serde::Deserialize;
use std::{sync::Arc, time::Instant};
use tracing::{debug, warn};

use super::credential::CredentialCache;
use crate::{entities::SearchResultItem, error::UpstreamError};

const MARKETPLACE_HEADER: &str = "X-EBAY-C-MARKETPLACE-ID";
/// Browse API bounds for `limit`.
pub const MAX_SEARCH_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    item_summaries: Option<Vec<RawItem>>,
}

/// Shape shared by item summaries and full item payloads. Everything is
/// optional here; [`RawItem::normalize`] decides what is required.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    item_id: Option<String>,
    title: Option<String>,
    price: Option<RawPrice>,
    estimated_availabilities: Option<Vec<RawAvailability>>,
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    value: Option<RawAmount>,
    currency: Option<String>,
}

// eBay sends amounts as strings, be lenient with plain numbers too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Text(String),
    Number(f64),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAvailability {
    estimated_available_quantity: Option<i64>,
    estimated_sold_quantity: Option<i64>,
}

impl RawItem {
    fn is_empty(&self) -> bool {
        self.item_id.is_none()
            && self.title.is_none()
            && self.price.is_none()
            && self.estimated_availabilities.is_none()
    }

    /// `known_id` is used when the payload itself carries no `itemId`.
    fn normalize(self, known_id: Option<&str>) -> Result<SearchResultItem, UpstreamError> {
        let ebay_item_id = self
            .item_id
            .filter(|id| !id.trim().is_empty())
            .or_else(|| known_id.map(str::to_string))
            .ok_or_else(|| UpstreamError::malformed("itemId", "missing"))?;

        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| UpstreamError::malformed("title", "missing"))?;

        let price = self
            .price
            .ok_or_else(|| UpstreamError::malformed("price", "missing"))?;
        let amount = match price.value {
            Some(RawAmount::Text(raw)) => raw
                .trim()
                .parse::<f64>()
                .map_err(|_| UpstreamError::malformed("price.value", format!("`{raw}` is not a number")))?,
            Some(RawAmount::Number(n)) => n,
            None => return Err(UpstreamError::malformed("price.value", "missing")),
        };
        if !amount.is_finite() || amount <= 0.0 {
            return Err(UpstreamError::malformed(
                "price.value",
                format!("invalid price {amount}"),
            ));
        }

        let (available_quantity, sold_quantity) = self
            .estimated_availabilities
            .and_then(|list| list.into_iter().next())
            .map_or((0, 0), |a| {
                (
                    a.estimated_available_quantity.unwrap_or(0),
                    a.estimated_sold_quantity.unwrap_or(0),
                )
            });
        if available_quantity < 0 {
            return Err(UpstreamError::malformed(
                "estimatedAvailableQuantity",
                format!("negative quantity {available_quantity}"),
            ));
        }
        if sold_quantity < 0 {
            return Err(UpstreamError::malformed(
                "estimatedSoldQuantity",
                format!("negative quantity {sold_quantity}"),
            ));
        }

        Ok(SearchResultItem {
            ebay_item_id,
            title,
            price: amount,
            currency: price.currency,
            available_quantity,
            sold_quantity,
        })
    }
}

/// Client for the eBay Browse API.
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    marketplace_id: String,
    credentials: Arc<CredentialCache>,
}

impl CatalogClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        marketplace_id: impl Into<String>,
        credentials: Arc<CredentialCache>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            marketplace_id: marketplace_id.into(),
            credentials,
        }
    }

    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }

    /// Searches item summaries. `limit` is clamped to `1..=200`.
    ///
    /// One malformed summary fails the whole call.
    pub async fn search(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SearchResultItem>, UpstreamError> {
        if query.trim().is_empty() {
            return Err(UpstreamError::InvalidArgument(
                "search query must not be empty".into(),
            ));
        }
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);

        let url = format!("{}/buy/browse/v1/item_summary/search", self.base_url);
        let response = self
            .get(
                &url,
                &[("q", query.to_string()), ("limit", limit.to_string())],
                "search",
            )
            .await?;
        let response = error_for_status(response).await?;

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|err| UpstreamError::malformed("body", err.to_string()))?;

        let summaries = body.item_summaries.unwrap_or_default();
        debug!(query, limit, count = summaries.len(), "search returned");

        summaries
            .into_iter()
            .map(|raw| raw.normalize(None))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                warn!(query, "rejecting search results: {err}");
                err
            })
    }

    pub async fn lookup_by_id(&self, ebay_item_id: &str) -> Result<SearchResultItem, UpstreamError> {
        let ebay_item_id = ebay_item_id.trim();
        if ebay_item_id.is_empty() {
            return Err(UpstreamError::InvalidArgument(
                "item id must not be empty".into(),
            ));
        }

        let url = format!(
            "{}/buy/browse/v1/item/{}",
            self.base_url,
            urlencoding::encode(ebay_item_id)
        );
        let response = self.get(&url, &[], "lookup").await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound(ebay_item_id.to_string()));
        }
        let response = error_for_status(response).await?;

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Err(UpstreamError::NotFound(ebay_item_id.to_string()));
        }
        let raw: Option<RawItem> = serde_json::from_str(&text)
            .map_err(|err| UpstreamError::malformed("body", err.to_string()))?;

        match raw {
            Some(raw) if !raw.is_empty() => raw.normalize(Some(ebay_item_id)),
            _ => Err(UpstreamError::NotFound(ebay_item_id.to_string())),
        }
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        operation: &'static str,
    ) -> Result<reqwest::Response, UpstreamError> {
        let token = self.credentials.token().await?;

        increment_counter!("upstream_request", "operation" => operation);
        let start = Instant::now();
        let result = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(MARKETPLACE_HEADER, &self.marketplace_id)
            .query(query)
            .send()
            .await;
        histogram!("upstream_request_time", start.elapsed(), "operation" => operation);

        result.map_err(|err| {
            warn!(operation, "catalog request failed: {err}");
            UpstreamError::from(err)
        })
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(%status, "catalog returned an error");
    Err(UpstreamError::UpstreamUnavailable {
        status: Some(status.as_u16()),
        message: body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::credential::tests::CountingIssuer;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SEARCH_PATH: &str = "/buy/browse/v1/item_summary/search";

    fn client(server: &MockServer) -> (CatalogClient, Arc<CountingIssuer>) {
        client_with_http(server, reqwest::Client::new())
    }

    fn client_with_http(
        server: &MockServer,
        http: reqwest::Client,
    ) -> (CatalogClient, Arc<CountingIssuer>) {
        let issuer = Arc::new(CountingIssuer::new(chrono::Duration::hours(2)));
        let credentials = Arc::new(CredentialCache::new(issuer.clone(), chrono::Duration::zero()));
        (
            CatalogClient::new(http, server.uri(), "EBAY_US", credentials),
            issuer,
        )
    }

    fn summary(id: &str, title: &str, price: &str) -> serde_json::Value {
        json!({
            "itemId": id,
            "title": title,
            "price": { "value": price, "currency": "USD" }
        })
    }

    #[tokio::test]
    async fn lookup_percent_encodes_the_trimmed_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/buy/browse/v1/item/a%20b%2Fc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": "Odd id",
                "price": { "value": "1.00", "currency": "USD" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        let (client, _) = client(&server);

        let item = client.lookup_by_id("  a b/c ").await.unwrap();
        assert_eq!(item.ebay_item_id, "a b/c");
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_any_call() {
        let server = MockServer::start().await;
        let (client, issuer) = client(&server);

        for limit in [0, 5, 500] {
            assert!(matches!(
                client.search("", limit).await,
                Err(UpstreamError::InvalidArgument(_))
            ));
        }
        assert!(client.search("   ", 5).await.is_err());
        assert_eq!(issuer.calls(), 0);
    }

    #[tokio::test]
    async fn search_normalizes_items_in_upstream_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .and(query_param("q", "laptop"))
            .and(query_param("limit", "5"))
            .and(header("authorization", "Bearer token-1"))
            .and(header(MARKETPLACE_HEADER, "EBAY_US"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 3,
                "itemSummaries": [
                    summary("v1|1|0", "ThinkPad", "499.99"),
                    summary("v1|2|0", "MacBook", "1299.00"),
                    summary("v1|3|0", "Chromebook", "149.5"),
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        let (client, _) = client(&server);

        let items = client.search("laptop", 5).await.unwrap();

        assert_eq!(items.len(), 3);
        let ids: Vec<_> = items.iter().map(|i| i.ebay_item_id.as_str()).collect();
        assert_eq!(ids, ["v1|1|0", "v1|2|0", "v1|3|0"]);
        assert!((items[0].price - 499.99).abs() < f64::EPSILON);
        assert!((items[2].price - 149.5).abs() < f64::EPSILON);
        assert_eq!(items[1].currency.as_deref(), Some("USD"));
        assert_eq!((items[0].available_quantity, items[0].sold_quantity), (0, 0));
    }

    #[tokio::test]
    async fn search_keeps_duplicates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "itemSummaries": [summary("v1|1|0", "A", "1"), summary("v1|1|0", "A", "1")]
            })))
            .mount(&server)
            .await;
        let (client, _) = client(&server);

        assert_eq!(client.search("a", 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn search_limit_is_clamped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .and(query_param("limit", "200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        let (client, _) = client(&server);

        assert!(client.search("a", 10_000).await.unwrap().is_empty());
    }

    // Batch policy: one malformed summary aborts the whole search.
    #[tokio::test]
    async fn missing_title_aborts_the_whole_search() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "itemSummaries": [
                    summary("v1|1|0", "fine", "10.00"),
                    { "itemId": "v1|2|0", "price": { "value": "5.00", "currency": "USD" } },
                ]
            })))
            .mount(&server)
            .await;
        let (client, _) = client(&server);

        match client.search("laptop", 5).await {
            Err(UpstreamError::MalformedUpstreamData { field, .. }) => assert_eq!(field, "title"),
            other => panic!("expected malformed data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_positive_price_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "itemSummaries": [summary("v1|1|0", "free", "0.00")]
            })))
            .mount(&server)
            .await;
        let (client, _) = client(&server);

        assert!(matches!(
            client.search("free", 5).await,
            Err(UpstreamError::MalformedUpstreamData { field: "price.value", .. })
        ));
    }

    #[tokio::test]
    async fn upstream_error_status_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1)
            .mount(&server)
            .await;
        let (client, _) = client(&server);

        match client.search("laptop", 5).await {
            Err(UpstreamError::UpstreamUnavailable { status, message }) => {
                assert_eq!(status, Some(503));
                assert_eq!(message, "maintenance");
            }
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let (client, _) = client_with_http(&server, http);

        assert!(matches!(
            client.search("slow", 5).await,
            Err(UpstreamError::UpstreamUnavailable { status: None, .. })
        ));
    }

    #[tokio::test]
    async fn token_failure_propagates_without_catalog_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let (client, issuer) = client(&server);
        issuer.fail.store(true, std::sync::atomic::Ordering::SeqCst);

        assert!(matches!(
            client.search("laptop", 5).await,
            Err(UpstreamError::UpstreamAuth(_))
        ));
        assert!(matches!(
            client.lookup_by_id("v1|1|0").await,
            Err(UpstreamError::UpstreamAuth(_))
        ));
    }

    #[tokio::test]
    async fn lookup_without_availabilities_defaults_quantities() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/buy/browse/v1/item/v1%7C123%7C0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "itemId": "v1|123|0",
                "title": "Camera",
                "price": { "value": "75.00", "currency": "USD" },
                "estimatedAvailabilities": []
            })))
            .expect(1)
            .mount(&server)
            .await;
        let (client, _) = client(&server);

        let item = client.lookup_by_id("v1|123|0").await.unwrap();
        assert_eq!(item.ebay_item_id, "v1|123|0");
        assert_eq!(item.title, "Camera");
        assert_eq!((item.available_quantity, item.sold_quantity), (0, 0));
    }

    #[tokio::test]
    async fn lookup_reads_first_availability_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": "Camera",
                "price": { "value": 75, "currency": "USD" },
                "estimatedAvailabilities": [
                    { "estimatedAvailableQuantity": 7, "estimatedSoldQuantity": 3 },
                    { "estimatedAvailableQuantity": 100, "estimatedSoldQuantity": 100 }
                ]
            })))
            .mount(&server)
            .await;
        let (client, issuer) = client(&server);

        let item = client.lookup_by_id("v1|9|0").await.unwrap();
        assert_eq!(item.ebay_item_id, "v1|9|0");
        assert_eq!((item.available_quantity, item.sold_quantity), (7, 3));

        client.lookup_by_id("v1|9|0").await.unwrap();
        assert_eq!(issuer.calls(), 1);
    }

    #[tokio::test]
    async fn lookup_missing_item_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/buy/browse/v1/item/missing"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/buy/browse/v1/item/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "errors": [] })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/buy/browse/v1/item/blank"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        let (client, _) = client(&server);

        for id in ["missing", "gone", "blank"] {
            assert!(
                matches!(client.lookup_by_id(id).await, Err(UpstreamError::NotFound(_))),
                "{id}"
            );
        }
    }

    #[tokio::test]
    async fn lookup_empty_id_is_invalid() {
        let server = MockServer::start().await;
        let (client, _) = client(&server);

        assert!(matches!(
            client.lookup_by_id("").await,
            Err(UpstreamError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn lookup_without_price_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "title": "Camera" })))
            .mount(&server)
            .await;
        let (client, _) = client(&server);

        assert!(matches!(
            client.lookup_by_id("v1|1|0").await,
            Err(UpstreamError::MalformedUpstreamData { field: "price", .. })
        ));
    }
}
