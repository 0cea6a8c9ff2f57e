//! Subscription Manager Client — network and in-memory variants sharing one
//! contract (spec §4.D).

use std::collections::HashMap;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::record::{NewRecordDetails, Record};
use crate::service::AppState;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The shared request/response contract both client variants implement.
///
/// The in-memory variant dispatches through the same HTTP `Router` the
/// network variant talks to over the wire, so the two never share a
/// serialization shortcut (spec §4.D).
#[allow(async_fn_in_trait)]
pub trait SubscriptionManagerClient: Send + Sync {
    async fn create(&self, subscription_id: &str, details: NewRecordDetails) -> ClientResult<()>;
    async fn get(&self, subscription_id: &str) -> ClientResult<Record>;
    async fn list(&self) -> ClientResult<Vec<Record>>;
    async fn delete(&self, subscription_id: &str) -> ClientResult<()>;
}

/// A client performing HTTP against a configured subscription-manager root
/// URL: a reqwest client built with a timeout and a custom user-agent.
pub struct HttpSubscriptionManagerClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSubscriptionManagerClient {
    pub fn new(endpoint: impl Into<String>) -> ClientResult<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(crate::version::user_agent())
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn subscription_url(&self, subscription_id: &str) -> String {
        format!(
            "{}/v1/subscriptions/{}",
            self.endpoint.trim_end_matches('/'),
            urlencoding::encode(subscription_id)
        )
    }

    fn map_transport_error(err: reqwest::Error) -> ClientError {
        if err.is_timeout() || err.is_connect() {
            ClientError::TransientExternal(err.to_string())
        } else {
            ClientError::Http(err)
        }
    }
}

/// The in-memory client dispatches through `axum::http`, whose `StatusCode`
/// comes from a different `http` crate major version than the one
/// `reqwest::StatusCode` is built on; convert by numeric code so both
/// client variants can share `require_code`.
fn to_reqwest_status(observed: axum::http::StatusCode) -> StatusCode {
    StatusCode::from_u16(observed.as_u16()).expect("valid HTTP status code")
}

fn require_code(observed: StatusCode, expected: StatusCode) -> ClientResult<()> {
    if observed == expected {
        return Ok(());
    }
    match observed {
        StatusCode::NOT_FOUND => Err(ClientError::NotFound("unknown subscription".to_string())),
        StatusCode::CONFLICT => Err(ClientError::AlreadyExists("subscription exists".to_string())),
        s if s.is_server_error() => Err(ClientError::TransientExternal(format!(
            "server error: {s}"
        ))),
        s => Err(ClientError::UnexpectedResponseCode {
            observed: s.as_u16(),
            expected: expected.as_u16(),
        }),
    }
}

impl SubscriptionManagerClient for HttpSubscriptionManagerClient {
    async fn create(&self, subscription_id: &str, details: NewRecordDetails) -> ClientResult<()> {
        debug!("creating subscription {} via HTTP", subscription_id);
        let response = self
            .client
            .put(self.subscription_url(subscription_id))
            .json(&details)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        require_code(response.status(), StatusCode::CREATED)
    }

    async fn get(&self, subscription_id: &str) -> ClientResult<Record> {
        let response = self
            .client
            .get(self.subscription_url(subscription_id))
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        require_code(response.status(), StatusCode::OK)?;
        Ok(response.json().await?)
    }

    async fn list(&self) -> ClientResult<Vec<Record>> {
        let url = format!("{}/v1/subscriptions", self.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        require_code(response.status(), StatusCode::OK)?;

        #[derive(serde::Deserialize)]
        struct ListResponse {
            subscriptions: Vec<Record>,
        }
        let body: ListResponse = response.json().await?;
        Ok(body.subscriptions)
    }

    async fn delete(&self, subscription_id: &str) -> ClientResult<()> {
        let response = self
            .client
            .delete(self.subscription_url(subscription_id))
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        require_code(response.status(), StatusCode::NO_CONTENT)
    }
}

/// A client that dispatches through an in-process `axum::Router`, using
/// `tower::ServiceExt::oneshot` so the request/response bodies still travel
/// through real HTTP encoding/decoding — it just skips the socket. This lets
/// the Converger and tests run without a live HTTP server while exercising
/// the same protocol path as `HttpSubscriptionManagerClient` (spec §4.D).
pub struct InMemorySubscriptionManagerClient {
    app: axum::Router,
}

impl InMemorySubscriptionManagerClient {
    pub fn new(state: AppState) -> Self {
        Self {
            app: crate::service::router(state),
        }
    }

    async fn dispatch(
        &self,
        request: axum::http::Request<axum::body::Body>,
    ) -> ClientResult<axum::http::Response<axum::body::Body>> {
        use tower::ServiceExt;
        self.app
            .clone()
            .oneshot(request)
            .await
            .map_err(|e: std::convert::Infallible| match e {})
    }

    async fn body_json<T: serde::de::DeserializeOwned>(
        response: axum::http::Response<axum::body::Body>,
    ) -> ClientResult<T> {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| ClientError::TransientExternal(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl SubscriptionManagerClient for InMemorySubscriptionManagerClient {
    async fn create(&self, subscription_id: &str, details: NewRecordDetails) -> ClientResult<()> {
        let body = serde_json::to_vec(&details)?;
        let request = axum::http::Request::builder()
            .method("PUT")
            .uri(format!(
                "/v1/subscriptions/{}",
                urlencoding::encode(subscription_id)
            ))
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body))
            .unwrap();
        let response = self.dispatch(request).await?;
        require_code(to_reqwest_status(response.status()), StatusCode::CREATED)
    }

    async fn get(&self, subscription_id: &str) -> ClientResult<Record> {
        let request = axum::http::Request::builder()
            .method("GET")
            .uri(format!(
                "/v1/subscriptions/{}",
                urlencoding::encode(subscription_id)
            ))
            .body(axum::body::Body::empty())
            .unwrap();
        let response = self.dispatch(request).await?;
        require_code(to_reqwest_status(response.status()), StatusCode::OK)?;
        Self::body_json(response).await
    }

    async fn list(&self) -> ClientResult<Vec<Record>> {
        let request = axum::http::Request::builder()
            .method("GET")
            .uri("/v1/subscriptions")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = self.dispatch(request).await?;
        require_code(to_reqwest_status(response.status()), StatusCode::OK)?;

        #[derive(serde::Deserialize)]
        struct ListResponse {
            subscriptions: Vec<Record>,
        }
        let body: ListResponse = Self::body_json(response).await?;
        Ok(body.subscriptions)
    }

    async fn delete(&self, subscription_id: &str) -> ClientResult<()> {
        let request = axum::http::Request::builder()
            .method("DELETE")
            .uri(format!(
                "/v1/subscriptions/{}",
                urlencoding::encode(subscription_id)
            ))
            .body(axum::body::Body::empty())
            .unwrap();
        let response = self.dispatch(request).await?;
        require_code(to_reqwest_status(response.status()), StatusCode::NO_CONTENT)
    }
}

/// Map a full [`Vec<Record>`] to an id-keyed map, as the Converger wants it
/// (spec §4.H step 1).
pub fn index_by_id(records: Vec<Record>) -> HashMap<String, Record> {
    records
        .into_iter()
        .map(|r| (r.subscription_id.clone(), r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn details(n: u32) -> NewRecordDetails {
        NewRecordDetails {
            customer_id: format!("cust-{n}"),
            product_id: "prod-1".to_string(),
            customer_email: format!("user{n}@example.com"),
            bucket_name: format!("bucket-{n}"),
            old_secrets: serde_json::json!({}),
        }
    }

    async fn in_memory_client(dir: &TempDir) -> InMemorySubscriptionManagerClient {
        let store = crate::store::SubscriptionStore::open(dir.path()).unwrap();
        let state = AppState::new(std::sync::Arc::new(store));
        InMemorySubscriptionManagerClient::new(state)
    }

    #[tokio::test]
    async fn create_get_list_delete_round_trip() {
        let dir = TempDir::new().unwrap();
        let client = in_memory_client(&dir).await;

        client.create("sub-a", details(1)).await.unwrap();

        let fetched = client.get("sub-a").await.unwrap();
        assert_eq!(fetched.subscription_id, "sub-a");
        assert_eq!(fetched.introducer_port_number, 10000);

        let listed = client.list().await.unwrap();
        assert_eq!(listed.len(), 1);

        client.delete("sub-a").await.unwrap();
        let listed_after = client.list().await.unwrap();
        assert!(listed_after.is_empty());
    }

    #[tokio::test]
    async fn create_duplicate_maps_to_already_exists() {
        let dir = TempDir::new().unwrap();
        let client = in_memory_client(&dir).await;

        client.create("sub-a", details(1)).await.unwrap();
        let err = client.create("sub-a", details(2)).await.unwrap_err();
        assert!(matches!(err, ClientError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn get_unknown_maps_to_not_found() {
        let dir = TempDir::new().unwrap();
        let client = in_memory_client(&dir).await;
        let err = client.get("nope").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_unknown_maps_to_not_found() {
        let dir = TempDir::new().unwrap();
        let client = in_memory_client(&dir).await;
        let err = client.delete("nope").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
    }
}
