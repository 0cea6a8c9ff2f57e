//! DNS Adapter — creates and destroys per-subscription DNS records
//! (spec §4.G).
//!
//! Same shape as the Orchestrator Adapter, simplified to a narrower
//! `create`/`destroy` contract.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{DnsError, DnsResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn hostname_for(subscription_id: &str) -> String {
    format!("{subscription_id}.customer-grids.internal")
}

/// Operations against a DNS provider, keyed by subscription id (spec §4.G).
#[allow(async_fn_in_trait)]
pub trait DnsAdapter: Send + Sync {
    async fn create(&self, subscription_ids: Vec<String>) -> DnsResult<()>;
    async fn destroy(&self, subscription_ids: Vec<String>) -> DnsResult<()>;
}

/// A REST client against a DNS provider's HTTP API.
pub struct HttpDnsAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDnsAdapter {
    pub fn new(base_url: impl Into<String>) -> DnsResult<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(crate::version::user_agent())
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn map_transport_error(err: reqwest::Error) -> DnsError {
        if err.is_timeout() || err.is_connect() {
            DnsError::TransientExternal(err.to_string())
        } else {
            DnsError::Http(err)
        }
    }
}

fn require_success(status: StatusCode) -> DnsResult<()> {
    if status.is_success() {
        return Ok(());
    }
    if status.is_server_error() {
        return Err(DnsError::TransientExternal(format!("server error: {status}")));
    }
    Err(DnsError::UnexpectedResponseCode {
        observed: status.as_u16(),
    })
}

impl DnsAdapter for HttpDnsAdapter {
    async fn create(&self, subscription_ids: Vec<String>) -> DnsResult<()> {
        debug!("creating {} dns record(s)", subscription_ids.len());
        let hostnames: Vec<String> = subscription_ids.iter().map(|id| hostname_for(id)).collect();
        let url = format!("{}/records", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .json(&hostnames)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        require_success(response.status())
    }

    async fn destroy(&self, subscription_ids: Vec<String>) -> DnsResult<()> {
        debug!("destroying {} dns record(s)", subscription_ids.len());
        let hostnames: Vec<String> = subscription_ids.iter().map(|id| hostname_for(id)).collect();
        let url = format!("{}/records", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .delete(url)
            .json(&hostnames)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        require_success(response.status())
    }
}

/// An in-memory fake tracking which hostnames currently exist.
#[derive(Default)]
pub struct InMemoryDnsAdapter {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl InMemoryDnsAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn hostnames(&self) -> HashSet<String> {
        self.inner.lock().await.clone()
    }
}

impl DnsAdapter for InMemoryDnsAdapter {
    async fn create(&self, subscription_ids: Vec<String>) -> DnsResult<()> {
        let mut hostnames = self.inner.lock().await;
        for id in subscription_ids {
            hostnames.insert(hostname_for(&id));
        }
        Ok(())
    }

    async fn destroy(&self, subscription_ids: Vec<String>) -> DnsResult<()> {
        let mut hostnames = self.inner.lock().await;
        for id in subscription_ids {
            hostnames.remove(&hostname_for(&id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_destroy_round_trips() {
        let adapter = InMemoryDnsAdapter::new();
        adapter.create(vec!["sub-a".to_string()]).await.unwrap();
        assert!(adapter.hostnames().await.contains(&hostname_for("sub-a")));

        adapter.destroy(vec!["sub-a".to_string()]).await.unwrap();
        assert!(adapter.hostnames().await.is_empty());
    }

    #[tokio::test]
    async fn destroy_missing_hostname_succeeds() {
        let adapter = InMemoryDnsAdapter::new();
        adapter.destroy(vec!["nope".to_string()]).await.unwrap();
    }
}
