//! Orchestrator Adapter — reads/writes Deployments, ConfigMaps, and the
//! shared Service object on the cluster (spec §4.F).
//!
//! There's no Kubernetes client crate in reach here, so rather than
//! inventing a `kube`-shaped dependency out of nowhere this is expressed as
//! a typed REST client wrapping reqwest with a timeout policy, the same way
//! `client::HttpSubscriptionManagerClient` is, generalized to the three
//! named resource kinds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::patch::ServiceDescriptor;
use crate::record::Record;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// The label triple identifying customer-grid objects (spec §3/§6).
#[derive(Debug, Clone)]
pub struct GridSelector {
    pub provider: String,
    pub app: String,
    pub component: String,
}

/// A realized Deployment as the Converger needs to see it: just the
/// `subscription` annotation and the first two containers' ports.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeploymentDescriptor {
    pub name: String,
    pub subscription_id: String,
    pub introducer_port_number: u16,
    pub storage_port_number: u16,
}

/// A ConfigMap descriptor: just enough to name and recreate it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConfigMapDescriptor {
    pub name: String,
    pub subscription_id: String,
    pub data: serde_json::Value,
}

/// The per-item outcome of a bulk `create` call (spec §4.F: "may reject
/// individual items; reports per-item outcome").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CreateOutcome {
    pub name: String,
    pub result: Result<(), String>,
}

pub fn deployment_name(subscription_id: &str) -> String {
    format!("customer-grid-{subscription_id}")
}

pub fn configmap_name(subscription_id: &str) -> String {
    format!("customer-grid-config-{subscription_id}")
}

fn configmap_payload(record: &Record) -> serde_json::Value {
    serde_json::json!({
        "bucket_name": record.bucket_name,
        "introducer_port_number": record.introducer_port_number,
        "storage_port_number": record.storage_port_number,
    })
}

/// Creatable cluster objects for one tick's `create_set` (spec §4.H step 5).
pub enum ClusterObject {
    Deployment(DeploymentDescriptor),
    ConfigMap(ConfigMapDescriptor),
}

pub fn deployment_for(record: &Record) -> DeploymentDescriptor {
    DeploymentDescriptor {
        name: deployment_name(&record.subscription_id),
        subscription_id: record.subscription_id.clone(),
        introducer_port_number: record.introducer_port_number,
        storage_port_number: record.storage_port_number,
    }
}

pub fn configmap_for(record: &Record) -> ConfigMapDescriptor {
    ConfigMapDescriptor {
        name: configmap_name(&record.subscription_id),
        subscription_id: record.subscription_id.clone(),
        data: configmap_payload(record),
    }
}

/// Operations against a cluster API server, scoped by a [`GridSelector`]
/// (spec §4.F).
#[allow(async_fn_in_trait)]
pub trait OrchestratorAdapter: Send + Sync {
    async fn list_deployments(&self) -> OrchestratorResult<Vec<DeploymentDescriptor>>;
    async fn list_service(&self) -> OrchestratorResult<ServiceDescriptor>;
    async fn create(&self, objects: Vec<ClusterObject>) -> OrchestratorResult<Vec<CreateOutcome>>;
    async fn apply(&self, service: ServiceDescriptor) -> OrchestratorResult<()>;
    async fn destroy(&self, names: Vec<String>) -> OrchestratorResult<()>;
}

/// A REST client against a generic cluster API server reachable at a
/// configured base URL.
pub struct HttpOrchestratorAdapter {
    client: reqwest::Client,
    base_url: String,
    selector: GridSelector,
}

impl HttpOrchestratorAdapter {
    pub fn new(base_url: impl Into<String>, selector: GridSelector) -> OrchestratorResult<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(crate::version::user_agent())
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            selector,
        })
    }

    fn map_transport_error(err: reqwest::Error) -> OrchestratorError {
        if err.is_timeout() || err.is_connect() {
            OrchestratorError::TransientExternal(err.to_string())
        } else {
            OrchestratorError::Http(err)
        }
    }
}

fn require_success(status: StatusCode) -> OrchestratorResult<()> {
    if status.is_success() {
        return Ok(());
    }
    if status.is_server_error() {
        return Err(OrchestratorError::TransientExternal(format!(
            "server error: {status}"
        )));
    }
    Err(OrchestratorError::UnexpectedResponseCode {
        observed: status.as_u16(),
    })
}

impl OrchestratorAdapter for HttpOrchestratorAdapter {
    async fn list_deployments(&self) -> OrchestratorResult<Vec<DeploymentDescriptor>> {
        debug!(
            "listing deployments for {}/{}/{}",
            self.selector.provider, self.selector.app, self.selector.component
        );
        let url = format!(
            "{}/deployments?provider={}&app={}&component={}",
            self.base_url.trim_end_matches('/'),
            self.selector.provider,
            self.selector.app,
            self.selector.component,
        );
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        require_success(response.status())?;
        Ok(response.json().await?)
    }

    async fn list_service(&self) -> OrchestratorResult<ServiceDescriptor> {
        let url = format!("{}/service", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        require_success(response.status())?;
        Ok(response.json().await?)
    }

    async fn create(&self, objects: Vec<ClusterObject>) -> OrchestratorResult<Vec<CreateOutcome>> {
        let url = format!("{}/objects", self.base_url.trim_end_matches('/'));
        let payload: Vec<serde_json::Value> = objects
            .iter()
            .map(|o| match o {
                ClusterObject::Deployment(d) => serde_json::json!({"kind": "deployment", "object": d}),
                ClusterObject::ConfigMap(c) => serde_json::json!({"kind": "configmap", "object": c}),
            })
            .collect();
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        require_success(response.status())?;
        Ok(response.json().await?)
    }

    async fn apply(&self, service: ServiceDescriptor) -> OrchestratorResult<()> {
        let url = format!("{}/service", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .put(url)
            .json(&service)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        require_success(response.status())
    }

    async fn destroy(&self, names: Vec<String>) -> OrchestratorResult<()> {
        let url = format!("{}/objects", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .delete(url)
            .json(&names)
            .send()
            .await
            .map_err(Self::map_transport_error)?;
        require_success(response.status())
    }
}

/// An in-memory fake, used by Converger tests to assert exactly which
/// objects were created/destroyed/applied without a live cluster.
#[derive(Default)]
pub struct InMemoryOrchestratorAdapter {
    inner: Arc<Mutex<InMemoryState>>,
}

#[derive(Default)]
struct InMemoryState {
    deployments: HashMap<String, DeploymentDescriptor>,
    configmaps: HashMap<String, ConfigMapDescriptor>,
    service: ServiceDescriptor,
}

impl InMemoryOrchestratorAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a realized deployment directly, for tests simulating existing
    /// cluster state.
    pub async fn seed_deployment(&self, deployment: DeploymentDescriptor) {
        let mut state = self.inner.lock().await;
        state.deployments.insert(deployment.name.clone(), deployment);
    }

    pub async fn seed_service(&self, service: ServiceDescriptor) {
        let mut state = self.inner.lock().await;
        state.service = service;
    }

    pub async fn configmap_names(&self) -> Vec<String> {
        let state = self.inner.lock().await;
        state.configmaps.keys().cloned().collect()
    }
}

impl OrchestratorAdapter for InMemoryOrchestratorAdapter {
    async fn list_deployments(&self) -> OrchestratorResult<Vec<DeploymentDescriptor>> {
        let state = self.inner.lock().await;
        Ok(state.deployments.values().cloned().collect())
    }

    async fn list_service(&self) -> OrchestratorResult<ServiceDescriptor> {
        let state = self.inner.lock().await;
        Ok(state.service.clone())
    }

    async fn create(&self, objects: Vec<ClusterObject>) -> OrchestratorResult<Vec<CreateOutcome>> {
        let mut state = self.inner.lock().await;
        let mut outcomes = Vec::with_capacity(objects.len());
        for object in objects {
            match object {
                ClusterObject::Deployment(d) => {
                    outcomes.push(CreateOutcome {
                        name: d.name.clone(),
                        result: Ok(()),
                    });
                    state.deployments.insert(d.name.clone(), d);
                }
                ClusterObject::ConfigMap(c) => {
                    outcomes.push(CreateOutcome {
                        name: c.name.clone(),
                        result: Ok(()),
                    });
                    state.configmaps.insert(c.name.clone(), c);
                }
            }
        }
        Ok(outcomes)
    }

    async fn apply(&self, service: ServiceDescriptor) -> OrchestratorResult<()> {
        let mut state = self.inner.lock().await;
        state.service = service;
        Ok(())
    }

    async fn destroy(&self, names: Vec<String>) -> OrchestratorResult<()> {
        let mut state = self.inner.lock().await;
        for name in names {
            // Missing targets are treated as success (spec §4.F).
            state.deployments.remove(&name);
            state.configmaps.remove(&name);
        }
        Ok(())
    }
}
