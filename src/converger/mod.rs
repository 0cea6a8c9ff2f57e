//! Converger — the periodic reconciliation loop tying the Subscription
//! Manager Client, Orchestrator Adapter, DNS Adapter, and Patch Algebra
//! together (spec §4.H).

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::client::{index_by_id, SubscriptionManagerClient};
use crate::dns::DnsAdapter;
use crate::error::{ClientError, ConvergenceResult, DnsError, OrchestratorError};
use crate::orchestrator::{
    configmap_for, configmap_name, deployment_for, deployment_name, ClusterObject,
    OrchestratorAdapter,
};
use crate::patch::{add_many, remove_many};

/// The loop's tick cadence (spec §5: "one long-lived loop task ticks at 1 Hz").
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Deadline for each external call within a tick, shorter than the tick
/// period by a safety factor (spec §5).
const CALL_TIMEOUT: Duration = Duration::from_millis(800);

/// The observable result of one tick, for logging and tests (spec §4.H).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub created: usize,
    pub deleted: usize,
    pub repaired: usize,
}

async fn with_deadline<T, E>(
    future: impl Future<Output = Result<T, E>>,
    on_timeout: impl FnOnce() -> E,
) -> Result<T, E> {
    match tokio::time::timeout(CALL_TIMEOUT, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

fn timed_out(what: &str) -> String {
    format!("{what} exceeded the per-call deadline")
}

/// Run one convergence tick against the given client/orchestrator/dns
/// adapters, implementing spec §4.H steps 1–5 with the corrected diff
/// direction (creates for `desired - realized`, deletes for
/// `realized - desired`) rather than the inverted direction spec.md §9
/// explicitly calls out as a bug in the source algorithm.
pub async fn tick<C, O, D>(
    client: &C,
    orchestrator: &O,
    dns: &D,
) -> ConvergenceResult<TickOutcome>
where
    C: SubscriptionManagerClient,
    O: OrchestratorAdapter,
    D: DnsAdapter,
{
    // 1. Gather desired state.
    let desired_records = with_deadline(client.list(), || {
        ClientError::TransientExternal(timed_out("client.list()"))
    })
    .await?;
    let desired = index_by_id(desired_records);

    // 2. Gather realized state.
    let realized_deployments = with_deadline(orchestrator.list_deployments(), || {
        OrchestratorError::TransientExternal(timed_out("orchestrator.list_deployments()"))
    })
    .await?;
    let service = with_deadline(orchestrator.list_service(), || {
        OrchestratorError::TransientExternal(timed_out("orchestrator.list_service()"))
    })
    .await?;

    // 3. Compute diff.
    let mut create_set: HashSet<String> = desired.keys().cloned().collect();
    let mut delete_set: HashSet<String> = HashSet::new();

    for deployment in &realized_deployments {
        match desired.get(&deployment.subscription_id) {
            None => {
                delete_set.insert(deployment.subscription_id.clone());
            }
            Some(record) => {
                create_set.remove(&deployment.subscription_id);
                if deployment.introducer_port_number != record.introducer_port_number
                    || deployment.storage_port_number != record.storage_port_number
                {
                    delete_set.insert(deployment.subscription_id.clone());
                    create_set.insert(deployment.subscription_id.clone());
                }
            }
        }
    }

    let repaired = create_set.intersection(&delete_set).count();

    // 4. Plan service.
    let planned_service = add_many(
        remove_many(service, delete_set.iter().map(String::as_str)),
        create_set.iter().filter_map(|id| desired.get(id)),
    );

    let delete_ids: Vec<String> = delete_set.iter().cloned().collect();
    let create_records: Vec<_> = create_set.iter().filter_map(|id| desired.get(id)).collect();

    // 5a. DNS destroy.
    with_deadline(dns.destroy(delete_ids.clone()), || {
        DnsError::TransientExternal(timed_out("dns.destroy()"))
    })
    .await?;

    // 5b. Orchestrator destroy deployments.
    let deployment_names: Vec<String> = delete_ids.iter().map(|id| deployment_name(id)).collect();
    with_deadline(orchestrator.destroy(deployment_names), || {
        OrchestratorError::TransientExternal(timed_out("orchestrator.destroy(deployments)"))
    })
    .await?;

    // 5c. Orchestrator destroy configmaps.
    let configmap_names: Vec<String> = delete_ids.iter().map(|id| configmap_name(id)).collect();
    with_deadline(orchestrator.destroy(configmap_names), || {
        OrchestratorError::TransientExternal(timed_out("orchestrator.destroy(configmaps)"))
    })
    .await?;

    // 5d. Orchestrator create configmaps.
    let configmap_objects: Vec<ClusterObject> = create_records
        .iter()
        .map(|r| ClusterObject::ConfigMap(configmap_for(r)))
        .collect();
    with_deadline(orchestrator.create(configmap_objects), || {
        OrchestratorError::TransientExternal(timed_out("orchestrator.create(configmaps)"))
    })
    .await?;

    // 5e. Orchestrator create deployments.
    let deployment_objects: Vec<ClusterObject> = create_records
        .iter()
        .map(|r| ClusterObject::Deployment(deployment_for(r)))
        .collect();
    with_deadline(orchestrator.create(deployment_objects), || {
        OrchestratorError::TransientExternal(timed_out("orchestrator.create(deployments)"))
    })
    .await?;

    // 5f. Orchestrator apply service.
    with_deadline(orchestrator.apply(planned_service), || {
        OrchestratorError::TransientExternal(timed_out("orchestrator.apply(service)"))
    })
    .await?;

    // 5g. DNS create.
    let create_ids: Vec<String> = create_set.into_iter().collect();
    let created = create_ids.len();
    with_deadline(dns.create(create_ids), || {
        DnsError::TransientExternal(timed_out("dns.create()"))
    })
    .await?;

    Ok(TickOutcome {
        created,
        deleted: delete_set.len(),
        repaired,
    })
}

/// Run `tick`, logging and swallowing any error so that one bad tick never
/// propagates past the loop boundary (spec §4.H "error quarantine", §7).
async fn quarantined_tick<C, O, D>(client: &C, orchestrator: &O, dns: &D)
where
    C: SubscriptionManagerClient,
    O: OrchestratorAdapter,
    D: DnsAdapter,
{
    match tick(client, orchestrator, dns).await {
        Ok(outcome) => {
            if outcome.created > 0 || outcome.deleted > 0 {
                info!(
                    created = outcome.created,
                    deleted = outcome.deleted,
                    repaired = outcome.repaired,
                    "tick converged drift"
                );
            }
        }
        Err(err) => warn!("tick failed, will retry next tick: {}", err),
    }
}

/// The long-lived convergence task: ticks at [`TICK_PERIOD`], never letting
/// adjacent ticks overlap, and honors graceful shutdown via a
/// `tokio::sync::watch` channel, using the same `tokio::select!`
/// cancellation idiom a reconnect loop would use against a timer and a
/// shutdown signal.
pub struct ConvergerLoop<C, O, D> {
    client: C,
    orchestrator: O,
    dns: D,
}

impl<C, O, D> ConvergerLoop<C, O, D>
where
    C: SubscriptionManagerClient,
    O: OrchestratorAdapter,
    D: DnsAdapter,
{
    pub fn new(client: C, orchestrator: O, dns: D) -> Self {
        Self {
            client,
            orchestrator,
            dns,
        }
    }

    /// Run until `shutdown` carries `true`. A tick already in flight when
    /// shutdown is requested is allowed to complete before the loop exits.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(TICK_PERIOD);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    quarantined_tick(&self.client, &self.orchestrator, &self.dns).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("converger loop shutting down");
                        break;
                    }
                }
            }
        }
    }
}
