//! Service-Object Patch Algebra — pure functions over the shared service
//! descriptor (spec §4.E).
//!
//! Deliberately free of I/O and logging: this is the one piece of in-tick
//! logic that admits clean property testing (spec §9).

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// One named port entry in the shared service object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortEntry {
    pub name: String,
    pub port: u16,
}

/// The shared, singleton service descriptor (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub ports: Vec<PortEntry>,
}

fn introducer_name(subscription_id: &str) -> String {
    format!("i-{subscription_id}")
}

fn storage_name(subscription_id: &str) -> String {
    format!("s-{subscription_id}")
}

/// Append the two port entries for `record`. Idempotent on name: re-adding
/// an existing name is a no-op for that name.
pub fn add(mut service: ServiceDescriptor, record: &Record) -> ServiceDescriptor {
    let i_name = introducer_name(&record.subscription_id);
    let s_name = storage_name(&record.subscription_id);

    if !service.ports.iter().any(|p| p.name == i_name) {
        service.ports.push(PortEntry {
            name: i_name,
            port: record.introducer_port_number,
        });
    }
    if !service.ports.iter().any(|p| p.name == s_name) {
        service.ports.push(PortEntry {
            name: s_name,
            port: record.storage_port_number,
        });
    }
    service
}

/// Add entries for every record in `records`.
pub fn add_many<'a>(
    service: ServiceDescriptor,
    records: impl IntoIterator<Item = &'a Record>,
) -> ServiceDescriptor {
    records.into_iter().fold(service, add)
}

/// Remove both port entries named for `subscription_id`. Idempotent.
pub fn remove(mut service: ServiceDescriptor, subscription_id: &str) -> ServiceDescriptor {
    let i_name = introducer_name(subscription_id);
    let s_name = storage_name(subscription_id);
    service.ports.retain(|p| p.name != i_name && p.name != s_name);
    service
}

/// Remove entries for every id in `subscription_ids`.
pub fn remove_many<'a>(
    service: ServiceDescriptor,
    subscription_ids: impl IntoIterator<Item = &'a str>,
) -> ServiceDescriptor {
    subscription_ids.into_iter().fold(service, remove)
}

/// The set of ids for which *both* `i-<id>` and `s-<id>` entries are
/// present. A lone half of a pair is ignored — it's partial state to be
/// repaired on the next apply.
pub fn configured_subscriptions(service: &ServiceDescriptor) -> std::collections::HashSet<String> {
    let names: std::collections::HashSet<&str> =
        service.ports.iter().map(|p| p.name.as_str()).collect();

    names
        .iter()
        .filter_map(|name| name.strip_prefix("i-"))
        .filter(|id| names.contains(&format!("s-{id}")[..]))
        .map(|id| id.to_string())
        .collect()
}
