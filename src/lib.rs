//! Subscription Convergence Core
//!
//! The convergence subsystem plus the subscription store that feeds it: a
//! persisted, port-stable subscription registry; an HTTP facade and client
//! pair for that registry; a pure patch algebra for the shared service
//! object; and the periodic reconciliation loop that drives a cluster
//! orchestrator and a DNS provider toward the declared set of active
//! subscriptions.

#![warn(missing_docs)]

pub mod cli;
pub mod client;
pub mod converger;
pub mod dns;
pub mod error;
pub mod orchestrator;
pub mod patch;
pub mod record;
pub mod service;
pub mod store;
pub mod utils;
pub mod version;

pub use client::{
    HttpSubscriptionManagerClient, InMemorySubscriptionManagerClient, SubscriptionManagerClient,
};
pub use converger::{tick, ConvergerLoop, TickOutcome};
pub use dns::{DnsAdapter, HttpDnsAdapter, InMemoryDnsAdapter};
pub use error::{ConvergenceError, ConvergenceResult};
pub use orchestrator::{HttpOrchestratorAdapter, InMemoryOrchestratorAdapter, OrchestratorAdapter};
pub use record::{NewRecordDetails, Record};
pub use store::SubscriptionStore;
pub use utils::{init_logger, LogLevel};
pub use version::{user_agent, VERSION};
