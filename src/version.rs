//! Version information for the convergence core.
//!
//! Centralized so the HTTP clients (manager client, orchestrator adapter,
//! DNS adapter) all advertise the same User-Agent string.

/// Crate version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const APP_NAME: &str = "convergence-core";

/// User-Agent string for outbound HTTP requests.
pub fn user_agent() -> String {
    format!("{}/{}", APP_NAME, VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_contains_name_and_version() {
        let ua = user_agent();
        assert!(ua.starts_with("convergence-core/"));
        assert!(ua.contains(VERSION));
    }
}
