//! Command-line configuration surface (spec §6 "Converger configuration").
//!
//! Mirrors the source's `Options`/`required()` validation with clap's
//! built-in required-argument handling: a missing option is a configuration
//! error and exits non-zero before any subsystem starts (spec §6 "Exit
//! codes").

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "convergence-core", version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the Subscription Manager Service over HTTP.
    Manager(ManagerArgs),
    /// Run the Converger reconciliation loop.
    Converge(ConvergeArgs),
}

#[derive(Debug, Args)]
pub struct ManagerArgs {
    /// Directory holding subscription record files. Must already exist.
    #[arg(long, required = true)]
    pub state_path: std::path::PathBuf,

    /// Address the HTTP service binds to, e.g. `0.0.0.0:8080`.
    #[arg(long, required = true)]
    pub listen_address: std::net::SocketAddr,

    #[arg(long, value_enum, default_value_t = crate::utils::LogLevel::Info)]
    pub log_level: crate::utils::LogLevel,
}

#[derive(Debug, Args)]
pub struct ConvergeArgs {
    /// Root URL of the subscription-manager HTTP service.
    #[arg(long, required = true)]
    pub endpoint: String,

    /// Base URL of the cluster orchestrator API.
    #[arg(long, required = true)]
    pub orchestrator_url: String,

    /// Vendor/provider label used to scope orchestrator queries.
    #[arg(long, required = true)]
    pub provider: String,

    /// Product label used to scope orchestrator queries.
    #[arg(long, required = true)]
    pub app: String,

    /// Grid-tag component label used to scope orchestrator queries.
    #[arg(long, required = true)]
    pub component: String,

    /// Base URL of the DNS provider API.
    #[arg(long, required = true)]
    pub dns_url: String,

    #[arg(long, value_enum, default_value_t = crate::utils::LogLevel::Info)]
    pub log_level: crate::utils::LogLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_requires_state_path_and_listen_address() {
        let err = Cli::try_parse_from(["convergence-core", "manager"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn manager_parses_with_required_args() {
        let cli = Cli::try_parse_from([
            "convergence-core",
            "manager",
            "--state-path",
            "/var/lib/subscriptions",
            "--listen-address",
            "0.0.0.0:8080",
        ])
        .unwrap();
        match cli.command {
            Command::Manager(args) => {
                assert_eq!(args.state_path, std::path::PathBuf::from("/var/lib/subscriptions"));
            }
            Command::Converge(_) => panic!("expected manager subcommand"),
        }
    }

    #[test]
    fn converge_requires_endpoint() {
        let err = Cli::try_parse_from([
            "convergence-core",
            "converge",
            "--orchestrator-url",
            "http://orch",
            "--provider",
            "acme",
            "--app",
            "grids",
            "--component",
            "storage",
            "--dns-url",
            "http://dns",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
