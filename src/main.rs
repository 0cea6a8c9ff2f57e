//! Subscription Convergence Core — CLI entry point.
//!
//! Dispatches to either the `manager` subcommand (serves the Subscription
//! Manager Service over HTTP) or the `converge` subcommand (runs the
//! Converger reconciliation loop). Exit codes follow spec §6: 0 on graceful
//! shutdown, non-zero on configuration error; the Converger loop itself
//! never exits due to convergence errors.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use convergence_core::cli::{Cli, Command, ConvergeArgs, ManagerArgs};
use convergence_core::converger::ConvergerLoop;
use convergence_core::dns::HttpDnsAdapter;
use convergence_core::orchestrator::{GridSelector, HttpOrchestratorAdapter};
use convergence_core::{init_logger, HttpSubscriptionManagerClient, SubscriptionStore};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Manager(args) => run_manager(args).await,
        Command::Converge(args) => run_converge(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{}", message);
            ExitCode::FAILURE
        }
    }
}

async fn run_manager(args: ManagerArgs) -> Result<(), String> {
    init_logger(args.log_level);

    let store = SubscriptionStore::open(&args.state_path)
        .map_err(|e| format!("failed to open state root {}: {}", args.state_path.display(), e))?;
    let state = convergence_core::service::AppState::new(Arc::new(store));
    let app = convergence_core::service::router(state);

    let listener = tokio::net::TcpListener::bind(args.listen_address)
        .await
        .map_err(|e| format!("failed to bind {}: {}", args.listen_address, e))?;

    info!(
        "subscription manager service listening on {}",
        args.listen_address
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("manager service exited with error: {e}"))
}

async fn run_converge(args: ConvergeArgs) -> Result<(), String> {
    init_logger(args.log_level);

    let client = HttpSubscriptionManagerClient::new(args.endpoint)
        .map_err(|e| format!("failed to build subscription manager client: {e}"))?;
    let orchestrator = HttpOrchestratorAdapter::new(
        args.orchestrator_url,
        GridSelector {
            provider: args.provider,
            app: args.app,
            component: args.component,
        },
    )
    .map_err(|e| format!("failed to build orchestrator adapter: {e}"))?;
    let dns = HttpDnsAdapter::new(args.dns_url).map_err(|e| format!("failed to build dns adapter: {e}"))?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    info!("converger loop starting");
    ConvergerLoop::new(client, orchestrator, dns)
        .run(shutdown_rx)
        .await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
