//! This binary is responsible for implementing an ICMP echo client.
//!
//! It pings one host every 500ms until interrupted, then prints statistics.

use std::{process::ExitCode, sync::Arc};

use icmp_ping::{
    parser::parse_input, resolve::resolve_host, PingConfig, PingResult, RawIcmp, Scheduler,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    match run(parse_input()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(host: String) -> PingResult<()> {
    let target = resolve_host(&host).await?;
    println!("PING {} ({}).", host, target);

    let scheduler = Scheduler::new(Arc::new(RawIcmp::default()), target, PingConfig::default());
    let stats = scheduler
        .run(shutdown_signal(), |outcome| println!("{}", outcome))
        .await?;

    if let Some(summary) = stats.render(&host) {
        println!("{}", summary);
    }
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
