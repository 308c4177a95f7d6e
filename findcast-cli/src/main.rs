mod cli;
mod error;
mod routing;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use findcast::{RelayConfig, RelayError, RelayService};

use crate::cli::Args;
use crate::error::{CliError, Result};
use crate::routing::{FileDirectory, OfflineChatGateway};

/// How long to wait for the first feed frame before continuing in the
/// background. Covers the whole startup retry regime.
const READY_PATIENCE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    // Load .env first so clap's env fallbacks and the config overrides see it.
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(args.verbose, args.silent);

    if let Err(e) = run(args).await {
        error!("{e}");
        eprintln!("Error: {e}");
        process::exit(exit_code(&e));
    }
}

fn init_logging(verbose: bool, silent: bool) {
    if silent {
        return;
    }
    let default_filter = if verbose {
        "findcast=debug,findcast_cli=debug"
    } else {
        "findcast=info,findcast_cli=info"
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Fatal faults get their own exit codes so supervisors can tell a bad
/// credential from an unreachable feed.
fn exit_code(error: &CliError) -> i32 {
    match error {
        CliError::Relay(RelayError::RetriesExhausted { .. }) => 2,
        CliError::Relay(RelayError::AuthRejected) => 3,
        CliError::Relay(RelayError::AuthInUse) => 4,
        _ => 1,
    }
}

async fn run(args: Args) -> Result<()> {
    let token = args.token.ok_or_else(|| {
        CliError::Config("no feed token: pass --token or set FEED_TOKEN".to_string())
    })?;

    let config = RelayConfig::from_env();
    let directory = Arc::new(FileDirectory::load(&args.routing)?);
    if directory.is_empty() {
        warn!(path = %args.routing.display(), "routing table has no users, nothing will be relayed");
    } else {
        info!(users = directory.len(), "routing table loaded");
    }

    let mut service = RelayService::new(
        config,
        directory.clone(),
        directory,
        Arc::new(OfflineChatGateway),
    );

    info!("starting relay...");
    let mut running = service.start(&token).await?;

    // Stop cleanly on ctrl-c.
    let cancel = service.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            cancel.cancel();
        }
    });

    match tokio::time::timeout(READY_PATIENCE, &mut running.ready).await {
        Ok(Ok(())) => info!("feed connection established"),
        // The worker stopped before the first frame; wait() surfaces why.
        Ok(Err(_)) => {}
        Err(_) => warn!(
            "no feed frame after {}s, still retrying in the background",
            READY_PATIENCE.as_secs()
        ),
    }

    running.wait().await?;
    info!("relay stopped");
    Ok(())
}
