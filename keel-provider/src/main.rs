//! keel: drive one resource lifecycle verb against the remote control plane.
//!
//! Models are exchanged as JSON files; the committed state is written back
//! to `--state` and diagnostics are printed to stdout.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use keel_engine::{EngineConfig, Timeouts};
use keel_provider::clients::{ApiClient, ClientConfig};
use keel_provider::host::{self, Invocation, Kind, Verb};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// keel resource reconciler
#[derive(Parser, Debug)]
#[command(name = "keel", version, about)]
struct Args {
    /// Remote API base URL
    #[arg(long, env = "KEEL_API_ENDPOINT")]
    endpoint: String,

    /// Bearer token for the remote API
    #[arg(long, env = "KEEL_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Interval between status probes of a long-running operation
    #[arg(long, default_value = "5")]
    poll_interval_secs: u64,

    /// Overrides the per-kind create, update and delete timeouts
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Upper bound on a single HTTP request
    #[arg(long, default_value = "30")]
    request_timeout_secs: u64,

    /// Resource kind
    #[arg(value_enum)]
    kind: Kind,

    /// Lifecycle verb
    #[arg(value_enum)]
    verb: Verb,

    /// Desired model (create, update)
    #[arg(long)]
    desired: Option<PathBuf>,

    /// State file, read by read/update/delete and written on commit
    #[arg(long)]
    state: Option<PathBuf>,

    /// Import identifier, e.g. `project_id,instance_id`
    #[arg(long)]
    id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "keel=info,keel_engine=info,keel_provider=info,reqwest=warn,hyper=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut client_config = ClientConfig::new(args.endpoint.clone());
    client_config.token = args.token.clone();
    client_config.request_timeout = Duration::from_secs(args.request_timeout_secs);
    let api = ApiClient::new(&client_config).context("Failed to build API client")?;

    let mut config =
        EngineConfig::default().with_poll_interval(Duration::from_secs(args.poll_interval_secs));
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeouts(Timeouts::uniform(Duration::from_secs(secs)));
    }

    info!("{:?} {} against {}", args.kind, args.verb, args.endpoint);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let invocation = Invocation {
        verb: args.verb,
        desired: args.desired,
        state: args.state,
        id: args.id,
    };

    let report = host::dispatch(args.kind, api, config, &invocation, &cancel)
        .await
        .with_context(|| format!("{} failed", args.verb))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to render report")?
    );

    if report.has_error() {
        std::process::exit(1);
    }
    Ok(())
}
