//! Gatepass CLI
//!
//! Solves one challenge end to end and prints the JSON result view: the
//! blocking presentation of the same state machine the polled mode uses.

use anyhow::Context;
use clap::Parser;
use gatepass::app::App;
use gatepass::config::{AppConfig, PoolConfig, PrimaryMethod, SolverConfig};
use gatepass::driver::CdpDriver;
use gatepass::inference::{DisabledClassifier, DisabledTranscriber};
use gatepass::ledger::MemoryLedger;
use gatepass::proxy::ProxySpec;
use gatepass::registry::{TaskSpec, Variant};
use std::sync::Arc;

/// Gatepass challenge solver
#[derive(Parser, Debug)]
#[command(name = "gatepass")]
#[command(version)]
#[command(about = "Solve a verification challenge and print the proof token")]
struct Args {
    /// Page hosting the challenge
    #[arg(long)]
    url: String,

    /// Challenge site key
    #[arg(long)]
    site_key: String,

    /// Challenge variant: normal, invisible, or enterprise
    #[arg(long, default_value = "normal")]
    variant: String,

    /// Proxy (host:port[:user:pass] or URL form)
    #[arg(long)]
    proxy: Option<String>,

    /// User-agent override
    #[arg(long)]
    user_agent: Option<String>,

    /// Action parameter (invisible/enterprise)
    #[arg(long)]
    action: Option<String>,

    /// Number of browser processes to launch
    #[arg(long, default_value = "2")]
    processes: usize,

    /// Outer retry budget
    #[arg(long, default_value = "3")]
    max_retries: u32,

    /// Run browsers with a visible window
    #[arg(long)]
    headed: bool,

    /// Disable the Chromium sandbox (containers)
    #[arg(long)]
    no_sandbox: bool,

    /// Path to a Chrome/Chromium executable
    #[arg(long)]
    chrome_path: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let variant = match args.variant.as_str() {
        "normal" => Variant::Normal,
        "invisible" => Variant::Invisible,
        "enterprise" => Variant::Enterprise,
        other => anyhow::bail!("unknown variant: {}", other),
    };
    let proxy = args
        .proxy
        .as_deref()
        .map(ProxySpec::parse)
        .transpose()
        .context("invalid proxy")?;

    let mut pool = PoolConfig::builder()
        .process_count(args.processes)
        .headless(!args.headed)
        .sandbox(!args.no_sandbox)
        .build();
    if let Some(path) = args.chrome_path {
        pool.chrome_path = Some(path);
    }
    let solver = SolverConfig::builder()
        .max_retries(args.max_retries)
        .primary_method(PrimaryMethod::Audio)
        .build();
    let config = AppConfig {
        pool,
        solver,
        ..AppConfig::default()
    };

    // Local single-user ledger; the CLI is its own owner
    let ledger = Arc::new(MemoryLedger::new());
    ledger.insert(
        "cli",
        gatepass::ledger::Account {
            balance: 0.0,
            is_owner: true,
            expires_at: None,
        },
    );

    let app = App::new(
        config,
        Arc::new(CdpDriver::new()),
        ledger,
        Arc::new(DisabledTranscriber),
        Arc::new(DisabledClassifier),
    );
    app.initialize().await.context("browser pool startup failed")?;

    let result = app
        .solve_blocking(TaskSpec {
            website_url: args.url,
            site_key: args.site_key,
            variant,
            proxy,
            user_agent: args.user_agent,
            cookies: None,
            action: args.action,
            enterprise_payload: None,
            client_key: "cli".into(),
        })
        .await;

    app.shutdown().await;

    let view = result.context("solve failed")?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
