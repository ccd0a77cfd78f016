use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use portmaster::probe::{NetworkProber, ProbeTimeouts};
use portmaster::scanner::Coordinator;
use portmaster::session::SessionStore;
use portmaster::types::{Algorithm, ProbeMethod, ScanConfig, ScanSnapshot};
use portmaster::{ports, server};

/// portmaster: single-host port scanner with BFS/DFS traversal, raw TCP/UDP probes and a tiny web UI.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "portmaster",
    version,
    about = "Single-host port scanner with BFS/DFS traversal, raw TCP/UDP probes and a tiny web UI.",
    long_about = None
)]
struct Cli {
    /// Hostname or IP to scan once from the command line.
    #[arg(long)]
    target: Option<String>,

    /// Port range to scan: `lo-hi` or a single port.
    #[arg(long, default_value = "1-1024")]
    ports: String,

    /// Traversal order of the port space.
    #[arg(long, value_enum, default_value_t = Algorithm::Bfs)]
    algorithm: Algorithm,

    /// Probe technique. Everything except `connect` and `udp` needs raw-socket privileges.
    #[arg(long, value_enum, default_value_t = ProbeMethod::Connect)]
    method: ProbeMethod,

    /// Do not probe well-known ports ahead of the rest of the range.
    #[arg(long = "no-common-first", default_value_t = false)]
    no_common_first: bool,

    /// Max concurrent probes.
    #[arg(long, default_value_t = 100)]
    concurrency: usize,

    /// Override every per-method probe timeout (milliseconds).
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Write the finished scan as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Start the embedded HTTP UI server.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Address the UI server listens on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Directory holding the static UI files.
    #[arg(long = "ui-dir", default_value = "ui")]
    ui_dir: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.target.is_none() && !cli.serve_ui {
        bail!("nothing to do: pass --target to scan once and/or --serve-ui to start the web UI");
    }

    let timeouts = match cli.timeout_ms {
        Some(ms) => ProbeTimeouts::uniform(Duration::from_millis(ms.max(1))),
        None => ProbeTimeouts::default(),
    };
    let store = SessionStore::new();
    let coordinator = Coordinator::new(store, Arc::new(NetworkProber::new(timeouts)));

    // Start embedded UI server if requested (background task, stopped on Ctrl+C)
    let shutdown = CancellationToken::new();
    let server_handle = if cli.serve_ui {
        let bind = cli.bind.clone();
        let ui_dir = cli.ui_dir.clone();
        let coordinator = coordinator.clone();
        let shutdown = shutdown.clone();
        println!("UI server starting at http://{} (Ctrl+C to stop)", bind);
        Some(tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind, ui_dir, coordinator, shutdown).await {
                error!("HTTP UI server error: {e:#}");
            }
        }))
    } else {
        None
    };

    if let Some(target) = cli.target.as_deref() {
        let (lo, hi) = ports::parse_port_range(&cli.ports)?;
        let config = ScanConfig::new(
            target,
            u32::from(lo),
            u32::from(hi),
            cli.algorithm,
            cli.method,
            !cli.no_common_first,
            cli.concurrency,
        )?;
        print_config(&config);

        let snapshot = coordinator.run(config).await;
        print_results_table(&snapshot);
        if let Some(path) = cli.output.as_deref() {
            match write_results_json(path, &snapshot) {
                Ok(()) => println!("Wrote JSON results to {}", path.display()),
                Err(e) => eprintln!("Failed to write JSON to {}: {e:#}", path.display()),
            }
        }
    }

    // If UI is running, keep the process alive until Ctrl+C.
    if let Some(handle) = server_handle {
        println!("Press Ctrl+C to stop the server...");
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
        shutdown.cancel();
        let _ = handle.await;
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn print_config(config: &ScanConfig) {
    println!("portmaster configuration:");
    println!("  target       : {}", config.target);
    println!("  ports        : {}-{}", config.port_start, config.port_end);
    println!("  algorithm    : {}", config.algorithm);
    println!("  method       : {}", config.method);
    println!("  common first : {}", config.common_ports_first);
    println!("  concurrency  : {}", config.max_concurrency);
}

fn print_results_table(s: &ScanSnapshot) {
    let port_w = "port".len().max(5);
    let mut service_w = "service".len();
    let mut name_w = "name".len();
    for p in &s.open_ports {
        service_w = service_w.max(p.service.len());
        name_w = name_w.max(p.risk.name.len());
    }
    let risk_w = "Critical".len();

    println!(
        "\nOpen ports: {} (scanned: {}/{}, elapsed: {}s)",
        s.open_ports.len(),
        s.progress,
        s.total_ports,
        s.elapsed_time.as_deref().unwrap_or("-")
    );
    if s.open_ports.is_empty() {
        println!("No open ports found.");
        return;
    }
    println!(
        "{:>port_w$}  {:<service_w$}  {:<name_w$}  {:<risk_w$}",
        "port", "service", "name", "risk",
    );
    println!(
        "{:->port_w$}  {:-<service_w$}  {:-<name_w$}  {:-<risk_w$}",
        "", "", "", "",
    );
    for p in &s.open_ports {
        println!(
            "{:>port_w$}  {:<service_w$}  {:<name_w$}  {:<risk_w$}",
            p.port,
            p.service,
            p.risk.name,
            p.risk.risk_level.to_string(),
        );
    }
}

fn write_results_json(path: &std::path::Path, results: &ScanSnapshot) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}
