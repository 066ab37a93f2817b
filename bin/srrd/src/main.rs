//! ---
//! srr_section: "03-orchestration-core"
//! srr_subsection: "binary"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Binary entrypoint for the SRR coordinator daemon."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use prometheus::Registry;
use srr_common::config::SrrConfig;
use srr_common::logging::init_tracing;
use srr_core::{default_fleet, Reply, RestartArbiter, SrrCoordinator, Status};
use srr_msg::types::meta;
use srr_msg::{BusError, InMemoryBus, Message, MessageBus, RequestClient, RequestMetrics};
use tracing::{debug, error, info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "SRR coordinator daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve operator requests from the bus")]
    Run,
    #[command(about = "Print the feature/group catalog and exit")]
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/srr.toml"));
    candidates.push(PathBuf::from("/etc/srr/srr.toml"));

    let loaded = SrrConfig::load_with_source(&candidates)?;
    let config = loaded.config;
    init_tracing("srrd", &config.logging)?;
    match &loaded.source {
        Some(source) => info!(config_path = %source.display(), "configuration loaded"),
        None => info!("running with built-in default configuration"),
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await,
        Commands::List => {
            render_catalog();
            Ok(())
        }
    }
}

async fn run_daemon(config: SrrConfig) -> Result<()> {
    let registry = Arc::new(default_fleet());
    // The in-memory bus serves single-process deployments and tests; fleet
    // deployments swap in a networked MessageBus implementation here.
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());

    let metrics_registry = Registry::new();
    let metrics = Arc::new(RequestMetrics::register(&metrics_registry)?);
    let client = RequestClient::new(
        bus.clone(),
        config.coordinator.agent_name.clone(),
        config.coordinator.reply_queue.clone(),
        config.request_timeout,
    )
    .with_metrics(metrics);

    let coordinator = SrrCoordinator::new(
        registry,
        client,
        config.version.clone(),
        config.supported_versions.clone(),
    );
    let arbiter = RestartArbiter::new(config.restart_delay);

    let running = Arc::new(AtomicBool::new(true));
    let serve_flag = running.clone();
    let request_queue = config.coordinator.request_queue.clone();
    info!(queue = %request_queue, agent = %config.coordinator.agent_name, "coordinator serving operator requests");

    let serve = tokio::task::spawn_blocking(move || {
        serve_loop(bus, coordinator, arbiter, &request_queue, serve_flag)
    });

    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received, shutting down");
    running.store(false, Ordering::Relaxed);
    serve.await?;
    Ok(())
}

fn serve_loop(
    bus: Arc<dyn MessageBus>,
    coordinator: SrrCoordinator,
    arbiter: RestartArbiter,
    queue: &str,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        let request = match bus.receive(queue, Duration::from_millis(250)) {
            Ok(request) => request,
            Err(BusError::Timeout { .. }) => continue,
            Err(err) => {
                error!(error = %err, "bus receive failed");
                continue;
            }
        };
        handle_request(&bus, &coordinator, &arbiter, request);
    }
}

fn handle_request(
    bus: &Arc<dyn MessageBus>,
    coordinator: &SrrCoordinator,
    arbiter: &RestartArbiter,
    request: Message,
) {
    let subject = request.subject().to_owned();
    debug!(subject = %subject, correlation = %request.correlation_id(), "operator request received");

    let mut restart = false;
    let reply = match subject.as_str() {
        "list" => coordinator.request_list(),
        "save" => coordinator.request_save(&request.body),
        "restore" => {
            let force = request.meta("force").map(|v| v == "true").unwrap_or(false);
            let outcome = coordinator.request_restore(&request.body, force);
            restart = outcome.restart;
            outcome.reply
        }
        "reset" => coordinator.request_reset(&request.body),
        other => {
            warn!(subject = %other, "unsupported request subject");
            Reply {
                status: Status::Failed,
                json: serde_json::json!({
                    "status": Status::Failed.as_str(),
                    "error": format!("unsupported request subject: {}", other),
                })
                .to_string(),
            }
        }
    };

    match request.reply_to().map(str::to_owned) {
        Some(reply_queue) => {
            let mut message = Message::reply(&request, reply.json);
            message.set_meta(meta::STATUS, reply.status.as_str());
            if let Err(err) = bus.send(&reply_queue, message) {
                error!(error = %err, "failed to send reply");
            }
        }
        None => warn!("request carried no reply-to queue, dropping reply"),
    }

    // the restart side effect stays out of the reply's critical path
    if restart {
        info!("restart demanded by restored features");
        arbiter.schedule();
    }
}

fn render_catalog() {
    let registry = default_fleet();
    for group in registry.all_groups() {
        println!("{}", group.id);
        for edge in &group.features {
            let flags = registry
                .feature_by_name(&edge.feature)
                .map(|feature| match (feature.restart, feature.reset) {
                    (true, true) => ", restart, reset",
                    (true, false) => ", restart",
                    (false, true) => ", reset",
                    (false, false) => "",
                })
                .unwrap_or("");
            println!("  {} (priority {}{})", edge.feature, edge.priority, flags);
        }
    }
}
