//! bpfd-agent - per-node reconciliation of eBPF program resources

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use kube::{Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bpfd_agent::controller::build_controllers;
use bpfd_agent::crd::{BpfProgram, TcProgram, TracepointProgram, XdpProgram};
use bpfd_agent::daemon::client::DaemonConfig;
use bpfd_agent::daemon::GrpcDaemon;
use bpfd_agent::retry::RetryConfig;
use bpfd_agent::DEFAULT_BPFD_ENDPOINT;

/// bpfd-agent - loads eBPF programs on this node as described by program resources
#[derive(Parser, Debug)]
#[command(name = "bpfd-agent", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    agent: AgentArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the node agent (default mode)
    ///
    /// Watches XdpProgram, TcProgram and TracepointProgram resources and
    /// reconciles them against the local bpfd daemon.
    Agent,
}

/// Agent mode arguments
#[derive(Args, Debug)]
struct AgentArgs {
    /// Name of the node this agent runs on
    ///
    /// Usually injected from the pod's spec.nodeName through the downward API.
    #[arg(long, env = "KUBE_NODE_NAME")]
    node_name: Option<String>,

    /// gRPC endpoint of the local bpfd daemon
    #[arg(long, env = "BPFD_ENDPOINT", default_value = DEFAULT_BPFD_ENDPOINT)]
    bpfd_endpoint: String,

    /// Timeout for establishing the bpfd connection in seconds
    #[arg(long, default_value = "10")]
    connect_timeout_secs: u64,

    /// Timeout for a single bpfd request in seconds
    #[arg(long, default_value = "30")]
    request_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        print_crds()?;
        return Ok(());
    }

    match cli.command {
        Some(Commands::Agent) | None => run_agent(cli.agent).await,
    }
}

/// Print every CRD the agent works with as a multi-document YAML stream
fn print_crds() -> anyhow::Result<()> {
    for crd in [
        XdpProgram::crd(),
        TcProgram::crd(),
        TracepointProgram::crd(),
        BpfProgram::crd(),
    ] {
        let yaml = serde_yaml::to_string(&crd)
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("---\n{yaml}");
    }
    Ok(())
}

/// Run the node agent until a shutdown signal arrives
async fn run_agent(args: AgentArgs) -> anyhow::Result<()> {
    let node_name = args
        .node_name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| anyhow::anyhow!("--node-name or KUBE_NODE_NAME must be set"))?;
    BpfProgram::validate_node_name(&node_name)?;

    tracing::info!(node = %node_name, "Starting bpfd agent");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let config = DaemonConfig {
        endpoint: args.bpfd_endpoint,
        connect_timeout: Duration::from_secs(args.connect_timeout_secs),
        request_timeout: Duration::from_secs(args.request_timeout_secs),
    };
    let daemon = GrpcDaemon::connect(&config, &RetryConfig::daemon_startup())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to bpfd: {}", e))?;

    tracing::info!("Starting controllers...");
    let controllers = build_controllers(client, Arc::new(daemon), &node_name);

    // Controllers stop together on SIGTERM/SIGINT
    futures::future::select_all(controllers).await;

    tracing::info!("bpfd agent shutting down");
    Ok(())
}
