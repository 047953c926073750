use axum::{Router, extract::Extension, routing::post};
use clap::{Args, Parser, Subcommand};
use shopping_cluster::config::ClusterConfig;
use shopping_cluster::node::{ReplicaNode, handlers as node_handlers};
use shopping_cluster::protocol::{ENDPOINT_MESSAGE, Endpoint, HttpTransport, Message, Transport, discover_router};
use shopping_cluster::router::{RouterService, handlers as router_handlers};
use shopping_cluster::storage::{DiskStore, KeyValueStore, MemoryStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shopping-cluster", about = "Replicated shopping-list store")]
struct Cli {
    #[command(flatten)]
    cluster: ClusterArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a router on one of the router ports.
    Router {
        #[arg(long, env = "SHOPPING_ROUTER_PORT")]
        port: u16,
    },
    /// Run a storage server.
    Server {
        #[arg(long, env = "SHOPPING_SERVER_ID")]
        id: u32,
        /// Join a running cluster instead of taking the bootstrap ring.
        #[arg(long)]
        join: bool,
        /// Keep lists on disk under this directory instead of in memory.
        #[arg(long, env = "SHOPPING_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },
    /// Ask the cluster to remove a server from the ring.
    Leave {
        #[arg(long)]
        id: u32,
    },
    /// Report which router port answers.
    Probe,
}

#[derive(Args, Debug)]
struct ClusterArgs {
    #[arg(long, global = true, env = "SHOPPING_HOST", default_value = "127.0.0.1")]
    host: String,
    #[arg(long, global = true, env = "SHOPPING_SERVER_BASE_PORT", default_value_t = 5000)]
    server_base_port: u16,
    #[arg(long, global = true, env = "SHOPPING_ROUTER_PORTS", value_delimiter = ',', default_values_t = [6001, 6002, 6003])]
    router_ports: Vec<u16>,
    #[arg(long, global = true, env = "SHOPPING_HASH_MODULUS", default_value_t = 1000)]
    hash_modulus: u64,
    #[arg(long, global = true, env = "SHOPPING_VIRTUAL_NODES", default_value_t = 3)]
    virtual_nodes: u32,
    #[arg(long, global = true, env = "SHOPPING_INITIAL_SERVERS", default_value_t = 4)]
    initial_servers: u32,
    #[arg(long, global = true, env = "SHOPPING_REPLICAS", default_value_t = 2)]
    replicas: usize,
    #[arg(long, global = true, env = "SHOPPING_FANOUT_CANDIDATES", default_value_t = 10)]
    fanout_candidates: usize,
    #[arg(long, global = true, env = "SHOPPING_PROBE_TIMEOUT_MS", default_value_t = 200)]
    probe_timeout_ms: u64,
    #[arg(long, global = true, env = "SHOPPING_DATA_TIMEOUT_MS", default_value_t = 1000)]
    data_timeout_ms: u64,
    #[arg(long, global = true, env = "SHOPPING_FANOUT_DEADLINE_MS", default_value_t = 10_000)]
    fanout_deadline_ms: u64,
    #[arg(long, global = true, env = "SHOPPING_REQUEST_DEADLINE_MS", default_value_t = 5000)]
    request_deadline_ms: u64,
    #[arg(long, global = true, env = "SHOPPING_JOIN_SETTLE_MS", default_value_t = 1000)]
    join_settle_ms: u64,
    /// Zero disables the hinted-handoff sweep.
    #[arg(long, global = true, env = "SHOPPING_HANDOFF_INTERVAL_MS", default_value_t = 10_000)]
    handoff_interval_ms: u64,
}

impl From<ClusterArgs> for ClusterConfig {
    fn from(args: ClusterArgs) -> Self {
        Self {
            host: args.host,
            server_base_port: args.server_base_port,
            router_ports: args.router_ports,
            hash_modulus: args.hash_modulus,
            virtual_nodes_per_server: args.virtual_nodes,
            initial_servers: args.initial_servers,
            replica_count: args.replicas,
            fanout_candidates: args.fanout_candidates,
            probe_timeout: Duration::from_millis(args.probe_timeout_ms),
            data_timeout: Duration::from_millis(args.data_timeout_ms),
            fanout_deadline: Duration::from_millis(args.fanout_deadline_ms),
            request_deadline: Duration::from_millis(args.request_deadline_ms),
            join_settle_delay: Duration::from_millis(args.join_settle_ms),
            handoff_interval: Duration::from_millis(args.handoff_interval_ms),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Arc::new(ClusterConfig::from(cli.cluster));
    let transport = Arc::new(HttpTransport::new(config.clone()));

    match cli.command {
        Command::Router { port } => run_router(port, config, transport).await,
        Command::Server { id, join, data_dir } => run_server(id, join, data_dir, config, transport).await,
        Command::Leave { id } => request_leave(id, &config, transport.as_ref()).await,
        Command::Probe => {
            let port = discover_router(transport.as_ref(), &config.router_ports, config.probe_timeout)
                .await
                .ok_or_else(|| anyhow::anyhow!("no router answered on {:?}", config.router_ports))?;
            println!("router on port {}", port);
            Ok(())
        }
    }
}

async fn run_router(port: u16, config: Arc<ClusterConfig>, transport: Arc<HttpTransport>) -> anyhow::Result<()> {
    let addr = config.router_bind_addr(port)?;
    let router = RouterService::new(port, config, transport);
    // A router started after membership changes must not serve the bootstrap ring.
    router.sync_from_peers().await;

    let app = Router::new()
        .route(ENDPOINT_MESSAGE, post(router_handlers::handle_message::<HttpTransport>))
        .layer(Extension(router));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Router listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn run_server(
    server_id: u32,
    join: bool,
    data_dir: Option<PathBuf>,
    config: Arc<ClusterConfig>,
    transport: Arc<HttpTransport>,
) -> anyhow::Result<()> {
    let store: Arc<dyn KeyValueStore> = match data_dir {
        Some(dir) => Arc::new(DiskStore::open(dir)?),
        None => Arc::new(MemoryStore::new()),
    };
    let addr = config.server_bind_addr(server_id)?;
    let node = ReplicaNode::new(server_id, config, store, transport);

    let app = Router::new()
        .route(ENDPOINT_MESSAGE, post(node_handlers::handle_message::<HttpTransport>))
        .layer(Extension(node.clone()));

    // Listen before announcing ourselves: the router pushes the ring right after a join.
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server {} listening on {}", server_id, addr);
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    let router_port = node.enter_cluster(join).await?;
    tracing::info!("Server {} registered with router :{}", server_id, router_port);
    node.start_handoff_loop();

    server.await??;
    Ok(())
}

async fn request_leave<T: Transport>(server_id: u32, config: &ClusterConfig, transport: &T) -> anyhow::Result<()> {
    let port = discover_router(transport, &config.router_ports, config.probe_timeout)
        .await
        .ok_or_else(|| anyhow::anyhow!("no router answered on {:?}", config.router_ports))?;

    let request = Message::LeaveHashRing { server_id };
    match transport.send(Endpoint::Router(port), &request, config.data_timeout).await? {
        Message::Ack { detail } => {
            tracing::info!("{}", detail);
            Ok(())
        }
        other => Err(anyhow::anyhow!("router refused leave: {:?}", other)),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
