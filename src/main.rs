use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sentinel_lite::config::{
    FolderConfig, ManagerConfig, NodeConfig, SandboxConfig, StorageConfig, TenancyConfig,
    DEFAULT_MAX_HISTORY_SIZE,
};
use sentinel_lite::node::Node;
use sentinel_lite::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "sentinel-lite")]
#[command(version)]
#[command(about = "A multi-tenant job server with per-owner queue isolation")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the job server
    Server(ServerArgs),
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value = "8188")]
    port: u16,

    /// JSON file with registered users and pre-issued tokens
    #[arg(long)]
    users_file: Option<PathBuf>,

    /// Disable owner isolation; every caller shares the public namespace
    #[arg(long)]
    no_multi_tenant: bool,

    /// Allow every user onto the manager routes
    #[arg(long)]
    no_manager_admin_only: bool,

    /// Maximum number of completed jobs kept in history
    #[arg(long, default_value_t = DEFAULT_MAX_HISTORY_SIZE)]
    max_history: usize,

    /// Root directory for job inputs
    #[arg(long, default_value = "input")]
    input_dir: PathBuf,

    /// Root directory for job outputs
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Root directory for temporary artifacts
    #[arg(long, default_value = "temp")]
    temp_dir: PathBuf,

    /// Run jobs in Docker using this image (payload field `command`).
    /// Without it jobs complete immediately and echo their payload.
    #[arg(long)]
    image: Option<String>,

    /// How long the worker waits on an empty queue between shutdown checks
    #[arg(long, default_value = "1000")]
    worker_poll_ms: u64,
}

impl ServerArgs {
    fn into_config(self) -> Result<NodeConfig, Box<dyn std::error::Error>> {
        let listen_addr: SocketAddr = format!("{}:{}", self.host, self.port).parse()?;

        Ok(NodeConfig {
            listen_addr,
            users_file: self.users_file,
            worker_poll_ms: self.worker_poll_ms,
            sandbox: self.image.map(|image| SandboxConfig {
                image,
                ..SandboxConfig::default()
            }),
            tenancy: TenancyConfig {
                enabled: !self.no_multi_tenant,
                max_history_size: self.max_history,
            },
            storage: StorageConfig {
                input_root: self.input_dir,
                output_root: self.output_dir,
                temp_root: self.temp_dir,
                ..StorageConfig::default()
            },
            folders: FolderConfig {
                enabled: !self.no_multi_tenant,
                ..FolderConfig::default()
            },
            manager: ManagerConfig {
                enabled: !self.no_manager_admin_only,
                ..ManagerConfig::default()
            },
        })
    }
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.into_config()?;
    let node = Node::from_config(config)?;
    let shutdown = install_shutdown_handler();

    node.run(shutdown).await?;
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
    }

    Ok(())
}
