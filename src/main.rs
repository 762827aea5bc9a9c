//! fileherd controller -- file server membership and file placement.
//!
//! Nothing is persisted: every start begins with an empty membership and
//! an empty file registry, and file servers re-register on their own.

use clap::Parser;
use tracing::info;

/// Command-line arguments for the controller.
#[derive(Parser, Debug)]
#[command(
    name = "fileherd-controller",
    version,
    about = "File server membership and file placement"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "fileherd.yaml")]
    config: String,

    /// Override the bind host for both listeners.
    #[arg(long)]
    host: Option<String>,

    /// Override the client RPC port.
    #[arg(long)]
    rpc_port: Option<u16>,

    /// Override the registration port.
    #[arg(long)]
    register_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = fileherd::config::load_config(&cli.config)?;
    if let Some(host) = cli.host {
        config.controller.host = host;
    }
    if let Some(port) = cli.rpc_port {
        config.controller.rpc_port = port;
    }
    if let Some(port) = cli.register_port {
        config.controller.register_port = port;
    }

    fileherd::logging::init_tracing(&config.logging);
    info!("Loaded configuration from {}", cli.config);

    if config.observability.metrics {
        fileherd::metrics::init_metrics();
        fileherd::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let server = fileherd::server::start_controller(&config).await?;
    info!(
        "fileherd controller serving RPC on {} and registrations on {}",
        server.rpc_addr(),
        server.register_addr()
    );

    fileherd::server::shutdown_signal().await;
    server.shutdown().await?;

    info!("fileherd controller shut down");
    Ok(())
}
