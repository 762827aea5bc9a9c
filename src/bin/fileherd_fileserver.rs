//! fileherd file server -- serves a local directory and stays registered
//! with the controller while running.

use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "fileherd-fileserver",
    version,
    about = "Directory and file server for fileherd"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "fileherd.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the address announced to the controller.
    #[arg(long)]
    advertise: Option<String>,

    /// Override the controller registration address.
    #[arg(long)]
    controller: Option<String>,

    /// Override the root directory.
    #[arg(long)]
    root_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = fileherd::config::load_config(&cli.config)?;
    if let Some(bind) = cli.bind {
        let (host, port) = bind
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("--bind must be host:port, got {bind}"))?;
        config.fileserver.host = host.to_string();
        config.fileserver.port = port.parse()?;
    }
    if cli.advertise.is_some() {
        config.fileserver.advertise = cli.advertise;
    }
    if let Some(controller) = cli.controller {
        config.fileserver.controller = controller;
    }
    if let Some(root_dir) = cli.root_dir {
        config.fileserver.root_dir = root_dir;
    }

    fileherd::logging::init_tracing(&config.logging);
    info!("Loaded configuration from {}", cli.config);

    let server = fileherd::fileserver::start(&config.fileserver).await?;
    info!(
        "fileherd file server listening on {} as {}",
        server.addr(),
        server.advertise()
    );

    fileherd::server::shutdown_signal().await;
    server.stop().await?;

    info!("fileherd file server shut down");
    Ok(())
}
