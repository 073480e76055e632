use std::path::PathBuf;

use clap::Parser;
use log::{error, info};
use tilecast::config::{load_config, resolve_sources};
use tilecast::srv::new_server;
use tilecast::TilecastResult;

#[derive(Parser, Debug)]
#[command(about, version)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the configured listen address, e.g. 127.0.0.1:8080.
    #[arg(short, long)]
    listen: Option<String>,
}

#[actix_web::main]
async fn main() {
    let env = env_logger::Env::default().default_filter_or("tilecast=info,tilecast_core=info");
    env_logger::Builder::from_env(env).init();

    let args = Args::parse();
    if let Err(e) = start(args).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn start(args: Args) -> TilecastResult<()> {
    info!("Starting tilecast v{}", env!("CARGO_PKG_VERSION"));
    let mut config = load_config(&args.config)?;
    if let Some(listen) = args.listen {
        config.server.listen_addresses = Some(listen);
    }

    let registry = resolve_sources(&config).await?;
    info!(
        "Serving {} source(s): {}",
        registry.len(),
        registry.ids().join(", ")
    );

    let (server, listen_addresses) = new_server(&config, registry)?;
    info!("Listening on {listen_addresses}");
    server.await?;
    Ok(())
}
