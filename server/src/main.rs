use clap::Parser;
use log::info;
use server::network::Server;
use shared::config::NetConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Simulation ticks per second
    #[arg(short, long)]
    tick_rate: Option<u32>,

    /// Character template every joining player gets
    #[arg(long)]
    character: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => NetConfig::load(path)?,
        None => NetConfig::default(),
    }
    .server;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(tick_rate) = args.tick_rate {
        config.tick_rate = tick_rate;
    }
    if let Some(character) = args.character {
        config.character = character;
    }

    info!(
        "Starting server on port {} at {}Hz, players spawn as '{}'",
        config.port, config.tick_rate, config.character
    );

    let mut server = Server::new(&config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
