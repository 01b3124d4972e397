use clap::Parser;
use client::bot::Bot;
use client::network::Client;
use log::{info, warn};
use shared::config::NetConfig;
use shared::protocol::{GameId, Team};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server address
    #[arg(short = 'H', long)]
    host: Option<Ipv4Addr>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Game to join
    #[arg(short, long)]
    game: Option<GameId>,

    /// Team to request: any, one or two
    #[arg(short, long)]
    team: Option<Team>,

    /// Leave after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Character template the local mirror simulates, as configured on the server
    #[arg(long)]
    character: Option<String>,

    /// Seed for the bot's decisions
    #[arg(long)]
    seed: Option<u64>,
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
    .client;
    if let Some(host) = args.host {
        config.target.address = host;
    }
    if let Some(port) = args.port {
        config.target.port = port;
    }
    if let Some(game) = args.game {
        config.target.game = game;
    }
    if let Some(team) = args.team {
        config.team = team;
    }
    if let Some(character) = args.character {
        config.character = character;
    }

    let server = SocketAddrV4::new(config.target.address, config.target.port);
    info!(
        "Joining game {} on {} (team {})",
        config.target.game, server, config.team
    );

    let mut client = Client::new(&config).await?;
    let mut bot = Bot::new(args.seed);
    let duration = args.duration.map(Duration::from_secs);

    let interrupted = tokio::select! {
        result = client.run(server, config.target.game, &mut bot, duration) => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };

    if interrupted {
        info!("Received Ctrl+C, leaving");
        if let Err(e) = client.disconnect().await {
            warn!("Could not announce the disconnect: {}", e);
        }
    }

    client.shutdown().await;
    Ok(())
}
