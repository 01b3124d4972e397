//! Asks a running server to stop by sending it the shutdown sentinel.

use clap::Parser;
use log::info;
use shared::network::{NetworkManager, Role};
use shared::protocol::{DisconnectEvent, Event};
use shared::DEFAULT_PORT;
use std::net::{Ipv4Addr, SocketAddrV4};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: Ipv4Addr,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let server = SocketAddrV4::new(args.host, args.port);
    let network = NetworkManager::bind(Role::Client, 0).await?;
    network
        .send(&Event::Disconnect(DisconnectEvent::shutdown()), server)
        .await?;

    info!("Shutdown request sent to {}", server);
    Ok(())
}
