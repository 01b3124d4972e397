//! # Game Server Library
//!
//! The authoritative side of the netcode. One UDP socket serves any number of
//! games; each game is a server-authority container that owns slot
//! allocation, team balancing and the outcome of every attack.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! Tracks which announced peer address sits in which (game, slot) seat:
//! - Connect handling with duplicate detection and lazy game creation
//! - Team assignment through the game container, GameFull on rejection
//! - Disconnects honoured only when address, port, game and slot all match
//! - Relaying Move and AutoAttack to the other peers of a game
//! - Broadcasting the Damage events the simulation triggers
//!
//! ### Network Module (`network`)
//! The server loop: drain the inbound queue, handle each event, tick every
//! game, flush the queued replies. A Disconnect carrying game 65535 and
//! slot 255 stops the loop after the batch it arrived in.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::config::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(&ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod session;
