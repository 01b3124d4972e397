//! # Shared Netcode Library
//!
//! Everything both the server and the client need to play a match: the wire
//! protocol, the UDP transport, and the simulation that runs identically on
//! both sides.
//!
//! ## Module Organization
//!
//! ### Protocol (`protocol`)
//! The closed set of events peers exchange and their fixed big-endian binary
//! layout. Malformed datagrams decode to an error and are dropped by the
//! transport.
//!
//! ### Transport (`network`)
//! One UDP socket per process. A spawned receive task decodes datagrams into
//! an unbounded channel that the simulation loop polls without blocking.
//! Log lines carry the process role as their target.
//!
//! ### Simulation (`game`, `attack`, `pathfinding`, `navigation`)
//! A game container per match holds characters and in-flight attacks. Each
//! character moves along breadth-first routes over the walkable-tile graph and
//! auto-attacks enemies through animation-timed target attacks.
//!
//! ### Static data (`game_map`, `character`, `config`)
//! The tile map with spawn points, character stat templates and the JSON
//! configuration of both binaries.
//!
//! ## Units
//!
//! Positions are in tiles: tile `(x, y)` is centred on the point `(x, y)`.
//! Pixel sizes only matter to a renderer.

pub mod attack;
pub mod character;
pub mod config;
pub mod game;
pub mod game_map;
pub mod math;
pub mod navigation;
pub mod network;
pub mod pathfinding;
pub mod protocol;

pub use character::{CharacterCatalog, CharacterRoster, CharacterTemplate};
pub use config::NetConfig;
pub use game::{Authority, GameContainer};
pub use game_map::GameMap;
pub use math::Vec2;
pub use network::{NetError, NetworkManager, Role};
pub use protocol::{Event, GameId, SlotId, Team};

/// UDP port servers listen on unless configured otherwise
pub const DEFAULT_PORT: u16 = 49518;
