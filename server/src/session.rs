//! Session registry and team assignment for the authoritative server
//!
//! This module tracks which network peer sits in which seat of which game and
//! owns the server-side game containers. It handles:
//! - Joining: duplicate detection, lazy game creation, team balancing
//! - Leaving: credential checks and seat cleanup
//! - Relaying gameplay events between the peers of one game
//! - The shutdown sentinel that stops the server loop
//!
//! The registry never touches the socket. Every reply it wants sent is pushed
//! onto an outgoing list that the server loop flushes after each batch.

use log::{debug, error, info, warn};
use shared::character::CharacterCatalog;
use shared::game::{Authority, GameContainer};
use shared::game_map::GameMap;
use shared::protocol::{
    ConnectEvent, DisconnectEvent, Event, GameFullEvent, GameId, SlotId, Team, UNASSIGNED_SLOT,
};
use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::sync::Arc;

/// Log target of every registry message
const LOG_TARGET: &str = "server";

/// Session-level identity of a seated peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub game_id: GameId,
    pub slot: SlotId,
}

/// A peer seated in a game
///
/// The address is the identity the peer announced in its Connect. It is
/// where replies and broadcasts go, and a Disconnect must repeat it exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    /// Announced address and port
    pub addr: SocketAddrV4,
    /// Game the peer plays in
    pub game_id: GameId,
    /// Seat inside that game
    pub slot: SlotId,
    /// Team the server assigned
    pub team: Team,
}

/// One datagram the registry wants sent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outgoing {
    pub event: Event,
    pub to: SocketAddrV4,
}

/// Whether the server loop should keep going after the current batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Shutdown,
}

/// Peers and game containers of one server process
///
/// Every joining peer receives the same character template, looked up by
/// name in the catalog; the Connect event carries no character choice.
pub struct SessionRegistry<C: CharacterCatalog> {
    /// Map every new game is played on
    map: Arc<GameMap>,
    /// Source of character templates
    catalog: C,
    /// Template name handed to joining peers
    character: String,
    /// Seated peers by (game, slot)
    peers: HashMap<PeerKey, Peer>,
    /// Authoritative containers by game id, created on first join
    games: HashMap<GameId, GameContainer>,
}

impl<C: CharacterCatalog> SessionRegistry<C> {
    /// Creates an empty registry
    ///
    /// Logs a warning when `character` is missing from the catalog; every
    /// join is then answered with GameFull.
    pub fn new(map: Arc<GameMap>, catalog: C, character: impl Into<String>) -> Self {
        let character = character.into();
        if catalog.template(&character).is_none() {
            warn!(target: LOG_TARGET, "Unknown character template '{}'", character);
        }

        Self {
            map,
            catalog,
            character,
            peers: HashMap::new(),
            games: HashMap::new(),
        }
    }

    /// Processes one inbound event
    ///
    /// Replies and broadcasts are appended to `out`. Returns
    /// [`Control::Shutdown`] for the shutdown sentinel; the caller is expected
    /// to finish its current batch before stopping.
    pub fn handle(&mut self, event: Event, out: &mut Vec<Outgoing>) -> Control {
        match event {
            Event::Connect(connect) => self.connect(connect, out),
            Event::Disconnect(disconnect) if disconnect.is_shutdown() => {
                info!(target: LOG_TARGET, "Shutdown requested");
                return Control::Shutdown;
            }
            Event::Disconnect(disconnect) => self.disconnect(disconnect, out),
            Event::Move(_) | Event::AutoAttack(_) => self.relay(event, out),
            Event::Damage(damage) => {
                debug!(
                    target: LOG_TARGET,
                    "Ignoring client damage for game {} slot {}", damage.game_id, damage.char_id
                );
            }
            Event::GameFull(_) | Event::Nop => {
                warn!(target: LOG_TARGET, "Unexpected {:?} from a client", event.event_type());
            }
        }
        Control::Continue
    }

    /// Seats a new peer, or answers GameFull
    ///
    /// The requester gets its Connect back stamped with team and slot. Peers
    /// already in the game get a copy with the address masked out; the
    /// newcomer is not told about them.
    fn connect(&mut self, connect: ConnectEvent, out: &mut Vec<Outgoing>) {
        let addr = connect.sender();
        if let Some(peer) = self.find_by_addr(addr) {
            warn!(
                target: LOG_TARGET,
                "{} is already in game {} slot {}, ignoring connect", addr, peer.game_id, peer.slot
            );
            return;
        }

        let full = Outgoing {
            event: Event::GameFull(GameFullEvent {
                game_id: connect.game_id,
            }),
            to: addr,
        };
        let Some(template) = self.catalog.template(&self.character) else {
            error!(
                target: LOG_TARGET,
                "Cannot seat {}: no character template '{}'", addr, self.character
            );
            out.push(full);
            return;
        };

        let game_id = connect.game_id;
        let map = &self.map;
        let game = self.games.entry(game_id).or_insert_with(|| {
            info!(target: LOG_TARGET, "Creating game {}", game_id);
            GameContainer::new(Arc::clone(map), game_id, Authority::Server)
        });

        let Some(admission) = game.add(template, connect.team, UNASSIGNED_SLOT) else {
            info!(
                target: LOG_TARGET,
                "Game {} has no room on team {} for {}", game_id, connect.team, addr
            );
            out.push(full);
            return;
        };

        let reply = ConnectEvent {
            char_id: admission.slot,
            team: admission.team,
            ..connect
        };
        out.push(Outgoing {
            event: Event::Connect(reply),
            to: addr,
        });
        let announce = Event::Connect(reply.masked());
        for peer in self.peers_in(game_id) {
            out.push(Outgoing {
                event: announce,
                to: peer.addr,
            });
        }

        self.peers.insert(
            PeerKey {
                game_id,
                slot: admission.slot,
            },
            Peer {
                addr,
                game_id,
                slot: admission.slot,
                team: admission.team,
            },
        );
        info!(
            target: LOG_TARGET,
            "{} joined game {} as slot {} on team {}", addr, game_id, admission.slot, admission.team
        );
    }

    /// Unseats a peer whose credentials match the record exactly
    fn disconnect(&mut self, disconnect: DisconnectEvent, out: &mut Vec<Outgoing>) {
        let key = PeerKey {
            game_id: disconnect.game_id,
            slot: disconnect.char_id,
        };
        match self.peers.get(&key) {
            Some(peer) if peer.addr == disconnect.sender() => {}
            Some(peer) => {
                warn!(
                    target: LOG_TARGET,
                    "Disconnect for game {} slot {} from {} does not match {}",
                    key.game_id,
                    key.slot,
                    disconnect.sender(),
                    peer.addr
                );
                return;
            }
            None => {
                warn!(
                    target: LOG_TARGET,
                    "Disconnect for unknown game {} slot {}", key.game_id, key.slot
                );
                return;
            }
        }

        self.peers.remove(&key);
        if let Some(game) = self.games.get_mut(&key.game_id) {
            game.remove(key.slot);
        }

        let announce = Event::Disconnect(disconnect.masked());
        for peer in self.peers_in(key.game_id) {
            out.push(Outgoing {
                event: announce,
                to: peer.addr,
            });
        }
        info!(
            target: LOG_TARGET,
            "{} left game {} slot {}",
            disconnect.sender(),
            key.game_id,
            key.slot
        );
    }

    /// Applies a Move or AutoAttack to the server container and forwards it
    /// to the other peers of the game
    fn relay(&mut self, event: Event, out: &mut Vec<Outgoing>) {
        let (game_id, slot) = match event {
            Event::Move(e) => (e.game_id, e.char_id),
            Event::AutoAttack(e) => (e.game_id, e.char_id),
            _ => return,
        };
        if !self.peers.contains_key(&PeerKey { game_id, slot }) {
            warn!(
                target: LOG_TARGET,
                "{:?} for unknown game {} slot {}",
                event.event_type(),
                game_id,
                slot
            );
            return;
        }

        let Some(game) = self.games.get_mut(&game_id) else {
            return;
        };
        if !game.apply(&event) {
            debug!(
                target: LOG_TARGET,
                "Game {} rejected {:?} from slot {}",
                game_id,
                event.event_type(),
                slot
            );
            return;
        }

        for peer in self.peers_in(game_id).filter(|peer| peer.slot != slot) {
            out.push(Outgoing {
                event,
                to: peer.addr,
            });
        }
    }

    /// Advances every game by `dt` seconds and broadcasts what their attacks
    /// triggered to every peer of that game
    pub fn tick(&mut self, dt: f32, out: &mut Vec<Outgoing>) {
        for (&game_id, game) in self.games.iter_mut() {
            for event in game.update(dt) {
                for peer in self.peers.values().filter(|peer| peer.game_id == game_id) {
                    out.push(Outgoing {
                        event,
                        to: peer.addr,
                    });
                }
            }
        }
    }

    /// Finds the seated peer that announced `addr`
    pub fn find_by_addr(&self, addr: SocketAddrV4) -> Option<&Peer> {
        self.peers.values().find(|peer| peer.addr == addr)
    }

    /// All peers seated in `game_id`
    pub fn peers_in(&self, game_id: GameId) -> impl Iterator<Item = &Peer> + '_ {
        self.peers
            .values()
            .filter(move |peer| peer.game_id == game_id)
    }

    pub fn peer(&self, game_id: GameId, slot: SlotId) -> Option<&Peer> {
        self.peers.get(&PeerKey { game_id, slot })
    }

    pub fn game(&self, game_id: GameId) -> Option<&GameContainer> {
        self.games.get(&game_id)
    }

    /// Returns the number of seated peers across all games
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
