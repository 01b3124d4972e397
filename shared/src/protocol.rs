//! Wire protocol: the closed set of events exchanged between peers and their
//! fixed binary layout.
//!
//! Every datagram starts with a big-endian `u16` event tag followed by the
//! variant's fields in declaration order. Fields are fixed width with no
//! padding, no length prefixes and no version field. The body is written with
//! bincode configured for fixed-width big-endian integers, which lays structs
//! out exactly as consecutive fields.

use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;
use thiserror::Error;

/// Identifies a match instance on the server
pub type GameId = u16;
/// Seat of a character inside a game container
pub type SlotId = u8;

/// Slot id meaning "not yet assigned by the server"
pub const UNASSIGNED_SLOT: SlotId = 255;
/// Game id half of the shutdown sentinel
pub const SHUTDOWN_GAME_ID: GameId = 65535;
/// Slot id half of the shutdown sentinel
pub const SHUTDOWN_SLOT: SlotId = 255;

/// Failures while decoding a datagram
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("packet too short to carry an event tag ({0} bytes)")]
    Truncated(usize),
    #[error("event tag 0 is reserved")]
    ReservedTag,
    #[error("unknown event tag {0}")]
    UnknownTag(u16),
    #[error("invalid team value {0}")]
    InvalidTeam(u8),
    #[error("malformed event body: {0}")]
    Malformed(#[from] bincode::Error),
}

/// Team a character plays for. `Any` is only valid in a connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Team {
    None,
    One,
    Two,
    Any,
}

impl Team {
    /// The team a character fights against
    pub fn opponent(self) -> Team {
        match self {
            Team::One => Team::Two,
            Team::Two => Team::One,
            other => other,
        }
    }
}

impl From<Team> for u8 {
    fn from(team: Team) -> u8 {
        match team {
            Team::None => 0,
            Team::One => 1,
            Team::Two => 2,
            Team::Any => 3,
        }
    }
}

impl TryFrom<u8> for Team {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Team::None),
            1 => Ok(Team::One),
            2 => Ok(Team::Two),
            3 => Ok(Team::Any),
            other => Err(ProtocolError::InvalidTeam(other)),
        }
    }
}

impl FromStr for Team {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" | "3" => Ok(Team::Any),
            "one" | "1" => Ok(Team::One),
            "two" | "2" => Ok(Team::Two),
            other => Err(format!("unknown team '{}', expected any, one or two", other)),
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Team::None => "none",
            Team::One => "one",
            Team::Two => "two",
            Team::Any => "any",
        };
        f.write_str(name)
    }
}

/// Wire tag of each event variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EventType {
    Nop = 0,
    Connect = 1,
    Disconnect = 2,
    GameFull = 3,
    Move = 4,
    Damage = 5,
    AutoAttack = 6,
}

impl EventType {
    /// Number of known variants; tags at or above this are rejected
    pub const COUNT: u16 = 7;
}

impl TryFrom<u16> for EventType {
    type Error = ProtocolError;

    fn try_from(tag: u16) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(EventType::Nop),
            1 => Ok(EventType::Connect),
            2 => Ok(EventType::Disconnect),
            3 => Ok(EventType::GameFull),
            4 => Ok(EventType::Move),
            5 => Ok(EventType::Damage),
            6 => Ok(EventType::AutoAttack),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

/// A peer asks to join a game, or the server announces a join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectEvent {
    pub ip: u32,
    pub port: u16,
    pub game_id: GameId,
    pub char_id: SlotId,
    pub team: Team,
}

impl ConnectEvent {
    /// Address the peer claims as its identity
    pub fn sender(&self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.ip), self.port)
    }

    /// Copy with address and port zeroed, as relayed to other peers
    pub fn masked(&self) -> Self {
        Self {
            ip: 0,
            port: 0,
            ..*self
        }
    }
}

/// A peer leaves its game. Also carries the server shutdown sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectEvent {
    pub ip: u32,
    pub port: u16,
    pub game_id: GameId,
    pub char_id: SlotId,
}

impl DisconnectEvent {
    pub fn sender(&self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.ip), self.port)
    }

    pub fn masked(&self) -> Self {
        Self {
            ip: 0,
            port: 0,
            ..*self
        }
    }

    /// The event that asks a server to stop its loop
    pub fn shutdown() -> Self {
        Self {
            ip: 0,
            port: 0,
            game_id: SHUTDOWN_GAME_ID,
            char_id: SHUTDOWN_SLOT,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.game_id == SHUTDOWN_GAME_ID && self.char_id == SHUTDOWN_SLOT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameFullEvent {
    pub game_id: GameId,
}

/// A character starts moving from `pos` towards `target` (tile units)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveEvent {
    pub game_id: GameId,
    pub char_id: SlotId,
    pub target: (f32, f32),
    pub pos: (f32, f32),
}

/// Authoritative health of a character after an attack landed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageEvent {
    pub game_id: GameId,
    pub char_id: SlotId,
    pub hp: f32,
}

/// `char_id` starts (or with `cancel`, stops) auto-attacking `target_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoAttackEvent {
    pub game_id: GameId,
    pub char_id: SlotId,
    pub target_id: SlotId,
    pub cancel: bool,
}

/// One message of the protocol vocabulary
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Nop,
    Connect(ConnectEvent),
    Disconnect(DisconnectEvent),
    GameFull(GameFullEvent),
    Move(MoveEvent),
    Damage(DamageEvent),
    AutoAttack(AutoAttackEvent),
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::Nop => EventType::Nop,
            Event::Connect(_) => EventType::Connect,
            Event::Disconnect(_) => EventType::Disconnect,
            Event::GameFull(_) => EventType::GameFull,
            Event::Move(_) => EventType::Move,
            Event::Damage(_) => EventType::Damage,
            Event::AutoAttack(_) => EventType::AutoAttack,
        }
    }

    /// Game the event belongs to, if the variant carries one
    pub fn game_id(&self) -> Option<GameId> {
        match self {
            Event::Nop => None,
            Event::Connect(e) => Some(e.game_id),
            Event::Disconnect(e) => Some(e.game_id),
            Event::GameFull(e) => Some(e.game_id),
            Event::Move(e) => Some(e.game_id),
            Event::Damage(e) => Some(e.game_id),
            Event::AutoAttack(e) => Some(e.game_id),
        }
    }

    /// Overwrites the game id and subject slot of variants that carry both
    pub fn stamp(&mut self, game_id: GameId, char_id: SlotId) {
        match self {
            Event::Connect(e) => {
                e.game_id = game_id;
                e.char_id = char_id;
            }
            Event::Disconnect(e) => {
                e.game_id = game_id;
                e.char_id = char_id;
            }
            Event::Move(e) => {
                e.game_id = game_id;
                e.char_id = char_id;
            }
            Event::Damage(e) => {
                e.game_id = game_id;
                e.char_id = char_id;
            }
            Event::AutoAttack(e) => {
                e.game_id = game_id;
                e.char_id = char_id;
            }
            Event::GameFull(e) => e.game_id = game_id,
            Event::Nop => {}
        }
    }
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_big_endian()
        .allow_trailing_bytes()
}

/// Serializes an event into a datagram payload
pub fn encode(event: &Event) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::with_capacity(20);
    buf.extend_from_slice(&(event.event_type() as u16).to_be_bytes());

    let options = wire_options();
    match event {
        Event::Nop => {}
        Event::Connect(e) => options.serialize_into(&mut buf, e)?,
        Event::Disconnect(e) => options.serialize_into(&mut buf, e)?,
        Event::GameFull(e) => options.serialize_into(&mut buf, e)?,
        Event::Move(e) => options.serialize_into(&mut buf, e)?,
        Event::Damage(e) => options.serialize_into(&mut buf, e)?,
        Event::AutoAttack(e) => options.serialize_into(&mut buf, e)?,
    }

    Ok(buf)
}

/// Parses a datagram payload. Tag 0 and unknown tags are rejected, as is any
/// body too short for its variant.
pub fn decode(bytes: &[u8]) -> Result<Event, ProtocolError> {
    if bytes.len() < 2 {
        return Err(ProtocolError::Truncated(bytes.len()));
    }

    let tag = u16::from_be_bytes([bytes[0], bytes[1]]);
    if tag >= EventType::COUNT {
        return Err(ProtocolError::UnknownTag(tag));
    }

    let body = &bytes[2..];
    let options = wire_options();
    let event = match EventType::try_from(tag)? {
        EventType::Nop => return Err(ProtocolError::ReservedTag),
        EventType::Connect => Event::Connect(options.deserialize(body)?),
        EventType::Disconnect => Event::Disconnect(options.deserialize(body)?),
        EventType::GameFull => Event::GameFull(options.deserialize(body)?),
        EventType::Move => Event::Move(options.deserialize(body)?),
        EventType::Damage => Event::Damage(options.deserialize(body)?),
        EventType::AutoAttack => Event::AutoAttack(options.deserialize(body)?),
    };

    Ok(event)
}
