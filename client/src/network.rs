//! Headless game client: joins a game, mirrors it locally and plays through a
//! bot controller

use crate::bot::{Action, Bot};
use log::{debug, info, trace, warn};
use shared::character::{CharacterCatalog, CharacterRoster};
use shared::config::ClientConfig;
use shared::game::{Authority, GameContainer};
use shared::game_map::GameMap;
use shared::math::Vec2;
use shared::network::{NetError, NetworkManager, Role};
use shared::protocol::{
    AutoAttackEvent, ConnectEvent, Event, GameId, MoveEvent, SlotId, Team, UNASSIGNED_SLOT,
};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

const LOG_TARGET: &str = "client";

/// Where the client stands with its server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Joining,
    Playing { game_id: GameId, slot: SlotId },
    /// The server answered GameFull
    Rejected,
}

pub struct Client {
    network: NetworkManager,
    map: Arc<GameMap>,
    roster: CharacterRoster,
    character: String,
    team: Team,
    state: ConnectionState,
    game: Option<GameContainer>,

    shutdown_tx: watch::Sender<bool>,
    receiver: JoinHandle<()>,
}

impl Client {
    /// Binds the configured local port on all interfaces
    pub async fn new(config: &ClientConfig) -> Result<Self, NetError> {
        Self::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port)), config).await
    }

    pub async fn bind(addr: SocketAddr, config: &ClientConfig) -> Result<Self, NetError> {
        let network = NetworkManager::bind_addr(Role::Client, addr)
            .await?
            .with_public_address(config.public_address);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let receiver = network.spawn_receiver(shutdown_rx);

        Ok(Client {
            network,
            map: Arc::new(GameMap::arena()),
            roster: CharacterRoster::builtin(),
            character: config.character.clone(),
            team: config.team,
            state: ConnectionState::Idle,
            game: None,
            shutdown_tx,
            receiver,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        self.network.local_addr()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Local mirror of the joined game
    pub fn game(&self) -> Option<&GameContainer> {
        self.game.as_ref()
    }

    pub fn slot(&self) -> Option<SlotId> {
        match self.state {
            ConnectionState::Playing { slot, .. } => Some(slot),
            _ => None,
        }
    }

    /// Asks `server` for a seat in `game_id`
    pub async fn connect(&mut self, server: SocketAddrV4, game_id: GameId) -> Result<(), NetError> {
        self.game = None;
        self.state = ConnectionState::Joining;
        self.network
            .connect_to_server(server, game_id, self.team)
            .await
    }

    /// Applies everything received since the last call. Returns how many
    /// events were handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.network.poll_event() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Connect(connect) if self.network.is_own_connect(&connect) => {
                self.joined(connect)
            }
            Event::Connect(connect) => {
                let Some(template) = self.roster.template(&self.character) else {
                    return;
                };
                let Some(game) = self
                    .game
                    .as_mut()
                    .filter(|game| game.game_id() == connect.game_id)
                else {
                    return;
                };
                if game.add(template, connect.team, connect.char_id).is_some() {
                    info!(
                        target: LOG_TARGET,
                        "Slot {} joined team {}", connect.char_id, connect.team
                    );
                }
            }
            Event::Disconnect(disconnect) => {
                if let Some(game) = self.game_for(disconnect.game_id) {
                    if game.remove(disconnect.char_id).is_some() {
                        info!(target: LOG_TARGET, "Slot {} left", disconnect.char_id);
                    }
                }
            }
            Event::GameFull(full) => {
                warn!(target: LOG_TARGET, "Game {} is full", full.game_id);
                self.state = ConnectionState::Rejected;
            }
            Event::Move(_) | Event::Damage(_) | Event::AutoAttack(_) => {
                let Some(game_id) = event.game_id() else {
                    return;
                };
                if let Some(game) = self.game_for(game_id) {
                    if !game.apply(&event) {
                        trace!(target: LOG_TARGET, "Ignored {:?}", event);
                    }
                }
            }
            Event::Nop => {}
        }
    }

    /// The server's answer to this client's own Connect
    fn joined(&mut self, connect: ConnectEvent) {
        if self.state != ConnectionState::Joining {
            debug!(target: LOG_TARGET, "Duplicate join confirmation ignored");
            return;
        }
        let Some(template) = self.roster.template(&self.character) else {
            warn!(target: LOG_TARGET, "No character template '{}'", self.character);
            return;
        };

        let mut game = GameContainer::new(Arc::clone(&self.map), connect.game_id, Authority::Client);
        if game.add(template, connect.team, connect.char_id).is_none() {
            warn!(
                target: LOG_TARGET,
                "Server assigned unusable slot {}", connect.char_id
            );
            return;
        }

        self.network.set_slot(connect.char_id);
        self.state = ConnectionState::Playing {
            game_id: connect.game_id,
            slot: connect.char_id,
        };
        self.game = Some(game);
        info!(
            target: LOG_TARGET,
            "Joined game {} as slot {} on team {}", connect.game_id, connect.char_id, connect.team
        );
    }

    fn game_for(&mut self, game_id: GameId) -> Option<&mut GameContainer> {
        self.game.as_mut().filter(|game| game.game_id() == game_id)
    }

    /// Advances the local mirror. Attack results are the server's call, so
    /// whatever the mirror triggers is dropped here.
    pub fn update(&mut self, dt: f32) {
        if let Some(game) = self.game.as_mut() {
            for event in game.update(dt) {
                trace!(target: LOG_TARGET, "Predicted {:?}", event);
            }
        }
    }

    /// Sends an action of this client's character to the server and applies
    /// it locally through the inbound queue
    pub async fn perform(&mut self, mut event: Event) -> Result<(), NetError> {
        let ConnectionState::Playing { game_id, slot } = self.state else {
            return Err(NetError::NoServer);
        };
        event.stamp(game_id, slot);
        self.network.send_to_server(&event).await?;
        self.network.send_self(event);
        Ok(())
    }

    pub async fn move_to(&mut self, target: Vec2) -> Result<(), NetError> {
        let pos = self
            .slot()
            .and_then(|slot| self.game.as_ref()?.character(slot))
            .map(|character| character.pos())
            .unwrap_or(target);
        self.perform(Event::Move(MoveEvent {
            game_id: 0,
            char_id: UNASSIGNED_SLOT,
            target: target.into(),
            pos: pos.into(),
        }))
        .await
    }

    pub async fn auto_attack(&mut self, target: SlotId, cancel: bool) -> Result<(), NetError> {
        self.perform(Event::AutoAttack(AutoAttackEvent {
            game_id: 0,
            char_id: UNASSIGNED_SLOT,
            target_id: target,
            cancel,
        }))
        .await
    }

    /// Leaves the current game
    pub async fn disconnect(&mut self) -> Result<(), NetError> {
        self.state = ConnectionState::Idle;
        self.game = None;
        self.network.disconnect().await
    }

    /// Joins `game_id` on `server` and lets `bot` play until `duration` runs
    /// out (forever without one) or the server turns the client away
    pub async fn run(
        &mut self,
        server: SocketAddrV4,
        game_id: GameId,
        bot: &mut Bot,
        duration: Option<Duration>,
    ) -> Result<(), NetError> {
        self.connect(server, game_id).await?;

        let started = Instant::now();
        let mut last_tick = started;
        let mut tick_interval = interval(Duration::from_millis(16));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;
            let now = Instant::now();
            let dt = now.duration_since(last_tick).as_secs_f32().min(0.05);
            last_tick = now;

            self.process_events();
            if self.state == ConnectionState::Rejected {
                break;
            }
            if duration.map_or(false, |limit| started.elapsed() >= limit) {
                break;
            }

            let decision = match (self.game.as_ref(), self.slot()) {
                (Some(game), Some(slot)) => bot.decide(dt, game, slot),
                _ => None,
            };
            let result = match decision {
                Some(Action::MoveTo(target)) => self.move_to(target).await,
                Some(Action::Attack(target)) => self.auto_attack(target, false).await,
                None => Ok(()),
            };
            if let Err(e) = result {
                warn!(target: LOG_TARGET, "Action failed: {}", e);
            }

            self.update(dt);
        }

        if matches!(self.state, ConnectionState::Playing { .. }) {
            self.disconnect().await?;
        }
        Ok(())
    }

    /// Stops the receive task and waits for it
    pub async fn shutdown(self) {
        if self.shutdown_tx.send(true).is_err() {
            debug!(target: LOG_TARGET, "Receive loop already gone");
        }
        let _ = self.receiver.await;
    }
}
