//! Server loop coordinating the UDP transport and the game simulation

use crate::session::{Control, Outgoing, SessionRegistry};
use log::{debug, error, info, warn};
use shared::character::CharacterRoster;
use shared::config::ServerConfig;
use shared::game_map::GameMap;
use shared::network::{NetError, NetworkManager, Role};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

const LOG_TARGET: &str = "server";

/// Authoritative server: one socket, one registry, one tick loop
pub struct Server {
    network: NetworkManager,
    sessions: SessionRegistry<CharacterRoster>,
    tick_duration: Duration,
    tick: u64,
}

impl Server {
    /// Binds all interfaces on the configured port
    pub async fn new(config: &ServerConfig) -> Result<Self, NetError> {
        Self::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port)), config).await
    }

    pub async fn bind(addr: SocketAddr, config: &ServerConfig) -> Result<Self, NetError> {
        let network = NetworkManager::bind_addr(Role::Server, addr).await?;
        let sessions = SessionRegistry::new(
            Arc::new(GameMap::arena()),
            CharacterRoster::builtin(),
            config.character.clone(),
        );
        let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate.max(1) as f64);

        Ok(Server {
            network,
            sessions,
            tick_duration,
            tick: 0,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        self.network.local_addr()
    }

    pub fn sessions(&self) -> &SessionRegistry<CharacterRoster> {
        &self.sessions
    }

    /// Sends everything the registry queued. Failures are logged by the
    /// transport and the datagram is dropped.
    async fn flush(&self, outgoing: &mut Vec<Outgoing>) {
        for Outgoing { event, to } in outgoing.drain(..) {
            let _ = self.network.send(&event, to).await;
        }
    }

    /// Main server loop
    ///
    /// Every tick drains the inbound queue, lets the registry handle each
    /// event, advances all games and flushes the replies. Returns after the
    /// batch in which the shutdown sentinel arrived.
    pub async fn run(&mut self) -> Result<(), NetError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let receiver = self.network.spawn_receiver(shutdown_rx);

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();
        let mut outgoing = Vec::new();

        // Cap the maximum delta time to 50ms
        let max_delta_time = 1.0 / 20.0;

        info!(target: LOG_TARGET, "Server started on {}", self.local_addr()?);

        loop {
            tick_interval.tick().await;

            let now = Instant::now();
            let mut dt = now.duration_since(last_tick).as_secs_f32();
            last_tick = now;
            if dt > max_delta_time {
                debug!(
                    target: LOG_TARGET,
                    "Large delta time ({:.3}s), capping to {:.3}s", dt, max_delta_time
                );
                dt = max_delta_time;
            }

            let mut control = Control::Continue;
            while let Some(event) = self.network.poll_event() {
                if self.sessions.handle(event, &mut outgoing) == Control::Shutdown {
                    control = Control::Shutdown;
                }
            }

            self.sessions.tick(dt, &mut outgoing);
            self.flush(&mut outgoing).await;
            self.tick += 1;

            if control == Control::Shutdown {
                break;
            }

            if self.tick % 600 == 0 && !self.sessions.is_empty() {
                debug!(
                    target: LOG_TARGET,
                    "Tick {}: {} peers, {:.1}Hz",
                    self.tick,
                    self.sessions.len(),
                    1.0 / dt
                );
            }
        }

        if shutdown_tx.send(true).is_err() {
            warn!(target: LOG_TARGET, "Receive loop already gone");
        }
        if let Err(e) = receiver.await {
            error!(target: LOG_TARGET, "Receive task failed: {}", e);
        }
        info!(target: LOG_TARGET, "Server stopped after {} ticks", self.tick);
        Ok(())
    }
}
