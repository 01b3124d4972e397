//! UDP transport shared by server and client.
//!
//! A [`NetworkManager`] owns one socket. Sending is direct; receiving happens
//! on a spawned task that decodes datagrams and feeds an unbounded channel,
//! which the simulation loop drains with [`NetworkManager::poll_event`]
//! without ever blocking.

use crate::protocol::{
    decode, encode, ConnectEvent, DisconnectEvent, Event, GameId, ProtocolError, SlotId, Team,
    UNASSIGNED_SLOT,
};
use log::{debug, error, info, trace, warn};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Largest datagram the receive loop accepts
pub const MAX_DATAGRAM: usize = 512;
/// Pause after a socket receive error before trying again
const RECV_BACKOFF: Duration = Duration::from_millis(100);

/// Which side of the protocol a process plays. Used as the log target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}

#[derive(Debug, Error)]
pub enum NetError {
    #[error("failed to bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("not connected to a server")]
    NoServer,
    #[error("no slot assigned yet in game {0}")]
    Unseated(GameId),
    #[error("{0} is not an IPv4 address")]
    NotIpv4(SocketAddr),
}

/// The server a client talks to and the identity it announced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerLink {
    pub addr: SocketAddrV4,
    /// Address and port this client claims in its Connect
    pub identity: SocketAddrV4,
    pub game_id: GameId,
    /// Seat assigned by the server, `UNASSIGNED_SLOT` until it answers
    pub slot: SlotId,
}

/// True for addresses that are reachable without crossing the public internet
pub fn is_local_address(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

pub struct NetworkManager {
    role: Role,
    socket: Arc<UdpSocket>,
    inbound_tx: mpsc::UnboundedSender<Event>,
    inbound_rx: mpsc::UnboundedReceiver<Event>,
    server: Option<ServerLink>,
    public_address: Option<Ipv4Addr>,
}

impl NetworkManager {
    /// Binds all interfaces on `port` (0 for an ephemeral port)
    pub async fn bind(role: Role, port: u16) -> Result<Self, NetError> {
        Self::bind_addr(role, SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await
    }

    pub async fn bind_addr(role: Role, addr: SocketAddr) -> Result<Self, NetError> {
        let socket = UdpSocket::bind(addr).await.map_err(|source| NetError::Bind {
            port: addr.port(),
            source,
        })?;
        info!(target: role.as_str(), "Listening on {}", socket.local_addr()?);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Ok(Self {
            role,
            socket: Arc::new(socket),
            inbound_tx,
            inbound_rx,
            server: None,
            public_address: None,
        })
    }

    /// Address to announce when connecting to a server on a public network
    pub fn with_public_address(mut self, public_address: Option<Ipv4Addr>) -> Self {
        self.public_address = public_address;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.socket.local_addr()?)
    }

    /// Encodes and transmits one event. Failures are logged and returned,
    /// never retried.
    pub async fn send(&self, event: &Event, to: SocketAddrV4) -> Result<(), NetError> {
        let result = match encode(event) {
            Ok(bytes) => self
                .socket
                .send_to(&bytes, to)
                .await
                .map(|_| ())
                .map_err(NetError::from),
            Err(e) => Err(e.into()),
        };

        match &result {
            Ok(()) => trace!(target: self.role.as_str(), "Sent {:?} to {}", event.event_type(), to),
            Err(e) => error!(
                target: self.role.as_str(),
                "Failed to send {:?} to {}: {}",
                event.event_type(),
                to,
                e
            ),
        }
        result
    }

    /// Queues an event locally as if it had arrived from the network
    pub fn send_self(&self, event: Event) {
        if self.inbound_tx.send(event).is_err() {
            warn!(target: self.role.as_str(), "Inbound queue closed, dropping {:?}", event);
        }
    }

    /// Next queued event, if any. Never blocks.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.inbound_rx.try_recv().ok()
    }

    /// Handle for a receive loop feeding this manager's queue
    pub fn receiver(&self) -> Receiver {
        Receiver {
            role: self.role,
            socket: Arc::clone(&self.socket),
            inbound: self.inbound_tx.clone(),
        }
    }

    /// Runs the receive loop on its own task until `shutdown` turns true or
    /// this manager is dropped
    pub fn spawn_receiver(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let receiver = self.receiver();
        tokio::spawn(receiver.run(shutdown))
    }

    /// Sends a Connect for `game_id` and remembers `server` for later sends.
    ///
    /// The announced identity is this machine's address on the route to the
    /// server when the server is local or private, otherwise the configured
    /// public address.
    pub async fn connect_to_server(
        &mut self,
        server: SocketAddrV4,
        game_id: GameId,
        team: Team,
    ) -> Result<(), NetError> {
        let ip = if is_local_address(*server.ip()) {
            self.route_address(server).await?
        } else if let Some(public) = self.public_address {
            public
        } else {
            warn!(
                target: self.role.as_str(),
                "Server {} is public but no public address is configured", server
            );
            self.route_address(server).await?
        };

        let identity = SocketAddrV4::new(ip, self.local_addr()?.port());
        self.server = Some(ServerLink {
            addr: server,
            identity,
            game_id,
            slot: UNASSIGNED_SLOT,
        });
        info!(
            target: self.role.as_str(),
            "Joining game {} on {} as {} (team {})", game_id, server, identity, team
        );

        let connect = Event::Connect(ConnectEvent {
            ip: u32::from(ip),
            port: identity.port(),
            game_id,
            char_id: UNASSIGNED_SLOT,
            team,
        });
        self.send(&connect, server).await
    }

    /// Local address the OS would use to reach `server`
    async fn route_address(&self, server: SocketAddrV4) -> Result<Ipv4Addr, NetError> {
        if let SocketAddr::V4(bound) = self.local_addr()? {
            if !bound.ip().is_unspecified() {
                return Ok(*bound.ip());
            }
        }

        let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        probe.connect(server).await?;
        match probe.local_addr()? {
            SocketAddr::V4(addr) => Ok(*addr.ip()),
            other => Err(NetError::NotIpv4(other)),
        }
    }

    pub fn server(&self) -> Option<&ServerLink> {
        self.server.as_ref()
    }

    /// Records the seat the server assigned to this client
    pub fn set_slot(&mut self, slot: SlotId) {
        if let Some(link) = self.server.as_mut() {
            link.slot = slot;
        }
    }

    /// True if `connect` announces this client's own join
    pub fn is_own_connect(&self, connect: &ConnectEvent) -> bool {
        self.server
            .map(|link| connect.sender() == link.identity && connect.game_id == link.game_id)
            .unwrap_or(false)
    }

    pub async fn send_to_server(&self, event: &Event) -> Result<(), NetError> {
        let link = self.server.ok_or(NetError::NoServer)?;
        self.send(event, link.addr).await
    }

    /// Tells the server this client leaves and forgets the link.
    ///
    /// Nothing is sent while the server has not assigned a slot: there is no
    /// seat to free, and game 65535 with slot 255 would read as the shutdown
    /// sentinel.
    pub async fn disconnect(&mut self) -> Result<(), NetError> {
        let link = self.server.take().ok_or(NetError::NoServer)?;
        if link.slot == UNASSIGNED_SLOT {
            warn!(
                target: self.role.as_str(),
                "Leaving game {} before a slot was assigned", link.game_id
            );
            return Err(NetError::Unseated(link.game_id));
        }
        let event = Event::Disconnect(DisconnectEvent {
            ip: u32::from(*link.identity.ip()),
            port: link.identity.port(),
            game_id: link.game_id,
            char_id: link.slot,
        });
        info!(target: self.role.as_str(), "Leaving game {}", link.game_id);
        self.send(&event, link.addr).await
    }
}

/// Receive side of a [`NetworkManager`], movable onto its own task
pub struct Receiver {
    role: Role,
    socket: Arc<UdpSocket>,
    inbound: mpsc::UnboundedSender<Event>,
}

impl Receiver {
    /// Waits for one datagram and queues it if it decodes.
    ///
    /// Malformed packets are logged and dropped. A socket error is logged and
    /// followed by a short pause. Returns false once nobody consumes the
    /// queue anymore.
    pub async fn wait_event(&self) -> bool {
        let mut buffer = [0u8; MAX_DATAGRAM];

        match self.socket.recv_from(&mut buffer).await {
            Ok((len, addr)) => match decode(&buffer[..len]) {
                Ok(event) => {
                    trace!(target: self.role.as_str(), "Received {:?} from {}", event, addr);
                    if self.inbound.send(event).is_err() {
                        return false;
                    }
                }
                Err(e) => {
                    warn!(target: self.role.as_str(), "Dropping packet from {}: {}", addr, e);
                }
            },
            Err(e) => {
                error!(target: self.role.as_str(), "Error receiving packet: {}", e);
                tokio::time::sleep(RECV_BACKOFF).await;
            }
        }
        true
    }

    /// Receives until `shutdown` turns true or the queue's consumer is gone.
    /// A dropped shutdown sender only stops the watching, not the loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut watching = true;
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                alive = self.wait_event() => {
                    if !alive {
                        break;
                    }
                }
                changed = shutdown.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                    }
                }
                _ = self.inbound.closed() => break,
            }
        }
        debug!(target: self.role.as_str(), "Receive loop stopped");
    }
}

/// Unwraps an IPv4 socket address
pub fn ipv4(addr: SocketAddr) -> Result<SocketAddrV4, NetError> {
    match addr {
        SocketAddr::V4(v4) => Ok(v4),
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(ip) => Ok(SocketAddrV4::new(ip, v6.port())),
            None => Err(NetError::NotIpv4(addr)),
        },
    }
}

/// Loopback address for `port`, handy for tests and local tools
pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GameFullEvent, MoveEvent, SHUTDOWN_GAME_ID};
    use tokio::time::{sleep, timeout};
    use tokio_test::{assert_err, assert_ok};

    async fn local(role: Role) -> NetworkManager {
        NetworkManager::bind_addr(role, loopback(0)).await.unwrap()
    }

    async fn next_event(manager: &mut NetworkManager) -> Option<Event> {
        timeout(Duration::from_secs(2), async {
            loop {
                if let Some(event) = manager.poll_event() {
                    return event;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .ok()
    }

    fn addr_of(manager: &NetworkManager) -> SocketAddrV4 {
        ipv4(manager.local_addr().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_send_self_short_circuits() {
        let mut manager = local(Role::Client).await;
        assert_eq!(manager.poll_event(), None);

        let event = Event::GameFull(GameFullEvent { game_id: 4 });
        manager.send_self(event);
        assert_eq!(manager.poll_event(), Some(event));
        assert_eq!(manager.poll_event(), None);
    }

    #[tokio::test]
    async fn test_events_cross_the_socket_in_order() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut receiver = local(Role::Server).await;
        let _task = receiver.spawn_receiver(shutdown_rx);
        let sender = local(Role::Client).await;

        let first = Event::Move(MoveEvent {
            game_id: 1,
            char_id: 2,
            target: (5.0, 6.0),
            pos: (1.0, 1.0),
        });
        let second = Event::GameFull(GameFullEvent { game_id: 1 });
        assert_ok!(sender.send(&first, addr_of(&receiver)).await);
        assert_ok!(sender.send(&second, addr_of(&receiver)).await);

        assert_eq!(next_event(&mut receiver).await, Some(first));
        assert_eq!(next_event(&mut receiver).await, Some(second));
    }

    #[tokio::test]
    async fn test_malformed_packets_are_dropped() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut receiver = local(Role::Server).await;
        let _task = receiver.spawn_receiver(shutdown_rx);

        let raw = UdpSocket::bind(loopback(0)).await.unwrap();
        let target = addr_of(&receiver);
        raw.send_to(&[0x00, 0x00], target).await.unwrap();
        raw.send_to(&[0x00, 0x09, 1, 2, 3], target).await.unwrap();
        raw.send_to(&[0x00, 0x05, 0x00], target).await.unwrap();

        let valid = Event::GameFull(GameFullEvent { game_id: 2 });
        raw.send_to(&encode(&valid).unwrap(), target).await.unwrap();

        assert_eq!(next_event(&mut receiver).await, Some(valid));
        assert_eq!(receiver.poll_event(), None);
    }

    #[tokio::test]
    async fn test_receive_loop_stops_on_shutdown() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = local(Role::Server).await;
        let task = manager.spawn_receiver(shutdown_rx);

        shutdown_tx.send(true).unwrap();
        assert_ok!(timeout(Duration::from_secs(1), task).await);
    }

    #[tokio::test]
    async fn test_receive_loop_stops_when_manager_is_dropped() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = local(Role::Server).await;
        let task = manager.spawn_receiver(shutdown_rx);

        drop(manager);
        assert_ok!(timeout(Duration::from_secs(1), task).await);
    }

    #[tokio::test]
    async fn test_connect_announces_route_identity() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut server = local(Role::Server).await;
        let _task = server.spawn_receiver(shutdown_rx);
        let mut client = local(Role::Client).await;

        assert_ok!(client.connect_to_server(addr_of(&server), 7, Team::Any).await);

        let link = *client.server().unwrap();
        assert_eq!(link.identity, addr_of(&client));
        assert_eq!(link.slot, UNASSIGNED_SLOT);

        match next_event(&mut server).await {
            Some(Event::Connect(connect)) => {
                assert_eq!(connect.sender(), addr_of(&client));
                assert_eq!(connect.game_id, 7);
                assert_eq!(connect.char_id, UNASSIGNED_SLOT);
                assert_eq!(connect.team, Team::Any);
                assert!(client.is_own_connect(&connect));
                assert!(!client.is_own_connect(&connect.masked()));
            }
            other => panic!("expected a connect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_carries_assigned_slot() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut server = local(Role::Server).await;
        let _task = server.spawn_receiver(shutdown_rx);
        let mut client = local(Role::Client).await;

        client
            .connect_to_server(addr_of(&server), 3, Team::Two)
            .await
            .unwrap();
        client.set_slot(4);
        assert_ok!(client.disconnect().await);
        assert!(client.server().is_none());

        next_event(&mut server).await.unwrap();
        match next_event(&mut server).await {
            Some(Event::Disconnect(disconnect)) => {
                assert_eq!(disconnect.sender(), addr_of(&client));
                assert_eq!(disconnect.game_id, 3);
                assert_eq!(disconnect.char_id, 4);
            }
            other => panic!("expected a disconnect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unseated_disconnect_sends_nothing() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut server = local(Role::Server).await;
        let _task = server.spawn_receiver(shutdown_rx);
        let mut client = local(Role::Client).await;

        client
            .connect_to_server(addr_of(&server), SHUTDOWN_GAME_ID, Team::Any)
            .await
            .unwrap();
        assert!(matches!(
            client.disconnect().await,
            Err(NetError::Unseated(SHUTDOWN_GAME_ID))
        ));
        assert!(client.server().is_none());

        assert!(matches!(next_event(&mut server).await, Some(Event::Connect(_))));
        sleep(Duration::from_millis(100)).await;
        assert_eq!(server.poll_event(), None);
    }

    #[tokio::test]
    async fn test_public_target_announces_public_address() {
        let public = Ipv4Addr::new(198, 51, 100, 7);
        let mut client = local(Role::Client)
            .await
            .with_public_address(Some(public));
        let target = SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 1), 49518);
        assert!(!is_local_address(*target.ip()));

        // the datagram itself may not be routable here; the link is recorded first
        let _ = client.connect_to_server(target, 5, Team::One).await;

        let link = *client.server().unwrap();
        assert_eq!(link.addr, target);
        assert_eq!(*link.identity.ip(), public);
        assert_eq!(link.identity.port(), addr_of(&client).port());
        assert_eq!(link.game_id, 5);
    }

    #[tokio::test]
    async fn test_local_target_ignores_public_address() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut server = local(Role::Server).await;
        let _task = server.spawn_receiver(shutdown_rx);
        let mut client = local(Role::Client)
            .await
            .with_public_address(Some(Ipv4Addr::new(198, 51, 100, 7)));

        assert_ok!(client.connect_to_server(addr_of(&server), 1, Team::Any).await);
        assert_eq!(client.server().unwrap().identity, addr_of(&client));
        match next_event(&mut server).await {
            Some(Event::Connect(connect)) => assert_eq!(connect.sender(), addr_of(&client)),
            other => panic!("expected a connect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_sends_need_a_link() {
        let mut client = local(Role::Client).await;
        let event = Event::GameFull(GameFullEvent { game_id: 0 });
        assert!(matches!(
            client.send_to_server(&event).await,
            Err(NetError::NoServer)
        ));
        assert_err!(client.disconnect().await);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = local(Role::Server).await;
        let taken = first.local_addr().unwrap();
        match NetworkManager::bind_addr(Role::Server, taken).await {
            Err(NetError::Bind { port, .. }) => assert_eq!(port, taken.port()),
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("second bind on {} succeeded", taken),
        }
    }

    #[test]
    fn test_address_classification() {
        assert!(is_local_address(Ipv4Addr::LOCALHOST));
        assert!(is_local_address(Ipv4Addr::new(192, 168, 0, 10)));
        assert!(is_local_address(Ipv4Addr::new(10, 1, 2, 3)));
        assert!(!is_local_address(Ipv4Addr::new(203, 0, 113, 9)));
        assert_eq!(Role::Server.as_str(), "server");
    }
}
