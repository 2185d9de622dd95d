//! Server network layer: UDP receive, message dispatch and status broadcast

use crate::address_registry::{AddressRegistry, AddressSweeper};
use crate::game::{Game, GameLoop};
use crate::visibility::VisibilityFilter;
use log::{debug, error, info, warn};
use shared::entity::Snapshot;
use shared::message::MAX_DATAGRAM_SIZE;
use shared::{
    AsyncWorker, Lifecycle, Message, PolarSpeed, Universe, Vector2, WorkerError, RECEIVE_BUFFER_SIZE,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Where every connecting client's bacteria appears
pub const SPAWN_POINT: Vector2 = Vector2::ZERO;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub world_size: f32,
    pub total_nutrient: f32,
    /// Silence after which a client stops receiving updates
    pub client_expiration: Duration,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9582,
            world_size: 200.0,
            total_nutrient: 90.0,
            client_expiration: Duration::from_secs(2),
        }
    }
}

/// Everything a message handler or the broadcaster needs
struct Context {
    socket: Arc<UdpSocket>,
    universe: Universe,
    game: Game,
    registry: AddressRegistry,
    filter: VisibilityFilter,
}

impl Context {
    async fn handle(&self, message: Message, addr: SocketAddr) {
        match message {
            // Replies only travel to clients, so any CONNECT here is a join
            Message::Connect { name } | Message::Connected { name, .. } => {
                self.handle_connect(name, addr).await
            }
            Message::Ping => self.handle_ping(addr).await,
            Message::ChangeSpeed { bacteria_id, speed } => {
                self.handle_change_speed(bacteria_id, speed, addr).await
            }
            other => warn!("No handler for {:?} message from {}", other.kind(), addr),
        }
    }

    async fn handle_connect(&self, name: String, addr: SocketAddr) {
        self.registry.touch(addr).await;
        info!("Connect: {} from {}", name, addr);

        let bacteria = self.game.add_bacteria(&name, Some(SPAWN_POINT)).await;

        // Reply first so the client knows its id before any status update
        let reply = Message::Connected {
            bacteria_id: bacteria.id,
            name,
            world_size: self.universe.world_size(),
            total_nutrient: self.universe.total_nutrient(),
        };
        self.send(reply, addr).await;

        self.filter.register_player(addr, bacteria.id).await;
    }

    async fn handle_ping(&self, addr: SocketAddr) {
        self.registry.touch(addr).await;
    }

    async fn handle_change_speed(&self, bacteria_id: u32, speed: PolarSpeed, addr: SocketAddr) {
        self.registry.touch(addr).await;

        if self.game.change_speed(bacteria_id, speed).await.is_none() {
            warn!("{} steered unknown bacteria {}", addr, bacteria_id);
        }
    }

    async fn send(&self, message: Message, addr: SocketAddr) {
        let kind = message.kind();
        let data = match message.pack() {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to encode {:?} for {}: {}", kind, addr, e);
                return;
            }
        };

        if data.len() > MAX_DATAGRAM_SIZE {
            warn!(
                "{:?} for {} is {} bytes, over the datagram limit; not sent",
                kind,
                addr,
                data.len()
            );
            return;
        }

        if let Err(e) = self.socket.send_to(&data, addr).await {
            error!("Failed to send {:?} to {}: {}", kind, addr, e);
        }
    }
}

/// Authoritative game server
///
/// Owns the UDP socket, the game loop and the address sweeper. Incoming
/// datagrams are decoded and dispatched to one handler task each; every
/// published snapshot is filtered per registered address and sent out as a
/// game status update.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    lifecycle: Lifecycle,
    local_addr: Arc<Mutex<Option<SocketAddr>>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            lifecycle: Lifecycle::new("Server"),
            local_addr: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bound address, known once the server has started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.lock().ok().and_then(|addr| *addr)
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_receiver(
        socket: Arc<UdpSocket>,
        datagram_tx: mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut buffer = vec![0u8; RECEIVE_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if datagram_tx.send((buffer[..len].to_vec(), addr)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Decodes datagrams and hands each message to its own handler task
    async fn dispatch(context: Arc<Context>, mut datagram_rx: mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>) {
        while let Some((data, addr)) = datagram_rx.recv().await {
            let message = match Message::unpack(&data) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Dropping datagram from {}: {}", addr, e);
                    continue;
                }
            };

            debug!("{:?} from {}", message.kind(), addr);
            let context = Arc::clone(&context);
            tokio::spawn(async move { context.handle(message, addr).await });
        }
    }

    /// Sends every published snapshot, filtered, to each registered address
    async fn broadcast(context: Arc<Context>, mut snapshot_rx: mpsc::UnboundedReceiver<Snapshot>) {
        while let Some(snapshot) = snapshot_rx.recv().await {
            context.filter.set_snapshot(snapshot).await;

            for addr in context.registry.addresses().await {
                let Some(visible) = context.filter.filtered(addr).await else {
                    continue;
                };

                context
                    .send(Message::GameStatusUpdate { snapshot: visible }, addr)
                    .await;
            }
        }
    }

    /// Drops the players of addresses the sweeper expired
    async fn forget_expired(context: Arc<Context>, mut expired_rx: mpsc::UnboundedReceiver<Vec<SocketAddr>>) {
        while let Some(expired) = expired_rx.recv().await {
            let mut gone = Vec::with_capacity(expired.len());
            for addr in expired {
                // Reconnected in the meantime
                if !context.registry.contains(addr).await {
                    gone.push(addr);
                }
            }
            context.filter.forget_players(&gone).await;
        }
    }
}

impl AsyncWorker for Server {
    fn lifecycle(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn start(&mut self) {
        let config = self.config.clone();
        let local_addr = Arc::clone(&self.local_addr);

        self.lifecycle.spawn(move |ready, mut shutdown| async move {
            let universe = match Universe::try_new(config.world_size, config.total_nutrient) {
                Ok(universe) => universe,
                Err(e) => {
                    error!("Refusing to start: {}", e);
                    ready.fail(e.into());
                    return;
                }
            };

            let bind_addr = config.bind_addr();
            let socket = match UdpSocket::bind(&bind_addr).await {
                Ok(socket) => Arc::new(socket),
                Err(source) => {
                    error!("Failed to bind {}: {}", bind_addr, source);
                    ready.fail(WorkerError::Bind {
                        addr: bind_addr,
                        source,
                    });
                    return;
                }
            };

            let bound = socket.local_addr().ok();
            if let Ok(mut slot) = local_addr.lock() {
                *slot = bound;
            }
            info!("Server listening on {}", bound.map_or(bind_addr, |a| a.to_string()));

            let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
            let game = Game::new(universe, snapshot_tx);
            let registry = AddressRegistry::new(config.client_expiration);

            let mut game_loop = GameLoop::new(game.clone());
            let (expired_tx, expired_rx) = mpsc::unbounded_channel();
            let mut sweeper = AddressSweeper::new(registry.clone()).with_listener(expired_tx);
            game_loop.start();
            sweeper.start();

            let started = match game_loop.wait_started().await {
                Ok(()) => sweeper.wait_started().await,
                Err(e) => Err(e),
            };
            if let Err(e) = started {
                game_loop.stop();
                sweeper.stop();
                game_loop.join().await;
                sweeper.join().await;
                ready.fail(e);
                return;
            }

            ready.ok();
            info!(
                "World size {}, total nutrient {}, client expiration {:?}",
                universe.world_size(),
                universe.total_nutrient(),
                config.client_expiration
            );

            let context = Arc::new(Context {
                socket: Arc::clone(&socket),
                universe,
                game,
                registry,
                filter: VisibilityFilter::new(universe),
            });

            let (datagram_tx, datagram_rx) = mpsc::unbounded_channel();
            let receiver = Self::spawn_receiver(socket, datagram_tx);

            tokio::select! {
                _ = shutdown.requested() => {}
                _ = Self::dispatch(Arc::clone(&context), datagram_rx) => {
                    warn!("Dispatch loop ended");
                }
                _ = Self::broadcast(Arc::clone(&context), snapshot_rx) => {
                    warn!("Broadcast loop ended");
                }
                _ = Self::forget_expired(Arc::clone(&context), expired_rx) => {
                    warn!("Expiry loop ended");
                }
            }

            receiver.abort();
            game_loop.stop();
            sweeper.stop();
            game_loop.join().await;
            sweeper.join().await;

            if let Ok(mut slot) = local_addr.lock() {
                *slot = None;
            }
            info!("Server stopped");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{MessageType, RawMessage, WorkerState};

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            world_size: 100.0,
            total_nutrient: 90.0,
            client_expiration: Duration::from_secs(2),
        }
    }

    async fn started_server() -> (Server, SocketAddr) {
        let mut server = Server::new(test_config());
        server.start();
        server.wait_started().await.unwrap();
        let addr = server.local_addr().unwrap();
        (server, addr)
    }

    async fn client_socket() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    async fn receive(socket: &UdpSocket, wait: Duration) -> Option<Message> {
        let mut buffer = vec![0u8; RECEIVE_BUFFER_SIZE];
        let (len, _) = tokio::time::timeout(wait, socket.recv_from(&mut buffer))
            .await
            .ok()?
            .ok()?;
        Message::unpack(&buffer[..len]).ok()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:9582");
        assert_eq!(config.world_size, 200.0);
        assert_eq!(config.total_nutrient, 90.0);
        assert_eq!(config.client_expiration, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_connect_reply() {
        let (mut server, addr) = started_server().await;
        let client = client_socket().await;

        let connect = Message::Connect {
            name: "John".to_string(),
        };
        client.send_to(&connect.pack().unwrap(), addr).await.unwrap();

        match receive(&client, Duration::from_secs(1)).await {
            Some(Message::Connected {
                bacteria_id,
                name,
                world_size,
                total_nutrient,
            }) => {
                assert_ne!(bacteria_id, 0);
                assert_eq!(name, "John");
                assert_eq!(world_size, 100.0);
                assert_eq!(total_nutrient, 90.0);
            }
            other => panic!("Unexpected reply: {:?}", other),
        }

        server.stop();
        server.join().await;
        assert_eq!(server.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn test_ping_gets_no_reply() {
        let (mut server, addr) = started_server().await;
        let client = client_socket().await;

        client.send_to(&Message::Ping.pack().unwrap(), addr).await.unwrap();
        assert!(receive(&client, Duration::from_millis(100)).await.is_none());

        server.stop();
        server.join().await;
    }

    #[tokio::test]
    async fn test_malformed_datagram_keeps_server_alive() {
        let (mut server, addr) = started_server().await;
        let client = client_socket().await;

        client.send_to(b"definitely not a message", addr).await.unwrap();

        let incomplete = RawMessage::new(MessageType::ChangeSpeed).pack().unwrap();
        client.send_to(&incomplete, addr).await.unwrap();

        let connect = Message::Connect {
            name: "Jenny".to_string(),
        };
        client.send_to(&connect.pack().unwrap(), addr).await.unwrap();

        assert!(matches!(
            receive(&client, Duration::from_secs(1)).await,
            Some(Message::Connected { .. })
        ));

        server.stop();
        server.join().await;
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let (mut first, addr) = started_server().await;

        let mut second = Server::new(ServerConfig {
            port: addr.port(),
            ..test_config()
        });
        second.start();

        assert!(matches!(
            second.wait_started().await,
            Err(WorkerError::Bind { .. })
        ));
        second.join().await;
        assert_eq!(second.state(), WorkerState::Stopped);

        first.stop();
        first.join().await;
    }

    #[tokio::test]
    async fn test_unusable_world_fails_to_start() {
        for (world_size, total_nutrient) in [(0.0, 90.0), (-1.0, 90.0), (f32::NAN, 90.0), (100.0, 0.1)] {
            let mut server = Server::new(ServerConfig {
                world_size,
                total_nutrient,
                ..test_config()
            });
            server.start();

            assert!(matches!(
                server.wait_started().await,
                Err(WorkerError::Config(_))
            ));
            server.join().await;
            assert!(server.local_addr().is_none());
        }
    }

    #[tokio::test]
    async fn test_connect_with_reply_fields_still_joins() {
        let (mut server, addr) = started_server().await;
        let client = client_socket().await;

        let mut record = RawMessage::new(MessageType::Connect);
        record.name = Some("John".to_string());
        record.bacteria_id = Some(4242);
        record.world_size = Some(1.0);
        record.total_nutrient = Some(1.0);
        client.send_to(&record.pack().unwrap(), addr).await.unwrap();

        match receive(&client, Duration::from_secs(1)).await {
            Some(Message::Connected {
                bacteria_id,
                name,
                world_size,
                ..
            }) => {
                assert_ne!(bacteria_id, 4242);
                assert_eq!(name, "John");
                assert_eq!(world_size, 100.0);
            }
            other => panic!("Unexpected reply: {:?}", other),
        }

        server.stop();
        server.join().await;
    }
}
