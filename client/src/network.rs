use log::{debug, error, info, warn};
use shared::{
    AsyncWorker, Lifecycle, Message, PolarSpeed, WorkerError, RECEIVE_BUFFER_SIZE,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval};

const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    /// Time between two keep-alive pings once connected
    pub ping_interval: Duration,
}

impl ClientConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9582,
            name: "player".to_string(),
            ping_interval: Duration::from_millis(500),
        }
    }
}

/// UDP client of the game server
///
/// On start it sends a connect request with the player name. The reply
/// carries the id of the bacteria the client controls; from then on the
/// client pings the server to stay registered and may steer. Every decoded
/// message, the reply included, is forwarded to the handler channel.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    lifecycle: Lifecycle,
    handler: mpsc::UnboundedSender<Message>,
    outgoing: Option<mpsc::UnboundedSender<Message>>,
    // 0 until the server has assigned a bacteria
    player_id: Arc<AtomicU32>,
}

impl Client {
    pub fn new(config: ClientConfig, handler: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            config,
            lifecycle: Lifecycle::new("Client"),
            handler,
            outgoing: None,
            player_id: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Id of the controlled bacteria, once the server has replied
    pub fn player_id(&self) -> Option<u32> {
        match self.player_id.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    /// Steers the controlled bacteria
    ///
    /// Returns false, sending nothing, while no bacteria has been assigned.
    pub fn change_speed(&self, speed: PolarSpeed) -> bool {
        let Some(bacteria_id) = self.player_id() else {
            return false;
        };

        self.send(Message::ChangeSpeed { bacteria_id, speed })
    }

    /// Queues a message for the server; false if the client is not running
    pub fn send(&self, message: Message) -> bool {
        match &self.outgoing {
            Some(outgoing) => outgoing.send(message).is_ok(),
            None => false,
        }
    }

    async fn connect_socket(server_addr: &str) -> Result<UdpSocket, WorkerError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|source| WorkerError::Bind {
                addr: "0.0.0.0:0".to_string(),
                source,
            })?;

        socket
            .connect(server_addr)
            .await
            .map_err(|source| WorkerError::Connect {
                addr: server_addr.to_string(),
                source,
            })?;

        Ok(socket)
    }

    async fn send_message(socket: &UdpSocket, message: Message) {
        let kind = message.kind();
        match message.pack() {
            Ok(data) => {
                if let Err(e) = socket.send(&data).await {
                    error!("Failed to send {:?}: {}", kind, e);
                }
            }
            Err(e) => error!("Failed to encode {:?}: {}", kind, e),
        }
    }

    async fn next_ping(keep_alive: &mut Option<Interval>) {
        match keep_alive {
            Some(keep_alive) => {
                keep_alive.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}

impl AsyncWorker for Client {
    fn lifecycle(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn start(&mut self) {
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel();
        self.outgoing = Some(outgoing_tx);
        self.player_id.store(0, Ordering::Release);

        let config = self.config.clone();
        let handler = self.handler.clone();
        let player_id = Arc::clone(&self.player_id);

        self.lifecycle.spawn(move |ready, mut shutdown| async move {
            let server_addr = config.server_addr();
            let socket = match Self::connect_socket(&server_addr).await {
                Ok(socket) => socket,
                Err(e) => {
                    error!("{}", e);
                    ready.fail(e);
                    return;
                }
            };

            ready.ok();
            info!("Connecting to {} as {}", server_addr, config.name);
            Self::send_message(&socket, Message::Connect { name: config.name.clone() }).await;

            let mut buffer = vec![0u8; RECEIVE_BUFFER_SIZE];
            let mut keep_alive: Option<Interval> = None;

            loop {
                tokio::select! {
                    _ = shutdown.requested() => break,

                    result = socket.recv(&mut buffer) => {
                        let len = match result {
                            Ok(len) => len,
                            Err(e) => {
                                warn!("Error receiving datagram: {}", e);
                                tokio::time::sleep(Duration::from_millis(10)).await;
                                continue;
                            }
                        };

                        let message = match Message::unpack(&buffer[..len]) {
                            Ok(message) => message,
                            Err(e) => {
                                warn!("Dropping datagram from server: {}", e);
                                continue;
                            }
                        };

                        if let Message::Connected { bacteria_id, .. } = &message {
                            info!("Connected! Bacteria id: {}", bacteria_id);
                            player_id.store(*bacteria_id, Ordering::Release);
                            if keep_alive.is_none() {
                                keep_alive = Some(interval(config.ping_interval.max(MIN_PING_INTERVAL)));
                            }
                        }

                        if handler.send(message).is_err() {
                            debug!("Message handler is gone");
                        }
                    },

                    Some(message) = outgoing_rx.recv() => {
                        Self::send_message(&socket, message).await;
                    },

                    _ = Self::next_ping(&mut keep_alive) => {
                        Self::send_message(&socket, Message::Ping).await;
                    },
                }
            }

            info!("Client stopped");
        });
    }
}
