//! Tracking of the client addresses that receive game status updates
//!
//! Clients have no explicit session. Any datagram from an address (connect,
//! ping, speed change) refreshes its last-seen time, and an address that has
//! been quiet for longer than the expiration interval stops receiving
//! updates. A background [`AddressSweeper`] does the periodic cleanup.

use log::{debug, info};
use shared::{AsyncWorker, Lifecycle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Addresses with the time each was last heard from
///
/// Cloning shares the underlying table, so the network handlers, the
/// broadcaster and the sweeper all see the same set of addresses.
#[derive(Debug, Clone)]
pub struct AddressRegistry {
    clients: Arc<RwLock<HashMap<SocketAddr, Instant>>>,
    expiration: Duration,
}

impl AddressRegistry {
    pub fn new(expiration: Duration) -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
            expiration,
        }
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Inserts the address or refreshes its last-seen time
    pub async fn touch(&self, addr: SocketAddr) {
        let previous = self.clients.write().await.insert(addr, Instant::now());
        if previous.is_none() {
            info!("Client {} registered", addr);
        }
    }

    pub async fn contains(&self, addr: SocketAddr) -> bool {
        self.clients.read().await.contains_key(&addr)
    }

    /// Every registered address, collected under the lock
    pub async fn addresses(&self) -> Vec<SocketAddr> {
        self.clients.read().await.keys().copied().collect()
    }

    /// Drops the addresses not heard from within the expiration interval
    ///
    /// Returns the removed addresses so callers can log or clean up after
    /// them.
    pub async fn remove_expired(&self) -> Vec<SocketAddr> {
        let now = Instant::now();
        let mut clients = self.clients.write().await;

        let expired: Vec<SocketAddr> = clients
            .iter()
            .filter(|(_, last_seen)| now.duration_since(**last_seen) > self.expiration)
            .map(|(addr, _)| *addr)
            .collect();

        for addr in &expired {
            clients.remove(addr);
            debug!("Client {} expired", addr);
        }

        expired
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

/// Background task calling [`AddressRegistry::remove_expired`] once per
/// expiration interval
#[derive(Debug)]
pub struct AddressSweeper {
    registry: AddressRegistry,
    lifecycle: Lifecycle,
    expired_tx: Option<mpsc::UnboundedSender<Vec<SocketAddr>>>,
}

impl AddressSweeper {
    pub fn new(registry: AddressRegistry) -> Self {
        Self {
            registry,
            lifecycle: Lifecycle::new("Address sweeper"),
            expired_tx: None,
        }
    }

    /// Reports every non-empty batch of expired addresses on `expired_tx`
    pub fn with_listener(mut self, expired_tx: mpsc::UnboundedSender<Vec<SocketAddr>>) -> Self {
        self.expired_tx = Some(expired_tx);
        self
    }
}

impl AsyncWorker for AddressSweeper {
    fn lifecycle(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn start(&mut self) {
        let registry = self.registry.clone();
        let expired_tx = self.expired_tx.clone();

        self.lifecycle.spawn(move |ready, mut shutdown| async move {
            let mut sweep_interval = interval(registry.expiration().max(MIN_SWEEP_INTERVAL));
            // The first tick of an interval completes immediately.
            sweep_interval.tick().await;
            ready.ok();

            loop {
                tokio::select! {
                    _ = shutdown.requested() => break,
                    _ = sweep_interval.tick() => {
                        let expired = registry.remove_expired().await;
                        if let Some(tx) = expired_tx.as_ref().filter(|_| !expired.is_empty()) {
                            let _ = tx.send(expired);
                        }
                    }
                }
            }
        });
    }
}
