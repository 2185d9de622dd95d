//! Types shared by the simulation server and its clients: world geometry,
//! organisms and snapshots, the datagram protocol, and the background worker
//! lifecycle.

pub mod entity;
pub mod message;
pub mod physics;
pub mod universe;
pub mod worker;

use std::time::Duration;

pub use entity::{Bacteria, IdGenerator, Organic, Organism, Snapshot};
pub use message::{Message, MessageError, MessageType, PolarSpeed, RawMessage};
pub use physics::Vector2;
pub use universe::{Universe, UniverseError};
pub use worker::{AsyncWorker, Lifecycle, Ready, Shutdown, WorkerError, WorkerState};

/// Simulation ticks per second.
pub const REFRESH_FREQUENCY: u32 = 40;

/// Time between two simulation ticks.
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(1000 / REFRESH_FREQUENCY as u64);

/// Receive buffer large enough for any UDP datagram.
pub const RECEIVE_BUFFER_SIZE: usize = 65_536;
