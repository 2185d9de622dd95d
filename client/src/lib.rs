//! # Cell Growth Client Library
//!
//! A headless UDP client for the cell growth server. It performs the
//! connect handshake, keeps the client's address registered with periodic
//! pings, steers the controlled bacteria, and hands every message the server
//! sends to the caller through a channel.
//!
//! ## Protocol Flow
//!
//! 1. The client sends `Connect` with its display name.
//! 2. The server answers with `Connected`, carrying the id of the newly
//!    spawned bacteria and the world parameters.
//! 3. From then on the client pings at a fixed interval and may send
//!    `ChangeSpeed` for its bacteria; the server streams `GameStatusUpdate`
//!    messages holding the part of the world visible to that bacteria.
//!
//! Updates stop arriving once the bacteria has been eaten.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//! use shared::{AsyncWorker, Message, PolarSpeed};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let mut client = Client::new(ClientConfig::default(), tx);
//!
//!     client.start();
//!     client.wait_started().await?;
//!
//!     while let Some(message) = rx.recv().await {
//!         if let Message::Connected { .. } = message {
//!             client.change_speed(PolarSpeed::new(1.0, 0.0)?);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod network;
