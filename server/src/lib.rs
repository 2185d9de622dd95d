//! # Cell Growth Server Library
//!
//! This library provides the authoritative server for the multiplayer cell
//! growth simulation. It owns the one true world, applies client steering,
//! and sends every client the part of the world its bacteria can see.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Bacterias move across a toroidal world, eat the food organisms they
//! overlap and eat each other when one is clearly larger. The server runs
//! this simulation at a fixed 40 Hz; clients only ever render what the server
//! sends them.
//!
//! ### Client Tracking
//! Clients have no session beyond their UDP address. Any datagram refreshes
//! the address; addresses that stay quiet longer than the expiration interval
//! stop receiving updates.
//!
//! ### Culled Broadcasting
//! Each tick's snapshot is cut down per client to the entities within view
//! distance of that client's bacteria, then compressed and sent as a single
//! datagram.
//!
//! ## Module Organization
//!
//! ### Simulation Module (`simulation`)
//! Pure per-tick rules: movement with wrap-around, food placement up to the
//! nutrient budget, and the two feeding passes with growth.
//!
//! ### Game Module (`game`)
//! The lock-guarded live world, speed changes, and the fixed-rate game loop
//! that publishes one snapshot per successful tick.
//!
//! ### Address Registry Module (`address_registry`)
//! Last-seen times per client address and the background sweeper that
//! expires them.
//!
//! ### Visibility Module (`visibility`)
//! Address to bacteria mapping and the per-client view distance filter.
//!
//! ### Network Module (`network`)
//! UDP socket, datagram decoding, message dispatch and the broadcast loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//! use shared::AsyncWorker;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::default());
//!
//!     // Binds the socket and starts the game loop and address sweeper
//!     server.start();
//!     server.wait_started().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!
//!     server.stop();
//!     server.join().await;
//!     Ok(())
//! }
//! ```

pub mod address_registry;
pub mod game;
pub mod network;
pub mod simulation;
pub mod visibility;
