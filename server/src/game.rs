use log::{debug, error, info};
use shared::entity::{Bacteria, Snapshot};
use shared::universe::{Universe, BACTERIA_STARTING_RADIUS};
use shared::{AsyncWorker, Lifecycle, PolarSpeed, Vector2, REFRESH_FREQUENCY, REFRESH_INTERVAL};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};

use crate::simulation::{Simulation, SimulationError};

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error("snapshot subscriber is gone")]
    ChannelClosed,
}

#[derive(Debug)]
struct GameState {
    tick: u64,
    snapshot: Snapshot,
    simulation: Simulation,
}

/// Owner of the live world.
///
/// Every mutation (`add_bacteria`, `change_speed`, `tick`) runs under the same
/// lock. Each successful tick publishes a copy of the new snapshot; the
/// published copies are never mutated again. Cloning a `Game` clones the
/// handle, not the world.
#[derive(Debug, Clone)]
pub struct Game {
    universe: Universe,
    state: Arc<Mutex<GameState>>,
    publisher: mpsc::UnboundedSender<Snapshot>,
}

impl Game {
    pub fn new(universe: Universe, publisher: mpsc::UnboundedSender<Snapshot>) -> Self {
        Self::from_parts(Simulation::new(universe), Snapshot::new(), publisher)
    }

    pub fn from_parts(
        simulation: Simulation,
        snapshot: Snapshot,
        publisher: mpsc::UnboundedSender<Snapshot>,
    ) -> Self {
        Self {
            universe: *simulation.universe(),
            state: Arc::new(Mutex::new(GameState {
                tick: 0,
                snapshot,
                simulation,
            })),
            publisher,
        }
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// Spawns a bacteria at `position`, or at a random spot when `None`.
    pub async fn add_bacteria(&self, name: &str, position: Option<Vector2>) -> Bacteria {
        let max_speed = self.universe.max_speed(BACTERIA_STARTING_RADIUS);

        let mut state = self.state.lock().await;
        let GameState {
            snapshot,
            simulation,
            ..
        } = &mut *state;

        let position = position.unwrap_or_else(|| simulation.random_position());
        let id = simulation.next_id(snapshot);
        let mut bacteria = Bacteria::new(id, name, position, BACTERIA_STARTING_RADIUS, max_speed);
        bacteria.hue = simulation.random_hue();

        snapshot.bacterias.push(bacteria.clone());
        info!(
            "Added bacteria {} ({}) at ({:.2}, {:.2})",
            bacteria.id, bacteria.name, position.x, position.y
        );

        bacteria
    }

    /// Steers a bacteria. Returns the new velocity, or `None` if no bacteria
    /// has that id.
    pub async fn change_speed(&self, bacteria_id: u32, speed: PolarSpeed) -> Option<Vector2> {
        let mut state = self.state.lock().await;
        let bacteria = state.snapshot.bacteria_by_id_mut(bacteria_id)?;

        bacteria.current_speed = speed.to_velocity(bacteria.max_speed);
        Some(bacteria.current_speed)
    }

    /// Advances the world by one tick and publishes the result.
    ///
    /// Returns `Ok(false)` without publishing while there are no bacterias. A
    /// failed tick leaves the world as it was before the call.
    pub async fn tick(&self) -> Result<bool, GameError> {
        let mut state = self.state.lock().await;
        if state.snapshot.bacterias.is_empty() {
            return Ok(false);
        }

        let GameState {
            tick,
            snapshot,
            simulation,
        } = &mut *state;

        let mut next = snapshot.clone();
        simulation.step(&mut next)?;
        *snapshot = next.clone();
        *tick += 1;

        if *tick % REFRESH_FREQUENCY as u64 == 0 {
            debug!(
                "Tick {}: {} bacterias, {} organisms, total mass {:.2}",
                tick,
                snapshot.bacterias.len(),
                snapshot.organisms.len(),
                Simulation::total_organic_mass(snapshot)
            );
        }

        self.publisher
            .send(next)
            .map_err(|_| GameError::ChannelClosed)?;

        Ok(true)
    }

    /// Copy of the current world.
    pub async fn snapshot(&self) -> Snapshot {
        self.state.lock().await.snapshot.clone()
    }
}

/// Runs [`Game::tick`] at [`REFRESH_FREQUENCY`] until stopped.
#[derive(Debug)]
pub struct GameLoop {
    game: Game,
    lifecycle: Lifecycle,
}

impl GameLoop {
    pub fn new(game: Game) -> Self {
        Self {
            game,
            lifecycle: Lifecycle::new("Game"),
        }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }
}

impl AsyncWorker for GameLoop {
    fn lifecycle(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn start(&mut self) {
        let game = self.game.clone();

        self.lifecycle.spawn(move |ready, mut shutdown| async move {
            let mut tick_interval = interval(REFRESH_INTERVAL);
            tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            ready.ok();
            info!("Game loop started ({} Hz)", REFRESH_FREQUENCY);

            loop {
                tokio::select! {
                    _ = shutdown.requested() => break,
                    _ = tick_interval.tick() => {
                        if let Err(e) = game.tick().await {
                            error!("Tick failed: {}", e);
                        }
                    }
                }
            }

            info!("Game loop stopped");
        });
    }
}
