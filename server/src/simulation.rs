//! Per-tick physics, feeding and food spawning on a toroidal world.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::entity::{Bacteria, IdGenerator, Organic, Organism, Snapshot};
use shared::universe::{radius_of, Universe, FOOD_ORGANISM_SIZE, MAX_SPEED, MINIMAL_RADIUS_MODIFIER_TO_EAT, MIN_SPEED};
use shared::{Vector2, REFRESH_FREQUENCY};
use std::collections::HashSet;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("bacteria {id} grew into an invalid state (radius {radius}, max speed {max_speed})")]
    InvalidGrowth { id: u32, radius: f32, max_speed: f32 },
}

/// Advances a [`Snapshot`] by one tick.
///
/// Owns the id counter and the random source, nothing else; all world state
/// lives in the snapshot passed to each call.
#[derive(Debug)]
pub struct Simulation {
    universe: Universe,
    ids: IdGenerator,
    rng: StdRng,
}

impl Simulation {
    pub fn new(universe: Universe) -> Self {
        Self::with_rng(universe, StdRng::from_entropy())
    }

    /// Simulation with a reproducible random source.
    pub fn with_seed(universe: Universe, seed: u64) -> Self {
        Self::with_rng(universe, StdRng::seed_from_u64(seed))
    }

    fn with_rng(universe: Universe, rng: StdRng) -> Self {
        Self {
            universe,
            ids: IdGenerator::new(),
            rng,
        }
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// Next id that no organism or bacteria of `snapshot` is using.
    pub fn next_id(&self, snapshot: &Snapshot) -> u32 {
        self.ids.next_free_id(&snapshot.live_ids())
    }

    /// Uniformly random position in `[0, world_size)²`.
    pub fn random_position(&mut self) -> Vector2 {
        let world_size = self.universe.world_size();
        Vector2::new(
            self.rng.gen_range(0.0..world_size),
            self.rng.gen_range(0.0..world_size),
        )
    }

    pub fn random_hue(&mut self) -> f32 {
        self.rng.gen()
    }

    /// Runs one tick: move, place food, bacterias eat bacterias, bacterias eat food.
    ///
    /// Movement comes first so that feeding sees post-move positions, and food
    /// is placed before feeding so fresh food can be eaten in the same tick.
    pub fn step(&mut self, snapshot: &mut Snapshot) -> Result<(), SimulationError> {
        self.move_bacterias(snapshot);
        self.place_food(snapshot);
        self.feed_bacterias_to_other_bacterias(snapshot)?;
        self.feed_organisms_to_bacterias(snapshot)
    }

    /// Sum of the sizes of every organism and bacteria.
    pub fn total_organic_mass(snapshot: &Snapshot) -> f32 {
        let organisms: f64 = snapshot.organisms.iter().map(|o| o.size() as f64).sum();
        let bacterias: f64 = snapshot.bacterias.iter().map(|b| b.size() as f64).sum();
        (organisms + bacterias) as f32
    }

    pub fn move_bacterias(&self, snapshot: &mut Snapshot) {
        let world_size = self.universe.world_size();

        for bacteria in &mut snapshot.bacterias {
            let step = bacteria.current_speed / REFRESH_FREQUENCY as f32;
            bacteria.position = (bacteria.position + step).wrap(world_size);
        }
    }

    /// Tops the world up with food until the nutrient budget is used.
    ///
    /// Returns the number of organisms placed. Organisms stay sorted by x.
    pub fn place_food(&mut self, snapshot: &mut Snapshot) -> usize {
        let missing = self.universe.total_nutrient() - Self::total_organic_mass(snapshot);
        let organism_count = (missing / FOOD_ORGANISM_SIZE).floor();

        if organism_count < 1.0 {
            return 0;
        }

        let organism_count = organism_count as usize;
        let mut live = snapshot.live_ids();
        snapshot.organisms.reserve(organism_count);

        for _ in 0..organism_count {
            let id = self.ids.next_free_id(&live);
            live.insert(id);
            let position = self.random_position();
            snapshot.organisms.push(Organism::food(id, position));
        }

        snapshot
            .organisms
            .sort_by(|a, b| a.position.x.total_cmp(&b.position.x));

        organism_count
    }

    /// Bacterias eat smaller bacterias, largest predator first.
    pub fn feed_bacterias_to_other_bacterias(&self, snapshot: &mut Snapshot) -> Result<(), SimulationError> {
        snapshot
            .bacterias
            .sort_by(|a, b| b.size().total_cmp(&a.size()));

        let predator_ids: Vec<u32> = snapshot.bacterias.iter().map(|b| b.id).collect();

        for predator_id in predator_ids {
            // Eaten earlier in this tick
            let Some(index) = snapshot.bacterias.iter().position(|b| b.id == predator_id) else {
                continue;
            };

            let victims = self.bacterias_to_eat(&snapshot.bacterias[index], &snapshot.bacterias);
            if victims.is_empty() {
                continue;
            }

            let eaten: f32 = snapshot
                .bacterias
                .iter()
                .filter(|b| victims.contains(&b.id))
                .map(|b| b.size())
                .sum();

            self.grow(&mut snapshot.bacterias[index], eaten)?;
            snapshot.bacterias.retain(|b| !victims.contains(&b.id));
        }

        Ok(())
    }

    /// Every bacteria eats the food it covers.
    pub fn feed_organisms_to_bacterias(&self, snapshot: &mut Snapshot) -> Result<(), SimulationError> {
        for index in 0..snapshot.bacterias.len() {
            let food = self.organisms_to_eat(&snapshot.bacterias[index], &snapshot.organisms);
            if food.is_empty() {
                continue;
            }

            let eaten: f32 = snapshot
                .organisms
                .iter()
                .filter(|o| food.contains(&o.id))
                .map(|o| o.size())
                .sum();

            self.grow(&mut snapshot.bacterias[index], eaten)?;
            snapshot.organisms.retain(|o| !food.contains(&o.id));
        }

        Ok(())
    }

    /// Ids of the food within `bacteria`'s radius.
    pub fn organisms_to_eat(&self, bacteria: &Bacteria, organisms: &[Organism]) -> HashSet<u32> {
        organisms
            .iter()
            .filter(|o| self.universe.wrapped_distance(bacteria.position, o.position) < bacteria.radius)
            .map(|o| o.id)
            .collect()
    }

    /// Ids of the bacterias `predator` can eat: small enough, and whose centre
    /// lies within the predator's radius.
    pub fn bacterias_to_eat(&self, predator: &Bacteria, bacterias: &[Bacteria]) -> HashSet<u32> {
        bacterias
            .iter()
            .filter(|victim| victim.id != predator.id)
            .filter(|victim| predator.radius / victim.radius >= MINIMAL_RADIUS_MODIFIER_TO_EAT)
            .filter(|victim| self.universe.wrapped_distance(predator.position, victim.position) < predator.radius)
            .map(|victim| victim.id)
            .collect()
    }

    /// Adds `eaten` size to `bacteria` and rescales its speed so it keeps the
    /// same fraction of its (new) max speed.
    fn grow(&self, bacteria: &mut Bacteria, eaten: f32) -> Result<(), SimulationError> {
        let radius = radius_of(bacteria.size() + eaten);
        let max_speed = self
            .universe
            .max_speed(radius)
            .clamp(MIN_SPEED, MAX_SPEED);

        if !radius.is_finite() || !max_speed.is_finite() {
            return Err(SimulationError::InvalidGrowth {
                id: bacteria.id,
                radius,
                max_speed,
            });
        }

        let previous_max_speed = bacteria.max_speed;
        bacteria.radius = radius;
        bacteria.max_speed = max_speed;
        if previous_max_speed > 0.0 {
            bacteria.current_speed *= max_speed / previous_max_speed;
        }

        Ok(())
    }
}
