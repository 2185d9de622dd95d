//! World parameters and the geometry of the toroidal world.
//!
//! Lengths are in micrometers, speeds in micrometers per second.

use crate::physics::Vector2;
use std::f32::consts::FRAC_PI_2;

pub const BACTERIA_STARTING_RADIUS: f32 = 0.5;
pub const BACTERIA_STARTING_SIZE: f32 = BACTERIA_STARTING_RADIUS * BACTERIA_STARTING_RADIUS * FRAC_PI_2;
pub const FOOD_ORGANISM_RADIUS: f32 = 0.3;
pub const FOOD_ORGANISM_SIZE: f32 = FOOD_ORGANISM_RADIUS * FOOD_ORGANISM_RADIUS * FRAC_PI_2;
/// Max speed of an organism that has eaten the whole nutrient budget.
pub const MIN_SPEED: f32 = 1.0;
/// Max speed of a freshly spawned bacteria.
pub const MAX_SPEED: f32 = MIN_SPEED * 5.0;
/// A predator must be at least this many times wider than its prey.
pub const MINIMAL_RADIUS_MODIFIER_TO_EAT: f32 = 1.25;
pub const VIEW_DISTANCE: f32 = 20.0;

/// Area covered by a circle of the given radius, as used for organism sizes.
pub fn size_of(radius: f32) -> f32 {
    radius * radius * FRAC_PI_2
}

/// Inverse of [`size_of`].
pub fn radius_of(size: f32) -> f32 {
    (size * 2.0 / std::f32::consts::PI).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("world size must be a positive finite number, got {0}")]
    WorldSize(f32),
    #[error("total nutrient must be finite and exceed the starting bacteria size, got {0}")]
    TotalNutrient(f32),
}

/// Immutable world parameters shared by the simulation, the visibility
/// filter and the connect handshake.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Universe {
    world_size: f32,
    total_nutrient: f32,
    half_world_size: f32,
    speed_size_modifier: f32,
}

impl Universe {
    pub fn new(world_size: f32, total_nutrient: f32) -> Self {
        Self {
            world_size,
            total_nutrient,
            half_world_size: world_size / 2.0,
            speed_size_modifier: (MIN_SPEED - MAX_SPEED) / (total_nutrient - BACTERIA_STARTING_SIZE),
        }
    }

    /// Like [`Universe::new`], but rejects parameters the simulation cannot
    /// run with: an empty or non-finite world, or a nutrient budget that
    /// leaves no room for growth.
    pub fn try_new(world_size: f32, total_nutrient: f32) -> Result<Self, UniverseError> {
        if !world_size.is_finite() || world_size <= 0.0 {
            return Err(UniverseError::WorldSize(world_size));
        }
        if !total_nutrient.is_finite() || total_nutrient <= BACTERIA_STARTING_SIZE {
            return Err(UniverseError::TotalNutrient(total_nutrient));
        }

        Ok(Self::new(world_size, total_nutrient))
    }

    pub fn world_size(&self) -> f32 {
        self.world_size
    }

    pub fn total_nutrient(&self) -> f32 {
        self.total_nutrient
    }

    pub fn speed_size_modifier(&self) -> f32 {
        self.speed_size_modifier
    }

    /// Max speed of an organism with the given radius.
    ///
    /// Linear in size: [`MAX_SPEED`] at the starting size, [`MIN_SPEED`] once
    /// the organism holds the whole nutrient budget. Not clamped; sizes outside
    /// that range extrapolate the line.
    pub fn max_speed(&self, radius: f32) -> f32 {
        MAX_SPEED + self.speed_size_modifier * (size_of(radius) - BACTERIA_STARTING_SIZE)
    }

    /// Shortest vector from `origin` to `point` on the torus.
    pub fn wrapped_delta(&self, origin: Vector2, point: Vector2) -> Vector2 {
        Vector2 {
            x: self.wrap_component(point.x - origin.x),
            y: self.wrap_component(point.y - origin.y),
        }
    }

    /// [`Universe::wrapped_delta`] for every point of a batch.
    pub fn wrapped_deltas(&self, origin: Vector2, points: &[Vector2]) -> Vec<Vector2> {
        points
            .iter()
            .map(|point| self.wrapped_delta(origin, *point))
            .collect()
    }

    pub fn wrapped_distance(&self, origin: Vector2, point: Vector2) -> f32 {
        self.wrapped_delta(origin, point).magnitude()
    }

    pub fn wrapped_distances(&self, origin: Vector2, points: &[Vector2]) -> Vec<f32> {
        points
            .iter()
            .map(|point| self.wrapped_distance(origin, *point))
            .collect()
    }

    fn wrap_component(&self, delta: f32) -> f32 {
        if delta > self.half_world_size {
            delta - self.world_size
        } else if delta < -self.half_world_size {
            delta + self.world_size
        } else {
            delta
        }
    }
}
