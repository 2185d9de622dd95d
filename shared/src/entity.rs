use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::physics::Vector2;
use crate::universe::{size_of, FOOD_ORGANISM_RADIUS};

/// Ids wrap back to 1 after `ORGANISM_MAX_COUNT - 1`.
pub const ORGANISM_MAX_COUNT: u32 = 9999;

// Anything that occupies a circle in the world
pub trait Organic {
    fn id(&self) -> u32;
    fn position(&self) -> Vector2;
    fn radius(&self) -> f32;

    fn size(&self) -> f32 {
        size_of(self.radius())
    }
}

/// A passive organism; every organism that is not a bacteria is food.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organism {
    pub id: u32,
    pub position: Vector2,
    pub radius: f32,
}

impl Organism {
    pub fn new(id: u32, position: Vector2, radius: f32) -> Self {
        Organism {
            id,
            position,
            radius,
        }
    }

    pub fn food(id: u32, position: Vector2) -> Self {
        Organism::new(id, position, FOOD_ORGANISM_RADIUS)
    }
}

/// A player-controlled organism.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bacteria {
    pub id: u32,
    pub position: Vector2,
    pub radius: f32,
    pub name: String,
    /// World units per second.
    pub current_speed: Vector2,
    pub max_speed: f32,
    /// Cosmetic only.
    pub hue: f32,
}

impl Bacteria {
    pub fn new(id: u32, name: impl Into<String>, position: Vector2, radius: f32, max_speed: f32) -> Self {
        Bacteria {
            id,
            position,
            radius,
            name: name.into(),
            current_speed: Vector2::ZERO,
            max_speed,
            hue: 0.1,
        }
    }
}

macro_rules! impl_organic {
    ($($ty:ty),*) => {
        $(
            impl Organic for $ty {
                fn id(&self) -> u32 {
                    self.id
                }

                fn position(&self) -> Vector2 {
                    self.position
                }

                fn radius(&self) -> f32 {
                    self.radius
                }
            }

            impl PartialEq for $ty {
                fn eq(&self, other: &Self) -> bool {
                    self.id == other.id
                }
            }

            impl Eq for $ty {}

            impl Hash for $ty {
                fn hash<H: Hasher>(&self, state: &mut H) {
                    self.id.hash(state);
                }
            }
        )*
    };
}

impl_organic!(Organism, Bacteria);

/// All live organisms and bacterias at one simulation tick.
///
/// Lookups by id are linear scans; populations stay in the hundreds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub bacterias: Vec<Bacteria>,
    pub organisms: Vec<Organism>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bacteria_by_id(&self, id: u32) -> Option<&Bacteria> {
        self.bacterias.iter().find(|bacteria| bacteria.id == id)
    }

    pub fn bacteria_by_id_mut(&mut self, id: u32) -> Option<&mut Bacteria> {
        self.bacterias.iter_mut().find(|bacteria| bacteria.id == id)
    }

    pub fn organism_by_id(&self, id: u32) -> Option<&Organism> {
        self.organisms.iter().find(|organism| organism.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.bacterias.is_empty() && self.organisms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bacterias.len() + self.organisms.len()
    }

    /// Ids currently in use by either collection.
    pub fn live_ids(&self) -> HashSet<u32> {
        self.bacterias
            .iter()
            .map(|bacteria| bacteria.id)
            .chain(self.organisms.iter().map(|organism| organism.id))
            .collect()
    }
}

/// Monotonic id counter that wraps at [`ORGANISM_MAX_COUNT`].
///
/// Issues `1, 2, .., ORGANISM_MAX_COUNT - 1, 1, ..`; `0` is never issued.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU32,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator whose next id follows `last`.
    pub fn starting_after(last: u32) -> Self {
        Self {
            last: AtomicU32::new(last % ORGANISM_MAX_COUNT),
        }
    }

    pub fn next_id(&self) -> u32 {
        match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(advance(last)))
        {
            Ok(previous) | Err(previous) => advance(previous),
        }
    }

    /// Next id not contained in `live`.
    ///
    /// After a full cycle without a free id the next id is returned anyway.
    pub fn next_free_id(&self, live: &HashSet<u32>) -> u32 {
        let first = self.next_id();
        if !live.contains(&first) {
            return first;
        }

        for _ in 1..ORGANISM_MAX_COUNT - 1 {
            let id = self.next_id();
            if !live.contains(&id) {
                return id;
            }
        }

        log::warn!("All {} organism ids are in use", ORGANISM_MAX_COUNT - 1);
        self.next_id()
    }
}

fn advance(last: u32) -> u32 {
    last % (ORGANISM_MAX_COUNT - 1) + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::size_of;
    use assert_approx_eq::assert_approx_eq;
    use std::f32::consts::PI;

    fn bacteria(id: u32, x: f32, y: f32) -> Bacteria {
        Bacteria::new(id, "asd", Vector2::new(x, y), 1.0, 0.0)
    }

    #[test]
    fn test_size() {
        let organism = Organism::new(1, Vector2::ZERO, 2.0);
        assert_approx_eq!(organism.size(), 4.0 * PI / 2.0, 1e-6);
        assert_approx_eq!(organism.size(), size_of(2.0), 1e-6);
    }

    #[test]
    fn test_equality_is_by_id() {
        let mut a = bacteria(7, 0.0, 0.0);
        let b = bacteria(7, 5.0, 5.0);
        assert_eq!(a, b);

        a.id = 8;
        assert_ne!(a, b);
    }

    #[test]
    fn test_get_bacteria_by_id() {
        let snapshot = Snapshot {
            bacterias: vec![bacteria(3, 0.0, 0.0)],
            organisms: vec![],
        };

        assert_eq!(snapshot.bacteria_by_id(3).map(|b| b.id), Some(3));
        assert!(snapshot.bacteria_by_id(8).is_none());
    }

    #[test]
    fn test_get_organism_by_id() {
        let snapshot = Snapshot {
            bacterias: vec![],
            organisms: vec![Organism::food(4, Vector2::ZERO)],
        };

        assert_eq!(snapshot.organism_by_id(4).map(|o| o.radius), Some(FOOD_ORGANISM_RADIUS));
        assert!(snapshot.organism_by_id(8).is_none());
    }

    #[test]
    fn test_live_ids() {
        let snapshot = Snapshot {
            bacterias: vec![bacteria(1, 0.0, 0.0)],
            organisms: vec![Organism::food(2, Vector2::ZERO)],
        };

        assert_eq!(snapshot.live_ids(), HashSet::from([1, 2]));
        assert_eq!(snapshot.len(), 2);
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_id_generator_is_monotonic() {
        let ids = IdGenerator::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.next_id(), 3);
    }

    #[test]
    fn test_id_generator_wraps_without_zero() {
        let ids = IdGenerator::starting_after(ORGANISM_MAX_COUNT - 2);
        assert_eq!(ids.next_id(), ORGANISM_MAX_COUNT - 1);
        assert_eq!(ids.next_id(), 1);
    }

    #[test]
    fn test_next_free_id_skips_live_ids() {
        let ids = IdGenerator::new();
        let live = HashSet::from([1, 2, 4]);

        assert_eq!(ids.next_free_id(&live), 3);
        assert_eq!(ids.next_free_id(&live), 5);
    }
}
