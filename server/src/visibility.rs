//! Per-client culling of game status snapshots
//!
//! Each connected address controls one bacteria. The filter keeps the most
//! recent published snapshot together with a flat position index
//! (organisms first, then bacterias) and answers, per address, with the part
//! of the world lying within [`VIEW_DISTANCE`] of that address's bacteria.
//!
//! Snapshots reach the filter after they were taken, so a freshly registered
//! bacteria may be missing from the first few. A player is only considered
//! eaten once its bacteria has been seen in a snapshot and then disappears.

use log::debug;
use shared::entity::Snapshot;
use shared::universe::{Universe, VIEW_DISTANCE};
use shared::Vector2;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::Mutex;

/// Where a flattened position came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityRef {
    Organism(usize),
    Bacteria(usize),
}

#[derive(Debug, Clone, Copy)]
struct Player {
    bacteria_id: u32,
    seen_alive: bool,
}

#[derive(Debug, Default)]
struct FilterState {
    players: HashMap<SocketAddr, Player>,
    snapshot: Snapshot,
    positions: Vec<Vector2>,
    index: Vec<EntityRef>,
}

impl FilterState {
    fn rebuild_index(&mut self) {
        let organisms = self.snapshot.organisms.iter().enumerate();
        let bacterias = self.snapshot.bacterias.iter().enumerate();

        self.positions.clear();
        self.index.clear();

        for (i, organism) in organisms {
            self.positions.push(organism.position);
            self.index.push(EntityRef::Organism(i));
        }
        for (i, bacteria) in bacterias {
            self.positions.push(bacteria.position);
            self.index.push(EntityRef::Bacteria(i));
        }
    }
}

#[derive(Debug)]
pub struct VisibilityFilter {
    universe: Universe,
    state: Mutex<FilterState>,
}

impl VisibilityFilter {
    pub fn new(universe: Universe) -> Self {
        Self {
            universe,
            state: Mutex::new(FilterState::default()),
        }
    }

    /// Replaces the cached snapshot and rebuilds the position index.
    pub async fn set_snapshot(&self, snapshot: Snapshot) {
        let mut state = self.state.lock().await;
        state.snapshot = snapshot;
        state.rebuild_index();
    }

    /// Associates `addr` with the bacteria it controls.
    pub async fn register_player(&self, addr: SocketAddr, bacteria_id: u32) {
        let player = Player {
            bacteria_id,
            seen_alive: false,
        };
        self.state.lock().await.players.insert(addr, player);
    }

    /// Drops the mappings of addresses that no longer receive updates.
    pub async fn forget_players(&self, addrs: &[SocketAddr]) {
        let mut state = self.state.lock().await;
        for addr in addrs {
            if let Some(player) = state.players.remove(addr) {
                debug!("Forgot bacteria {} of expired {}", player.bacteria_id, addr);
            }
        }
    }

    /// Copy of the address to bacteria id mapping.
    pub async fn players(&self) -> HashMap<SocketAddr, u32> {
        self.state
            .lock()
            .await
            .players
            .iter()
            .map(|(addr, player)| (*addr, player.bacteria_id))
            .collect()
    }

    /// The part of the cached snapshot visible from `addr`.
    ///
    /// Returns `None` when `addr` controls no bacteria or its bacteria is not
    /// in the snapshot. A bacteria that was seen before and is now missing has
    /// been eaten, and its address is deregistered.
    pub async fn filtered(&self, addr: SocketAddr) -> Option<Snapshot> {
        let mut state = self.state.lock().await;
        let player = *state.players.get(&addr)?;

        let Some(origin) = state.snapshot.bacteria_by_id(player.bacteria_id).map(|b| b.position) else {
            if player.seen_alive {
                state.players.remove(&addr);
                debug!("Bacteria {} of {} is gone, no more updates", player.bacteria_id, addr);
            }
            return None;
        };

        if !player.seen_alive {
            if let Some(entry) = state.players.get_mut(&addr) {
                entry.seen_alive = true;
            }
        }

        let distances = self.universe.wrapped_distances(origin, &state.positions);
        let mut visible = Snapshot::new();

        for (entity, distance) in state.index.iter().zip(distances) {
            if distance >= VIEW_DISTANCE {
                continue;
            }

            match *entity {
                EntityRef::Organism(i) => visible.organisms.push(state.snapshot.organisms[i].clone()),
                EntityRef::Bacteria(i) => visible.bacterias.push(state.snapshot.bacterias[i].clone()),
            }
        }

        Some(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::entity::{Bacteria, Organism};
    use tokio_test::block_on;

    fn universe() -> Universe {
        Universe::new(1000.0, 10.0)
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn bacteria(id: u32, x: f32, y: f32) -> Bacteria {
        Bacteria::new(id, format!("player{}", id), Vector2::new(x, y), 0.5, 5.0)
    }

    fn ids<T: shared::Organic>(items: &[T]) -> Vec<u32> {
        let mut ids: Vec<u32> = items.iter().map(|i| i.id()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_register_player() {
        let filter = VisibilityFilter::new(universe());

        block_on(filter.register_player(addr(9999), 7));

        assert_eq!(block_on(filter.players()).get(&addr(9999)), Some(&7));
    }

    #[tokio::test]
    async fn test_filtered_snapshot() {
        let filter = VisibilityFilter::new(universe());
        let far = VIEW_DISTANCE + 10.0;

        let snapshot = Snapshot {
            bacterias: vec![bacteria(1, 0.0, 0.0), bacteria(2, 1.0, 1.0), bacteria(3, far, far)],
            organisms: vec![
                Organism::food(4, Vector2::new(5.0, 5.0)),
                Organism::food(5, Vector2::new(VIEW_DISTANCE + 5.0, VIEW_DISTANCE + 5.0)),
            ],
        };
        filter.set_snapshot(snapshot).await;

        filter.register_player(addr(1), 1).await;
        filter.register_player(addr(2), 2).await;
        filter.register_player(addr(3), 3).await;

        let first = filter.filtered(addr(1)).await.unwrap();
        assert_eq!(ids(&first.bacterias), vec![1, 2]);
        assert_eq!(ids(&first.organisms), vec![4]);

        let second = filter.filtered(addr(2)).await.unwrap();
        assert_eq!(ids(&second.bacterias), vec![1, 2]);
        assert_eq!(ids(&second.organisms), vec![4]);

        let third = filter.filtered(addr(3)).await.unwrap();
        assert_eq!(ids(&third.bacterias), vec![3]);
        assert_eq!(ids(&third.organisms), vec![5]);
    }

    #[tokio::test]
    async fn test_view_wraps_around_world_edge() {
        let filter = VisibilityFilter::new(universe());

        let snapshot = Snapshot {
            bacterias: vec![bacteria(1, 995.0, 500.0)],
            organisms: vec![Organism::food(2, Vector2::new(5.0, 500.0))],
        };
        filter.set_snapshot(snapshot).await;
        filter.register_player(addr(1), 1).await;

        let visible = filter.filtered(addr(1)).await.unwrap();
        assert_eq!(ids(&visible.organisms), vec![2]);
    }

    #[tokio::test]
    async fn test_view_distance_is_exclusive() {
        let filter = VisibilityFilter::new(universe());

        let snapshot = Snapshot {
            bacterias: vec![bacteria(1, 100.0, 100.0)],
            organisms: vec![
                Organism::food(2, Vector2::new(100.0 + VIEW_DISTANCE, 100.0)),
                Organism::food(3, Vector2::new(100.0 + VIEW_DISTANCE - 0.01, 100.0)),
            ],
        };
        filter.set_snapshot(snapshot).await;
        filter.register_player(addr(1), 1).await;

        let visible = filter.filtered(addr(1)).await.unwrap();
        assert_eq!(ids(&visible.organisms), vec![3]);
        assert_eq!(ids(&visible.bacterias), vec![1]);
    }

    #[tokio::test]
    async fn test_unknown_address() {
        let filter = VisibilityFilter::new(universe());
        assert!(filter.filtered(addr(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_eaten_bacteria_deregisters_address() {
        let filter = VisibilityFilter::new(universe());

        filter.register_player(addr(1), 1).await;
        filter
            .set_snapshot(Snapshot {
                bacterias: vec![bacteria(1, 0.0, 0.0)],
                organisms: vec![],
            })
            .await;
        assert!(filter.filtered(addr(1)).await.is_some());

        filter.set_snapshot(Snapshot::new()).await;

        assert!(filter.filtered(addr(1)).await.is_none());
        assert!(filter.players().await.get(&addr(1)).is_none());
    }

    #[tokio::test]
    async fn test_snapshot_older_than_registration_keeps_player() {
        let filter = VisibilityFilter::new(universe());
        let stale = Snapshot {
            bacterias: vec![bacteria(1, 0.0, 0.0)],
            organisms: vec![],
        };

        filter.set_snapshot(stale.clone()).await;
        filter.register_player(addr(2), 2).await;

        assert!(filter.filtered(addr(2)).await.is_none());
        filter.set_snapshot(stale).await;
        assert!(filter.filtered(addr(2)).await.is_none());
        assert_eq!(filter.players().await.get(&addr(2)), Some(&2));

        filter
            .set_snapshot(Snapshot {
                bacterias: vec![bacteria(1, 0.0, 0.0), bacteria(2, 1.0, 1.0)],
                organisms: vec![],
            })
            .await;

        let visible = filter.filtered(addr(2)).await.unwrap();
        assert_eq!(ids(&visible.bacterias), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_forget_players() {
        let filter = VisibilityFilter::new(universe());
        filter.register_player(addr(1), 1).await;
        filter.register_player(addr(2), 2).await;

        filter.forget_players(&[addr(1), addr(3)]).await;

        let players = filter.players().await;
        assert_eq!(players.len(), 1);
        assert_eq!(players.get(&addr(2)), Some(&2));
    }

    #[tokio::test]
    async fn test_index_follows_latest_snapshot() {
        let filter = VisibilityFilter::new(universe());
        filter.register_player(addr(1), 1).await;

        filter
            .set_snapshot(Snapshot {
                bacterias: vec![bacteria(1, 0.0, 0.0)],
                organisms: vec![Organism::food(2, Vector2::new(1.0, 1.0))],
            })
            .await;
        assert_eq!(ids(&filter.filtered(addr(1)).await.unwrap().organisms), vec![2]);

        filter
            .set_snapshot(Snapshot {
                bacterias: vec![bacteria(1, 500.0, 500.0)],
                organisms: vec![Organism::food(2, Vector2::new(1.0, 1.0))],
            })
            .await;
        assert!(filter.filtered(addr(1)).await.unwrap().organisms.is_empty());
    }
}
