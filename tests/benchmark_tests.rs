//! Performance benchmarks for the simulation and broadcast hot paths

use server::simulation::Simulation;
use server::visibility::VisibilityFilter;
use shared::{Bacteria, Message, Snapshot, Universe, Vector2};
use std::net::SocketAddr;
use std::time::Instant;

fn populated_world(universe: &Universe, bacteria_count: u32) -> (Simulation, Snapshot) {
    let mut simulation = Simulation::with_seed(*universe, 7);
    let mut snapshot = Snapshot::new();

    for i in 0..bacteria_count {
        let position = simulation.random_position();
        let mut bacteria = Bacteria::new(i + 1, format!("bot{}", i), position, 0.5, 5.0);
        bacteria.current_speed = Vector2::from_polar(5.0, i as f32);
        snapshot.bacterias.push(bacteria);
    }
    simulation.place_food(&mut snapshot);

    (simulation, snapshot)
}

/// Benchmarks full simulation ticks on a crowded world
#[test]
fn benchmark_simulation_step() {
    let universe = Universe::new(200.0, 90.0);
    let (mut simulation, mut snapshot) = populated_world(&universe, 50);

    let iterations = 200;
    let start = Instant::now();

    for _ in 0..iterations {
        simulation.step(&mut snapshot).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Simulation step: {} ticks in {:?} ({:.2} μs/tick), {} organisms",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64,
        snapshot.organisms.len()
    );

    // A tick has 25ms; stay well inside it even unoptimized
    assert!(duration.as_secs_f64() / (iterations as f64) < 0.025);
}

/// Benchmarks per-client visibility filtering
#[test]
fn benchmark_visibility_filter() {
    let universe = Universe::new(200.0, 90.0);
    let (_, snapshot) = populated_world(&universe, 50);

    let filter = VisibilityFilter::new(universe);
    let addrs: Vec<SocketAddr> = (0..50u16)
        .map(|i| SocketAddr::from(([127, 0, 0, 1], 10_000 + i)))
        .collect();

    tokio_test::block_on(async {
        filter.set_snapshot(snapshot).await;
        for (i, addr) in addrs.iter().enumerate() {
            filter.register_player(*addr, i as u32 + 1).await;
        }
    });

    let iterations = 20;
    let start = Instant::now();

    tokio_test::block_on(async {
        for _ in 0..iterations {
            for addr in &addrs {
                assert!(filter.filtered(*addr).await.is_some());
            }
        }
    });

    let duration = start.elapsed();
    let queries = iterations * addrs.len();
    println!(
        "Visibility filter: {} queries in {:?} ({:.2} μs/query)",
        queries,
        duration,
        duration.as_micros() as f64 / queries as f64
    );

    // One broadcast round for 50 clients has to fit in a tick
    assert!(duration.as_secs_f64() / (iterations as f64) < 0.025);
}

/// Benchmarks encoding a full-world status update
#[test]
fn benchmark_status_update_packing() {
    let universe = Universe::new(200.0, 90.0);
    let (_, snapshot) = populated_world(&universe, 50);

    let iterations = 100;
    let start = Instant::now();
    let mut packed_len = 0;

    for _ in 0..iterations {
        let message = Message::GameStatusUpdate {
            snapshot: snapshot.clone(),
        };
        packed_len = message.pack().unwrap().len();
    }

    let duration = start.elapsed();
    println!(
        "Status update packing: {} iterations in {:?} ({:.2} μs/iter), {} bytes",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64,
        packed_len
    );

    assert!(packed_len <= shared::message::MAX_DATAGRAM_SIZE);
    assert!(duration.as_millis() < 2000);
}
