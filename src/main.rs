use std::time::Instant;

use tilesim::{Scenario, Simulation};

/// Simulated seconds per frame.
const DT: f64 = 1.0 / 60.0;

/// Frames between progress reports: one simulated minute.
const NUM_FRAMES: u32 = 3600;

fn main() -> tilesim::Result<()> {
    let scenario = match std::env::args().nth(1) {
        Some(path) => Scenario::load(path)?,
        None => Scenario::builtin(),
    };
    let mut sim = Simulation::from_scenario(&scenario)?;
    let mut clock_ms = 0.0;

    println!("Simulating...");
    loop {
        let start = Instant::now();
        for _ in 0..NUM_FRAMES {
            clock_ms += 1000.0 * DT;
            sim.step(DT, clock_ms as u64);
        }
        let frame = start.elapsed() / NUM_FRAMES;
        let score: f64 = sim
            .iter_lights()
            .filter_map(|(id, _)| sim.light_stats(id))
            .map(|stats| stats.total_reward)
            .sum();
        println!(
            "{:.0} min: avg. frame {:?} --> {:.0}x speedup | {} vehs, {} arrived, {} crashes | {} states, score {:.0}",
            clock_ms / 60_000.0,
            frame,
            DT / frame.as_secs_f64(),
            sim.iter_vehicles().count(),
            sim.arrivals(),
            sim.crashes(),
            sim.policy().len(),
            score,
        );
    }
}
