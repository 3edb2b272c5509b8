#![warn(rust_2018_idioms)]

use std::env;

use pdv_routing::{
    error::Result,
    genetic::GeneticEngine,
    network::Network,
    parse::{parse_problem, save_problem},
    point::Point,
    problem::{NodeDescription, ProblemDescription},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Simulated seconds per tick
const TICK_SECONDS: f64 = 3600.0;
/// Number of ticks to simulate
const TICKS: usize = 240;

/// A square field of `n` nodes with random positions and charge levels
fn gen_random_problem(n: usize, side: f64) -> ProblemDescription {
    let nodes = (0..n).map(|_| NodeDescription {
        x: fastrand::f64() * side,
        y: fastrand::f64() * side,
        voltage: 3.3 + fastrand::f64() * 0.9,
        pressure_sensor: fastrand::bool(),
    }).collect();
    ProblemDescription {
        origin: Point::new(side / 2.0, side / 2.0),
        nodes,
        ga: Default::default(),
        pdv: Default::default(),
        node: Default::default(),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let problem = match env::args().nth(1) {
        Some(path) => parse_problem(path)?,
        None => {
            let problem = gen_random_problem(30, 8.0);
            save_problem("random_network.toml", &problem)?;
            problem
        }
    };
    let mut network = Network::from_description(&problem)?;
    let mut engine = GeneticEngine::new(problem.origin, &problem.config())?;

    for tick in 0..TICKS {
        network.tick(TICK_SECONDS);
        if engine.check_task(&network.nodes) {
            continue;
        }
        let request = network.reachable_requests();
        if request.is_empty() {
            continue;
        }
        match engine.calc_final_path(&network.nodes, &request) {
            Ok(solution) => {
                let delivered = network.apply_solution(&solution);
                info!(
                    tick, requests = request.len(), pdvs = solution.pdv_num(),
                    fitness = solution.fitness, delivered, "Charging round done"
                );
            }
            Err(e) => warn!(tick, error = %e, "Charging round skipped"),
        }
    }
    Ok(())
}
