//! This module contains interfaces for the optimiser: the `ProblemDescription` of a sensor network
//! scenario, the encoding of candidate routes, and the `Solution` the engine returns

use std::{collections::HashSet, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    config::{Config, GaConfig, PdvParams},
    point::Point,
    sensor::EnergyModel,
};

/// Ordered registry indices of the nodes one PDV visits
pub type Lane = Vec<usize>;
/// One lane per PDV; together the lanes partition the request set
pub type Candidate = Vec<Lane>;
/// All candidates of one generation
pub type Population = Vec<Candidate>;

fn default_voltage() -> f64 {
    3.4
}

fn default_sensor_type() -> bool {
    true
}

/// Initial state of one sensor node in a scenario
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct NodeDescription {
    pub x: f64,
    pub y: f64,
    /// Starting capacitor voltage [V]
    #[serde(default = "default_voltage")]
    pub voltage: f64,
    /// Pressure sensor if true, temperature sensor otherwise
    #[serde(default = "default_sensor_type")]
    pub pressure_sensor: bool,
}

/// A description of a sensor network and the fleet that serves it
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ProblemDescription {
    /// The base station PDVs take off from and return to
    #[serde(default)]
    pub origin: Point,
    /// Every sensor node of the network
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub ga: GaConfig,
    #[serde(default)]
    pub pdv: PdvParams,
    #[serde(default)]
    pub node: EnergyModel,
}
impl ProblemDescription {
    /// The parameter sections of this scenario
    pub fn config(&self) -> Config {
        Config { ga: self.ga.clone(), pdv: self.pdv.clone(), node: self.node.clone() }
    }
}

/// True when the lanes of `candidate` contain every index of `request` exactly once, and nothing else
pub fn is_partition(candidate: &[Lane], request: &[usize]) -> bool {
    let wanted: HashSet<usize> = request.iter().copied().collect();
    let mut seen = HashSet::with_capacity(wanted.len());
    for &i in candidate.iter().flatten() {
        if !wanted.contains(&i) || !seen.insert(i) {
            return false;
        }
    }
    seen.len() == wanted.len()
}

/// The optimiser's best charging plan for one request batch
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Visiting order of each PDV
    pub routes: Vec<Lane>,
    /// Fitness of each route
    pub lane_fitness: Vec<f64>,
    /// Sum of the route fitnesses, where higher is better
    pub fitness: f64,
    /// Which candidate of the final target population this came from
    pub population_index: usize,
    /// Generations run before stopping
    pub generations: usize,
    /// Wall time spent in the optimiser
    pub elapsed: Duration,
}
impl Solution {
    /// Ensures the routes visit every requested node exactly once
    pub fn check_feasibility(&self, request: &[usize]) -> bool {
        self.routes.len() == self.lane_fitness.len() && is_partition(&self.routes, request)
    }

    /// Number of PDVs the plan sends out
    pub fn pdv_num(&self) -> usize {
        self.routes.len()
    }
}
