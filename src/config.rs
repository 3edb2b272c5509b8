//! Tunable parameters of the optimiser and of the PDV fleet.
//! Varying these changes the quality and speed of the solution.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    sensor::EnergyModel,
};

/// Parameters of the genetic algorithm
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GaConfig {
    /// Number of candidates in each of the target and trail populations
    pub pop_num: usize,
    /// Percentage (0 to 100) of the population recombined each generation;
    /// the rest is swap-mutated
    pub cross_ratio: u32,
    /// Fleet size; estimated from the request set when absent
    pub pdv_num: Option<usize>,
    /// The engine is not invoked until this many nodes request a recharge
    pub min_requests: usize,
    /// Fail count after which a node is considered unreachable
    pub max_fails: u32,
    /// Upper bound on the number of generations
    pub max_generations: usize,
    /// Stop early when the best total fitness hasn't improved for this many generations
    pub stall_generations: Option<usize>,
    /// Rank (by distance to the base station) of the request node the first candidate is seeded from
    pub r_num: usize,
    /// Seed for reproducible runs
    pub seed: Option<u64>,
    /// Weight of the recharged energy term
    pub alpha: f64,
    /// Weight of the flight distance term
    pub beta: f64,
    /// Weight of the PDV energy term
    pub gamma: f64,
    /// Initial guess file: read from when present, written to otherwise
    pub guess_path: Option<PathBuf>,
    /// Where to write the best path, if anywhere
    pub best_path_out: Option<PathBuf>,
}
impl Default for GaConfig {
    fn default() -> Self {
        Self {
            pop_num: 20,
            cross_ratio: 50,
            pdv_num: None,
            min_requests: 5,
            max_fails: 5,
            max_generations: 200,
            stall_generations: Some(50),
            r_num: 0,
            seed: None,
            alpha: 0.5,
            beta: 0.3,
            gamma: 0.2,
            guess_path: None,
            best_path_out: None,
        }
    }
}
impl GaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pop_num == 0 {
            return Err(Error::Config("pop_num must be at least 1".into()));
        }
        if self.cross_ratio > 100 {
            return Err(Error::Config(format!("cross_ratio is a percentage, got {}", self.cross_ratio)));
        }
        if self.pdv_num == Some(0) {
            return Err(Error::Config("pdv_num must be at least 1".into()));
        }
        if [self.alpha, self.beta, self.gamma].iter().any(|w| *w < 0.0) {
            return Err(Error::Config("fitness weights must be non-negative".into()));
        }
        let total = self.alpha + self.beta + self.gamma;
        if (total - 1.0).abs() > 1e-9 {
            return Err(Error::Config(format!(
                "alpha + beta + gamma must equal 1.0, got {} + {} + {} = {}",
                self.alpha, self.beta, self.gamma, total
            )));
        }
        Ok(())
    }
}

/// Capabilities of a single power-delivery vehicle
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PdvParams {
    /// Energy spent per metre of flight [J/m]
    pub flight_energy_per_metre: f64,
    /// Usable battery energy per sortie [J]
    pub energy_budget: f64,
    /// Most nodes one PDV serves per sortie
    pub max_nodes_per_pdv: usize,
    /// Distance between the hovering PDV and the node it charges [m]
    pub hover_distance: f64,
    /// Longest round trip a PDV can fly [m]
    pub max_range: f64,
}
impl Default for PdvParams {
    fn default() -> Self {
        Self {
            flight_energy_per_metre: 5.0,
            energy_budget: 600.0,
            max_nodes_per_pdv: 8,
            hover_distance: 0.2,
            max_range: 50.0,
        }
    }
}
impl PdvParams {
    pub fn validate(&self, model: &EnergyModel) -> Result<()> {
        if self.energy_budget <= 0.0 || self.flight_energy_per_metre < 0.0 {
            return Err(Error::Config("PDV energy figures must be positive".into()));
        }
        if self.max_nodes_per_pdv == 0 {
            return Err(Error::Config("max_nodes_per_pdv must be at least 1".into()));
        }
        if self.hover_distance < 0.0 || self.hover_distance > model.max_acous_dist {
            return Err(Error::Config(format!(
                "hover_distance must lie within acoustic range [0, {}], got {}",
                model.max_acous_dist, self.hover_distance
            )));
        }
        Ok(())
    }
}

/// Every parameter section of a run, as laid out in a scenario file
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub ga: GaConfig,
    pub pdv: PdvParams,
    pub node: EnergyModel,
}
impl Config {
    pub fn validate(&self) -> Result<()> {
        self.ga.validate()?;
        self.pdv.validate(&self.node)?;
        if self.node.capacitance <= 0.0 || self.node.v_max <= self.node.v_critical {
            return Err(Error::Config("node needs positive capacitance and v_max above v_critical".into()));
        }
        Ok(())
    }
}
