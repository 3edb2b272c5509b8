//! Scores a single PDV route.
//!
//! The fitness of a lane combines three terms of different units, each squashed into `[0, 1]` with `tanh`:
//!
//! - `E_wsn`, the energy needed to top up every visited node, scaled by the average share one PDV should deliver;
//! - `d_pdv`, the closed flight distance, placed between a nearest-neighbour and a farthest-neighbour tour
//!   over the same points;
//! - `E_pdv`, the energy the PDV spends flying and transmitting, relative to its budget.
//!
//! `M = α tanh(E_wsn) + β (1 - tanh(d_norm)) + γ (1 - tanh(E_pdv_norm))`, where higher is better.

use crate::{
    baseline::{far_neigh_dist, near_neigh_dist, tour_length},
    config::{GaConfig, PdvParams},
    point::Point,
    sensor::{EnergyModel, SensorNode},
};

/// Anchors below this are treated as equal
const EPSILON: f64 = 1e-9;

/// Everything needed to evaluate a lane, independent of the population it belongs to
#[derive(Debug, Clone)]
pub struct FitnessModel {
    pub origin: Point,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Reference energy for the recharge term [J]
    pub energy_scale: f64,
    pub pdv: PdvParams,
    pub model: EnergyModel,
}
impl FitnessModel {
    /// Build a model for a request batch served by `pdv_num` vehicles.
    pub fn new(
        origin: Point, ga: &GaConfig, pdv: &PdvParams, model: &EnergyModel,
        nodes: &[SensorNode], request: &[usize], pdv_num: usize,
    ) -> Self {
        let total: f64 = request.iter().map(|&i| nodes[i].calc_package(model)).sum();
        Self {
            origin,
            alpha: ga.alpha,
            beta: ga.beta,
            gamma: ga.gamma,
            energy_scale: (total / pdv_num.max(1) as f64).max(EPSILON),
            pdv: pdv.clone(),
            model: model.clone(),
        }
    }

    /// Energy a PDV spends flying `distance` metres and charging `stops` nodes
    pub fn pdv_energy(&self, distance: f64, stops: usize) -> f64 {
        self.pdv.flight_energy_per_metre * distance + self.model.acous_energy_send * stops as f64
    }

    /// Fitness of visiting `idx_list` in order. Pure in the node states and the sequence.
    pub fn fitness_func(&self, nodes: &[SensorNode], idx_list: &[usize]) -> f64 {
        if idx_list.is_empty() {
            return 0.0;
        }
        let path: Vec<Point> = idx_list.iter().map(|&i| nodes[i].pos).collect();

        let e_wsn: f64 = idx_list.iter().map(|&i| nodes[i].calc_package(&self.model)).sum();
        let reward = (e_wsn / self.energy_scale).tanh();

        let d_pdv = tour_length(&self.origin, &path);
        let near = near_neigh_dist(&self.origin, &path);
        let far = far_neigh_dist(&self.origin, &path);
        let d_norm = if far - near > EPSILON { ((d_pdv - near) / (far - near)).max(0.0) } else { 0.0 };

        let e_pdv = self.pdv_energy(d_pdv, idx_list.len());
        let e_norm = e_pdv / self.pdv.energy_budget;

        self.alpha * reward + self.beta * (1.0 - d_norm.tanh()) + self.gamma * (1.0 - e_norm.tanh())
    }
}
