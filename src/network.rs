//! The node registry of a simulated network: energy drain over time, recharge
//! requests, and the recharge a PDV fleet delivers along a planned solution

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::{
    cluster::Cluster,
    config::PdvParams,
    error::Result,
    point::Point,
    problem::{ProblemDescription, Solution},
    sensor::{EnergyModel, SensorNode},
};

/// Owns every sensor node; everything else refers to nodes by their index here
#[derive(Debug, Clone)]
pub struct Network {
    /// The base station
    pub origin: Point,
    pub nodes: Vec<SensorNode>,
    pub model: EnergyModel,
    pub pdv: PdvParams,
    /// Fail count after which a node is reported unreachable
    pub max_fails: u32,
}
impl Network {
    pub fn new(origin: Point, nodes: Vec<SensorNode>, model: EnergyModel, pdv: PdvParams, max_fails: u32) -> Self {
        Self { origin, nodes, model, pdv, max_fails }
    }

    /// Set up the network a scenario describes
    pub fn from_description(description: &ProblemDescription) -> Result<Self> {
        description.config().validate()?;
        let nodes = description.nodes.iter()
            .map(|n| SensorNode::new(Point::new(n.x, n.y), n.voltage, n.pressure_sensor, &description.node))
            .collect();
        Ok(Self::new(description.origin, nodes, description.node.clone(), description.pdv.clone(), description.ga.max_fails))
    }

    /// Let `dt` seconds of operation pass for every node
    pub fn tick(&mut self, dt: f64) {
        for node in &mut self.nodes {
            node.tick(dt, &self.model);
        }
    }

    /// Indices of every node asking for a recharge
    pub fn request_nodes(&self) -> Vec<usize> {
        (0..self.nodes.len()).filter(|&i| self.nodes[i].needs_recharge(&self.model)).collect()
    }

    /// The requesting nodes a PDV can actually reach. Nodes whose round trip from the base
    /// station exceeds the PDV range are left out of this batch and get a fail recorded.
    pub fn reachable_requests(&mut self) -> Vec<usize> {
        let mut reachable = vec![];
        for i in self.request_nodes() {
            let round_trip = 2.0 * self.origin.distance(&self.nodes[i].pos);
            if round_trip > self.pdv.max_range {
                let node = &mut self.nodes[i];
                node.add_fail();
                warn!(node = i, round_trip, range = self.pdv.max_range, fails = node.fails(), "Node out of PDV range");
                if node.is_unreachable(self.max_fails) {
                    warn!(node = i, "Node flagged unreachable");
                }
                continue;
            }
            reachable.push(i);
        }
        reachable
    }

    /// Fly the planned routes and deliver acoustic energy, returning the total energy received.
    ///
    /// At every stop the PDV hovers over the visited node, and the requesting nodes of that
    /// node's acoustic cluster pick up energy at their own distance. A visited node that
    /// receives nothing counts as a failure; one that does has its fails reset.
    pub fn apply_solution(&mut self, solution: &Solution) -> f64 {
        let mut delivered = 0.0;
        for (pdv, route) in solution.routes.iter().enumerate() {
            let route_nodes: HashSet<usize> = route.iter().copied().collect();
            let mut on_route = 0.0;
            for &stop in route {
                if self.model.acoustic_transfer(self.pdv.hover_distance) > 0.0 {
                    on_route += self.nodes[stop].receive_acoustic(self.pdv.hover_distance, &self.model);
                    self.nodes[stop].reset_fail();
                } else {
                    self.nodes[stop].add_fail();
                }

                let cluster = Cluster::around(self.nodes[stop].pos, &self.nodes, self.model.max_acous_dist);
                for &m in &cluster.members {
                    if route_nodes.contains(&m) || !self.nodes[m].needs_recharge(&self.model) {
                        continue;
                    }
                    let d = cluster.center.distance(&self.nodes[m].pos);
                    on_route += self.nodes[m].receive_acoustic(d, &self.model);
                }
            }
            debug!(pdv, stops = route.len(), energy = on_route, "Route flown");
            delivered += on_route;
        }
        delivered
    }
}
