//! Groups sensor nodes around a centre node by acoustic reach

use crate::{point::Point, sensor::SensorNode};

/// Nodes closer than this to a centre are treated as the centre itself
pub const MIN_CLUSTER_DIST: f64 = 0.1;

/// A centre and the registry indices of the nodes it can reach acoustically
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cluster {
    pub center: Point,
    pub members: Vec<usize>,
}
impl Cluster {
    pub fn new(center: Point) -> Self {
        Self { center, members: vec![] }
    }

    /// Recompute membership from scratch: node `i` belongs to the cluster
    /// when `MIN_CLUSTER_DIST < d < max_dist`, both bounds exclusive
    pub fn assign_members(&mut self, nodes: &[SensorNode], max_dist: f64) {
        self.members.clear();
        for (i, node) in nodes.iter().enumerate() {
            let d = self.center.distance(&node.pos);
            if d > MIN_CLUSTER_DIST && d < max_dist {
                self.members.push(i);
            }
        }
    }

    /// Build a cluster around `center` in one go
    pub fn around(center: Point, nodes: &[SensorNode], max_dist: f64) -> Self {
        let mut cluster = Self::new(center);
        cluster.assign_members(nodes, max_dist);
        cluster
    }
}
