//! Implements a few simple greedy tour constructions.
//! They seed the initial population and anchor the distance normalisation
//! of the fitness function; none of them is meant to be optimal.

use std::cmp::Reverse;

use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::{
    cluster::Cluster,
    point::Point,
    problem::{Candidate, Lane},
    sensor::SensorNode,
};

/// Length of the closed tour origin -> `path` -> origin
pub fn tour_length(origin: &Point, path: &[Point]) -> f64 {
    let mut total = 0.0;
    let mut at = origin;
    for p in path {
        total += at.distance(p);
        at = p;
    }
    total + at.distance(origin)
}

/// Greedy closed tour from `origin`, always moving to the nearest (or farthest) unvisited point
fn greedy_tour(origin: &Point, path: &[Point], farthest: bool) -> f64 {
    let mut unvisited = path.to_vec();
    let mut at = *origin;
    let mut total = 0.0;
    while !unvisited.is_empty() {
        let key = |p: &Point| OrderedFloat(at.distance(p));
        // UNWRAP: `unvisited` is non-empty inside the loop
        let next = if farthest {
            unvisited.iter().position_min_by_key(|&p| Reverse(key(p))).unwrap()
        } else {
            unvisited.iter().position_min_by_key(|&p| key(p)).unwrap()
        };
        let p = unvisited.swap_remove(next);
        total += at.distance(&p);
        at = p;
    }
    total + at.distance(origin)
}

/// Flight distance when always heading for the nearest unvisited point.
/// A best-case scale reference, not the shortest tour.
pub fn near_neigh_dist(origin: &Point, path: &[Point]) -> f64 {
    greedy_tour(origin, path, false)
}

/// Flight distance when always heading for the farthest unvisited point.
/// A worst-case scale reference, not the longest tour.
pub fn far_neigh_dist(origin: &Point, path: &[Point]) -> f64 {
    greedy_tour(origin, path, true)
}

/// Orders `indices` by repeatedly hopping to the nearest unvisited node, starting from `start`
pub fn nearest_neighbour_order(start: &Point, nodes: &[SensorNode], indices: &[usize]) -> Lane {
    let mut unvisited = indices.to_vec();
    let mut order = Vec::with_capacity(indices.len());
    let mut at = *start;
    while let Some(next) = unvisited.iter().position_min_by_key(|&&i| OrderedFloat(at.distance(&nodes[i].pos))) {
        let i = unvisited.remove(next);
        at = nodes[i].pos;
        order.push(i);
    }
    order
}

/// Visits every node of `request` starting at `seed`. Whenever the chain arrives at a node,
/// the requesting members of that node's acoustic cluster are visited next (closest first),
/// then the chain jumps to the nearest node not yet visited.
pub fn cluster_chain(nodes: &[SensorNode], request: &[usize], seed: usize, max_dist: f64) -> Lane {
    let mut unvisited = request.to_vec();
    let mut chain = Vec::with_capacity(request.len());
    let mut current = seed;
    loop {
        let Some(pos) = unvisited.iter().position(|&i| i == current) else { break };
        unvisited.remove(pos);
        chain.push(current);

        let cluster = Cluster::around(nodes[current].pos, nodes, max_dist);
        let neighbours = cluster.members.iter()
            .copied()
            .filter(|i| unvisited.contains(i))
            .sorted_by_key(|&i| (OrderedFloat(cluster.center.distance(&nodes[i].pos)), i))
            .collect_vec();
        for i in neighbours {
            unvisited.retain(|&u| u != i);
            chain.push(i);
        }

        // UNWRAP: the chain always holds at least the seed here
        let last = nodes[*chain.last().unwrap()].pos;
        match unvisited.iter().min_by_key(|&&i| (OrderedFloat(last.distance(&nodes[i].pos)), i)) {
            Some(&next) => current = next,
            None => break,
        }
    }
    chain
}

/// Cuts `chain` into `pdv_num` contiguous lanes. When the split is uneven the first
/// `len % pdv_num` lanes get one extra node each. Returns whether the split was even.
pub fn split_lanes(chain: &[usize], pdv_num: usize) -> (Candidate, bool) {
    let base = chain.len() / pdv_num;
    let extra = chain.len() % pdv_num;
    let mut lanes = Vec::with_capacity(pdv_num);
    let mut start = 0;
    for k in 0..pdv_num {
        let len = base + usize::from(k < extra);
        lanes.push(chain[start..start + len].to_vec());
        start += len;
    }
    (lanes, extra == 0)
}
