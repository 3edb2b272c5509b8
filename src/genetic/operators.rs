//! Variation operators on candidate routes: order crossover, swap mutation
//! and the repair step that restores the partition of the request set

use std::collections::HashSet;

use fastrand::Rng;
use itertools::Itertools;

use crate::problem::{Candidate, Lane, Population};

/// Order crossover of two lanes. A random segment of `a` stays in place, the other positions
/// are filled with the entries of `b` in their order, skipping those already placed, and
/// finally with what is left of `a`. The child is as long as `a`.
///
/// `b` may hold nodes that `a` doesn't, so the child can clash with other lanes of its candidate.
pub fn order_crossover(a: &[usize], b: &[usize], rng: &mut Rng) -> Lane {
    let n = a.len();
    if n == 0 {
        return vec![];
    }
    let i = rng.usize(0..n);
    let j = rng.usize(i..n);
    let mut placed: HashSet<usize> = a[i..=j].iter().copied().collect();
    let mut fill = b.iter().chain(a.iter()).copied().filter(|x| !a[i..=j].contains(x));

    let mut child = Vec::with_capacity(n);
    for pos in 0..n {
        if (i..=j).contains(&pos) {
            child.push(a[pos]);
            continue;
        }
        // UNWRAP: `a` alone has enough unplaced entries to fill every free position
        let next = fill.by_ref().find(|x| placed.insert(*x)).unwrap();
        child.push(next);
    }
    child
}

/// Exchange two distinct random positions of a lane
pub fn swap_mutation(lane: &mut Lane, rng: &mut Rng) {
    let n = lane.len();
    if n < 2 {
        return;
    }
    let i = rng.usize(0..n);
    let mut j = rng.usize(0..n - 1);
    if j >= i {
        j += 1;
    }
    lane.swap(i, j);
}

/// Restore the partition invariant of a candidate in place: keep the first occurrence of every
/// requested node, drop anything else, then append each missing node to the currently shortest
/// lane (the lowest lane index wins ties). Returns true if anything had to change.
pub fn repair(candidate: &mut Candidate, request: &[usize]) -> bool {
    let wanted: HashSet<usize> = request.iter().copied().collect();
    let mut seen = HashSet::with_capacity(wanted.len());
    let mut changed = false;
    for lane in candidate.iter_mut() {
        let before = lane.len();
        lane.retain(|i| wanted.contains(i) && seen.insert(*i));
        changed |= lane.len() != before;
    }
    if candidate.is_empty() {
        return changed;
    }
    for &missing in request.iter().filter(|i| !seen.contains(i)) {
        // UNWRAP: the candidate has at least one lane
        let shortest = candidate.iter().position_min_by_key(|l| l.len()).unwrap();
        candidate[shortest].push(missing);
        changed = true;
    }
    changed
}

/// Produce the trail population from the target population.
///
/// `cross_ratio` percent of the slots, picked at random, are recombined lane by lane with a
/// random partner; the other slots are swap-mutated. Every child is repaired before it is returned.
/// An evenly split target keeps equal lane lengths through both operators.
pub fn crossover(rng: &mut Rng, cross_ratio: u32, is_match: bool, target: &[Candidate], request: &[usize]) -> Population {
    let pop_num = target.len();
    let n_cross = (pop_num * cross_ratio.min(100) as usize + 50) / 100;
    let mut order = (0..pop_num).collect_vec();
    rng.shuffle(&mut order);

    let mut trail = target.to_vec();
    for (rank, &p) in order.iter().enumerate() {
        let child = &mut trail[p];
        if rank < n_cross {
            let q = if pop_num > 1 {
                let q = rng.usize(0..pop_num - 1);
                if q >= p { q + 1 } else { q }
            } else {
                p
            };
            for (k, lane) in child.iter_mut().enumerate() {
                *lane = order_crossover(&target[p][k], &target[q][k], rng);
            }
        } else {
            for lane in child.iter_mut() {
                swap_mutation(lane, rng);
            }
        }
        repair(child, request);
        debug_assert!(!is_match || child.iter().map(Vec::len).all_equal());
    }
    trail
}
