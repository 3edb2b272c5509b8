//! Implements the genetic algorithm that plans PDV charging routes.
//!
//! Two parallel populations are kept: target vectors (the parents) and trail vectors
//! (their offspring). Every generation both are scored lane by lane, the better lane of
//! each (population, PDV) slot survives into the next target population, and a fresh trail
//! population is bred from it.

use std::{cmp::Reverse, time::Instant};

use fastrand::Rng;
use itertools::Itertools;
use ndarray::Array2;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    baseline::{cluster_chain, far_neigh_dist, near_neigh_dist, nearest_neighbour_order, split_lanes},
    config::{Config, GaConfig, PdvParams},
    error::{Error, Result},
    evaluate::FitnessModel,
    parse,
    point::Point,
    problem::{is_partition, Candidate, Lane, Population, Solution},
    sensor::{EnergyModel, SensorNode},
};

pub mod operators;

/// Improvements smaller than this don't reset the stall counter
const IMPROVEMENT_EPS: f64 = 1e-12;

/// Where a run of the engine currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Uninitialized, Seeding, Evaluating, Evolving, Converged
}

/// Score every lane of every candidate. Candidates are evaluated in parallel
/// but the matrix is always laid out in population order.
fn evaluate_population(model: &FitnessModel, nodes: &[SensorNode], population: &[Candidate], pdv_num: usize) -> Array2<f64> {
    let rows: Vec<Vec<f64>> = population.par_iter()
        .map(|c| c.iter().map(|lane| model.fitness_func(nodes, lane)).collect())
        .collect();
    Array2::from_shape_fn((population.len(), pdv_num), |(p, k)| rows[p].get(k).copied().unwrap_or(0.0))
}

fn same_nodes(a: &[usize], b: &[usize]) -> bool {
    a.len() == b.len() && a.iter().sorted().eq(b.iter().sorted())
}

/// The genetic optimiser for one request batch at a time
#[derive(Debug)]
pub struct GeneticEngine {
    pub config: GaConfig,
    pub pdv: PdvParams,
    pub model: EnergyModel,
    /// The base station every route starts and ends at
    pub origin: Point,
    state: EngineState,
    request: Vec<usize>,
    req_points: Vec<Point>,
    pdv_num: usize,
    is_match: bool,
    targets: Population,
    trails: Population,
    targets_metric: Array2<f64>,
    trails_metric: Array2<f64>,
    fitness: FitnessModel,
    best: Option<Solution>,
    rng: Rng,
}
impl GeneticEngine {
    /// Create an engine for PDVs based at `origin`
    pub fn new(origin: Point, config: &Config) -> Result<Self> {
        config.validate()?;
        let rng = match config.ga.seed {
            Some(seed) => Rng::with_seed(seed),
            None => Rng::new(),
        };
        Ok(Self {
            fitness: FitnessModel::new(origin, &config.ga, &config.pdv, &config.node, &[], &[], 1),
            config: config.ga.clone(),
            pdv: config.pdv.clone(),
            model: config.node.clone(),
            origin,
            state: EngineState::Uninitialized,
            request: vec![],
            req_points: vec![],
            pdv_num: 0,
            is_match: true,
            targets: vec![],
            trails: vec![],
            targets_metric: Array2::zeros((0, 0)),
            trails_metric: Array2::zeros((0, 0)),
            best: None,
            rng,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Registry indices of the nodes being planned for
    pub fn request(&self) -> &[usize] {
        &self.request
    }

    /// Positions of the nodes being planned for, in request order
    pub fn request_points(&self) -> &[Point] {
        &self.req_points
    }

    pub fn pdv_num(&self) -> usize {
        self.pdv_num
    }

    pub fn targets(&self) -> &Population {
        &self.targets
    }

    pub fn trails(&self) -> &Population {
        &self.trails
    }

    pub fn targets_metric(&self) -> &Array2<f64> {
        &self.targets_metric
    }

    pub fn trails_metric(&self) -> &Array2<f64> {
        &self.trails_metric
    }

    /// The result of the last completed run
    pub fn best_solution(&self) -> Option<&Solution> {
        self.best.as_ref()
    }

    /// Record the requesting nodes and clear every population buffer
    pub fn init_params(&mut self, nodes: &[SensorNode], request: &[usize]) -> Result<()> {
        if request.is_empty() {
            return Err(Error::InputInvalid("no node requested a recharge".into()));
        }
        if let Some(&bad) = request.iter().find(|&&i| i >= nodes.len()) {
            return Err(Error::InputInvalid(format!("request index {bad} outside a registry of {} nodes", nodes.len())));
        }
        if !request.iter().all_unique() {
            return Err(Error::InputInvalid("request set contains duplicates".into()));
        }
        self.request = request.to_vec();
        self.req_points = request.iter().map(|&i| nodes[i].pos).collect();
        self.pdv_num = 0;
        self.targets.clear();
        self.trails.clear();
        self.targets_metric = Array2::zeros((0, 0));
        self.trails_metric = Array2::zeros((0, 0));
        self.best = None;
        self.state = EngineState::Seeding;
        Ok(())
    }

    /// Estimate how many PDVs the request set needs.
    ///
    /// Nodes are taken in nearest-neighbour order from the base station and packed
    /// greedily: a PDV is full once the next stop plus the flight home would exceed its
    /// energy budget, or once it serves `max_nodes_per_pdv` nodes.
    pub fn calc_opt_pdv_num(&self, nodes: &[SensorNode], request: &[usize]) -> Result<usize> {
        if request.is_empty() {
            return Err(Error::InputInvalid("no node requested a recharge".into()));
        }
        let order = nearest_neighbour_order(&self.origin, nodes, request);
        let fly = |a: &Point, b: &Point| self.pdv.flight_energy_per_metre * a.distance(b);

        let mut pdvs = 1;
        let mut spent = 0.0;
        let mut stops = 0;
        let mut at = self.origin;
        for &i in &order {
            let p = nodes[i].pos;
            let leg = fly(&at, &p) + self.model.acous_energy_send;
            let home = fly(&p, &self.origin);
            if stops > 0 && (spent + leg + home > self.pdv.energy_budget || stops >= self.pdv.max_nodes_per_pdv) {
                pdvs += 1;
                spent = 0.0;
                stops = 0;
                at = self.origin;
            }
            let leg = fly(&at, &p) + self.model.acous_energy_send;
            if stops == 0 && leg + home > self.pdv.energy_budget {
                warn!(node = i, needed = leg + home, budget = self.pdv.energy_budget, "Node exceeds a single PDV's budget");
            }
            spent += leg;
            stops += 1;
            at = p;
        }
        let pdvs = pdvs.clamp(1, request.len());
        debug!(pdvs, requests = request.len(), "Estimated fleet size");
        Ok(pdvs)
    }

    /// Build the initial target population and return whether the request set splits evenly across the PDVs.
    ///
    /// Request nodes are ranked by distance to the base station. The first candidate grows a
    /// cluster-aware nearest-neighbour chain from the `r_num`-th ranked node, the others from a
    /// random one with a few extra random swaps. Each chain is cut into `pdv_num` contiguous
    /// lanes; when the split is uneven the first lanes carry one extra node.
    pub fn calc_init_guess(
        &mut self, r_num: usize, pdv_num: usize, pop_num: usize, nodes: &[SensorNode], request: &[usize],
    ) -> Result<bool> {
        if pdv_num == 0 {
            return Err(Error::InputInvalid("at least one PDV is needed".into()));
        }
        if pop_num == 0 {
            return Err(Error::InputInvalid("population size must be positive".into()));
        }
        self.init_params(nodes, request)?;
        let n = request.len();
        let ranked = request.iter()
            .copied()
            .sorted_by_key(|&i| (OrderedFloat(self.origin.distance(&nodes[i].pos)), i))
            .collect_vec();

        let is_match = n % pdv_num == 0;
        let mut population = Vec::with_capacity(pop_num);
        for p in 0..pop_num {
            let seed = if p == 0 { ranked[r_num.min(n - 1)] } else { ranked[self.rng.usize(0..n)] };
            let mut chain = cluster_chain(nodes, request, seed, self.model.max_acous_dist);
            if p > 0 && n > 1 {
                for _ in 0..self.rng.usize(0..=n / 2) {
                    operators::swap_mutation(&mut chain, &mut self.rng);
                }
            }
            let (lanes, _) = split_lanes(&chain, pdv_num);
            population.push(lanes);
        }
        self.install_population(population, pdv_num, is_match, nodes);
        debug!(pdv_num, pop_num, is_match, "Initial guess built");
        Ok(is_match)
    }

    /// Make `population` the current target population
    fn install_population(&mut self, population: Population, pdv_num: usize, is_match: bool, nodes: &[SensorNode]) {
        self.pdv_num = pdv_num;
        self.is_match = is_match;
        self.fitness = FitnessModel::new(self.origin, &self.config, &self.pdv, &self.model, nodes, &self.request, pdv_num);
        self.trails = population.clone();
        self.targets = population;
        self.targets_metric = Array2::zeros((self.targets.len(), pdv_num));
        self.trails_metric = Array2::zeros((self.trails.len(), pdv_num));
    }

    /// Seed from the configured guess file if it holds a usable population, otherwise build
    /// a fresh guess (and save it when a path is configured)
    fn seed_population(&mut self, pdv_num: usize, pop_num: usize, nodes: &[SensorNode]) -> Result<bool> {
        if let Some(path) = self.config.guess_path.clone() {
            if path.exists() {
                match parse::load_guess(&path, pop_num, pdv_num) {
                    Ok(population) if population.iter().all(|c| is_partition(c, &self.request)) => {
                        let is_match = self.request.len() % pdv_num == 0
                            && population.iter().all(|c| c.iter().map(Vec::len).all_equal());
                        info!(path = %path.display(), "Loaded initial guess");
                        self.install_population(population, pdv_num, is_match, nodes);
                        return Ok(is_match);
                    }
                    Ok(_) => warn!(path = %path.display(), "Stored guess doesn't match the request set, regenerating"),
                    Err(e) => warn!(error = %e, "Could not read stored guess, regenerating"),
                }
            }
            let request = self.request.clone();
            let is_match = self.calc_init_guess(self.config.r_num, pdv_num, pop_num, nodes, &request)?;
            if let Err(e) = parse::save_guess(&path, &self.targets) {
                warn!(error = %e, "Could not save initial guess");
            }
            return Ok(is_match);
        }
        let request = self.request.clone();
        self.calc_init_guess(self.config.r_num, pdv_num, pop_num, nodes, &request)
    }

    /// Breed the trail population from the current targets
    pub fn crossover(&mut self) {
        self.trails = operators::crossover(&mut self.rng, self.config.cross_ratio, self.is_match, &self.targets, &self.request);
        self.state = EngineState::Evolving;
    }

    /// Score both populations
    pub fn evaluate(&mut self, nodes: &[SensorNode]) {
        self.state = EngineState::Evaluating;
        self.targets_metric = evaluate_population(&self.fitness, nodes, &self.targets, self.pdv_num);
        self.trails_metric = evaluate_population(&self.fitness, nodes, &self.trails, self.pdv_num);
    }

    /// Slot-wise survivor selection between targets and trails.
    ///
    /// A lane visiting the same nodes in both vectors is simply replaced when the trail's
    /// ordering scores higher. Lanes whose node sets differ only move over together, and only
    /// if none of them scores lower than the lane it replaces, so the candidate stays a
    /// partition and no slot ever gets worse.
    pub fn select(&mut self) {
        let mut next = Vec::with_capacity(self.targets.len());
        let mut next_metric = self.targets_metric.clone();
        for (p, (target, trail)) in self.targets.iter().zip(&self.trails).enumerate() {
            let mut survivor = target.clone();
            let mut moved = vec![];
            for k in 0..target.len() {
                let (t, r) = (self.targets_metric[[p, k]], self.trails_metric[[p, k]]);
                if same_nodes(&target[k], &trail[k]) {
                    if r > t {
                        survivor[k] = trail[k].clone();
                        next_metric[[p, k]] = r;
                    }
                } else {
                    moved.push(k);
                }
            }
            let accept = moved.iter().all(|&k| self.trails_metric[[p, k]] >= self.targets_metric[[p, k]])
                && moved.iter().any(|&k| self.trails_metric[[p, k]] > self.targets_metric[[p, k]]);
            if accept {
                for &k in &moved {
                    survivor[k] = trail[k].clone();
                    next_metric[[p, k]] = self.trails_metric[[p, k]];
                }
            }
            next.push(survivor);
        }
        self.targets = next;
        self.targets_metric = next_metric;
    }

    /// One generation: score, select survivors, breed the next trail population
    pub fn step(&mut self, nodes: &[SensorNode]) {
        self.evaluate(nodes);
        self.select();
        self.crossover();
    }

    /// Fitness of visiting `idx_list` in order with the current batch's scaling
    pub fn fitness_func(&self, nodes: &[SensorNode], idx_list: &[usize]) -> f64 {
        self.fitness.fitness_func(nodes, idx_list)
    }

    /// Greedy farthest-neighbour tour length over `path`, from and back to the base station
    pub fn calc_far_neigh_dist(&self, path: &[Point]) -> f64 {
        far_neigh_dist(&self.origin, path)
    }

    /// Greedy nearest-neighbour tour length over `path`, from and back to the base station
    pub fn calc_near_neigh_dist(&self, path: &[Point]) -> f64 {
        near_neigh_dist(&self.origin, path)
    }

    /// Index of the target with the highest fitness on lane `pdv`; the first one wins ties
    pub fn get_best_sol(&self, pdv: usize) -> Option<usize> {
        if pdv >= self.targets_metric.ncols() {
            return None;
        }
        self.targets_metric.column(pdv)
            .iter()
            .position_min_by_key(|&&m| Reverse(OrderedFloat(m)))
    }

    /// Index of the target with the highest summed fitness; the first one wins ties
    pub fn best_candidate(&self) -> Option<usize> {
        self.targets_metric.rows()
            .into_iter()
            .map(|row| row.sum())
            .position_min_by_key(|&m| Reverse(OrderedFloat(m)))
    }

    /// Run the whole optimisation for one request batch and return the best plan found
    pub fn calc_final_path(&mut self, nodes: &[SensorNode], request: &[usize]) -> Result<Solution> {
        let start = Instant::now();
        self.init_params(nodes, request)?;
        let pdv_num = match self.config.pdv_num {
            Some(n) => n,
            None => self.calc_opt_pdv_num(nodes, request)?,
        };
        let is_match = self.seed_population(pdv_num, self.config.pop_num, nodes)?;
        info!(requests = request.len(), pdv_num, pop_num = self.config.pop_num, is_match, "Starting genetic search");

        self.crossover();
        let mut best_total = f64::NEG_INFINITY;
        let mut stale = 0;
        let mut generations = 0;
        for generation in 0..self.config.max_generations {
            self.step(nodes);
            generations += 1;
            let total = self.best_candidate()
                .map(|p| self.targets_metric.row(p).sum())
                .unwrap_or(f64::NEG_INFINITY);
            if total > best_total + IMPROVEMENT_EPS {
                best_total = total;
                stale = 0;
            } else {
                stale += 1;
            }
            debug!(generation, best = total, stale, "Generation done");
            if self.config.stall_generations.is_some_and(|limit| stale >= limit) {
                debug!(generation, "Fitness plateaued");
                break;
            }
        }
        if generations == 0 {
            self.evaluate(nodes);
        }

        // UNWRAP: the population is never empty after seeding
        let index = self.best_candidate().unwrap();
        let routes: Vec<Lane> = self.targets[index].clone();
        let lane_fitness = self.targets_metric.row(index).to_vec();
        let solution = Solution {
            fitness: lane_fitness.iter().sum(),
            routes,
            lane_fitness,
            population_index: index,
            generations,
            elapsed: start.elapsed(),
        };
        self.state = EngineState::Converged;
        info!(fitness = solution.fitness, generations, elapsed = ?solution.elapsed, "Genetic search converged");

        if let Some(path) = &self.config.best_path_out {
            if let Err(e) = parse::save_best_path(path, &solution) {
                warn!(error = %e, "Could not save best path");
            }
        }
        self.best = Some(solution.clone());
        Ok(solution)
    }

    /// True while fewer than `min_requests` nodes ask for a recharge, i.e. keep waiting
    pub fn check_task(&self, nodes: &[SensorNode]) -> bool {
        let requests = nodes.iter().filter(|n| n.needs_recharge(&self.model)).count();
        requests < self.config.min_requests
    }
}
