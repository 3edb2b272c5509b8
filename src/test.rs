use std::{collections::HashSet, env, fs, path::PathBuf, time::Duration};

use crate::{
    baseline::{far_neigh_dist, near_neigh_dist, split_lanes},
    cluster::Cluster,
    config::Config,
    error::Error,
    genetic::{operators, EngineState, GeneticEngine},
    network::Network,
    parse::{load_guess, parse_problem, read_best_path, read_guess_data, save_guess, save_problem},
    point::Point,
    problem::{is_partition, NodeDescription, ProblemDescription, Solution},
    sensor::{EnergyModel, SensorNode, WEIGHT_FULL, WEIGHT_LOW},
};

/// A scratch file in the system temp directory, unique to this test process
fn temp_file(name: &str) -> PathBuf {
    env::temp_dir().join(format!("pdv_routing_{}_{name}", std::process::id()))
}

/// Reproducible configuration with a fixed fleet size
fn test_config(pop_num: usize, cross_ratio: u32, pdv_num: usize) -> Config {
    let mut config = Config::default();
    config.ga.pop_num = pop_num;
    config.ga.cross_ratio = cross_ratio;
    config.ga.pdv_num = Some(pdv_num);
    config.ga.seed = Some(7);
    config.ga.max_generations = 40;
    config.ga.stall_generations = None;
    config
}

/// Nodes scattered around the base station at the origin, all low enough to ask for a recharge.
/// Some sit within acoustic range of each other so the seeding clusters aren't empty.
fn scattered_nodes(model: &EnergyModel) -> Vec<SensorNode> {
    [(1.0, 0.5), (1.4, 0.7), (3.0, 2.0), (-2.0, 1.0), (-2.3, 1.2), (0.5, -3.0), (4.0, -1.0), (-1.0, -1.5)]
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| SensorNode::new(Point::new(x, y), 3.2 + 0.02 * i as f64, i % 2 == 0, model))
        .collect()
}

fn assert_partitions(population: &[Vec<Vec<usize>>], request: &[usize]) {
    for (p, candidate) in population.iter().enumerate() {
        assert!(is_partition(candidate, request), "Candidate {p} must partition the request set: {candidate:?}");
    }
}

/// Voltage and energy convert into each other without drift
#[test]
fn test_voltage_energy_round_trip() {
    let model = EnergyModel::default();
    let mut v = model.v_min;
    while v <= model.v_max {
        let back = model.update_voltage(model.update_energy(v));
        assert!((back - v).abs() < 1e-12, "Round trip of {v} V gave {back} V");
        v += 0.01;
    }
    let node = SensorNode::new(Point::default(), 3.4, true, &model);
    assert!((node.energy() - 17.34).abs() < 1e-9, "Default voltage stores 17.34 J");
}

/// Weight is graded from low to full and never drops as voltage rises
#[test]
fn test_weight_monotone() {
    let model = EnergyModel::default();
    assert_eq!(model.update_weight(model.v_critical), WEIGHT_LOW);
    assert_eq!(model.update_weight(0.0), WEIGHT_LOW);
    assert_eq!(model.update_weight(model.v_max), WEIGHT_FULL);
    assert!((WEIGHT_LOW + 1..WEIGHT_FULL).contains(&model.update_weight(4.2)));

    let mut prev = 0;
    for step in 0..=600 {
        let w = model.update_weight(step as f64 * 0.01);
        assert!(w >= prev, "Weight dropped from {prev} to {w} at {} V", step as f64 * 0.01);
        prev = w;
    }
}

/// Acoustic transfer is zero beyond range, and positive and decreasing inside it
#[test]
fn test_acoustic_transfer() {
    let model = EnergyModel::default();
    for d in [0.7001, 0.8, 1.0, 25.0] {
        assert_eq!(model.acoustic_transfer(d), 0.0, "Nothing arrives {d} m away");
    }
    assert!(model.acoustic_transfer(model.max_acous_dist) > 0.0, "The range limit itself is still reachable");

    let mut prev = f64::INFINITY;
    for step in 1..70 {
        let e = model.acoustic_transfer(step as f64 * 0.01);
        assert!(e > 0.0 && e < prev, "Transfer must shrink with distance");
        prev = e;
    }
    let cap = model.eff_piezo * model.eff_piezo * model.eff_acous2dc * model.acous_energy_send;
    assert!(model.acoustic_transfer(0.01) < cap);
}

/// Draining removes energy over time, never below zero, and keeps voltage consistent
#[test]
fn test_drain_and_recharge() {
    let model = EnergyModel::default();
    let e = model.update_energy(3.4);
    let drained = model.drain_energy(3600.0, e);
    assert!(drained < e && drained > 0.0);
    assert_eq!(model.drain_energy(1e12, e), 0.0, "Energy is clamped at zero");

    let mut node = SensorNode::new(Point::default(), 3.4, false, &model);
    node.tick(1e12, &model);
    assert_eq!(node.energy(), 0.0);
    assert_eq!(node.voltage(), 0.0);
    assert_eq!(node.weight(), WEIGHT_LOW);
    assert_eq!(node.fails(), 1, "A node below critical voltage fails to sense");

    let gained = node.receive_acoustic(0.2, &model);
    assert!(gained > 0.0);
    assert!((node.voltage() - model.update_voltage(node.energy())).abs() < 1e-12);
    assert_eq!(node.receive_acoustic(0.9, &model), 0.0);

    let full = SensorNode::new(Point::default(), model.v_max, true, &model);
    assert_eq!(full.calc_package(&model), 0.0);
    assert!((full.energy() - model.calc_max_energy()).abs() < 1e-12);
}

/// Fails accumulate until reset and only flag a node past the limit
#[test]
fn test_fail_counter() {
    let model = EnergyModel::default();
    let mut node = SensorNode::new(Point::default(), 4.0, true, &model);
    for _ in 0..5 {
        node.add_fail();
    }
    assert!(!node.is_unreachable(5));
    node.add_fail();
    assert!(node.is_unreachable(5));
    node.reset_fail();
    assert_eq!(node.fails(), 0);
}

/// Cluster bounds are exclusive on both ends
#[test]
fn test_cluster_membership() {
    let model = EnergyModel::default();
    let nodes = [(0.05, 0.0), (0.3, 0.0), (0.7, 0.0), (0.0, 0.69), (2.0, 2.0)]
        .iter()
        .map(|&(x, y)| SensorNode::new(Point::new(x, y), 3.4, true, &model))
        .collect::<Vec<_>>();
    let mut cluster = Cluster::new(Point::new(0.0, 0.0));
    cluster.assign_members(&nodes, model.max_acous_dist);
    assert_eq!(cluster.members, vec![1, 3]);

    cluster.assign_members(&nodes, model.max_acous_dist);
    assert_eq!(cluster.members, vec![1, 3], "Rebuilding gives the same members");
}

/// Remainder nodes go to the first lanes
#[test]
fn test_split_lanes() {
    let (lanes, even) = split_lanes(&[4, 5, 6, 7, 8, 9, 10], 3);
    assert!(!even);
    assert_eq!(lanes, vec![vec![4, 5, 6], vec![7, 8], vec![9, 10]]);
    let (lanes, even) = split_lanes(&[1, 2, 3, 4], 2);
    assert!(even);
    assert_eq!(lanes, vec![vec![1, 2], vec![3, 4]]);
}

/// Nearest-neighbour tours are never longer than farthest-neighbour ones
#[test]
fn test_neighbour_anchors() {
    let origin = Point::new(0.0, 0.0);
    let path = [Point::new(1.0, 0.0), Point::new(5.0, 0.0), Point::new(2.0, 0.0)];
    assert_eq!(near_neigh_dist(&origin, &path), 10.0);
    assert!(far_neigh_dist(&origin, &path) >= near_neigh_dist(&origin, &path));
    assert_eq!(near_neigh_dist(&origin, &[]), 0.0);
}

/// Repair drops duplicates and strangers, and fills the shortest lane
#[test]
fn test_repair() {
    let request = [1, 2, 3, 4, 5];
    let mut candidate = vec![vec![1, 2, 3, 2], vec![9, 3]];
    assert!(operators::repair(&mut candidate, &request));
    assert_eq!(candidate, vec![vec![1, 2, 3], vec![4, 5]]);
    assert!(!operators::repair(&mut candidate, &request), "A valid candidate is left alone");
}

/// Mutation and crossover keep lanes as permutations
#[test]
fn test_operators_keep_permutations() {
    let mut rng = fastrand::Rng::with_seed(3);
    let a = vec![1, 2, 3, 4, 5, 6];
    let b = vec![6, 4, 2, 5, 3, 1];
    for _ in 0..50 {
        let child = operators::order_crossover(&a, &b, &mut rng);
        let mut sorted = child.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, a, "Child {child:?} isn't a permutation");

        let mut lane = a.clone();
        operators::swap_mutation(&mut lane, &mut rng);
        assert_eq!(lane.iter().zip(&a).filter(|(x, y)| x != y).count(), 2, "Exactly two positions swap");
    }
    let mut single = vec![7];
    operators::swap_mutation(&mut single, &mut rng);
    assert_eq!(single, vec![7]);
}

/// Six request nodes, two PDVs, four candidates and a 50% crossover ratio:
/// the initial guess and the bred trails all partition the request set
#[test]
fn test_init_guess_and_crossover_partition() {
    let config = test_config(4, 50, 2);
    let nodes = scattered_nodes(&config.node);
    let request = [1, 2, 3, 5, 6, 7];
    let mut engine = GeneticEngine::new(Point::default(), &config).unwrap();

    let is_match = engine.calc_init_guess(0, 2, 4, &nodes, &request).unwrap();
    assert!(is_match);
    assert_eq!(engine.state(), EngineState::Seeding);
    assert_eq!(engine.targets().len(), 4);
    assert!(engine.targets().iter().all(|c| c.len() == 2 && c.iter().all(|l| l.len() == 3)));
    assert_partitions(engine.targets(), &request);

    engine.crossover();
    assert_eq!(engine.state(), EngineState::Evolving);
    assert_partitions(engine.trails(), &request);

    let is_match = engine.calc_init_guess(0, 4, 4, &nodes, &request).unwrap();
    assert!(!is_match, "Six nodes don't split evenly over four PDVs");
    assert_partitions(engine.targets(), &request);
}

/// The partition holds for every generation, and no slot's best fitness ever drops below generation 0
#[test]
fn test_evolution_invariants() {
    let config = test_config(6, 50, 3);
    let nodes = scattered_nodes(&config.node);
    let request = (0..nodes.len()).collect::<Vec<_>>();
    let mut engine = GeneticEngine::new(Point::default(), &config).unwrap();
    engine.calc_init_guess(0, 3, 6, &nodes, &request).unwrap();
    engine.crossover();
    engine.evaluate(&nodes);

    let column_best = |engine: &GeneticEngine, k: usize| {
        let p = engine.get_best_sol(k).unwrap();
        engine.targets_metric()[[p, k]]
    };
    let initial = (0..3).map(|k| column_best(&engine, k)).collect::<Vec<_>>();

    for _ in 0..30 {
        engine.step(&nodes);
        assert_partitions(engine.targets(), &request);
        assert_partitions(engine.trails(), &request);
        for (k, &first) in initial.iter().enumerate() {
            assert!(column_best(&engine, k) >= first - 1e-12, "Best fitness of PDV {k} regressed");
        }
    }
}

/// Scoring the same route twice gives the same value, and a short tour beats a zig-zag
#[test]
fn test_fitness_deterministic() {
    let config = test_config(4, 50, 1);
    let model = config.node.clone();
    let nodes = [(1.0, 0.0), (2.0, 0.0), (3.0, 0.0), (4.0, 0.0)]
        .iter()
        .map(|&(x, y)| SensorNode::new(Point::new(x, y), 3.3, true, &model))
        .collect::<Vec<_>>();
    let request = [0, 1, 2, 3];
    let mut engine = GeneticEngine::new(Point::default(), &config).unwrap();
    engine.calc_init_guess(0, 1, 4, &nodes, &request).unwrap();

    let straight = engine.fitness_func(&nodes, &[0, 1, 2, 3]);
    assert_eq!(straight, engine.fitness_func(&nodes, &[0, 1, 2, 3]));
    assert!(straight > engine.fitness_func(&nodes, &[3, 0, 2, 1]));
    assert!(straight > 0.0 && straight <= 1.0);
    assert_eq!(engine.fitness_func(&nodes, &[]), 0.0);

    let points = nodes.iter().map(|n| n.pos).collect::<Vec<_>>();
    assert!(engine.calc_near_neigh_dist(&points) <= engine.calc_far_neigh_dist(&points));
}

/// Ties go to the lowest population index
#[test]
fn test_best_sol_ties() {
    let config = test_config(5, 50, 1);
    let nodes = scattered_nodes(&config.node);
    let mut engine = GeneticEngine::new(Point::default(), &config).unwrap();
    engine.calc_init_guess(0, 1, 5, &nodes, &[2]).unwrap();
    engine.evaluate(&nodes);
    assert_eq!(engine.get_best_sol(0), Some(0));
    assert_eq!(engine.best_candidate(), Some(0));
    assert_eq!(engine.get_best_sol(1), None);
}

/// Bad inputs are refused before any work is done
#[test]
fn test_invalid_input() {
    let config = test_config(4, 50, 2);
    let nodes = scattered_nodes(&config.node);
    let mut engine = GeneticEngine::new(Point::default(), &config).unwrap();
    assert!(matches!(engine.calc_final_path(&nodes, &[]), Err(Error::InputInvalid(_))));
    assert!(matches!(engine.calc_init_guess(0, 0, 4, &nodes, &[1, 2]), Err(Error::InputInvalid(_))));
    assert!(matches!(engine.calc_init_guess(0, 2, 0, &nodes, &[1, 2]), Err(Error::InputInvalid(_))));
    assert!(matches!(engine.init_params(&nodes, &[1, 100]), Err(Error::InputInvalid(_))));
    assert!(matches!(engine.init_params(&nodes, &[1, 1]), Err(Error::InputInvalid(_))));

    let mut bad = Config::default();
    bad.ga.alpha = 0.9;
    assert!(matches!(GeneticEngine::new(Point::default(), &bad), Err(Error::Config(_))));
    bad = Config::default();
    bad.ga.cross_ratio = 120;
    assert!(bad.validate().is_err());
}

/// Fleet size grows with the per-PDV node limit and never exceeds the request count
#[test]
fn test_opt_pdv_num() {
    let mut config = test_config(4, 50, 1);
    config.pdv.max_nodes_per_pdv = 2;
    let nodes = (1..=6)
        .map(|i| SensorNode::new(Point::new(i as f64, 0.0), 3.3, true, &config.node))
        .collect::<Vec<_>>();
    let request = (0..6).collect::<Vec<_>>();
    let engine = GeneticEngine::new(Point::default(), &config).unwrap();
    assert_eq!(engine.calc_opt_pdv_num(&nodes, &request).unwrap(), 3);
    assert_eq!(engine.calc_opt_pdv_num(&nodes, &[4]).unwrap(), 1);

    config.pdv.max_nodes_per_pdv = 8;
    config.pdv.energy_budget = 1.0;
    let engine = GeneticEngine::new(Point::default(), &config).unwrap();
    assert_eq!(engine.calc_opt_pdv_num(&nodes, &request).unwrap(), 6, "Every node needs its own PDV");
}

/// The engine only runs once enough nodes ask for a recharge
#[test]
fn test_check_task() {
    let config = test_config(4, 50, 1);
    let engine = GeneticEngine::new(Point::default(), &config).unwrap();
    let nodes = (0..6)
        .map(|i| SensorNode::new(Point::new(i as f64, 0.0), if i < 4 { 3.3 } else { 4.5 }, true, &config.node))
        .collect::<Vec<_>>();
    assert!(engine.check_task(&nodes), "Four requests are below the batch threshold of five");
    let all_low = (0..6)
        .map(|i| SensorNode::new(Point::new(i as f64, 0.0), 3.3, true, &config.node))
        .collect::<Vec<_>>();
    assert!(!engine.check_task(&all_low));
}

/// A full run returns a feasible plan and leaves the engine converged
#[test]
fn test_calc_final_path() {
    let mut config = test_config(8, 60, 2);
    config.ga.pdv_num = None;
    config.pdv.max_nodes_per_pdv = 4;
    let out = temp_file("best_path.csv");
    config.ga.best_path_out = Some(out.clone());
    let nodes = scattered_nodes(&config.node);
    let request = (0..nodes.len()).collect::<Vec<_>>();
    let mut engine = GeneticEngine::new(Point::default(), &config).unwrap();

    let solution = engine.calc_final_path(&nodes, &request).unwrap();
    assert_eq!(engine.state(), EngineState::Converged);
    assert!(solution.check_feasibility(&request));
    assert_eq!(solution.pdv_num(), 2);
    assert!(solution.generations > 0 && solution.generations <= 40);
    assert!((solution.fitness - solution.lane_fitness.iter().sum::<f64>()).abs() < 1e-12);
    assert_eq!(engine.best_solution(), Some(&solution));

    let stored = read_best_path(&out).unwrap();
    assert_eq!(stored.len(), 2);
    for ((route, fitness), (expected, expected_fitness)) in stored.iter().zip(solution.routes.iter().zip(&solution.lane_fitness)) {
        assert_eq!(route, expected);
        assert_eq!(fitness, expected_fitness);
    }
    fs::remove_file(out).unwrap();
}

/// A stored guess is read back and used as the starting population
#[test]
fn test_guess_persistence() {
    let path = temp_file("guess.csv");
    let population = vec![
        vec![vec![0, 1, 2], vec![3, 4, 5]],
        vec![vec![5, 3, 1], vec![0, 2, 4]],
    ];
    save_guess(&path, &population).unwrap();
    assert_eq!(read_guess_data(&path, 1, 0).unwrap(), vec![5, 3, 1]);
    assert_eq!(load_guess(&path, 2, 2).unwrap(), population);
    assert!(load_guess(&path, 1, 2).is_err(), "Records beyond the population size are corrupt");

    let mut config = test_config(2, 50, 2);
    config.ga.max_generations = 0;
    config.ga.guess_path = Some(path.clone());
    let nodes = scattered_nodes(&config.node);
    let mut engine = GeneticEngine::new(Point::default(), &config).unwrap();
    let solution = engine.calc_final_path(&nodes, &[0, 1, 2, 3, 4, 5]).unwrap();
    assert!(population.contains(&solution.routes), "Without generations the plan is one of the stored candidates");
    fs::remove_file(path).unwrap();
}

/// A corrupt guess file is replaced by a freshly generated one
#[test]
fn test_corrupt_guess_regenerated() {
    let path = temp_file("corrupt_guess.csv");
    fs::write(&path, "0,0,zero,1\nnonsense\n").unwrap();
    assert!(matches!(read_guess_data(&path, 0, 0), Err(Error::Corrupt { .. })));

    let mut config = test_config(3, 50, 2);
    config.ga.max_generations = 5;
    config.ga.guess_path = Some(path.clone());
    let nodes = scattered_nodes(&config.node);
    let request = [0, 2, 4, 6];
    let mut engine = GeneticEngine::new(Point::default(), &config).unwrap();
    let solution = engine.calc_final_path(&nodes, &request).unwrap();
    assert!(solution.check_feasibility(&request));

    let regenerated = load_guess(&path, 3, 2).unwrap();
    assert_partitions(&regenerated, &request);
    fs::remove_file(path).unwrap();
}

/// Tests saving and loading capabilities, ensuring that
/// problem data is consistently (de)serialised.
#[test]
fn test_problem_serde() {
    let path = temp_file("problem.toml");
    let mut problem = ProblemDescription {
        origin: Point::new(1.5, -2.0),
        nodes: vec![
            NodeDescription { x: 0.25, y: 3.0, voltage: 3.4, pressure_sensor: true },
            NodeDescription { x: -1.0, y: 0.5, voltage: 4.1, pressure_sensor: false },
        ],
        ga: Default::default(),
        pdv: Default::default(),
        node: Default::default(),
    };
    problem.ga.seed = Some(11);
    save_problem(&path, &problem).unwrap();
    let problem2 = parse_problem(&path).unwrap();
    assert_eq!(problem, problem2, "Ensure problem data (de)serialises consistently");
    fs::remove_file(&path).unwrap();

    fs::write(&path, "[[nodes]]\nx = 1.0\ny = 2.0\n").unwrap();
    let minimal = parse_problem(&path).unwrap();
    assert_eq!(minimal.nodes[0].voltage, 3.4);
    assert_eq!(minimal.ga, Default::default());
    fs::remove_file(path).unwrap();
}

/// Out-of-range nodes are flagged, and flying a plan charges the visited nodes and their cluster
#[test]
fn test_network_recharge() {
    let model = EnergyModel::default();
    let mut pdv = crate::config::PdvParams::default();
    pdv.max_range = 10.0;
    let nodes = [(1.0, 0.0), (1.3, 0.0), (1.05, 0.0), (6.0, 0.0), (2.0, 2.0)]
        .iter()
        .map(|&(x, y)| SensorNode::new(Point::new(x, y), 3.3, true, &model))
        .collect::<Vec<_>>();
    let mut network = Network::new(Point::default(), nodes, model.clone(), pdv, 5);

    assert_eq!(network.request_nodes(), vec![0, 1, 2, 3, 4]);
    let reachable = network.reachable_requests();
    assert_eq!(reachable, vec![0, 1, 2, 4]);
    assert_eq!(network.nodes[3].fails(), 1);

    let before = network.nodes.iter().map(SensorNode::energy).collect::<Vec<_>>();
    let solution = Solution {
        routes: vec![vec![0]],
        lane_fitness: vec![0.0],
        fitness: 0.0,
        population_index: 0,
        generations: 0,
        elapsed: Duration::ZERO,
    };
    let delivered = network.apply_solution(&solution);
    assert!(delivered > 0.0);
    assert!(network.nodes[0].energy() > before[0], "The visited node is charged");
    assert!(network.nodes[1].energy() > before[1], "Its cluster neighbour is charged too");
    assert_eq!(network.nodes[2].energy(), before[2], "Nodes within 0.1 m of the centre are not cluster members");
    assert_eq!(network.nodes[4].energy(), before[4]);

    let seen: HashSet<usize> = network.request_nodes().into_iter().collect();
    assert!(!seen.contains(&0));
}
