//! Reads and writes scenarios (TOML) and the engine's intermediate results
//! (comma-delimited text, one record per line)

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use itertools::Itertools;

use crate::{
    error::{Error, Result},
    problem::{Candidate, Lane, Population, ProblemDescription, Solution},
};

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::Persistence { path: path.to_path_buf(), source }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> Error {
    Error::Corrupt { path: path.to_path_buf(), reason: reason.into() }
}

/// Reads a problem from a file, in TOML format
pub fn parse_problem(path: impl AsRef<Path>) -> Result<ProblemDescription> {
    let path = path.as_ref();
    let file_contents = fs::read_to_string(path).map_err(io_error(path))?;
    Ok(toml::from_str(&file_contents)?)
}

/// Saves a problem in TOML format to a file
pub fn save_problem(path: impl AsRef<Path>, problem: &ProblemDescription) -> Result<()> {
    let path = path.as_ref();
    let contents = toml::to_string(problem)?;
    fs::write(path, contents).map_err(io_error(path))
}

/// Saves a population as `pop,pdv,order,node` records
pub fn save_guess(path: impl AsRef<Path>, population: &Population) -> Result<()> {
    let path = path.as_ref();
    let mut file = BufWriter::new(File::create(path).map_err(io_error(path))?);
    for (p, candidate) in population.iter().enumerate() {
        for (k, lane) in candidate.iter().enumerate() {
            for (order, node) in lane.iter().enumerate() {
                writeln!(file, "{p},{k},{order},{node}").map_err(io_error(path))?;
            }
        }
    }
    file.flush().map_err(io_error(path))
}

/// Every `[pop, pdv, order, node]` record of a guess file
fn read_guess_rows(path: &Path) -> Result<Vec<[usize; 4]>> {
    let contents = fs::read_to_string(path).map_err(io_error(path))?;
    contents.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            let fields: Vec<usize> = line.split(',')
                .map(|f| f.trim().parse::<usize>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| corrupt(path, format!("line {}: {e}", n + 1)))?;
            <[usize; 4]>::try_from(fields)
                .map_err(|f| corrupt(path, format!("line {}: expected 4 fields, got {}", n + 1, f.len())))
        })
        .collect()
}

/// Sort a lane's records by their order field and check it runs 0, 1, 2, ...
fn assemble_lane(path: &Path, mut records: Vec<(usize, usize)>) -> Result<Lane> {
    records.sort_unstable();
    if records.iter().enumerate().any(|(i, (order, _))| *order != i) {
        return Err(corrupt(path, "visiting order has gaps or repeats"));
    }
    Ok(records.into_iter().map(|(_, node)| node).collect())
}

/// The lane stored for population `pop` and PDV `pdv`
pub fn read_guess_data(path: impl AsRef<Path>, pop: usize, pdv: usize) -> Result<Lane> {
    let path = path.as_ref();
    let records = read_guess_rows(path)?
        .into_iter()
        .filter(|r| r[0] == pop && r[1] == pdv)
        .map(|r| (r[2], r[3]))
        .collect_vec();
    assemble_lane(path, records)
}

/// A whole stored population of `pop_num` candidates with `pdv_num` lanes each
pub fn load_guess(path: impl AsRef<Path>, pop_num: usize, pdv_num: usize) -> Result<Population> {
    let path = path.as_ref();
    let rows = read_guess_rows(path)?;
    if let Some(r) = rows.iter().find(|r| r[0] >= pop_num || r[1] >= pdv_num) {
        return Err(corrupt(path, format!("record for population {} PDV {} is out of range", r[0], r[1])));
    }
    let mut records = vec![vec![vec![]; pdv_num]; pop_num];
    for [p, k, order, node] in rows {
        records[p][k].push((order, node));
    }
    let population: Population = records.into_iter()
        .map(|lanes| lanes.into_iter().map(|lane| assemble_lane(path, lane)).collect::<Result<Candidate>>())
        .collect::<Result<_>>()?;
    if population.iter().any(|c| c.iter().all(Vec::is_empty)) {
        return Err(corrupt(path, "a stored candidate is empty"));
    }
    Ok(population)
}

/// Saves the best routes, one `pdv,len,fitness,node,node,...` row per PDV
pub fn save_best_path(path: impl AsRef<Path>, solution: &Solution) -> Result<()> {
    let path = path.as_ref();
    let mut file = BufWriter::new(File::create(path).map_err(io_error(path))?);
    for (k, (route, fitness)) in solution.routes.iter().zip(&solution.lane_fitness).enumerate() {
        let nodes = route.iter().join(",");
        let sep = if nodes.is_empty() { "" } else { "," };
        writeln!(file, "{k},{},{fitness}{sep}{nodes}", route.len()).map_err(io_error(path))?;
    }
    file.flush().map_err(io_error(path))
}

/// Reads back the routes written by [`save_best_path`] with their fitness
pub fn read_best_path(path: impl AsRef<Path>) -> Result<Vec<(Lane, f64)>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(io_error(path))?;
    contents.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut fields = line.split(',').map(str::trim);
            let (_, len, fitness) = fields.next_tuple().ok_or_else(|| corrupt(path, "truncated row"))?;
            let len: usize = len.parse().map_err(|_| corrupt(path, "bad route length"))?;
            let fitness: f64 = fitness.parse().map_err(|_| corrupt(path, "bad fitness"))?;
            let route: Lane = fields.map(str::parse::<usize>)
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| corrupt(path, "bad node index"))?;
            if route.len() != len {
                return Err(corrupt(path, "route length doesn't match its tag"));
            }
            Ok((route, fitness))
        })
        .collect()
}
