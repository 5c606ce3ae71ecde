//! Experiment driver: runs trials, collects per-trial logs through the
//! new-best callback, looks up best-known costs and serializes the result
//! document.

use crate::heuristics::aco::{Aco, AcoConfig};
use crate::heuristics::construction::commodity_adding_heuristic;
use crate::instance::Instance;
use crate::rng::SearchRng;
use crate::solution::Solution;
use crate::stop::StopCondition;
use crate::utils::sample_mean;

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

/// One entry of the best-known-solutions database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestKnownEntry {
    pub name: String,
    pub best_cost: i32,
    pub best_markets: i32,
}

/// Looks up the best known solution for an instance in the JSON database
/// file, matching by the trailing component of the instance path. A
/// missing file or entry is only a warning.
pub fn get_best_known_solution(db_path: &str, instance_path: &str) -> Option<BestKnownEntry> {
    let file = match File::open(db_path) {
        Ok(file) => file,
        Err(_) => {
            log::warn!("Best-known database not found at: {}", db_path);
            return None;
        }
    };
    let entries: Vec<BestKnownEntry> = match serde_json::from_reader(file) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot parse best-known database: {}", e);
            return None;
        }
    };

    let filename = Path::new(instance_path)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| instance_path.to_string());

    let found = entries.into_iter().find(|e| e.name == filename);
    if found.is_none() {
        log::warn!(
            "No info about best known solution for the instance at path: {}",
            instance_path
        );
    }
    found
}

/// Colony parameters as reported in the result document.
#[derive(Debug, Clone, Serialize)]
pub struct AcoParameters {
    pub ants: usize,
    pub evaporation_rate: f64,
    pub cand_list_size: usize,
    pub local_search_enabled: bool,
}

impl From<&AcoConfig> for AcoParameters {
    fn from(config: &AcoConfig) -> Self {
        AcoParameters {
            ants: config.ants_count,
            evaporation_rate: config.evaporation_rate,
            cand_list_size: config.cand_list_size,
            local_search_enabled: config.use_local_search,
        }
    }
}

/// Per-trial record: duration, iteration count and the new-best logs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrialRecord {
    pub duration: f64,
    pub total_iterations: i32,
    pub best_solutions_cost_log: Vec<i32>,
    pub best_solutions_iteration_log: Vec<i32>,
    pub best_solutions_time_log: Vec<f64>,
    pub best_solutions_error_log: Vec<f64>,
}

/// The complete result document written after an experiment.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentRecord {
    pub experiment_id: String,
    pub trials_count: u32,
    pub instance_path: String,
    pub instance_name: String,
    pub instance_dimension: usize,
    pub instance_product_count: usize,
    pub best_known_cost: i32,
    pub rng_seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aco_parameters: Option<AcoParameters>,
    pub trials: Vec<TrialRecord>,
    pub best_found_cost: i32,
    pub best_found_error: f64,
    pub best_found_solution: Vec<usize>,
    pub mean_best_solution_cost: f64,
    pub mean_best_solution_error: f64,
}

/// Which algorithm an experiment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Aco,
    Cah,
}

/// Experiment-level settings carried from the command line.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub experiment_id: String,
    pub algorithm: Algorithm,
    pub trials: u32,
    pub seed: u64,
    pub instance_path: String,
    pub max_iterations: Option<u32>,
    pub timeout: Option<f64>,
}

/// Runs one ACO trial, wiring the new-best callback into the trial logs.
pub fn perform_trial(aco: &mut Aco, stop_condition: &mut dyn StopCondition) -> TrialRecord {
    let logs: Rc<RefCell<TrialRecord>> = Rc::new(RefCell::new(TrialRecord::default()));
    let trial_start = Instant::now();

    let sink = Rc::clone(&logs);
    aco.new_best_found_callback = Some(Box::new(move |aco: &Aco| {
        let best = match &aco.global_best {
            Some(best) => best,
            None => return,
        };
        let rel_error = best.solution.relative_error() * 100.0;
        let mut record = sink.borrow_mut();
        record.best_solutions_cost_log.push(best.cost());
        record
            .best_solutions_iteration_log
            .push(aco.current_iteration);
        record
            .best_solutions_time_log
            .push(trial_start.elapsed().as_secs_f64());
        record.best_solutions_error_log.push(rel_error);

        log::warn!(
            "New global best: {} ({:.2}%, {}), iter: {}",
            best.cost(),
            rel_error,
            aco.instance.best_known_cost,
            aco.current_iteration
        );
    }));

    aco.run(stop_condition);
    aco.new_best_found_callback = None;

    if let Some(best) = &aco.global_best {
        log::warn!("Best route: {:?}", best.solution.route);
    }

    let mut record = logs.borrow().clone();
    record.duration = trial_start.elapsed().as_secs_f64();
    record.total_iterations = aco.current_iteration;
    record
}

/// Runs CAH repeatedly under the stop condition, keeping the best
/// solution; the same logs are collected as for the colony.
pub fn perform_trial_cah<'a>(
    instance: &'a Instance,
    stop_condition: &mut dyn StopCondition,
    rng: &mut SearchRng,
) -> (TrialRecord, Option<Solution<'a>>) {
    let mut record = TrialRecord::default();
    let trial_start = Instant::now();
    let mut best_solution: Option<Solution<'a>> = None;

    stop_condition.start();
    while !stop_condition.is_reached() {
        let sol = commodity_adding_heuristic(instance, rng);

        let is_better = best_solution
            .as_ref()
            .map_or(true, |best| best.cost > sol.cost);
        if is_better {
            let rel_error = sol.relative_error() * 100.0;
            log::warn!(
                "New global best: {} ({:.2}%, {}), iter: {}",
                sol.cost,
                rel_error,
                instance.best_known_cost,
                stop_condition.iteration()
            );
            record.best_solutions_cost_log.push(sol.cost);
            record
                .best_solutions_iteration_log
                .push(stop_condition.iteration() as i32);
            record
                .best_solutions_time_log
                .push(trial_start.elapsed().as_secs_f64());
            record.best_solutions_error_log.push(rel_error);
            best_solution = Some(sol);
        }
        stop_condition.next_iteration();
    }
    if let Some(best) = &best_solution {
        log::warn!("Final solution cost: {}", best.cost);
    }
    record.duration = trial_start.elapsed().as_secs_f64();
    record.total_iterations = stop_condition.iteration() as i32;
    (record, best_solution)
}

/// Runs the configured number of trials and aggregates the result
/// document.
pub fn run_experiment(
    instance: &Instance,
    config: &ExperimentConfig,
    stop_condition: &mut dyn StopCondition,
) -> ExperimentRecord {
    let mut rng = crate::rng::seeded_rng(config.seed);

    let mut record = ExperimentRecord {
        experiment_id: config.experiment_id.clone(),
        trials_count: config.trials,
        instance_path: config.instance_path.clone(),
        instance_name: instance.name.clone(),
        instance_dimension: instance.dimension,
        instance_product_count: instance.product_count,
        best_known_cost: instance.best_known_cost,
        rng_seed: crate::rng::resolve_seed(config.seed),
        max_iterations: config.max_iterations,
        timeout: config.timeout,
        aco_parameters: None,
        trials: Vec::new(),
        best_found_cost: i32::MAX,
        best_found_error: -1.0,
        best_found_solution: Vec::new(),
        mean_best_solution_cost: 0.0,
        mean_best_solution_error: 0.0,
    };

    let mut trials_best_cost: Vec<i32> = Vec::new();
    let mut trials_best_error: Vec<f64> = Vec::new();

    for _ in 0..config.trials {
        match config.algorithm {
            Algorithm::Aco => {
                let aco_config = AcoConfig::default();
                record.aco_parameters = Some(AcoParameters::from(&aco_config));

                let mut aco = Aco::new(instance, aco_config, &mut rng);
                let trial_record = perform_trial(&mut aco, stop_condition);
                record.trials.push(trial_record);

                let best = match &aco.global_best {
                    Some(best) => best,
                    None => break,
                };
                if best.cost() < record.best_found_cost {
                    record.best_found_cost = best.cost();
                    record.best_found_solution = best.solution.route.clone();
                    record.best_found_error = best.solution.relative_error();
                }
                trials_best_cost.push(best.cost());
                trials_best_error.push(best.solution.relative_error());
            }
            Algorithm::Cah => {
                let (trial_record, best) =
                    perform_trial_cah(instance, stop_condition, &mut rng);
                record.trials.push(trial_record);

                let best = match best {
                    Some(best) => best,
                    None => break,
                };
                if best.cost < record.best_found_cost {
                    record.best_found_cost = best.cost;
                    record.best_found_solution = best.route.clone();
                    record.best_found_error = best.relative_error();
                }
                trials_best_cost.push(best.cost);
                trials_best_error.push(best.relative_error());
            }
        }
    }

    record.mean_best_solution_cost = sample_mean(&trials_best_cost);
    record.mean_best_solution_error = sample_mean(&trials_best_error);
    record
}

/// Result file name: `results_<label>_<Y-M-D__H:M:S>_<pid>.js`.
pub fn result_file_name(label: &str) -> String {
    let now = chrono::Local::now();
    format!(
        "results_{}_{}_{}.js",
        label,
        now.format("%Y-%-m-%-d__%-H:%-M:%-S"),
        std::process::id()
    )
}

/// Writes the result document into the output directory, pretty-printed.
pub fn write_results(record: &ExperimentRecord, outdir: &Path) -> Result<PathBuf, String> {
    let path = outdir.join(result_file_name(&record.instance_name));
    log::warn!("Saving results to a file: {}", path.display());

    let json = serde_json::to_string_pretty(record)
        .map_err(|e| format!("Cannot serialize results: {}", e))?;
    std::fs::write(&path, json).map_err(|e| {
        format!(
            "Cannot create a file with results: {}: {}",
            path.display(),
            e
        )
    })?;
    Ok(path)
}
