//! Command-line front-end for the ant-colony TPP solver.

use clap::{Parser, ValueEnum};
use log::LevelFilter;

use ants_tpp::benchmark::{
    get_best_known_solution, run_experiment, write_results, Algorithm, ExperimentConfig,
};
use ants_tpp::instance::Instance;
use ants_tpp::stop::{FixedIterations, StopCondition, Timeout};

use std::path::PathBuf;

const BEST_KNOWN_DB_PATH: &str = "best-known.js";

#[derive(Parser)]
#[command(name = "ants-tpp")]
#[command(version = "0.1.0")]
#[command(about = "Ant-colony solver for the uncapacitated traveling purchaser problem")]
struct Cli {
    /// Path to the instance file.
    #[arg(long)]
    instance: Option<PathBuf>,

    /// How many trials to do.
    #[arg(long, default_value_t = 1)]
    trials: u32,

    /// Max number of iterations to perform.
    #[arg(long, default_value_t = 1000)]
    iterations: u32,

    /// Timeout in seconds; overrides the iteration limit when present.
    #[arg(long)]
    timeout: Option<f64>,

    /// Identifier of the experiment to which calculations belong.
    #[arg(long, default_value = "default")]
    id: String,

    /// Directory where to store files with results.
    #[arg(long, default_value = ".")]
    outdir: PathBuf,

    /// Algorithm to run.
    #[arg(long, value_enum, default_value = "aco", ignore_case = true)]
    alg: AlgorithmArg,

    /// Initial seed for the pseudo-random number generator; 0 means the
    /// current time is used.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Logging verbosity.
    #[arg(long, value_enum, default_value = "warning", ignore_case = true)]
    verbosity: Verbosity,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum AlgorithmArg {
    /// Ant colony optimization.
    Aco,
    /// Commodity-adding heuristic restarts.
    Cah,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Verbosity {
    Info,
    Warning,
    Error,
}

impl Verbosity {
    fn level_filter(self) -> LevelFilter {
        match self {
            Verbosity::Info => LevelFilter::Info,
            Verbosity::Warning => LevelFilter::Warn,
            Verbosity::Error => LevelFilter::Error,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(cli.verbosity.level_filter())
        .init();

    let instance_path = match &cli.instance {
        Some(path) => path.clone(),
        None => {
            println!("No instance given; nothing to do.");
            return;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&cli.outdir) {
        eprintln!(
            "Cannot create output directory {}: {}",
            cli.outdir.display(),
            e
        );
        std::process::exit(1);
    }

    let mut instance = match Instance::from_file(&instance_path) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("Error loading instance: {}", e);
            std::process::exit(1);
        }
    };

    if instance.is_capacitated {
        eprintln!("Uncapacitated TPP instance required");
        std::process::exit(1);
    }

    let instance_path_str = instance_path.to_string_lossy().into_owned();
    if let Some(best_known) = get_best_known_solution(BEST_KNOWN_DB_PATH, &instance_path_str) {
        instance.best_known_cost = best_known.best_cost;
    }

    let (mut stop_condition, max_iterations, timeout): (Box<dyn StopCondition>, _, _) =
        match cli.timeout {
            Some(seconds) => (Box::new(Timeout::new(seconds)), None, Some(seconds)),
            None => (
                Box::new(FixedIterations::new(cli.iterations)),
                Some(cli.iterations),
                None,
            ),
        };

    let config = ExperimentConfig {
        experiment_id: cli.id.clone(),
        algorithm: match cli.alg {
            AlgorithmArg::Aco => Algorithm::Aco,
            AlgorithmArg::Cah => Algorithm::Cah,
        },
        trials: cli.trials,
        seed: cli.seed,
        instance_path: instance_path_str,
        max_iterations,
        timeout,
    };

    let record = run_experiment(&instance, &config, stop_condition.as_mut());

    match write_results(&record, &cli.outdir) {
        Ok(path) => println!("Results saved to {}", path.display()),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
