//! Ant-colony solver for the uncapacitated Traveling Purchaser Problem.
//!
//! Given a depot, a set of markets and per-market product offers, the
//! solver picks a subset of markets and a visiting order that covers
//! every product demand while minimizing travel plus purchase cost.
//!
//! # Features
//!
//! - TPPLIB instance parsing (EUC_2D and explicit upper-row weights)
//! - Incrementally maintained solutions under market insertions/removals
//! - Local-search kit: drop, insertion, exchange variants, 2-opt, 3-opt
//!   with neighbor lists and don't-look bits
//! - Commodity-adding construction heuristic
//! - Max-Min ant colony with branching-factor restarts
//!
//! # Example
//!
//! ```no_run
//! use ants_tpp::heuristics::aco::{Aco, AcoConfig};
//! use ants_tpp::instance::Instance;
//! use ants_tpp::rng::seeded_rng;
//! use ants_tpp::stop::FixedIterations;
//!
//! let instance = Instance::from_file("instance.tpp").unwrap();
//! let mut rng = seeded_rng(42);
//! let mut aco = Aco::new(&instance, AcoConfig::default(), &mut rng);
//! let mut stop = FixedIterations::new(1000);
//! aco.run(&mut stop);
//!
//! if let Some(best) = &aco.global_best {
//!     println!("Best cost: {}", best.cost());
//! }
//! ```

pub mod benchmark;
pub mod heuristics;
pub mod instance;
pub mod rng;
pub mod solution;
pub mod stop;
pub mod utils;

pub use instance::{calc_solution_cost, is_solution_valid, Instance, Offer};
pub use solution::Solution;
