//! Heuristics module for the TPP solver.
//!
//! Exports the construction heuristics, the local-search kit and the ant
//! colony engine.

pub mod aco;
pub mod construction;
pub mod local_search;
pub mod pheromone;
pub mod three_opt;
pub mod two_opt;

pub use aco::{node_branching, Aco, AcoConfig, Ant};
pub use construction::{commodity_adding_heuristic, create_random_solution};
pub use local_search::*;
pub use pheromone::PheromoneMatrix;
pub use three_opt::{three_opt, three_opt_nn};
pub use two_opt::{two_opt, two_opt_route, two_opt_with_shuffle};
