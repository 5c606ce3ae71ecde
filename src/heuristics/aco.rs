//! Max-Min ant colony for the uncapacitated TPP.
//!
//! Each iteration the ants extend their routes one market at a time with a
//! roulette over pheromone, inverse distance and a purchase-share
//! heuristic; selected ants then receive the local-search battery, and the
//! iteration/restart/global best deposits pheromone under the u_gb
//! schedule. A node-branching-factor sensor resets the trails when the
//! colony stagnates.

use crate::instance::{calc_solution_cost, Instance};
use crate::rng::SearchRng;
use crate::solution::Solution;
use crate::stop::StopCondition;
use rand::Rng;

use super::construction::{commodity_adding_heuristic, create_random_solution};
use super::local_search::{drop_heuristic, local_search};
use super::pheromone::PheromoneMatrix;

/// A single ant: its solution under construction plus the personal
/// parameters steering the roulette.
#[derive(Clone)]
pub struct Ant<'a> {
    pub solution: Solution<'a>,
    /// Pheromone exponent.
    pub affinity: f64,
    /// Inverse-distance exponent.
    pub laziness: f64,
    /// Product-value exponent.
    pub avidity: f64,
    /// Slack probability for extending an already feasible route.
    pub oversize: f64,
    /// Route length at the moment the solution first became feasible.
    pub length_when_valid: usize,
    pub id: usize,
}

impl<'a> Ant<'a> {
    pub fn new(instance: &'a Instance, rng: &mut SearchRng) -> Self {
        Ant {
            solution: Solution::new(instance),
            affinity: 3.0,
            laziness: 2.0,
            avidity: 2.0,
            oversize: rng.gen::<f64>() * 0.1,
            length_when_valid: 0,
            id: 0,
        }
    }

    /// Appends a market to the route, tracking the feasibility point.
    pub fn move_to(&mut self, market: usize) {
        assert!(market != 0, "Cannot move to depot");
        self.solution.push_back_market(market);

        if self.solution.is_valid() {
            self.length_when_valid = self.solution.route.len();
        }
    }

    #[inline]
    pub fn cost(&self) -> i32 {
        self.solution.cost
    }

    /// Current market, i.e. the last one in the route.
    #[inline]
    pub fn position(&self) -> usize {
        self.solution.route[self.solution.route.len() - 1]
    }

    /// Candidate markets for the next move: the unvisited ones among the
    /// current market's first `nn_count` nearest neighbors, or the whole
    /// unselected set when fewer than two of those remain.
    pub fn candidate_markets(&self, nn_count: usize) -> Vec<usize> {
        let current = self.position();
        let nn_list = &self.solution.instance.nn_lists[current];
        let mut cand = Vec::with_capacity(nn_count);
        for &market in nn_list.iter().take(nn_count) {
            if market != 0 && !self.solution.is_market_used(market) {
                cand.push(market);
            }
        }
        if cand.len() > 1 {
            cand
        } else {
            self.solution.unselected_markets.clone()
        }
    }
}

/// Colony parameters.
#[derive(Debug, Clone)]
pub struct AcoConfig {
    /// Number of ants per iteration.
    pub ants_count: usize,
    /// Trail retention ratio applied on evaporation.
    pub evaporation_rate: f64,
    /// Neighbor-list size used for construction and stagnation sensing.
    pub cand_list_size: usize,
    /// Whether ants receive the local-search battery.
    pub use_local_search: bool,
}

impl Default for AcoConfig {
    fn default() -> Self {
        AcoConfig {
            ants_count: 20,
            evaporation_rate: 0.99,
            cand_list_size: 25,
            use_local_search: true,
        }
    }
}

/// Computes the average node lambda-branching factor: for each node, how
/// many of its nearest trails exceed a cutoff between the local min and
/// max, averaged and halved.
pub fn node_branching(
    lambda: f64,
    cand_list_size: usize,
    pheromone: &PheromoneMatrix,
    instance: &Instance,
) -> f64 {
    let n = instance.dimension;
    let nn_ants = cand_list_size.min(instance.dimension - 1);
    assert!(nn_ants > 0);

    let mut num_branches = 0u64;
    for m in 0..n {
        let nn_list = &instance.nn_lists[m];
        let mut min = pheromone.trail(m, nn_list[0]);
        let mut max = min;
        for &nn in &nn_list[1..nn_ants] {
            let ph = pheromone.trail(m, nn);
            if ph > max {
                max = ph;
            }
            if ph < min {
                min = ph;
            }
        }
        let cutoff = min + lambda * (max - min);
        for &nn in &nn_list[..nn_ants] {
            if pheromone.trail(m, nn) > cutoff {
                num_branches += 1;
            }
        }
    }
    num_branches as f64 / (n as f64 * 2.0)
}

/// The colony engine; owns the pheromone matrix and the best-solution
/// snapshots for the lifetime of a trial.
pub struct Aco<'a> {
    pub instance: &'a Instance,
    pub config: AcoConfig,
    rng: &'a mut SearchRng,
    pheromone: PheromoneMatrix,
    pub ants: Vec<Ant<'a>>,
    /// Best feasible ant ever seen; an owned snapshot.
    pub global_best: Option<Ant<'a>>,
    /// Best ant since the last pheromone reset; an owned snapshot.
    pub restart_best: Option<Ant<'a>>,
    pub current_iteration: i32,
    pub restart_best_found_iteration: i32,
    pub pheromone_reset_iteration: i32,
    u_gb: i32,
    initial_pheromone: f64,
    min_pheromone: f64,
    max_pheromone: f64,
    greedy_solution_value: i32,
    global_best_cost_no_ls: Option<i32>,
    global_best_values_no_ls: Vec<i32>,
    /// heuristic[m][p] = purchase-share statistic of product p at market
    /// m; heuristic[m][product_count] holds the row sum the ants read.
    heuristic: Vec<Vec<f64>>,
    /// Invoked synchronously whenever a new global best is found.
    pub new_best_found_callback: Option<Box<dyn FnMut(&Aco<'a>) + 'a>>,
}

impl<'a> Aco<'a> {
    pub fn new(instance: &'a Instance, config: AcoConfig, rng: &'a mut SearchRng) -> Self {
        let dimension = instance.dimension;
        Aco {
            instance,
            config,
            rng,
            pheromone: PheromoneMatrix::new(dimension, instance.is_symmetric, 0.0, 1.0),
            ants: Vec::new(),
            global_best: None,
            restart_best: None,
            current_iteration: 0,
            restart_best_found_iteration: 0,
            pheromone_reset_iteration: 0,
            u_gb: 25,
            initial_pheromone: 0.0,
            min_pheromone: 0.0,
            max_pheromone: 0.0,
            greedy_solution_value: 0,
            global_best_cost_no_ls: None,
            global_best_values_no_ls: Vec::new(),
            heuristic: Vec::new(),
            new_best_found_callback: None,
        }
    }

    /// Runs the colony until the stop condition is reached.
    pub fn run(&mut self, stop_condition: &mut dyn StopCondition) {
        stop_condition.start();
        self.run_init();

        while !stop_condition.is_reached() {
            self.build_ant_solutions();

            // Track the best raw construction cost for the local-search
            // gating threshold.
            let best_idx = self.iteration_best_index();
            let cost = self.ants[best_idx].cost();
            if self.global_best_cost_no_ls.map_or(true, |c| c > cost) {
                self.global_best_cost_no_ls = Some(cost);
                self.global_best_values_no_ls.push(cost);
            }

            self.apply_local_search();

            let best_idx = self.iteration_best_index();
            let iteration_best_cost = self.ants[best_idx].cost();

            if self
                .global_best
                .as_ref()
                .map_or(true, |g| g.cost() > iteration_best_cost)
            {
                self.global_best = Some(self.ants[best_idx].clone());

                if let Some(mut callback) = self.new_best_found_callback.take() {
                    callback(self);
                    self.new_best_found_callback = Some(callback);
                }
            }

            if self
                .restart_best
                .as_ref()
                .map_or(true, |r| r.cost() > iteration_best_cost)
            {
                self.restart_best = Some(self.ants[best_idx].clone());
                self.restart_best_found_iteration = self.current_iteration;
            }

            // Refresh the Max-Min bounds from the global best cost.
            let best_cost = self
                .global_best
                .as_ref()
                .map_or(iteration_best_cost, |g| g.cost());
            self.max_pheromone = 1.0 / (best_cost as f64 * self.config.evaporation_rate);
            self.min_pheromone = self.max_pheromone / (2.0 * self.instance.dimension as f64);

            self.pheromone
                .set_trail_limits(self.min_pheromone, self.max_pheromone);
            self.pheromone.evaporate(self.config.evaporation_rate);

            self.deposit_pheromone(best_idx, iteration_best_cost);

            if (self.current_iteration + 1) % 100 == 0 {
                self.check_stagnation();
            }

            self.current_iteration += 1;
            self.update_u_gb();
            stop_condition.next_iteration();
        }

        if let Some(best) = &self.global_best {
            log::info!("Final best value: {}", best.cost());
            log::info!("Best ant affinity: {}", best.affinity);
            log::info!("Best ant laziness: {}", best.laziness);
            log::info!("Best ant avidity: {}", best.avidity);
        }
    }

    fn run_init(&mut self) {
        self.global_best = None;
        self.global_best_cost_no_ls = None;
        self.global_best_values_no_ls.clear();

        self.restart_best = None;
        self.restart_best_found_iteration = 0;

        if self.initial_pheromone == 0.0 {
            self.calc_initial_pheromone();
        }

        self.pheromone = PheromoneMatrix::new(
            self.instance.dimension,
            self.instance.is_symmetric,
            self.min_pheromone,
            self.max_pheromone,
        );
        self.init_heuristic_info();

        self.current_iteration = 0;
    }

    /// Seeds the trail bounds from one run of the commodity-adding
    /// construction.
    fn calc_initial_pheromone(&mut self) {
        if self.greedy_solution_value == 0 {
            let sol = commodity_adding_heuristic(self.instance, self.rng);
            self.greedy_solution_value = sol.cost;
        }
        self.max_pheromone =
            1.0 / (self.greedy_solution_value as f64 * self.config.evaporation_rate);
        self.min_pheromone = self.max_pheromone / (2.0 * self.instance.dimension as f64);
        self.initial_pheromone = self.max_pheromone;

        log::info!("max_pheromone: {}", self.max_pheromone);
        log::info!("min_pheromone: {}", self.min_pheromone);
    }

    /// Index of the cheapest ant of the current iteration.
    fn iteration_best_index(&self) -> usize {
        let mut best = 0;
        for (i, ant) in self.ants.iter().enumerate() {
            if ant.cost() < self.ants[best].cost() {
                best = i;
            }
        }
        best
    }

    fn build_ant_solutions(&mut self) {
        self.ants.clear();
        for i in 0..self.config.ants_count {
            let mut ant = Ant::new(self.instance, self.rng);
            ant.id = i;
            self.ants.push(ant);
        }

        for _ in 1..self.instance.dimension {
            for idx in 0..self.ants.len() {
                self.move_ant(idx);
            }
        }
        for ant in &mut self.ants {
            assert!(ant.solution.is_valid(), "Ant solution should be valid");
            debug_assert_eq!(
                ant.solution.cost,
                calc_solution_cost(self.instance, &ant.solution.route)
            );
            // Shed markets the construction over-covered.
            drop_heuristic(self.instance, &mut ant.solution);
        }
    }

    /// One construction step for one ant: a feasible ant keeps extending
    /// only with the oversize slack probability, then a roulette over the
    /// candidate set picks the next market.
    fn move_ant(&mut self, ant_idx: usize) {
        let ant = &self.ants[ant_idx];
        if ant.solution.is_valid() {
            let delta = (ant.length_when_valid as f64 * ant.oversize).round() as usize;
            let trials = self.instance.dimension - ant.length_when_valid;
            if trials == 0 || delta == 0 {
                return;
            }
            let p = delta as f64 / trials as f64;
            if self.rng.gen::<f64>() > p {
                return;
            }
        }

        let ant = &self.ants[ant_idx];
        let cand = ant.candidate_markets(self.config.cand_list_size);
        assert!(!cand.is_empty(), "At least one market should be unvisited");

        let mut cand_values = Vec::with_capacity(cand.len());
        let mut total = 0.0;
        for &market in &cand {
            let value = self.calc_attractiveness(ant, market);
            cand_values.push(value);
            total += value;
        }

        let threshold = self.rng.gen::<f64>() * total;
        let mut partial_sum = 0.0;
        let mut chosen = cand[cand.len() - 1];
        for (i, &value) in cand_values.iter().enumerate() {
            partial_sum += value;
            if partial_sum >= threshold {
                chosen = cand[i];
                break;
            }
        }
        assert!(chosen != 0, "Cannot move to depot");
        self.ants[ant_idx].move_to(chosen);
    }

    /// Attractiveness of moving to a market: pheromone, closeness and the
    /// market's purchase-share statistic, each under the ant's exponent.
    fn calc_attractiveness(&self, ant: &Ant, to_market: usize) -> f64 {
        let from_market = ant.position();
        let trail = self.pheromone.trail(from_market, to_market);

        let mut product = trail.powi(ant.affinity as i32);

        let travel_cost = self.instance.travel_cost(from_market, to_market);
        product *= (1.0 / travel_cost as f64).powi(ant.laziness as i32);

        let h = self.heuristic[to_market][self.instance.product_count];
        product *= h.max(1e-10).powi(ant.avidity as i32);

        product
    }

    /// Estimates per-market product desirability from 200 random feasible
    /// solutions: each solution's purchase cost is distributed over the
    /// offers that fulfilled it and normalized.
    fn init_heuristic_info(&mut self) {
        let dimension = self.instance.dimension;
        let product_count = self.instance.product_count;

        self.heuristic = vec![vec![0.0; product_count + 1]; dimension];

        // [m][p] = weighted share of product p bought at market m.
        let mut bought_at_markets = vec![vec![0.0f64; product_count]; dimension];

        const TRIALS: i32 = 200;
        for _ in 0..TRIALS {
            let sol = create_random_solution(self.instance, self.rng);
            let purchases_cost: i32 = sol.purchase_costs.iter().sum();
            let purchases_cost = purchases_cost as f64;

            for offers in &sol.product_offers {
                assert!(!offers.is_empty(), "At least one offer should be used");

                let product_id = offers[0].product_id;
                let needed = self.instance.demands[product_id];
                let mut total_bought = 0i32;
                for offer in offers {
                    let bought = offer.quantity.min(needed - total_bought);
                    bought_at_markets[offer.market_id][product_id] +=
                        (bought * offer.price) as f64 / purchases_cost;
                    total_bought -= bought;
                    if bought == 0 {
                        break;
                    }
                }
            }
        }
        for m in 0..dimension {
            let mut sum = 0.0;
            for p in 0..product_count {
                let ratio = bought_at_markets[m][p] / TRIALS as f64;
                self.heuristic[m][p] = ratio;
                sum += ratio;
            }
            self.heuristic[m][product_count] = sum;
        }
    }

    /// Applies local search to qualifying ants. Disabled for the first 200
    /// iterations; at iteration 200 the trails are reset once for a fresh
    /// exploration phase, and from then on an ant qualifies when its raw
    /// cost reaches the 5th most recent pre-local-search best.
    fn apply_local_search(&mut self) {
        if self.current_iteration == 200 {
            self.pheromone.set_all_trails(self.max_pheromone);
        }
        if self.config.use_local_search && self.current_iteration >= 200 {
            let track = &self.global_best_values_no_ls;
            if track.is_empty() {
                return;
            }
            let in_track_index = track.len() - track.len().min(5);
            let track_threshold = track[in_track_index];
            let global_best_cost = self.global_best.as_ref().map_or(i32::MAX, |g| g.cost());

            for idx in 0..self.ants.len() {
                if self.ants[idx].cost() <= track_threshold {
                    local_search(
                        self.instance,
                        &mut self.ants[idx].solution,
                        global_best_cost,
                    );
                }
            }
        }
    }

    /// Deposits `1/cost` along the closed route of the iteration, restart
    /// or global best, as selected by the u_gb schedule.
    fn deposit_pheromone(&mut self, iteration_best_idx: usize, iteration_best_cost: i32) {
        let source = if self.current_iteration % self.u_gb != 0 {
            Some((
                &self.ants[iteration_best_idx].solution.route,
                iteration_best_cost,
            ))
        } else if self.u_gb == 1
            && (self.current_iteration - self.restart_best_found_iteration) > 50
        {
            self.global_best
                .as_ref()
                .map(|ant| (&ant.solution.route, ant.cost()))
        } else {
            self.restart_best
                .as_ref()
                .map(|ant| (&ant.solution.route, ant.cost()))
        };

        if let Some((route, cost)) = source {
            let deposit = 1.0 / cost as f64;
            let mut prev = route[route.len() - 1];
            for &market in route.iter() {
                self.pheromone.increase(prev, market, deposit);
                prev = market;
            }
        }
    }

    /// Every 100 iterations: if the restart best has been stale for more
    /// than 250 iterations and the branching factor shows the trails have
    /// converged, reset the pheromone and the restart bookkeeping.
    fn check_stagnation(&mut self) {
        let lambda = 0.05;
        let branching_factor_threshold = 1.00001;
        let branching_factor = node_branching(
            lambda,
            self.config.cand_list_size,
            &self.pheromone,
            self.instance,
        );

        log::warn!("Branching factor: {}", branching_factor);

        if (self.current_iteration - self.restart_best_found_iteration > 250)
            && branching_factor < branching_factor_threshold
        {
            log::warn!("Resetting pheromone at iteration: {}", self.current_iteration);

            self.pheromone.set_all_trails(self.max_pheromone);
            self.restart_best = None;
            self.pheromone_reset_iteration = self.current_iteration;

            self.global_best_cost_no_ls = None;
            self.global_best_values_no_ls.clear();
        }
    }

    /// The u_gb schedule: with local search the deposit shifts from the
    /// iteration best towards the restart/global best as the restart best
    /// ages; without local search u_gb stays 25.
    fn update_u_gb(&mut self) {
        if self.config.use_local_search {
            let delta = self.current_iteration - self.restart_best_found_iteration;
            self.u_gb = if delta < 25 {
                25
            } else if delta < 75 {
                5
            } else if delta < 125 {
                3
            } else if delta < 250 {
                2
            } else {
                1
            };
        } else {
            self.u_gb = 25;
        }
    }
}
