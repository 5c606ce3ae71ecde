//! Local search operators built on the incremental solution state.
//!
//! Each operator takes the instance and a mutable solution, preserves
//! solution validity, and returns the improvement (start cost − end cost,
//! >= 0 unless noted). The composite driver chains them the way the colony
//! applies local search to an ant.

use crate::instance::{is_solution_valid, Instance};
use crate::rng::SearchRng;
use crate::solution::Solution;
use rand::seq::SliceRandom;

use super::three_opt::three_opt_nn;

/// Drops a market whenever the travel saving exceeds the purchase-cost
/// increase, keeping the solution feasible. Re-scans from the same index
/// after each removal.
pub fn drop_heuristic(instance: &Instance, solution: &mut Solution) -> i32 {
    let start_cost = solution.cost;
    let mut solution_changed = false;
    let mut i = 1;
    while i < solution.route.len() {
        let market_id = solution.route[i];
        let after = solution.calc_market_removal_cost(market_id, true);
        if after.demand_satisfied && after.cost_change < 0 {
            solution.remove_market_at_pos(i);
            solution_changed = true;
        } else {
            i += 1;
        }
    }
    if solution_changed {
        debug_assert!(is_solution_valid(instance, &solution.route));
    }
    start_cost - solution.cost
}

/// Drop pass over the route markets in a random order.
pub fn drop_heuristic_randomized(
    instance: &Instance,
    solution: &mut Solution,
    rng: &mut SearchRng,
) -> i32 {
    let mut markets: Vec<usize> = solution.route[1..].to_vec();
    markets.shuffle(rng);

    let start_cost = solution.cost;
    let mut solution_changed = false;

    for market_id in markets {
        let after = solution.calc_market_removal_cost(market_id, true);
        if after.demand_satisfied && after.cost_change < 0 {
            let pos = solution.market_pos_in_route(market_id);
            solution.remove_market_at_pos(pos);
            solution_changed = true;
        }
    }
    if solution_changed {
        debug_assert!(is_solution_valid(instance, &solution.route));
    }
    start_cost - solution.cost
}

/// Inserts any unselected market whose best insertion does not increase
/// the total cost.
pub fn insertion_heuristic(instance: &Instance, solution: &mut Solution) -> i32 {
    let start_cost = solution.cost;
    let candidates = solution.unselected_markets.clone();
    let mut solution_changed = false;

    for cand in candidates {
        let verdict = solution.calc_market_add_cost(cand);
        if verdict.cost_change <= 0 {
            let prev_cost = solution.cost;
            solution.insert_market_at_pos(cand, verdict.index);
            debug_assert_eq!(prev_cost + verdict.cost_change, solution.cost);
            solution_changed = true;
        }
    }
    if solution_changed {
        debug_assert!(is_solution_valid(instance, &solution.route));
    }
    start_cost - solution.cost
}

/// For each route market, removes it and looks for an unselected
/// replacement that keeps the solution feasible at no higher cost; the
/// market is restored when no replacement qualifies.
pub fn exchange_heuristic(instance: &Instance, sol: &mut Solution) -> i32 {
    let start_cost = sol.cost;
    let mut unselected = sol.unselected_markets.clone();
    let mut solution_changed = false;

    let markets_to_check: Vec<usize> = sol.route[1..].to_vec();

    for market_id in markets_to_check {
        let cost_before_removal = sol.cost;
        let market_pos = sol.market_pos_in_route(market_id);
        sol.remove_market_at_pos(market_pos);

        let mut found = false;
        for idx in 0..unselected.len() {
            let cand = unselected[idx];
            if !sol.check_market_satisfies_demand(cand) {
                continue;
            }
            let verdict = sol.calc_market_add_cost(cand);
            if sol.cost + verdict.cost_change <= cost_before_removal && verdict.demand_satisfied {
                let prev_cost = sol.cost;
                sol.insert_market_at_pos(cand, verdict.index);
                debug_assert_eq!(prev_cost + verdict.cost_change, sol.cost);
                unselected.remove(idx);
                found = true;
                break;
            }
        }
        if found {
            solution_changed = true;
        } else {
            // Restore the solution to the previous state.
            sol.insert_market_at_pos(market_id, market_pos);
        }
    }
    if solution_changed {
        debug_assert!(is_solution_valid(instance, &sol.route));
    }
    start_cost - sol.cost
}

/// Exchange variant that removes two consecutive markets and inserts at
/// most one replacement.
pub fn double_exchange_heuristic(instance: &Instance, sol: &mut Solution) -> i32 {
    let route_copy = sol.route.clone();
    double_exchange_over(instance, sol, &route_copy[1..])
}

/// Double exchange over the route markets in a random order.
pub fn double_exchange_heuristic_randomized(
    instance: &Instance,
    sol: &mut Solution,
    rng: &mut SearchRng,
) -> i32 {
    let mut markets: Vec<usize> = sol.route[1..].to_vec();
    markets.shuffle(rng);
    double_exchange_over(instance, sol, &markets)
}

fn double_exchange_over(instance: &Instance, sol: &mut Solution, markets: &[usize]) -> i32 {
    let start_cost = sol.cost;
    let mut solution_changed = false;
    let mut unselected = sol.unselected_markets.clone();

    let mut i = 0;
    while i + 1 < markets.len() {
        let cost_before_removal = sol.cost;
        let market_1 = markets[i];
        let market_2 = markets[i + 1];

        let pos_1 = sol.market_pos_in_route(market_1);
        let pos_2 = sol.market_pos_in_route(market_2);
        assert!(pos_1 < sol.route.len(), "market_1 not in route");
        assert!(pos_2 < sol.route.len(), "market_2 not in route");

        if pos_1 < pos_2 {
            sol.remove_market_at_pos(pos_2);
            sol.remove_market_at_pos(pos_1);
        } else {
            sol.remove_market_at_pos(pos_1);
            sol.remove_market_at_pos(pos_2);
        }

        let mut found = false;
        for idx in 0..unselected.len() {
            let cand = unselected[idx];
            if !sol.check_market_satisfies_demand(cand) {
                continue;
            }
            let verdict = sol.calc_market_add_cost(cand);
            if sol.cost + verdict.cost_change < cost_before_removal && verdict.demand_satisfied {
                let prev_cost = sol.cost;
                sol.insert_market_at_pos(cand, verdict.index);
                debug_assert_eq!(prev_cost + verdict.cost_change, sol.cost);
                unselected.remove(idx);
                found = true;
                break;
            }
        }
        if found {
            solution_changed = true;
            i += 1; // Skip over market_2.
        } else {
            // Restore the solution to the previous state.
            if pos_1 < pos_2 {
                sol.insert_market_at_pos(market_1, pos_1);
                sol.insert_market_at_pos(market_2, pos_2);
            } else {
                sol.insert_market_at_pos(market_2, pos_2);
                sol.insert_market_at_pos(market_1, pos_1);
            }
        }
        i += 1;
    }
    if solution_changed {
        debug_assert!(is_solution_valid(instance, &sol.route));
    }
    start_cost - sol.cost
}

/// Exchange variant that removes k consecutive markets and inserts at most
/// one replacement; the removed markets are restored when nothing better
/// is found.
pub fn k_exchange_heuristic(instance: &Instance, sol: &mut Solution, k: usize) -> i32 {
    let start_cost = sol.cost;
    let mut unselected = sol.unselected_markets.clone();
    let mut solution_changed = false;

    let route_copy = sol.route.clone();
    let mut rem_markets: Vec<(usize, usize)> = Vec::with_capacity(k); // (market, position)

    let mut i = 1;
    while i + k - 1 < route_copy.len() {
        let cost_before_removal = sol.cost;

        rem_markets.clear();
        for j in 0..k {
            let market = route_copy[i + j];
            let pos = sol.market_pos_in_route(market);
            assert!(pos < sol.route.len(), "market not in route");
            rem_markets.push((market, pos));
        }
        rem_markets.sort_by_key(|&(_, pos)| pos);

        for &(_, pos) in rem_markets.iter().rev() {
            sol.remove_market_at_pos(pos);
        }

        let mut found = false;
        for idx in 0..unselected.len() {
            let cand = unselected[idx];
            if !sol.check_market_satisfies_demand(cand) {
                continue;
            }
            let verdict = sol.calc_market_add_cost(cand);
            if sol.cost + verdict.cost_change < cost_before_removal && verdict.demand_satisfied {
                let prev_cost = sol.cost;
                sol.insert_market_at_pos(cand, verdict.index);
                debug_assert_eq!(prev_cost + verdict.cost_change, sol.cost);
                unselected.remove(idx);
                found = true;
                break;
            }
        }
        if found {
            solution_changed = true;
            i += k - 1; // Skip over the removed markets.
        } else {
            // Restore the solution to the previous state.
            for &(market, pos) in rem_markets.iter() {
                sol.insert_market_at_pos(market, pos);
            }
        }
        i += 1;
    }
    if solution_changed {
        debug_assert!(is_solution_valid(instance, &sol.route));
    }
    start_cost - sol.cost
}

/// The local-search battery applied to ant solutions: a neighbor-list
/// 3-opt on entry, then up to two passes of drop, insertion, k-exchange,
/// double exchange and exchange, re-running 3-opt whenever a pass changed
/// the cost. A pass close enough to the global best earns extra passes,
/// more generously early on.
pub fn local_search(instance: &Instance, sol: &mut Solution, global_best_cost: i32) {
    const MAX_PASSES: i32 = 2;
    let mut pass = 0;
    let mut global_best_improved = false;

    three_opt_nn(instance, sol, true, 25);

    loop {
        let start_cost = sol.cost;

        drop_heuristic(instance, sol);
        insertion_heuristic(instance, sol);
        k_exchange_heuristic(instance, sol, 3);
        double_exchange_heuristic(instance, sol);
        exchange_heuristic(instance, sol);

        if sol.cost != start_cost {
            three_opt_nn(instance, sol, true, 25);
        }
        let improvement_found = sol.cost < start_cost;
        pass += 1;
        if improvement_found
            && (sol.cost as f64) < global_best_cost as f64 * (1.0 + 0.08 / ((pass * pass) as f64))
        {
            global_best_improved = true;
        }
        if !(improvement_found && (pass < MAX_PASSES || global_best_improved)) {
            break;
        }
    }
    debug_assert!(is_solution_valid(instance, &sol.route));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{calc_solution_cost, Instance, Offer};
    use crate::rng::seeded_rng;
    use crate::solution::Solution;

    /// 5 nodes; market 4 duplicates market 1's products at higher prices
    /// and sits far away, so it is worth dropping.
    fn build_droppable_instance() -> Instance {
        let n = 5;
        let mut weights = vec![1i32; n * n];
        for i in 0..n {
            weights[i * n + i] = 0;
        }
        for j in 0..n {
            if j != 4 {
                weights[4 * n + j] = 10;
                weights[j * n + 4] = 10;
            }
        }
        let offers = vec![
            vec![],
            vec![Offer::new(1, 1, 0, 1), Offer::new(1, 1, 1, 1)],
            vec![Offer::new(1, 1, 2, 2)],
            vec![Offer::new(2, 1, 0, 3)],
            vec![Offer::new(3, 1, 0, 4), Offer::new(3, 1, 1, 4)],
        ];
        Instance::from_parts(
            "droppable".to_string(),
            n,
            weights,
            vec![1, 1, 1],
            offers,
            true,
        )
    }

    fn full_solution(instance: &Instance) -> Solution<'_> {
        let mut sol = Solution::new(instance);
        for m in 1..instance.dimension {
            sol.push_back_market(m);
        }
        sol
    }

    fn assert_costs_consistent(sol: &Solution) {
        assert_eq!(sol.travel_cost, sol.instance.route_travel_cost(&sol.route));
        assert_eq!(sol.cost, calc_solution_cost(sol.instance, &sol.route));
    }

    #[test]
    fn test_drop_heuristic_removes_wasteful_markets() {
        let instance = build_droppable_instance();
        let mut sol = full_solution(&instance);
        assert!(sol.is_valid());

        let improvement = drop_heuristic(&instance, &mut sol);
        assert!(improvement > 0);
        assert!(sol.is_valid());
        assert!(!sol.route.contains(&4));
        assert_costs_consistent(&sol);
    }

    #[test]
    fn test_drop_heuristic_randomized_keeps_validity() {
        let instance = build_droppable_instance();
        let mut rng = seeded_rng(5);
        for _ in 0..10 {
            let mut sol = full_solution(&instance);
            let improvement = drop_heuristic_randomized(&instance, &mut sol, &mut rng);
            assert!(improvement >= 0);
            assert!(sol.is_valid());
            assert_costs_consistent(&sol);
        }
    }

    #[test]
    fn test_insertion_heuristic_adds_cheaper_market() {
        // Market 3 sells product 0 for 1 while the only current provider
        // charges 5; the detour costs nothing extra on unit edges.
        let n = 4;
        let mut weights = vec![1i32; n * n];
        for i in 0..n {
            weights[i * n + i] = 0;
        }
        let offers = vec![
            vec![],
            vec![Offer::new(5, 1, 0, 1)],
            vec![Offer::new(1, 1, 1, 2)],
            vec![Offer::new(1, 1, 0, 3)],
        ];
        let instance = Instance::from_parts(
            "insertable".to_string(),
            n,
            weights,
            vec![1, 1],
            offers,
            true,
        );

        let mut sol = Solution::new(&instance);
        sol.push_back_market(1);
        sol.push_back_market(2);
        assert!(sol.is_valid());

        let improvement = insertion_heuristic(&instance, &mut sol);
        assert!(improvement > 0);
        assert!(sol.route.contains(&3));
        assert!(sol.is_valid());
        assert_costs_consistent(&sol);
    }

    #[test]
    fn test_exchange_heuristic_swaps_in_cheaper_provider() {
        // Markets 1 and 3 both cover product 0 alone; market 3 is cheaper.
        let n = 4;
        let mut weights = vec![1i32; n * n];
        for i in 0..n {
            weights[i * n + i] = 0;
        }
        let offers = vec![
            vec![],
            vec![Offer::new(5, 1, 0, 1)],
            vec![Offer::new(1, 1, 1, 2)],
            vec![Offer::new(1, 1, 0, 3)],
        ];
        let instance = Instance::from_parts(
            "exchange".to_string(),
            n,
            weights,
            vec![1, 1],
            offers,
            true,
        );

        let mut sol = Solution::new(&instance);
        sol.push_back_market(1);
        sol.push_back_market(2);
        let cost_before = sol.cost;

        let improvement = exchange_heuristic(&instance, &mut sol);
        assert!(improvement > 0);
        assert_eq!(sol.cost, cost_before - improvement);
        assert!(sol.route.contains(&3));
        assert!(!sol.route.contains(&1));
        assert!(sol.is_valid());
        assert_costs_consistent(&sol);
    }

    #[test]
    fn test_exchange_restores_when_no_replacement_exists() {
        let instance = build_droppable_instance();
        let mut sol = Solution::new(&instance);
        sol.push_back_market(1);
        sol.push_back_market(2);
        let route_before = sol.route.clone();
        let cost_before = sol.cost;

        // Only markets 3 and 4 are unselected; neither covers the demands
        // left by dropping markets 1 or 2 alone.
        let improvement = exchange_heuristic(&instance, &mut sol);
        assert_eq!(improvement, 0);
        assert_eq!(sol.route, route_before);
        assert_eq!(sol.cost, cost_before);
        assert!(sol.is_valid());
    }

    #[test]
    fn test_double_and_k_exchange_preserve_validity() {
        let instance = build_droppable_instance();
        let mut rng = seeded_rng(17);

        let mut sol = full_solution(&instance);
        let improvement = double_exchange_heuristic(&instance, &mut sol);
        assert!(improvement >= 0);
        assert!(sol.is_valid());
        assert_costs_consistent(&sol);

        let mut sol = full_solution(&instance);
        let improvement = double_exchange_heuristic_randomized(&instance, &mut sol, &mut rng);
        assert!(improvement >= 0);
        assert!(sol.is_valid());
        assert_costs_consistent(&sol);

        for k in 1..=3 {
            let mut sol = full_solution(&instance);
            let improvement = k_exchange_heuristic(&instance, &mut sol, k);
            assert!(improvement >= 0);
            assert!(sol.is_valid());
            assert_costs_consistent(&sol);
        }
    }

    #[test]
    fn test_double_and_k_exchange_replace_pair_with_single_market() {
        // Markets 1 and 2 each sell one product dearly; market 3 sells both
        // cheaply, so the pair should collapse into it.
        let n = 4;
        let mut weights = vec![1i32; n * n];
        for i in 0..n {
            weights[i * n + i] = 0;
        }
        let offers = vec![
            vec![],
            vec![Offer::new(5, 1, 0, 1)],
            vec![Offer::new(5, 1, 1, 2)],
            vec![Offer::new(1, 1, 0, 3), Offer::new(1, 1, 1, 3)],
        ];
        let instance =
            Instance::from_parts("pair".to_string(), n, weights, vec![1, 1], offers, true);

        let mut sol = Solution::new(&instance);
        sol.push_back_market(1);
        sol.push_back_market(2);
        assert_eq!(sol.cost, 13);

        let improvement = double_exchange_heuristic(&instance, &mut sol);
        assert_eq!(improvement, 9);
        assert_eq!(sol.route, vec![0, 3]);
        assert!(sol.is_valid());
        assert_costs_consistent(&sol);

        let mut sol = Solution::new(&instance);
        sol.push_back_market(1);
        sol.push_back_market(2);
        let improvement = k_exchange_heuristic(&instance, &mut sol, 2);
        assert_eq!(improvement, 9);
        assert_eq!(sol.route, vec![0, 3]);
        assert!(sol.is_valid());
    }

    #[test]
    fn test_local_search_driver() {
        let instance = build_droppable_instance();
        let mut sol = full_solution(&instance);
        let start_cost = sol.cost;

        local_search(&instance, &mut sol, start_cost);
        assert!(sol.cost <= start_cost);
        assert!(sol.is_valid());
        assert_eq!(sol.route[0], 0);
        assert_costs_consistent(&sol);
    }
}
