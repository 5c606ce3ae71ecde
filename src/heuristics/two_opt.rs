//! Basic best-improvement 2-opt over a route.

use crate::instance::{calc_solution_cost, Instance};
use crate::rng::SearchRng;
use crate::solution::Solution;
use rand::seq::SliceRandom;

/// Best-improvement 2-opt on a bare route. Returns the total travel-cost
/// improvement (>= 0).
pub fn two_opt_route(instance: &Instance, route: &mut [usize]) -> i32 {
    assert!(instance.is_symmetric, "Expected symmetric instance");

    let len = route.len();
    if len < 3 {
        return 0;
    }

    let mut total_improvement = 0;
    loop {
        let mut best_change_value = 0;
        let mut best_change_beg = len;
        let mut best_change_end = len;

        for i in 1..len - 1 {
            let a = route[i];
            let a_prev = route[i - 1];
            for j in i + 1..len {
                let b = route[j];
                let b_next = route[(j + 1) % len];

                let diff = instance.travel_cost(a_prev, a) + instance.travel_cost(b, b_next)
                    - instance.travel_cost(a_prev, b)
                    - instance.travel_cost(a, b_next);
                if diff > best_change_value {
                    best_change_value = diff;
                    best_change_beg = i;
                    best_change_end = j;
                }
            }
        }
        if best_change_value > 0 {
            route[best_change_beg..=best_change_end].reverse();
            total_improvement += best_change_value;
        } else {
            break;
        }
    }
    total_improvement
}

/// 2-opt on a solution, keeping the cached costs in sync. Returns the
/// improvement (start cost − end cost).
pub fn two_opt(instance: &Instance, sol: &mut Solution) -> i32 {
    let improvement = two_opt_route(instance, &mut sol.route);
    sol.cost -= improvement;
    sol.travel_cost -= improvement;
    improvement
}

/// Randomized restarts of 2-opt: the route (except the depot) is shuffled
/// between attempts and the best result is kept. Returns
/// `start_cost - best_cost`.
pub fn two_opt_with_shuffle(
    instance: &Instance,
    route: &mut Vec<usize>,
    rng: &mut SearchRng,
    attempts: u32,
) -> i32 {
    let start_cost = calc_solution_cost(instance, route);
    let mut best_cost = start_cost;
    let mut curr_route = route.clone();

    for i in 0..attempts {
        let improvement = two_opt_route(instance, &mut curr_route);

        if improvement > 0 {
            let cost = calc_solution_cost(instance, &curr_route);
            if cost < best_cost {
                best_cost = cost;
                *route = curr_route.clone();
            }
        }
        if i + 1 < attempts {
            // The first node is the depot and stays put.
            curr_route[1..].shuffle(rng);
        }
    }
    start_cost - best_cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Instance, Offer};
    use crate::rng::seeded_rng;

    fn build_two_opt_instance() -> Instance {
        let weights = vec![0, 2, 1, 1, 2, 0, 1, 1, 1, 1, 0, 1, 1, 1, 1, 0];
        Instance::from_parts(
            "two-opt".to_string(),
            4,
            weights,
            vec![1],
            vec![
                vec![],
                vec![Offer::new(1, 1, 0, 1)],
                vec![Offer::new(1, 1, 0, 2)],
                vec![],
            ],
            true,
        )
    }

    #[test]
    fn test_two_opt_improves_toy_route() {
        let instance = build_two_opt_instance();
        // Starting travel 2+1+1+1 = 5; swapping to {0,2,1,3} gives 4.
        let mut route = vec![0, 1, 2, 3];
        assert_eq!(two_opt_route(&instance, &mut route), 1);
        assert_eq!(instance.route_travel_cost(&route), 4);
    }

    #[test]
    fn test_two_opt_keeps_solution_cost_in_sync() {
        let instance = build_two_opt_instance();
        let mut sol = Solution::new(&instance);
        sol.push_back_market(1);
        sol.push_back_market(2);
        sol.push_back_market(3);

        let cost_before = sol.cost;
        let improvement = two_opt(&instance, &mut sol);
        assert_eq!(improvement, 1);
        assert_eq!(sol.cost, cost_before - 1);
        assert_eq!(sol.travel_cost, instance.route_travel_cost(&sol.route));
    }

    #[test]
    fn test_two_opt_with_shuffle_never_worsens() {
        let instance = build_two_opt_instance();
        let mut rng = seeded_rng(3);
        let mut route = vec![0, 1, 2, 3];
        let start_cost = calc_solution_cost(&instance, &route);
        let improvement = two_opt_with_shuffle(&instance, &mut route, &mut rng, 8);
        assert!(improvement >= 0);
        assert_eq!(
            calc_solution_cost(&instance, &route),
            start_cost - improvement
        );
        assert_eq!(route[0], 0);
    }
}
