//! Construction heuristics: commodity adding and random feasible routes.

use crate::instance::{is_solution_valid, Instance};
use crate::rng::SearchRng;
use crate::solution::Solution;
use ordered_float::OrderedFloat;
use rand::seq::SliceRandom;

use super::local_search::{drop_heuristic, exchange_heuristic, insertion_heuristic};
use super::three_opt::three_opt_nn;

/// Commodity-adding heuristic: products are handled in random order; for
/// the first one the market with the cheapest unit purchase (travel
/// round-trip spread over the quantity, plus price) starts the route, then
/// every remaining product is covered by the cheapest market insertion.
/// A local-search loop polishes the result.
pub fn commodity_adding_heuristic<'a>(
    instance: &'a Instance,
    rng: &mut SearchRng,
) -> Solution<'a> {
    let mut sol = Solution::new(instance);

    let mut products: Vec<usize> = (0..instance.product_count).collect();
    products.shuffle(rng);

    let h0 = products[0];

    // The market with the cheapest unit purchase of the first product.
    let best_market = instance
        .market_product_offers
        .iter()
        .filter_map(|market_offers| {
            let offer = &market_offers[h0];
            if offer.quantity == 0 {
                return None;
            }
            let value = 2.0 * instance.travel_cost(0, offer.market_id) as f64
                / offer.quantity as f64
                + offer.price as f64;
            Some((offer.market_id, OrderedFloat(value)))
        })
        .min_by_key(|&(_, value)| value)
        .map(|(market_id, _)| market_id);

    let best_market = match best_market {
        Some(market_id) if market_id != 0 => market_id,
        _ => unreachable!("first product must be sold by a non-depot market"),
    };
    sol.push_back_market(best_market);

    for &h in &products {
        while sol.demand_remaining[h] > 0 {
            let best = (1..instance.dimension)
                .filter(|&m| {
                    !sol.market_selected[m] && instance.market_product_offers[m][h].quantity > 0
                })
                .map(|m| (m, sol.calc_market_add_cost(m)))
                .min_by_key(|(_, verdict)| verdict.cost_change);
            match best {
                Some((market_id, verdict)) => sol.insert_market_at_pos(market_id, verdict.index),
                None => unreachable!("every demanded product must be sold somewhere"),
            }
        }
    }
    debug_assert!(is_solution_valid(instance, &sol.route));
    log::info!("Construction cost before local search: {}", sol.cost);

    loop {
        let start_cost = sol.cost;

        drop_heuristic(instance, &mut sol);
        insertion_heuristic(instance, &mut sol);
        exchange_heuristic(instance, &mut sol);
        three_opt_nn(instance, &mut sol, true, 25);

        if sol.cost >= start_cost {
            break;
        }
    }

    debug_assert!(is_solution_valid(instance, &sol.route));
    log::info!("Construction final cost: {}", sol.cost);
    sol
}

/// Builds a random feasible solution: markets are appended in random order
/// until every demand is covered, then the wasteful ones are dropped.
pub fn create_random_solution<'a>(instance: &'a Instance, rng: &mut SearchRng) -> Solution<'a> {
    let mut sol = Solution::new(instance);
    let mut unselected = sol.unselected_markets.clone();
    unselected.shuffle(rng);

    for market in unselected {
        sol.push_back_market(market);
        if sol.is_valid() {
            break;
        }
    }
    drop_heuristic(instance, &mut sol);
    sol
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::build_unit_demand_instance;
    use crate::instance::{calc_solution_cost, Instance, Offer};
    use crate::rng::seeded_rng;
    use rand::Rng;

    fn build_random_instance(dimension: usize, product_count: usize, seed: u64) -> Instance {
        let mut rng = seeded_rng(seed);
        let mut weights = vec![0i32; dimension * dimension];
        for i in 0..dimension {
            for j in 0..i {
                let w = rng.gen_range(1..30);
                weights[i * dimension + j] = w;
                weights[j * dimension + i] = w;
            }
        }
        let mut offers: Vec<Vec<Offer>> = vec![Vec::new(); dimension];
        for p in 0..product_count {
            let seller = rng.gen_range(1..dimension);
            offers[seller].push(Offer::new(rng.gen_range(1..10), 1, p, seller));
            for (m, market_offers) in offers.iter_mut().enumerate().skip(1) {
                if m != seller && rng.gen_bool(0.5) {
                    market_offers.push(Offer::new(rng.gen_range(1..10), 1, p, m));
                }
            }
        }
        Instance::from_parts(
            "random".to_string(),
            dimension,
            weights,
            vec![1; product_count],
            offers,
            true,
        )
    }

    #[test]
    fn test_cah_produces_valid_solution() {
        let instance = build_unit_demand_instance();
        let mut rng = seeded_rng(21);
        let sol = commodity_adding_heuristic(&instance, &mut rng);
        assert!(sol.is_valid());
        assert_eq!(sol.route[0], 0);
        assert_eq!(sol.cost, calc_solution_cost(&instance, &sol.route));
    }

    #[test]
    fn test_cah_on_random_instances() {
        let mut rng = seeded_rng(31);
        for seed in 0..5 {
            let instance = build_random_instance(12, 6, seed);
            let sol = commodity_adding_heuristic(&instance, &mut rng);
            assert!(sol.is_valid());
            assert!(is_solution_valid(&instance, &sol.route));
            assert_eq!(sol.cost, calc_solution_cost(&instance, &sol.route));
            assert_eq!(sol.travel_cost, instance.route_travel_cost(&sol.route));
        }
    }

    #[test]
    fn test_random_solution_is_valid_and_dropped() {
        let instance = build_random_instance(10, 5, 77);
        let mut rng = seeded_rng(5);
        for _ in 0..20 {
            let sol = create_random_solution(&instance, &mut rng);
            assert!(sol.is_valid());
            assert_eq!(sol.route[0], 0);
            assert_eq!(sol.cost, calc_solution_cost(&instance, &sol.route));
        }
    }

    #[test]
    fn test_random_solutions_vary_with_rng_stream() {
        let instance = build_random_instance(10, 5, 77);
        let mut rng = seeded_rng(5);
        let routes: Vec<Vec<usize>> = (0..10)
            .map(|_| create_random_solution(&instance, &mut rng).route)
            .collect();
        assert!(routes.windows(2).any(|pair| pair[0] != pair[1]));
    }
}
