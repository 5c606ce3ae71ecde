//! Solution representation with incremental cost maintenance.
//!
//! A solution is a route starting at the depot plus, per product, the
//! sorted list of offers available along it. Travel cost, purchase costs
//! and remaining demand are kept consistent under single-market insertions
//! and removals, so the local-search operators can probe and apply moves
//! in constant or linear time instead of recomputing from scratch.

use crate::instance::{is_better_offer, Instance, Offer};

/// Outcome of probing a market insertion or removal.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketVerdict {
    /// Total solution cost change if the move is applied.
    pub cost_change: i32,
    /// Cheapest insertion index (insertions only).
    pub index: usize,
    /// True if every product demand is satisfied after the move.
    pub demand_satisfied: bool,
}

/// A TPP solution under incremental maintenance.
#[derive(Clone)]
pub struct Solution<'a> {
    pub instance: &'a Instance,
    /// Ordered market sequence; route[0] is always the depot.
    pub route: Vec<usize>,
    /// Cached total cost (travel + purchases).
    pub cost: i32,
    /// Cached cyclic travel cost of the route.
    pub travel_cost: i32,
    /// market_selected[m] = true if market m is part of the route.
    pub market_selected: Vec<bool>,
    /// product_offers[p] = offers for product p along the route, best first.
    pub product_offers: Vec<Vec<Offer>>,
    /// purchase_costs[p] = currently charged price for product p.
    pub purchase_costs: Vec<i32>,
    /// demand_remaining[p] = unsatisfied demand for product p.
    pub demand_remaining: Vec<i32>,
    /// Sorted ids of products whose demand is still unsatisfied.
    pub remaining_products: Vec<usize>,
    /// markets_per_product[p] = markets used to satisfy product p.
    pub markets_per_product: Vec<u32>,
    /// Markets not in the route, in insertion-candidate order.
    pub unselected_markets: Vec<usize>,
    /// Sum of all remaining demands.
    pub total_unsatisfied_demand: i32,
}

impl<'a> Solution<'a> {
    pub fn new(instance: &'a Instance) -> Self {
        assert!(
            !instance.is_capacitated,
            "Uncapacitated TPP instance required"
        );

        let mut remaining_products = Vec::with_capacity(instance.product_count);
        let mut total_unsatisfied_demand = 0;
        for (p, &demand) in instance.demands.iter().enumerate() {
            if demand > 0 {
                remaining_products.push(p);
            }
            total_unsatisfied_demand += demand;
        }

        let mut market_selected = vec![false; instance.dimension];
        market_selected[0] = true; // The depot.

        Solution {
            instance,
            route: vec![0],
            cost: 0,
            travel_cost: 0,
            market_selected,
            product_offers: vec![Vec::new(); instance.product_count],
            purchase_costs: vec![0; instance.product_count],
            demand_remaining: instance.demands.clone(),
            remaining_products,
            markets_per_product: vec![0; instance.product_count],
            unselected_markets: (1..instance.dimension).collect(),
            total_unsatisfied_demand,
        }
    }

    /// Appends a market at the end of the route.
    pub fn push_back_market(&mut self, market_id: usize) {
        self.insert_market_at_pos(market_id, self.route.len());
    }

    /// Inserts a market at the given route index, updating travel cost,
    /// per-product offers and purchase costs.
    pub fn insert_market_at_pos(&mut self, market_id: usize, index: usize) {
        assert!(
            !self.market_selected[market_id],
            "Multiple visits of market {} are not allowed",
            market_id
        );
        assert!(index > 0, "No insertion at pos 0 is allowed");
        assert!(index <= self.route.len(), "Insertion index out of range");

        let prev = self.route[index - 1];
        let next = self.route[index % self.route.len()];

        self.route.insert(index, market_id);
        self.market_selected[market_id] = true;

        let instance = self.instance;
        let travel_cost_change = instance.travel_cost(prev, market_id)
            + instance.travel_cost(market_id, next)
            - instance.travel_cost(prev, next);
        self.travel_cost += travel_cost_change;
        self.cost += travel_cost_change;

        for &offer in &instance.market_offers[market_id] {
            self.cost += self.add_product_offer(offer);
        }

        let pos = self
            .unselected_markets
            .iter()
            .position(|&m| m == market_id);
        match pos {
            Some(pos) => {
                self.unselected_markets.remove(pos);
            }
            None => unreachable!("market {} missing from unselected list", market_id),
        }
    }

    /// Removes the market at the given route position; the mirror of
    /// `insert_market_at_pos`.
    pub fn remove_market_at_pos(&mut self, pos: usize) {
        assert!(pos < self.route.len(), "Invalid position in market removal");
        assert!(pos > 0, "Cannot remove depot");

        let prev = self.route[pos - 1];
        let removed = self.route[pos];
        let next = self.route[(pos + 1) % self.route.len()];

        self.route.remove(pos);
        self.market_selected[removed] = false;

        let instance = self.instance;
        let travel_cost_change = instance.travel_cost(prev, next)
            - instance.travel_cost(prev, removed)
            - instance.travel_cost(removed, next);
        self.travel_cost += travel_cost_change;
        self.cost += travel_cost_change;

        for &offer in &instance.market_offers[removed] {
            self.cost += self.remove_product_offer(&offer);
        }
        self.unselected_markets.push(removed);
    }

    /// Calculates how the purchase part of the cost changes if an offer is
    /// added. Returns the cost change and the product's remaining demand
    /// before the addition.
    pub fn calc_product_offer_add_cost(&self, new_offer: &Offer) -> (i32, i32) {
        let product_id = new_offer.product_id;
        let offers = &self.product_offers[product_id];
        let prev_cost = self.purchase_costs[product_id];
        let demand_covered = self.demand_remaining[product_id];

        let cost = if offers.is_empty() || offers[0].price > new_offer.price {
            new_offer.price // Accept the cheaper offer.
        } else {
            prev_cost
        };
        (cost - prev_cost, demand_covered)
    }

    /// Adds a product offer, keeping the per-product list sorted best offer
    /// first. Returns the purchase-cost change.
    pub fn add_product_offer(&mut self, new_offer: Offer) -> i32 {
        let product_id = new_offer.product_id;
        let offers = &mut self.product_offers[product_id];

        let pos = offers.partition_point(|existing| !is_better_offer(&new_offer, existing));
        offers.insert(pos, new_offer);

        let prev_cost = self.purchase_costs[product_id];
        let demand_before = self.demand_remaining[product_id];
        let demand_satisfied_before = demand_before == 0;

        // Only the cheapest offer is charged.
        self.purchase_costs[product_id] = offers[0].price;
        self.demand_remaining[product_id] = 0;
        self.markets_per_product[product_id] = 1;

        self.total_unsatisfied_demand -= demand_before;
        debug_assert!(self.total_unsatisfied_demand >= 0);

        if !demand_satisfied_before {
            if let Ok(idx) = self.remaining_products.binary_search(&product_id) {
                self.remaining_products.remove(idx);
            }
        }
        self.purchase_costs[product_id] - prev_cost
    }

    /// Removes a specific product offer. Returns the purchase-cost change.
    pub fn remove_product_offer(&mut self, offer: &Offer) -> i32 {
        let product_id = offer.product_id;
        let offers = &mut self.product_offers[product_id];

        let start = offers.partition_point(|existing| is_better_offer(existing, offer));
        let idx = offers[start..]
            .iter()
            .position(|existing| existing.same_listing(offer))
            .map(|i| start + i);
        match idx {
            Some(idx) => {
                offers.remove(idx);
            }
            None => unreachable!("offer should exist in the solution"),
        }

        let prev_cost = self.purchase_costs[product_id];
        let demand = self.instance.demands[product_id];

        if let Some(cheapest) = offers.first() {
            // Switch to the next cheapest market.
            self.purchase_costs[product_id] = cheapest.price;
            self.demand_remaining[product_id] = 0;
            self.markets_per_product[product_id] = 1;
        } else {
            self.purchase_costs[product_id] = 0;
            self.demand_remaining[product_id] = demand;
            self.markets_per_product[product_id] = 0;
            self.total_unsatisfied_demand += demand;

            if demand > 0 {
                if let Err(idx) = self.remaining_products.binary_search(&product_id) {
                    self.remaining_products.insert(idx, product_id);
                }
            }
        }
        self.purchase_costs[product_id] - prev_cost
    }

    /// Calculates the purchase-cost change of removing an offer, and
    /// whether the product demand stays satisfied afterwards.
    pub fn calc_product_offer_removal_cost(&self, rem_offer: &Offer) -> (i32, bool) {
        let offers = &self.product_offers[rem_offer.product_id];
        let (cost, demand_satisfied) = if offers.len() >= 2 {
            // The next cheapest offer takes over.
            (offers[1].price, true)
        } else {
            (0, false)
        };
        let prev_cost = self.purchase_costs[rem_offer.product_id];
        (cost - prev_cost, demand_satisfied)
    }

    /// Probes the removal of a market: total cost change and whether the
    /// solution stays feasible. With `validity_required` the probe
    /// short-circuits as soon as one removed offer would leave a product
    /// uncovered.
    pub fn calc_market_removal_cost(
        &self,
        market_id: usize,
        validity_required: bool,
    ) -> MarketVerdict {
        let index = self.market_pos_in_route(market_id);
        assert!(index < self.route.len(), "Market should be in the solution");
        assert!(index > 0, "Cannot remove depot");

        let mut all_demands_satisfied = self.total_unsatisfied_demand == 0;
        let mut cost = 0;
        for offer in &self.instance.market_offers[market_id] {
            let (offer_cost, demand_satisfied) = self.calc_product_offer_removal_cost(offer);
            if validity_required && !demand_satisfied {
                return MarketVerdict {
                    cost_change: 0,
                    index: 0,
                    demand_satisfied: false,
                };
            }
            cost += offer_cost;
            all_demands_satisfied &= demand_satisfied;
        }

        let prev = self.route[index - 1];
        let next = self.route[(index + 1) % self.route.len()];
        let dist_decrease = self.instance.travel_cost(prev, market_id)
            + self.instance.travel_cost(market_id, next)
            - self.instance.travel_cost(prev, next);

        MarketVerdict {
            cost_change: cost - dist_decrease,
            index: 0,
            demand_satisfied: all_demands_satisfied,
        }
    }

    /// Probes the insertion of a market: total cost change, the cheapest
    /// insertion index, and whether all demands are satisfied afterwards.
    pub fn calc_market_add_cost(&self, market_id: usize) -> MarketVerdict {
        assert!(
            !self.is_market_used(market_id),
            "Market should not be in the solution"
        );

        let mut unsatisfied_count = self.total_unsatisfied_demand;
        let mut cost = 0;
        for offer in &self.instance.market_offers[market_id] {
            let (offer_cost, demand_covered) = self.calc_product_offer_add_cost(offer);
            cost += offer_cost;
            unsatisfied_count -= demand_covered;
        }
        let all_demands_satisfied = unsatisfied_count == 0;

        // Cheapest place to insert the new market.
        let len = self.route.len();
        let mut min_dist_increase = i32::MAX;
        let mut min_dist_index = len + 1;
        for i in 0..len {
            let curr = self.route[i];
            let next = self.route[(i + 1) % len];
            let dist_increase = self.instance.travel_cost(curr, market_id)
                + self.instance.travel_cost(market_id, next)
                - self.instance.travel_cost(curr, next);
            if dist_increase < min_dist_increase {
                min_dist_increase = dist_increase;
                min_dist_index = i + 1;
            }
        }

        MarketVerdict {
            cost_change: cost + min_dist_increase,
            index: min_dist_index,
            demand_satisfied: all_demands_satisfied,
        }
    }

    /// True if inserting the market alone would cover every still-needed
    /// product.
    pub fn check_market_satisfies_demand(&self, market_id: usize) -> bool {
        if self.is_market_used(market_id) {
            return false;
        }
        let offers = &self.instance.market_product_offers[market_id];
        self.remaining_products
            .iter()
            .all(|&p| offers[p].quantity >= self.demand_remaining[p])
    }

    /// True if the market is part of the route.
    #[inline]
    pub fn is_market_used(&self, market_id: usize) -> bool {
        self.market_selected[market_id]
    }

    /// True when every product demand is satisfied.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.remaining_products.is_empty()
    }

    /// Index of a market in the route, or `route.len()` if absent.
    pub fn market_pos_in_route(&self, market_id: usize) -> usize {
        self.route
            .iter()
            .position(|&m| m == market_id)
            .unwrap_or(self.route.len())
    }

    /// Error relative to the best known cost, or +∞ when no best known
    /// cost is available.
    pub fn relative_error(&self) -> f64 {
        if self.instance.best_known_cost > 0 {
            (self.cost - self.instance.best_known_cost) as f64
                / self.instance.best_known_cost as f64
        } else {
            f64::INFINITY
        }
    }
}

impl std::fmt::Display for Solution<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Solution")?;
        writeln!(f, "  Cost: {}", self.cost)?;
        writeln!(f, "  Travel cost: {}", self.travel_cost)?;
        writeln!(f, "  Valid: {}", self.is_valid())?;
        writeln!(f, "  Route: {:?}", self.route)
    }
}
