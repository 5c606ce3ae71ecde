//! Module for parsing and representing TPP instances.
//!
//! This module handles the TPPLIB format files used for the Traveling
//! Purchaser Problem. It supports Euclidean 2D distances and explicit
//! upper-row weight matrices, and precomputes the offer tables and
//! nearest-neighbor lists used by the search.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A single product offer at a market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// Unit price, non-negative.
    pub price: i32,
    /// Available quantity; 0 marks "not offered" in the per-product table.
    pub quantity: i32,
    /// Product identifier (0-indexed internally).
    pub product_id: usize,
    /// Market identifier (0-indexed; 0 is the depot).
    pub market_id: usize,
}

impl Offer {
    pub fn new(price: i32, quantity: i32, product_id: usize, market_id: usize) -> Self {
        Offer {
            price,
            quantity,
            product_id,
            market_id,
        }
    }

    /// True if both refer to the same (market, product) listing.
    pub fn same_listing(&self, other: &Offer) -> bool {
        self.market_id == other.market_id && self.product_id == other.product_id
    }
}

/// Offer ordering used by the solution state: lower price first, higher
/// quantity on ties.
pub fn is_better_offer(a: &Offer, b: &Offer) -> bool {
    a.price < b.price || (a.price == b.price && a.quantity > b.quantity)
}

/// Represents a complete TPP instance, immutable after loading.
#[derive(Debug, Clone)]
pub struct Instance {
    /// Name of the instance.
    pub name: String,
    /// Number of nodes including the depot (node 0).
    pub dimension: usize,
    /// Row-major travel cost matrix (dimension × dimension).
    edge_weights: Vec<i32>,
    /// nn_lists[i] = all other markets sorted by travel cost from i.
    pub nn_lists: Vec<Vec<usize>>,
    /// True for symmetric travel costs.
    pub is_symmetric: bool,
    /// Number of products.
    pub product_count: usize,
    /// demands[p] = demand for product p.
    pub demands: Vec<i32>,
    /// Ids of products with demand > 0.
    pub needed_products: Vec<usize>,
    /// market_offers[m] = offers at market m, sorted by ascending price.
    pub market_offers: Vec<Vec<Offer>>,
    /// market_product_offers[m][p] = offer for product p at market m
    /// (quantity 0 when the market does not sell p).
    pub market_product_offers: Vec<Vec<Offer>>,
    /// True when any product demand exceeds 1.
    pub is_capacitated: bool,
    /// Best known solution cost from an external source; 0 when unknown.
    pub best_known_cost: i32,
}

impl Instance {
    /// Assembles an instance from raw parts: sorts the offer lists, builds
    /// the per-product lookup, the needed-product list and the
    /// nearest-neighbor lists.
    pub fn from_parts(
        name: String,
        dimension: usize,
        edge_weights: Vec<i32>,
        demands: Vec<i32>,
        mut market_offers: Vec<Vec<Offer>>,
        is_symmetric: bool,
    ) -> Self {
        assert_eq!(edge_weights.len(), dimension * dimension);
        assert_eq!(market_offers.len(), dimension);

        let product_count = demands.len();
        let mut needed_products = Vec::new();
        let mut is_capacitated = false;
        for (p, &demand) in demands.iter().enumerate() {
            if demand > 0 {
                needed_products.push(p);
            }
            if demand > 1 {
                is_capacitated = true;
            }
        }

        for offers in &mut market_offers {
            offers.sort_by(|a, b| a.price.cmp(&b.price));
        }

        let mut market_product_offers = vec![vec![Offer::default(); product_count]; dimension];
        for (m, offers) in market_offers.iter().enumerate() {
            for offer in offers {
                market_product_offers[m][offer.product_id] = *offer;
            }
        }

        let mut instance = Instance {
            name,
            dimension,
            edge_weights,
            nn_lists: Vec::new(),
            is_symmetric,
            product_count,
            demands,
            needed_products,
            market_offers,
            market_product_offers,
            is_capacitated,
            best_known_cost: 0,
        };
        instance.nn_lists = instance.calc_nearest_neighbors();
        instance
    }

    /// Travel cost between two markets.
    #[inline]
    pub fn travel_cost(&self, market_a: usize, market_b: usize) -> i32 {
        self.edge_weights[market_a * self.dimension + market_b]
    }

    /// Cyclic travel cost of a route closed back to its first node.
    pub fn route_travel_cost(&self, route: &[usize]) -> i32 {
        if route.is_empty() {
            return 0;
        }
        let mut cost = 0;
        let mut prev = route[route.len() - 1];
        for &node in route {
            cost += self.travel_cost(prev, node);
            prev = node;
        }
        cost
    }

    /// Builds, for each market, a list of all other markets sorted by
    /// ascending travel cost.
    fn calc_nearest_neighbors(&self) -> Vec<Vec<usize>> {
        let mut nn_lists = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            let mut neighbors: Vec<usize> = (0..self.dimension).filter(|&j| j != i).collect();
            neighbors.sort_by_key(|&j| self.travel_cost(i, j));
            nn_lists.push(neighbors);
        }
        nn_lists
    }

    /// Parses a TPP instance from a TPPLIB format file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let file = File::open(&path).map_err(|e| format!("Cannot open file: {}", e))?;
        let reader = BufReader::new(file);
        let lines: Vec<String> = reader
            .lines()
            .collect::<Result<_, _>>()
            .map_err(|e| format!("Read error: {}", e))?;

        let mut name = String::new();
        let mut dimension = 0usize;
        let mut edge_weight_type = EdgeWeightType::Euc2d;
        // UPPER_ROW is the only supported explicit layout; files that skip
        // the EDGE_WEIGHT_FORMAT key get it by default.
        let mut is_symmetric = true;
        let mut demands: Vec<i32> = Vec::new();
        let mut market_offers: Vec<Vec<Offer>> = Vec::new();
        let mut edge_weights: Vec<i32> = Vec::new();

        let mut cursor = 0usize;
        while cursor < lines.len() {
            let line = lines[cursor].trim();
            cursor += 1;
            if line.is_empty() {
                continue;
            }

            let (key, value) = match line.find(':') {
                Some(pos) => (line[..pos].trim(), line[pos + 1..].trim()),
                None => (line, ""),
            };

            if key.starts_with("NAME") {
                name = value.to_string();
            } else if key.starts_with("TYPE") {
                if value != "TPP" {
                    return Err(format!("Unsupported instance type: {}", value));
                }
            } else if key.starts_with("COMMENT") || key.starts_with("DISPLAY_DATA_TYPE") {
                // ignored
            } else if key.starts_with("DIMENSION") {
                dimension = value
                    .parse()
                    .map_err(|_| format!("Invalid dimension: {}", value))?;
                if dimension < 2 {
                    return Err("Dimension must be at least 2".to_string());
                }
            } else if key.starts_with("EDGE_WEIGHT_TYPE") {
                edge_weight_type = match value {
                    "EUC_2D" => EdgeWeightType::Euc2d,
                    "EXPLICIT" => EdgeWeightType::Explicit,
                    other => return Err(format!("Unknown edge weight type: {}", other)),
                };
            } else if key.starts_with("EDGE_WEIGHT_FORMAT") {
                if value != "UPPER_ROW" {
                    return Err(format!("Unsupported edge weight format: {}", value));
                }
                is_symmetric = true;
            } else if key.starts_with("EDGE_DATA_FORMAT") {
                log::info!("Ignoring EDGE_DATA_FORMAT: {}", value);
            } else if key.starts_with("NODE_COORD_TYPE") {
                if value != "TWOD_COORDS" {
                    return Err(format!("Unsupported node coord type: {}", value));
                }
            } else if key.starts_with("NODE_COORD_SECTION") {
                let coords = read_node_coords(&lines, &mut cursor, dimension)?;
                edge_weights = euclidean_edge_weights(&coords);
            } else if key.starts_with("EDGE_WEIGHT_SECTION") {
                if edge_weight_type != EdgeWeightType::Explicit {
                    return Err("EDGE_WEIGHT_SECTION requires EXPLICIT weights".to_string());
                }
                edge_weights = read_upper_row_weights(&lines, &mut cursor, dimension)?;
            } else if key.starts_with("DEMAND_SECTION") {
                demands = read_demand_section(&lines, &mut cursor)?;
            } else if key.starts_with("OFFER_SECTION") {
                market_offers = read_offer_section(&lines, &mut cursor, dimension)?;
            } else if key.starts_with("EOF") {
                break;
            } else {
                return Err(format!("Unknown section: {}", key));
            }
        }

        if edge_weights.len() != dimension * dimension {
            return Err("Missing or incomplete edge weight data".to_string());
        }
        if market_offers.len() != dimension {
            return Err("Missing OFFER_SECTION".to_string());
        }
        if demands.is_empty() {
            return Err("Missing DEMAND_SECTION".to_string());
        }

        if name.is_empty() {
            name = instance_name_from_path(path.as_ref());
        }

        Ok(Instance::from_parts(
            name,
            dimension,
            edge_weights,
            demands,
            market_offers,
            is_symmetric,
        ))
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum EdgeWeightType {
    Euc2d,
    Explicit,
}

fn next_line<'a>(lines: &'a [String], cursor: &mut usize, what: &str) -> Result<&'a str, String> {
    if *cursor >= lines.len() {
        return Err(format!("Lines missing in {}", what));
    }
    let line = lines[*cursor].trim();
    *cursor += 1;
    Ok(line)
}

/// Reads the demand section: a product count line followed by one
/// `product_id demand` line per product (ids are 1-based in the file).
fn read_demand_section(lines: &[String], cursor: &mut usize) -> Result<Vec<i32>, String> {
    let count_line = next_line(lines, cursor, "DEMAND_SECTION")?;
    let product_count: usize = count_line
        .parse()
        .map_err(|_| format!("Invalid product count: {}", count_line))?;

    let mut demands = Vec::with_capacity(product_count);
    for i in 0..product_count {
        let line = next_line(lines, cursor, "DEMAND_SECTION")?;
        let mut parts = line.split_whitespace();
        let id: usize = parts
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| format!("Invalid demand line: {}", line))?;
        let demand: i32 = parts
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| format!("Invalid demand line: {}", line))?;
        if id != i + 1 {
            return Err(format!("Out-of-order product id in DEMAND_SECTION: {}", id));
        }
        demands.push(demand);
    }
    Ok(demands)
}

/// Reads one offer line per market: `market_id offer_count (product price
/// quantity)*`; product ids are stored 0-based.
fn read_offer_section(
    lines: &[String],
    cursor: &mut usize,
    market_count: usize,
) -> Result<Vec<Vec<Offer>>, String> {
    let mut market_offers = Vec::with_capacity(market_count);
    for i in 0..market_count {
        let line = next_line(lines, cursor, "OFFER_SECTION")?;
        let mut tokens = line.split_whitespace().map(|t| t.parse::<i64>());

        let mut next_num = |what: &str| -> Result<i64, String> {
            tokens
                .next()
                .and_then(|r| r.ok())
                .ok_or_else(|| format!("Invalid {} in OFFER_SECTION line: {}", what, line))
        };

        let market_id = next_num("market id")?;
        if market_id != (i + 1) as i64 {
            return Err(format!(
                "Out-of-order market id in OFFER_SECTION: {}",
                market_id
            ));
        }
        let offer_count = next_num("offer count")?;

        let mut offers = Vec::with_capacity(offer_count as usize);
        for _ in 0..offer_count {
            let product_id = next_num("product id")?;
            let price = next_num("price")?;
            let quantity = next_num("quantity")?;
            if product_id < 1 {
                return Err(format!("Product id out of range: {}", product_id));
            }
            if price < 0 {
                return Err(format!("Offer price must be >= 0, got {}", price));
            }
            if quantity <= 0 {
                return Err(format!("Offer quantity must be > 0, got {}", quantity));
            }
            offers.push(Offer::new(
                price as i32,
                quantity as i32,
                (product_id - 1) as usize,
                i,
            ));
        }
        market_offers.push(offers);
    }
    Ok(market_offers)
}

/// Reads the upper triangle of an explicit weight matrix, row by row, and
/// mirrors it into a full row-major matrix.
fn read_upper_row_weights(
    lines: &[String],
    cursor: &mut usize,
    dimension: usize,
) -> Result<Vec<i32>, String> {
    if dimension < 2 {
        return Err("EDGE_WEIGHT_SECTION before a valid DIMENSION".to_string());
    }
    let mut weights = vec![0i32; dimension * dimension];
    for i in 0..dimension - 1 {
        let line = next_line(lines, cursor, "EDGE_WEIGHT_SECTION")?;
        let mut tokens = line.split_whitespace();
        for j in i + 1..dimension {
            let w: i32 = tokens
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| format!("Missing weight at row {} col {}", i + 1, j + 1))?;
            weights[i * dimension + j] = w;
            weights[j * dimension + i] = w;
        }
    }
    Ok(weights)
}

/// Reads `id x y` coordinate lines (1-based ids).
fn read_node_coords(
    lines: &[String],
    cursor: &mut usize,
    dimension: usize,
) -> Result<Vec<(i32, i32)>, String> {
    let mut coords = Vec::with_capacity(dimension);
    for i in 0..dimension {
        let line = next_line(lines, cursor, "NODE_COORD_SECTION")?;
        let mut parts = line.split_whitespace();
        let id: usize = parts
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| format!("Invalid coord line: {}", line))?;
        let x: i32 = parts
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| format!("Invalid coord line: {}", line))?;
        let y: i32 = parts
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| format!("Invalid coord line: {}", line))?;
        if id != i + 1 {
            return Err(format!(
                "Out-of-order node id in NODE_COORD_SECTION: {}",
                id
            ));
        }
        coords.push((x, y));
    }
    Ok(coords)
}

/// Euclidean distances truncated to integers, per the TPPLIB description.
fn euclidean_edge_weights(coords: &[(i32, i32)]) -> Vec<i32> {
    let n = coords.len();
    let mut weights = vec![0i32; n * n];
    for i in 0..n {
        for j in 0..i {
            let xd = (coords[i].0 - coords[j].0) as f64;
            let yd = (coords[i].1 - coords[j].1) as f64;
            let w = (xd * xd + yd * yd).sqrt() as i32;
            weights[i * n + j] = w;
            weights[j * n + i] = w;
        }
    }
    weights
}

/// Trailing path component with a `.tpp` suffix stripped.
fn instance_name_from_path(path: &Path) -> String {
    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    filename
        .strip_suffix(".tpp")
        .map(|s| s.to_string())
        .unwrap_or(filename)
}

/// Returns true if the route represents a valid TPP solution: it starts at
/// the depot and the visited markets jointly cover every product demand.
pub fn is_solution_valid(instance: &Instance, route: &[usize]) -> bool {
    if route.len() > instance.dimension {
        return false;
    }
    if route.first() != Some(&0) {
        return false;
    }

    let mut product_quantities = vec![0i32; instance.product_count];
    for &node in route {
        for offer in &instance.market_offers[node] {
            product_quantities[offer.product_id] += offer.quantity;
        }
    }
    instance
        .demands
        .iter()
        .zip(product_quantities.iter())
        .all(|(&demand, &quantity)| quantity >= demand)
}

/// Recomputes the cost of a route from scratch: cyclic travel cost plus,
/// for each demanded product, the cheapest price offered at a visited
/// market. Products without any offer in the route contribute nothing (the
/// route is then invalid and the value is diagnostic only).
pub fn calc_solution_cost(instance: &Instance, route: &[usize]) -> i32 {
    debug_assert!(!instance.is_capacitated, "uncapacitated instance required");

    let mut cheapest: Vec<Option<i32>> = vec![None; instance.product_count];
    let mut total_distance = 0;

    let mut prev = route[route.len() - 1];
    for &node in route {
        total_distance += instance.travel_cost(prev, node);
        for offer in &instance.market_offers[node] {
            if instance.demands[offer.product_id] > 0 {
                let entry = &mut cheapest[offer.product_id];
                *entry = Some(entry.map_or(offer.price, |p: i32| p.min(offer.price)));
            }
        }
        prev = node;
    }
    let purchase_cost: i32 = cheapest.iter().flatten().sum();
    total_distance + purchase_cost
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 4 markets, 3 products, all edges 1; market 0 (depot) sells nothing.
    pub(crate) fn build_coverage_instance() -> Instance {
        let weights = vec![0, 1, 1, 1, 1, 0, 1, 1, 1, 1, 0, 1, 1, 1, 1, 0];
        let offers = vec![
            vec![],
            vec![Offer::new(1, 1, 0, 1), Offer::new(1, 1, 1, 1)],
            vec![Offer::new(2, 1, 1, 2), Offer::new(1, 1, 2, 2)],
            vec![Offer::new(2, 1, 0, 3), Offer::new(2, 1, 1, 3)],
        ];
        Instance::from_parts(
            "coverage".to_string(),
            4,
            weights,
            vec![2, 1, 1],
            offers,
            true,
        )
    }

    /// Same layout, unit demands, quantity 2 everywhere.
    pub(crate) fn build_unit_demand_instance() -> Instance {
        let weights = vec![0, 1, 1, 1, 1, 0, 1, 1, 1, 1, 0, 1, 1, 1, 1, 0];
        let offers = vec![
            vec![],
            vec![Offer::new(1, 2, 0, 1), Offer::new(2, 2, 1, 1)],
            vec![Offer::new(2, 2, 1, 2), Offer::new(1, 2, 2, 2)],
            vec![Offer::new(2, 2, 0, 3), Offer::new(1, 2, 1, 3)],
        ];
        Instance::from_parts(
            "unit-demand".to_string(),
            4,
            weights,
            vec![1, 1, 1],
            offers,
            true,
        )
    }

    #[test]
    fn test_offer_tables() {
        let instance = build_unit_demand_instance();
        assert_eq!(instance.product_count, 3);
        assert_eq!(instance.needed_products, vec![0, 1, 2]);
        assert!(!instance.is_capacitated);
        // Offers at each market are sorted by ascending price.
        for offers in &instance.market_offers {
            for pair in offers.windows(2) {
                assert!(pair[0].price <= pair[1].price);
            }
        }
        // Missing products have quantity 0 in the lookup table.
        assert_eq!(instance.market_product_offers[1][2].quantity, 0);
        assert_eq!(instance.market_product_offers[2][1].price, 2);
    }

    #[test]
    fn test_capacitated_flag() {
        let instance = build_coverage_instance();
        assert!(instance.is_capacitated);
    }

    #[test]
    fn test_nearest_neighbor_lists() {
        let weights = vec![0, 3, 1, 2, 3, 0, 2, 1, 1, 2, 0, 3, 2, 1, 3, 0];
        let instance = Instance::from_parts(
            "nn".to_string(),
            4,
            weights,
            vec![1],
            vec![vec![], vec![Offer::new(1, 1, 0, 1)], vec![], vec![]],
            true,
        );
        assert_eq!(instance.nn_lists[0], vec![2, 3, 1]);
        assert_eq!(instance.nn_lists[1], vec![3, 2, 0]);
        assert_eq!(instance.nn_lists.len(), 4);
        for (i, nn) in instance.nn_lists.iter().enumerate() {
            assert_eq!(nn.len(), 3);
            assert!(!nn.contains(&i));
        }
    }

    #[test]
    fn test_is_solution_valid() {
        let instance = build_coverage_instance();
        assert!(is_solution_valid(&instance, &[0, 1, 2, 3]));
        assert!(!is_solution_valid(&instance, &[1, 2, 3]));
        assert!(!is_solution_valid(&instance, &[0, 1, 3]));
        assert!(!is_solution_valid(&instance, &[0, 1, 2]));
    }

    #[test]
    fn test_calc_solution_cost() {
        let instance = build_unit_demand_instance();
        // Travel 4, product 0 at market 1, product 1 at market 3, product 2
        // at market 2, each for 1.
        assert_eq!(calc_solution_cost(&instance, &[0, 1, 2, 3]), 7);
    }

    #[test]
    fn test_route_travel_cost_is_cyclic() {
        let instance = build_unit_demand_instance();
        assert_eq!(instance.route_travel_cost(&[0, 1, 2, 3]), 4);
        assert_eq!(instance.route_travel_cost(&[0, 2]), 2);
        assert_eq!(instance.route_travel_cost(&[0]), 0);
    }

    #[test]
    fn test_parse_tpplib_file() {
        use std::io::Write;

        let text = "NAME: toy\nTYPE: TPP\nCOMMENT: four markets\nDIMENSION: 4\n\
                    EDGE_WEIGHT_TYPE: EXPLICIT\nEDGE_WEIGHT_FORMAT: UPPER_ROW\n\
                    EDGE_WEIGHT_SECTION\n1 1 1\n1 1\n1\n\
                    DEMAND_SECTION\n3\n1 1\n2 1\n3 1\n\
                    OFFER_SECTION\n1 0\n2 2 1 1 2 2 2 2\n3 2 2 2 2 3 1 2\n4 2 1 2 2 2 1 2\n\
                    EOF\n";
        let path = std::env::temp_dir().join("ants_tpp_parse_test.tpp");
        let mut file = File::create(&path).expect("temp file");
        file.write_all(text.as_bytes()).expect("write");

        let instance = Instance::from_file(&path).expect("parse");
        std::fs::remove_file(&path).ok();

        assert_eq!(instance.name, "toy");
        assert_eq!(instance.dimension, 4);
        assert_eq!(instance.product_count, 3);
        assert_eq!(instance.travel_cost(0, 3), 1);
        assert_eq!(instance.travel_cost(3, 0), 1);
        assert!(!instance.is_capacitated);
        // Offer for product 1 (file id 2) at market 1 (file id 2).
        assert_eq!(instance.market_product_offers[1][1].price, 2);
        assert_eq!(calc_solution_cost(&instance, &[0, 1, 2, 3]), 7);
    }

    #[test]
    fn test_parse_euc_2d() {
        use std::io::Write;

        let text = "NAME: euc\nTYPE: TPP\nDIMENSION: 3\nEDGE_WEIGHT_TYPE: EUC_2D\n\
                    NODE_COORD_TYPE: TWOD_COORDS\nNODE_COORD_SECTION\n1 0 0\n2 3 4\n3 0 1\n\
                    DEMAND_SECTION\n1\n1 1\n\
                    OFFER_SECTION\n1 0\n2 1 1 5 1\n3 1 1 7 1\nEOF\n";
        let path = std::env::temp_dir().join("ants_tpp_euc_test.tpp");
        let mut file = File::create(&path).expect("temp file");
        file.write_all(text.as_bytes()).expect("write");

        let instance = Instance::from_file(&path).expect("parse");
        std::fs::remove_file(&path).ok();

        assert_eq!(instance.travel_cost(0, 1), 5);
        // sqrt(9 + 9) = 4.24.. truncates to 4
        assert_eq!(instance.travel_cost(1, 2), 4);
        assert_eq!(instance.travel_cost(0, 2), 1);
    }

    #[test]
    fn test_unknown_section_is_fatal() {
        use std::io::Write;

        let text = "NAME: bad\nTYPE: TPP\nDIMENSION: 2\nBOGUS_SECTION\nEOF\n";
        let path = std::env::temp_dir().join("ants_tpp_bad_test.tpp");
        let mut file = File::create(&path).expect("temp file");
        file.write_all(text.as_bytes()).expect("write");

        let result = Instance::from_file(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn test_name_fallback_from_path() {
        assert_eq!(
            instance_name_from_path(Path::new("/data/EEuclideo.33.100.1.tpp")),
            "EEuclideo.33.100.1"
        );
        assert_eq!(instance_name_from_path(Path::new("plain")), "plain");
    }
}
