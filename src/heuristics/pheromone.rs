//! Dense pheromone trail matrix with Max-Min clamping.

/// A matrix holding the current pheromone level for every market pair.
/// Levels are clamped to `[min_value, max_value]` on update.
#[derive(Debug, Clone)]
pub struct PheromoneMatrix {
    trails: Vec<Vec<f64>>,
    is_symmetric: bool,
    min_value: f64,
    max_value: f64,
}

impl PheromoneMatrix {
    /// Creates the matrix with every trail set to `max_value`.
    pub fn new(size: usize, is_symmetric: bool, min_value: f64, max_value: f64) -> Self {
        PheromoneMatrix {
            trails: vec![vec![max_value; size]; size],
            is_symmetric,
            min_value,
            max_value,
        }
    }

    #[inline]
    pub fn trail(&self, from: usize, to: usize) -> f64 {
        self.trails[from][to]
    }

    /// Deposits pheromone on an edge, clamped to the upper bound; mirrored
    /// for symmetric instances.
    pub fn increase(&mut self, from: usize, to: usize, delta: f64) {
        let value = (self.trails[from][to] + delta).min(self.max_value);
        self.trails[from][to] = value;
        if self.is_symmetric {
            self.trails[to][from] = value;
        }
    }

    /// Multiplies every trail by `evaporation_ratio`, clamped to the lower
    /// bound.
    pub fn evaporate(&mut self, evaporation_ratio: f64) {
        for row in &mut self.trails {
            for trail in row {
                *trail = (*trail * evaporation_ratio).max(self.min_value);
            }
        }
    }

    /// Resets every trail to the given value.
    pub fn set_all_trails(&mut self, value: f64) {
        for row in &mut self.trails {
            row.fill(value);
        }
    }

    /// Updates the Max-Min bounds; existing trails are clamped lazily by
    /// subsequent updates.
    pub fn set_trail_limits(&mut self, min_value: f64, max_value: f64) {
        self.min_value = min_value;
        self.max_value = max_value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_max() {
        let pheromone = PheromoneMatrix::new(3, true, 0.1, 0.5);
        for a in 0..3 {
            for b in 0..3 {
                assert_eq!(pheromone.trail(a, b), 0.5);
            }
        }
    }

    #[test]
    fn test_upper_clamp() {
        let mut pheromone = PheromoneMatrix::new(3, true, 0.1, 0.5);
        pheromone.set_all_trails(1.0);
        pheromone.evaporate(0.99);
        // 0.99 stays above the upper bound only until a deposit touches it.
        pheromone.increase(0, 1, 1000.0);
        assert_eq!(pheromone.trail(0, 1), 0.5);
        assert_eq!(pheromone.trail(1, 0), 0.5);
    }

    #[test]
    fn test_lower_clamp() {
        let mut pheromone = PheromoneMatrix::new(2, true, 0.1, 0.5);
        pheromone.set_all_trails(0.1);
        for _ in 0..1000 {
            pheromone.evaporate(0.5);
        }
        assert_eq!(pheromone.trail(0, 1), 0.1);
    }

    #[test]
    fn test_bounds_hold_under_mixed_updates() {
        let mut pheromone = PheromoneMatrix::new(4, true, 0.01, 2.0);
        for step in 0..200 {
            if step % 3 == 0 {
                pheromone.increase(step % 4, (step + 1) % 4, 0.5);
            }
            pheromone.evaporate(0.9);
            for a in 0..4 {
                for b in 0..4 {
                    let t = pheromone.trail(a, b);
                    assert!((0.01..=2.0).contains(&t), "trail {} out of bounds", t);
                }
            }
        }
    }

    #[test]
    fn test_asymmetric_deposit_is_one_directional() {
        let mut pheromone = PheromoneMatrix::new(2, false, 0.0, 10.0);
        pheromone.set_all_trails(1.0);
        pheromone.increase(0, 1, 2.0);
        assert_eq!(pheromone.trail(0, 1), 3.0);
        assert_eq!(pheromone.trail(1, 0), 1.0);
    }
}
