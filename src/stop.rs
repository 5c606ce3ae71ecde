//! Stop conditions for the search loop.
//!
//! The engine polls the condition between iterations; an in-progress
//! iteration always runs to completion.

use std::time::Instant;

/// Decides when the outer search loop should stop.
pub trait StopCondition {
    /// Called once before the first iteration; resets counters/timestamps.
    fn start(&mut self);

    /// Called after each completed iteration.
    fn next_iteration(&mut self);

    /// True once the stopping criterion has been reached; stays true
    /// afterwards.
    fn is_reached(&self) -> bool;

    /// Current iteration number.
    fn iteration(&self) -> u32;
}

/// Stops after a fixed number of iterations.
pub struct FixedIterations {
    iteration: u32,
    max_iterations: u32,
}

impl FixedIterations {
    pub fn new(max_iterations: u32) -> Self {
        FixedIterations {
            iteration: 0,
            max_iterations,
        }
    }
}

impl StopCondition for FixedIterations {
    fn start(&mut self) {
        self.iteration = 0;
    }

    fn next_iteration(&mut self) {
        if self.iteration < self.max_iterations {
            self.iteration += 1;
        }
    }

    fn is_reached(&self) -> bool {
        self.iteration == self.max_iterations
    }

    fn iteration(&self) -> u32 {
        self.iteration
    }
}

/// Stops once the wall-clock budget is exhausted.
pub struct Timeout {
    max_seconds: f64,
    started_at: Instant,
    iteration: u32,
}

impl Timeout {
    pub fn new(max_seconds: f64) -> Self {
        Timeout {
            max_seconds: max_seconds.max(0.0),
            started_at: Instant::now(),
            iteration: 0,
        }
    }
}

impl StopCondition for Timeout {
    fn start(&mut self) {
        self.started_at = Instant::now();
        self.iteration = 0;
    }

    fn next_iteration(&mut self) {
        self.iteration += 1;
    }

    fn is_reached(&self) -> bool {
        self.started_at.elapsed().as_secs_f64() > self.max_seconds
    }

    fn iteration(&self) -> u32 {
        self.iteration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_iterations() {
        let mut stop = FixedIterations::new(3);
        stop.start();
        let mut count = 0;
        while !stop.is_reached() {
            count += 1;
            stop.next_iteration();
        }
        assert_eq!(count, 3);
        assert_eq!(stop.iteration(), 3);
        assert!(stop.is_reached());
    }

    #[test]
    fn test_fixed_iterations_restart() {
        let mut stop = FixedIterations::new(2);
        stop.start();
        stop.next_iteration();
        stop.next_iteration();
        assert!(stop.is_reached());
        stop.start();
        assert!(!stop.is_reached());
        assert_eq!(stop.iteration(), 0);
    }

    #[test]
    fn test_timeout_zero_budget() {
        let mut stop = Timeout::new(0.0);
        stop.start();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(stop.is_reached());
        // Monotonic once reached.
        assert!(stop.is_reached());
    }
}
