use serde::{Deserialize, Serialize};

/// Stop rule shared by the sub-pixel refiner and the calibration solver.
///
/// Iteration stops once `max_iterations` is reached or the update falls
/// below `epsilon` (pixels for corner refinement, relative parameter change
/// for the solver).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermCriteria {
    pub max_iterations: usize,
    pub epsilon: f64,
}

impl TermCriteria {
    pub fn new(max_iterations: usize, epsilon: f64) -> Self {
        Self {
            max_iterations,
            epsilon,
        }
    }
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self::new(30, 0.1)
    }
}
