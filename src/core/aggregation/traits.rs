// traits.rs - Pluggable aggregation of the standardized difference vector

use std::fmt::Debug;

/// Collapses the joint informativeness `q` and the standardized difference
/// vector into one fitness score.
///
/// Implementations must be non-decreasing in every `|d_j|`, independent of
/// the order of `difference_vector`, and deterministic.
pub trait FitnessAggregation: Send + Sync + Debug {
    fn aggregate(&self, q: f64, difference_vector: &[f64]) -> f64;

    /// Registry key
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;
}
