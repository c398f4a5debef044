// min_consistency.rs - Score limited by the weakest SNP of the set

use super::traits::FitnessAggregation;

#[derive(Debug, Clone, Copy, Default)]
pub struct MinConsistency;

impl FitnessAggregation for MinConsistency {
    fn aggregate(&self, q: f64, difference_vector: &[f64]) -> f64 {
        let weakest = difference_vector
            .iter()
            .map(|d| d * d)
            .fold(f64::INFINITY, f64::min);
        if !weakest.is_finite() {
            return 0.0;
        }
        q * q * difference_vector.len() as f64 * weakest
    }

    fn name(&self) -> &'static str {
        "min-consistency"
    }

    fn description(&self) -> &'static str {
        "q^2 * k * min(d_j^2): every SNP must carry signal"
    }
}
