// squared_sum.rs - q^2 times the squared norm of the difference vector

use super::traits::FitnessAggregation;

#[derive(Debug, Clone, Copy, Default)]
pub struct SquaredSum;

impl FitnessAggregation for SquaredSum {
    fn aggregate(&self, q: f64, difference_vector: &[f64]) -> f64 {
        // summed in sorted order so the result is bit-identical for any SNP order
        let mut squares: Vec<f64> = difference_vector.iter().map(|d| d * d).collect();
        squares.sort_by(f64::total_cmp);
        q * q * squares.iter().sum::<f64>()
    }

    fn name(&self) -> &'static str {
        "squared-sum"
    }

    fn description(&self) -> &'static str {
        "q^2 * sum(d_j^2): joint transmission times total standardized signal"
    }
}
