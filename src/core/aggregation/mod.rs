// mod.rs - Fitness aggregation strategies

pub mod min_consistency;
pub mod registry;
pub mod squared_sum;
pub mod traits;

pub use min_consistency::MinConsistency;
pub use registry::{AggregationRegistry, DEFAULT_AGGREGATION};
pub use squared_sum::SquaredSum;
pub use traits::FitnessAggregation;
