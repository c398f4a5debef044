// mod.rs - Core logic module

pub mod aggregate;
pub mod aggregation;
pub mod exposure;
pub mod fitness;
pub mod permutation;
pub mod significance;
pub mod weighting;

// Re-export main types for convenience
pub use aggregate::{aggregate, AggregatedResults, AnnotationTable, IslandFile, IslandRow};
pub use aggregation::{AggregationRegistry, FitnessAggregation};
pub use exposure::{
    estimate_null_calibration, exposure_mode, ExposureComponents, NullCalibration,
    NullCalibrationTable,
};
pub use fitness::{FitnessResult, FitnessScorer, RiskRequirement, ScoringConfig, ScoringMode};
pub use permutation::{PermutationEngine, PermutationMode, ReplicateArtifact};
pub use significance::{
    epistasis_test, global_test, gxe_test, maternal_fetal_test, GlobalTestResult,
    MaternalFetalOutcome, PermutationTestConfig, PermutationTestResult, SizeScores,
};
pub use weighting::{WeightConfig, WeightLookup};

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar for replicate loops; hidden when `visible` is false
pub(crate) fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {per_sec} ETA: {eta}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    pb.set_style(style);
    pb
}
