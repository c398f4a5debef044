// lib.rs - gadgets library root

//! # gadgets - Genetic-algorithm fitness and permutation inference for case-parent triads
//!
//! This library scores candidate SNP sets ("chromosomes" proposed by an
//! external genetic algorithm) against case/complement genotype data from
//! case-parent triads or affected/unaffected sibling pairs, and turns those
//! scores into permutation-based significance statements.
//!
//! ## Features
//!
//! - **Family-weighted fitness**: transmission score with recessive recoding
//! - **Exposure-aware scoring**: GxE / GxGxE with a persisted null calibration
//! - **Permutation engine**: label swap, exposure shuffle and LD-block shuffle,
//!   reproducible from one seed, with checksummed replicate artifacts
//! - **Significance tests**: epistasis, maternal-fetal, GxE and global tests
//! - **Result aggregation**: island files merged into ranked, deduplicated tables
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use gadgets::prelude::*;
//!
//! let case = load_genotypes(std::path::Path::new("case.tsv"), "-")?;
//! let complement = load_genotypes(std::path::Path::new("complement.tsv"), "-")?;
//! let n_snps = case.snp_names.len();
//! let store = GenotypeStore::new(case.matrix, complement.matrix, SnpMetadata::independent(n_snps))?;
//!
//! let scorer = FitnessScorer::new(ScoringConfig::default())?;
//! let result = scorer.score(&store, &[2, 5, 8])?;
//! println!("fitness = {}", result.fitness_score);
//!
//! let test = epistasis_test(&scorer, &store, &[2, 5, 8], &PermutationTestConfig::default())?;
//! println!("h-value = {}", test.p_value);
//! # Ok::<(), gadgets::GadgetsError>(())
//! ```

// Re-export all main modules
pub mod cli;
pub mod core;
pub mod data;
pub mod error;
pub mod output;

#[cfg(test)]
pub(crate) mod testing;

// Convenience prelude for common imports
pub mod prelude {
    pub use crate::cli::{validate_args, Args, ValidationResult};
    pub use crate::core::{
        aggregate, epistasis_test, estimate_null_calibration, exposure_mode, global_test, gxe_test,
        maternal_fetal_test,
    };
    pub use crate::core::{
        AnnotationTable, FitnessResult, FitnessScorer, IslandFile, MaternalFetalOutcome,
        NullCalibrationTable, PermutationEngine, PermutationTestConfig, ScoringConfig,
        ScoringMode,
    };
    pub use crate::data::loaders::{load_exposures, load_genotypes};
    pub use crate::data::{DenseGenotypeMatrix, ExposureMatrix, GenotypeStore, SnpMetadata};
    pub use crate::error::{GadgetsError, Result};
}

// Re-export main types at the root level for convenience
pub use cli::{Args, ValidationResult};
pub use core::{FitnessResult, FitnessScorer, ScoringConfig, ScoringMode};
pub use data::{GenotypeStore, SnpMetadata};
pub use error::{GadgetsError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn get_info() -> String {
    format!(
        "gadgets v{} - GA fitness scoring and permutation tests for case-parent triads",
        VERSION
    )
}
