// config.rs - Configuration file support

use crate::error::{GadgetsError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    // Analysis
    pub analysis: Option<String>,

    // Input/Output
    pub case_genotypes: Option<String>,
    pub complement_genotypes: Option<String>,
    pub exposures: Option<String>,
    pub missing_char: Option<String>,
    pub output: Option<String>,

    // SNP metadata
    pub block_ends: Option<Vec<usize>>,
    pub maternal_snps: Option<Vec<usize>>,
    pub snps: Option<Vec<usize>>,

    // Scoring
    pub weight_function_int: Option<u32>,
    pub n_different_snps_weight: Option<u32>,
    pub n_both_one_weight: Option<u32>,
    pub max_chrom_size: Option<usize>,
    pub recessive_ref_prop: Option<f64>,
    pub recode_test_stat: Option<f64>,
    pub aggregation: Option<String>,
    pub return_informative_indices: Option<bool>,

    // Calibration and permutations
    pub chrom_sizes: Option<Vec<usize>>,
    pub calibration_samples: Option<usize>,
    pub calibration: Option<String>,
    pub permutation_mode: Option<String>,
    pub n_permutations: Option<usize>,
    pub seed: Option<u64>,
    pub replicate_dir: Option<String>,
    pub global_input: Option<String>,

    // Performance
    pub threads: Option<usize>,
    pub no_progress: Option<bool>,
    pub dry_run: Option<bool>,
}

impl Config {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| GadgetsError::io(path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| GadgetsError::format(path, format!("Failed to parse config: {}", e)))?;

        println!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| GadgetsError::format(path, format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content).map_err(|e| GadgetsError::io(path, e))?;

        println!("📄 Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Generate a sample configuration file with comments
    pub fn generate_sample() -> String {
        r#"# gadgets.toml - Configuration file for gadgets
# Command line arguments will override these settings

# =============================================================================
# ANALYSIS
# =============================================================================

# score, epistasis-test, maternal-fetal-test, gxe-test, calibrate, permute,
# rescore, global-test
analysis = "epistasis-test"

# =============================================================================
# INPUT/OUTPUT
# =============================================================================

# Case and complement genotype matrices (families x SNPs, first column = family id)
case_genotypes = "/path/to/case.tsv"
complement_genotypes = "/path/to/complement.tsv"

# Exposure matrix (families x variables), enables exposure-aware scoring
# exposures = "/path/to/exposures.tsv"

# Missing genotype character
missing_char = "-"

# Output report
output = "epistasis_test.json"

# =============================================================================
# SNP METADATA
# =============================================================================

# Inclusive 0-based upper bounds of LD blocks; the last one is n_snps - 1
# block_ends = [4, 9, 14, 19]

# Maternal SNP columns (maternal-fetal test)
# maternal_snps = [0, 1]

# Candidate SNP set
snps = [2, 5, 8]

# =============================================================================
# SCORING
# =============================================================================

weight_function_int = 2
n_different_snps_weight = 2
n_both_one_weight = 1
max_chrom_size = 6
recessive_ref_prop = 0.75
recode_test_stat = 1.64

# Fitness aggregation: squared-sum, min-consistency
aggregation = "squared-sum"

# Report informative family rows
return_informative_indices = false

# =============================================================================
# CALIBRATION AND PERMUTATIONS
# =============================================================================

# Sizes and samples for the exposure-aware null calibration
# chrom_sizes = [2, 3, 4]
calibration_samples = 10000
# calibration = "calibration.json"

# Replicate mode for permute: label, exposure
permutation_mode = "label"
n_permutations = 10000
seed = 1
# replicate_dir = "replicates"

# Per-size observed and permuted top scores for the global test
# global_input = "global_scores.json"

# =============================================================================
# PERFORMANCE
# =============================================================================

# Number of threads (omit for auto-detection)
threads = 8

no_progress = false
dry_run = false
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_parses() {
        let config: Config = toml::from_str(&Config::generate_sample()).unwrap();
        assert_eq!(config.analysis.as_deref(), Some("epistasis-test"));
        assert_eq!(config.snps, Some(vec![2, 5, 8]));
        assert_eq!(config.threads, Some(8));
        assert!(config.block_ends.is_none());
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gadgets.toml");
        let config = Config {
            seed: Some(42),
            maternal_snps: Some(vec![1]),
            ..Config::default()
        };
        config.to_file(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }
}
