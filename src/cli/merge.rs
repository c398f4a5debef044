// merge.rs - Merge configuration file with CLI arguments

use crate::cli::{Args, Config};
use crate::error::Result;

fn join_indices(values: Vec<usize>) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

impl Args {
    /// Merge with configuration from file
    /// CLI arguments take precedence over config file values
    pub fn merge_with_config(mut self, config: Config) -> Self {
        // Analysis (only override default)
        if self.analysis == "score" {
            if let Some(analysis) = config.analysis {
                self.analysis = analysis;
            }
        }

        // Input/Output
        if self.case_genotypes.is_none() {
            self.case_genotypes = config.case_genotypes;
        }
        if self.complement_genotypes.is_none() {
            self.complement_genotypes = config.complement_genotypes;
        }
        if self.exposures.is_none() {
            self.exposures = config.exposures;
        }
        if self.missing_char == "-" {
            if let Some(missing_char) = config.missing_char {
                self.missing_char = missing_char;
            }
        }
        if self.output.is_none() {
            self.output = config.output;
        }

        // SNP metadata
        if self.block_ends.is_none() {
            self.block_ends = config.block_ends.map(join_indices);
        }
        if self.maternal_snps.is_none() {
            self.maternal_snps = config.maternal_snps.map(join_indices);
        }
        if self.snps.is_none() {
            self.snps = config.snps.map(join_indices);
        }

        // Scoring (only override defaults, not explicit CLI values)
        if self.weight_function_int == 2 {
            if let Some(v) = config.weight_function_int {
                self.weight_function_int = v;
            }
        }
        if self.n_different_snps_weight == 2 {
            if let Some(v) = config.n_different_snps_weight {
                self.n_different_snps_weight = v;
            }
        }
        if self.n_both_one_weight == 1 {
            if let Some(v) = config.n_both_one_weight {
                self.n_both_one_weight = v;
            }
        }
        if self.max_chrom_size == 6 {
            if let Some(v) = config.max_chrom_size {
                self.max_chrom_size = v;
            }
        }
        if self.recessive_ref_prop == 0.75 {
            if let Some(v) = config.recessive_ref_prop {
                self.recessive_ref_prop = v;
            }
        }
        if self.recode_test_stat == 1.64 {
            if let Some(v) = config.recode_test_stat {
                self.recode_test_stat = v;
            }
        }
        if self.aggregation == "squared-sum" {
            if let Some(v) = config.aggregation {
                self.aggregation = v;
            }
        }

        // Calibration and permutations
        if self.chrom_sizes.is_none() {
            self.chrom_sizes = config.chrom_sizes.map(join_indices);
        }
        if self.calibration_samples == 10000 {
            if let Some(v) = config.calibration_samples {
                self.calibration_samples = v;
            }
        }
        if self.calibration.is_none() {
            self.calibration = config.calibration;
        }
        if self.permutation_mode == "label" {
            if let Some(v) = config.permutation_mode {
                self.permutation_mode = v;
            }
        }
        if self.n_permutations == 10000 {
            if let Some(v) = config.n_permutations {
                self.n_permutations = v;
            }
        }
        if self.seed == 1 {
            if let Some(v) = config.seed {
                self.seed = v;
            }
        }
        if self.replicate_dir.is_none() {
            self.replicate_dir = config.replicate_dir;
        }
        if self.global_input.is_none() {
            self.global_input = config.global_input;
        }

        // Performance
        if self.threads.is_none() {
            self.threads = config.threads;
        }

        // Flags (CLI flags take precedence, config only sets if not explicitly set)
        if !self.return_informative_indices && config.return_informative_indices.unwrap_or(false) {
            self.return_informative_indices = true;
        }
        if !self.no_progress && config.no_progress.unwrap_or(false) {
            self.no_progress = true;
        }
        if !self.dry_run && config.dry_run.unwrap_or(false) {
            self.dry_run = true;
        }

        self
    }

    /// Load configuration and merge with CLI args
    pub fn with_config_file(self, config_path: &str) -> Result<Self> {
        let config = Config::from_file(config_path)?;
        Ok(self.merge_with_config(config))
    }
}
