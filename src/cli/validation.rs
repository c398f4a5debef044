// validation.rs - Input validation utilities

use crate::cli::args::Args;
use crate::core::aggregation::AggregationRegistry;
use crate::core::fitness::ScoringConfig;
use crate::core::permutation::PermutationMode;
use crate::core::weighting::WeightConfig;
use crate::error::{GadgetsError, Result};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analysis {
    Score,
    EpistasisTest,
    MaternalFetalTest,
    GxeTest,
    Calibrate,
    Permute,
    Rescore,
    GlobalTest,
}

impl FromStr for Analysis {
    type Err = GadgetsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "score" => Ok(Analysis::Score),
            "epistasis-test" => Ok(Analysis::EpistasisTest),
            "maternal-fetal-test" => Ok(Analysis::MaternalFetalTest),
            "gxe-test" => Ok(Analysis::GxeTest),
            "calibrate" => Ok(Analysis::Calibrate),
            "permute" => Ok(Analysis::Permute),
            "rescore" => Ok(Analysis::Rescore),
            "global-test" => Ok(Analysis::GlobalTest),
            _ => Err(GadgetsError::InvalidInput(format!(
                "Invalid analysis '{}'. Use: score, epistasis-test, maternal-fetal-test, gxe-test, calibrate, permute, rescore, global-test",
                s
            ))),
        }
    }
}

impl Analysis {
    pub fn description(&self) -> &'static str {
        match self {
            Analysis::Score => "Fitness score of one SNP set",
            Analysis::EpistasisTest => "Epistasis permutation test",
            Analysis::MaternalFetalTest => "Maternal-fetal interaction test",
            Analysis::GxeTest => "Gene-environment permutation test",
            Analysis::Calibrate => "Null calibration of exposure-aware scores",
            Analysis::Permute => "Write permutation replicate artifacts",
            Analysis::Rescore => "Score a SNP set on stored replicates",
            Analysis::GlobalTest => "Global test across chromosome sizes",
        }
    }

    /// Whether the analysis reads genotype matrices
    pub fn needs_genotypes(&self) -> bool {
        !matches!(self, Analysis::GlobalTest)
    }

    /// Whether the analysis writes a report to `--output`; permute writes
    /// replicate artifacts instead
    pub fn writes_report(&self) -> bool {
        !matches!(self, Analysis::Permute)
    }

    /// Whether the analysis scores a single candidate set
    pub fn needs_snps(&self) -> bool {
        matches!(
            self,
            Analysis::Score
                | Analysis::EpistasisTest
                | Analysis::MaternalFetalTest
                | Analysis::GxeTest
                | Analysis::Rescore
        )
    }
}

pub struct ValidationResult {
    pub analysis: Analysis,
    pub scoring: ScoringConfig,
    pub snps: Option<Vec<usize>>,
    pub block_ends: Option<Vec<usize>>,
    pub maternal_snps: Vec<usize>,
    pub chrom_sizes: Vec<usize>,
    pub permutation_mode: PermutationMode,
}

/// Parse a comma-separated list of non-negative integers
pub fn parse_index_list(value: &str, name: &str) -> Result<Vec<usize>> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>().map_err(|_| {
                GadgetsError::InvalidInput(format!("Invalid --{} entry '{}'", name, s))
            })
        })
        .collect()
}

fn optional_list(value: &Option<String>, name: &str) -> Result<Option<Vec<usize>>> {
    value.as_deref().map(|v| parse_index_list(v, name)).transpose()
}

/// Validate all command line arguments
pub fn validate_args(args: &Args) -> Result<ValidationResult> {
    let analysis = Analysis::from_str(&args.analysis)?;

    // Validate aggregation
    let registry = AggregationRegistry::new();
    if !registry.has(&args.aggregation) {
        let available = registry
            .list()
            .iter()
            .map(|(name, description)| format!("{} ({})", name, description))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(GadgetsError::InvalidInput(format!(
            "Invalid aggregation '{}'. Available: {}",
            args.aggregation, available
        )));
    }

    if !(args.recessive_ref_prop > 0.0 && args.recessive_ref_prop < 1.0) {
        return Err(GadgetsError::InvalidInput(
            "recessive_ref_prop must be between 0.0 and 1.0 (exclusive)".to_string(),
        ));
    }
    if args.weight_function_int == 0 {
        return Err(GadgetsError::InvalidInput(
            "weight_function_int must be at least 1".to_string(),
        ));
    }
    if args.max_chrom_size == 0 {
        return Err(GadgetsError::InvalidInput(
            "max_chrom_size must be at least 1".to_string(),
        ));
    }

    let permutation_mode = match args.permutation_mode.to_lowercase().as_str() {
        "label" => PermutationMode::LabelSwap,
        "exposure" => PermutationMode::ExposureShuffle,
        other => {
            return Err(GadgetsError::InvalidInput(format!(
                "Invalid permutation mode '{}'. Use: label, exposure",
                other
            )))
        }
    };

    // Required inputs per analysis
    if analysis.needs_genotypes()
        && (args.case_genotypes.is_none() || args.complement_genotypes.is_none())
    {
        return Err(GadgetsError::InvalidInput(format!(
            "--case-genotypes and --complement-genotypes are required for {}",
            args.analysis
        )));
    }
    let snps = optional_list(&args.snps, "snps")?;
    if analysis.needs_snps() && snps.as_ref().map_or(true, |s| s.is_empty()) {
        return Err(GadgetsError::InvalidInput(format!(
            "--snps is required for {}",
            args.analysis
        )));
    }
    let needs_exposures = matches!(analysis, Analysis::GxeTest | Analysis::Calibrate)
        || (analysis == Analysis::Permute && permutation_mode == PermutationMode::ExposureShuffle);
    if needs_exposures && args.exposures.is_none() {
        return Err(GadgetsError::InvalidInput(format!(
            "--exposures is required for {}",
            args.analysis
        )));
    }
    if analysis == Analysis::GxeTest && args.calibration.is_none() {
        return Err(GadgetsError::InvalidInput(
            "--calibration is required for gxe-test (run the calibrate analysis first)".to_string(),
        ));
    }
    if analysis.writes_report() && args.output.is_none() {
        return Err(GadgetsError::InvalidInput(format!(
            "--output is required for {}",
            args.analysis
        )));
    }
    if matches!(analysis, Analysis::Permute | Analysis::Rescore) && args.replicate_dir.is_none() {
        return Err(GadgetsError::InvalidInput(format!(
            "--replicate-dir is required for {}",
            args.analysis
        )));
    }
    if analysis == Analysis::GlobalTest && args.global_input.is_none() {
        return Err(GadgetsError::InvalidInput(
            "--global-input is required for global-test".to_string(),
        ));
    }

    let chrom_sizes = match optional_list(&args.chrom_sizes, "chrom-sizes")? {
        Some(sizes) => sizes,
        None => snps.as_ref().map(|s| vec![s.len()]).unwrap_or_default(),
    };
    if analysis == Analysis::Calibrate && chrom_sizes.is_empty() {
        return Err(GadgetsError::InvalidInput(
            "calibrate needs --chrom-sizes or --snps".to_string(),
        ));
    }
    if let Some(&size) = chrom_sizes.iter().find(|&&s| s == 0 || s > args.max_chrom_size) {
        return Err(GadgetsError::InvalidInput(format!(
            "Chromosome size {} must be between 1 and max_chrom_size {}",
            size, args.max_chrom_size
        )));
    }

    let scoring = ScoringConfig {
        weights: WeightConfig {
            weight_function_int: args.weight_function_int,
            n_different_snps_weight: args.n_different_snps_weight,
            n_both_one_weight: args.n_both_one_weight,
            max_chrom_size: args.max_chrom_size,
        },
        recessive_ref_prop: args.recessive_ref_prop,
        recode_test_stat: args.recode_test_stat,
        return_informative_indices: args.return_informative_indices,
        aggregation: args.aggregation.clone(),
    };

    Ok(ValidationResult {
        analysis,
        scoring,
        snps,
        block_ends: optional_list(&args.block_ends, "block-ends")?,
        maternal_snps: optional_list(&args.maternal_snps, "maternal-snps")?.unwrap_or_default(),
        chrom_sizes,
        permutation_mode,
    })
}
