// exposure.rs - Exposure-aware (GxE / GxGxE) scoring and null calibration

use crate::core::fitness::{
    transmission_core, FamilyTable, FitnessResult, FitnessScorer, ScoringMode,
};
use crate::core::permutation::replicate_seed;
use crate::core::progress_bar;
use crate::data::{ExposureMatrix, GenotypeMatrix, GenotypeStore};
use crate::error::{GadgetsError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Order of the components in calibration records
pub const COMPONENT_NAMES: [&str; 2] = ["transmission", "parental_risk"];

/// Raw (uncalibrated) parts of an exposure-aware score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureComponents {
    pub transmission: f64,
    pub parental_risk: f64,
    /// Log-odds that the case rather than the complement is the full risk
    /// carrier, per stratum relative to the reference stratum (always 0)
    pub coefficients: Vec<f64>,
    pub stratum_labels: Vec<Vec<u8>>,
}

/// Null mean/sd of each component for one chromosome size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullCalibration {
    pub chrom_size: usize,
    pub n_samples: usize,
    pub seed: u64,
    pub null_mean: Vec<f64>,
    pub null_sd: Vec<f64>,
    pub created: String,
}

impl NullCalibration {
    fn standardize(&self, component: usize, value: f64) -> f64 {
        let sd = self.null_sd[component];
        let sd = if sd > 0.0 && sd.is_finite() { sd } else { 1.0 };
        (value - self.null_mean[component]) / sd
    }
}

/// Calibration records keyed by chromosome size; persisted once per analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NullCalibrationTable {
    pub records: BTreeMap<usize, NullCalibration>,
}

impl NullCalibrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: NullCalibration) {
        self.records.insert(record.chrom_size, record);
    }

    pub fn get(&self, chrom_size: usize) -> Result<&NullCalibration> {
        self.records.get(&chrom_size).ok_or_else(|| {
            GadgetsError::Calibration(format!(
                "No null calibration for chromosome size {} (available: {:?})",
                chrom_size,
                self.records.keys().collect::<Vec<_>>()
            ))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| GadgetsError::format(path, format!("Failed to serialize: {}", e)))?;
        crate::output::ensure_parent_dir(path)?;
        fs::write(path, content).map_err(|e| GadgetsError::io(path, e))?;
        log::info!("Null calibration written to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| GadgetsError::io(path, e))?;
        let table: Self =
            serde_json::from_str(&content).map_err(|e| GadgetsError::format(path, e.to_string()))?;
        for (&size, record) in &table.records {
            if size != record.chrom_size
                || record.null_mean.len() != COMPONENT_NAMES.len()
                || record.null_sd.len() != COMPONENT_NAMES.len()
            {
                return Err(GadgetsError::format(
                    path,
                    format!("Calibration record for size {} is inconsistent", size),
                ));
            }
        }
        Ok(table)
    }
}

/// Wald heterogeneity of the case-carrier log-odds across exposure strata
fn parental_risk(
    table: &FamilyTable,
    joint: &[(usize, bool)],
    exposures: &ExposureMatrix,
) -> (f64, Vec<f64>) {
    let n_strata = exposures.n_strata();
    let mut case_carriers = vec![0usize; n_strata];
    let mut comp_carriers = vec![0usize; n_strata];
    for &(f, case_is_carrier) in joint {
        let s = exposures.stratum_of(table.rows[f]);
        if case_is_carrier {
            case_carriers[s] += 1;
        } else {
            comp_carriers[s] += 1;
        }
    }

    let log_odds = |s: usize| {
        ((case_carriers[s] as f64 + 0.5) / (comp_carriers[s] as f64 + 0.5)).ln()
    };
    let inv_var = |s: usize| {
        1.0 / (case_carriers[s] as f64 + 0.5) + 1.0 / (comp_carriers[s] as f64 + 0.5)
    };

    let reference = log_odds(0);
    let reference_var = inv_var(0);
    let mut coefficients = vec![0.0; n_strata];
    let mut statistic = 0.0;
    for s in 1..n_strata {
        if case_carriers[s] + comp_carriers[s] == 0 {
            continue;
        }
        let beta = log_odds(s) - reference;
        coefficients[s] = beta;
        statistic += beta * beta / (inv_var(s) + reference_var);
    }
    (statistic, coefficients)
}

/// Raw components for one SNP set; `None` when no family carries signal
fn raw_components<M: GenotypeMatrix>(
    scorer: &FitnessScorer,
    store: &GenotypeStore<M>,
    exposures: &ExposureMatrix,
    snps: &[usize],
) -> Option<(FamilyTable, crate::core::fitness::TransmissionCore, f64, Vec<f64>)> {
    let table = FamilyTable::build(store, snps, scorer.lookup());
    if !table.has_signal() {
        return None;
    }
    // recessive recoding is never applied here
    let core = transmission_core(&table, scorer.config(), scorer.aggregation(), false);
    let (g, coefficients) = parental_risk(&table, &core.joint, exposures);
    Some((table, core, g, coefficients))
}

fn check_alignment<M: GenotypeMatrix>(
    store: &GenotypeStore<M>,
    exposures: &ExposureMatrix,
) -> Result<()> {
    if exposures.n_families() != store.n_families() {
        return Err(GadgetsError::InvalidInput(format!(
            "Exposure matrix has {} families, genotype store has {}",
            exposures.n_families(),
            store.n_families()
        )));
    }
    Ok(())
}

pub(crate) fn score_exposure_aware<M: GenotypeMatrix>(
    scorer: &FitnessScorer,
    store: &GenotypeStore<M>,
    exposures: &ExposureMatrix,
    calibration: &NullCalibrationTable,
    snps: &[usize],
) -> Result<FitnessResult> {
    check_alignment(store, exposures)?;
    let record = calibration.get(snps.len())?;
    let Some((table, mut core, g, coefficients)) = raw_components(scorer, store, exposures, snps)
    else {
        return Ok(FitnessResult::insufficient());
    };

    let t = core.fitness;
    core.fitness = record.standardize(0, t) + record.standardize(1, g);
    let components = ExposureComponents {
        transmission: t,
        parental_risk: g,
        coefficients,
        stratum_labels: (0..exposures.n_strata())
            .map(|s| exposures.stratum_label(s).to_vec())
            .collect(),
    };
    Ok(core.into_result(
        &table,
        scorer.config().return_informative_indices,
        Some(components),
    ))
}

/// Estimate null moments of both components from random SNP sets of one size.
///
/// Sample `i` draws its set from a seed derived from `(seed, i)`, so the
/// record does not depend on thread scheduling.
pub fn estimate_null_calibration<M: GenotypeMatrix>(
    scorer: &FitnessScorer,
    store: &GenotypeStore<M>,
    exposures: &ExposureMatrix,
    chrom_size: usize,
    n_samples: usize,
    seed: u64,
    show_progress: bool,
) -> Result<NullCalibration> {
    check_alignment(store, exposures)?;
    if chrom_size == 0 || chrom_size > store.n_snps() {
        return Err(GadgetsError::Calibration(format!(
            "Chromosome size {} is not valid for {} SNPs",
            chrom_size,
            store.n_snps()
        )));
    }
    if chrom_size > scorer.config().weights.max_chrom_size {
        return Err(GadgetsError::Calibration(format!(
            "Chromosome size {} exceeds max_chrom_size {}",
            chrom_size,
            scorer.config().weights.max_chrom_size
        )));
    }

    let pb = progress_bar(n_samples as u64, show_progress);
    let samples: Vec<(f64, f64)> = (0..n_samples)
        .into_par_iter()
        .filter_map(|i| {
            let mut rng = StdRng::seed_from_u64(replicate_seed(seed, i as u64));
            let snps = rand::seq::index::sample(&mut rng, store.n_snps(), chrom_size).into_vec();
            let components = raw_components(scorer, store, exposures, &snps);
            pb.inc(1);
            components.map(|(_, core, g, _)| (core.fitness, g))
        })
        .collect();
    pb.finish_and_clear();

    if samples.len() < 2 {
        return Err(GadgetsError::Calibration(format!(
            "Only {} of {} random SNP sets were informative",
            samples.len(),
            n_samples
        )));
    }

    let n = samples.len() as f64;
    let mean_t = samples.iter().map(|s| s.0).sum::<f64>() / n;
    let mean_g = samples.iter().map(|s| s.1).sum::<f64>() / n;
    let sd_t = (samples.iter().map(|s| (s.0 - mean_t).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
    let sd_g = (samples.iter().map(|s| (s.1 - mean_g).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();

    log::info!(
        "Null calibration for size {}: {} informative sets, transmission {:.4} +/- {:.4}, parental risk {:.4} +/- {:.4}",
        chrom_size,
        samples.len(),
        mean_t,
        sd_t,
        mean_g,
        sd_g
    );

    Ok(NullCalibration {
        chrom_size,
        n_samples,
        seed,
        null_mean: vec![mean_t, mean_g],
        null_sd: vec![sd_t, sd_g],
        created: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    })
}

/// Exposure-aware scoring mode from an exposure matrix and calibration table
pub fn exposure_mode(exposures: ExposureMatrix, calibration: NullCalibrationTable) -> ScoringMode {
    ScoringMode::ExposureAware {
        exposures: Arc::new(exposures),
        calibration: Arc::new(calibration),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fitness::{RiskRequirement, ScoringConfig};
    use crate::data::{DenseGenotypeMatrix, SnpMetadata};
    use crate::testing::{simulate_exposed_triads, SimulationParams};

    fn unit_calibration(size: usize) -> NullCalibrationTable {
        let mut table = NullCalibrationTable::new();
        table.insert(NullCalibration {
            chrom_size: size,
            n_samples: 0,
            seed: 0,
            null_mean: vec![0.0, 0.0],
            null_sd: vec![1.0, 1.0],
            created: String::new(),
        });
        table
    }

    #[test]
    fn test_recoding_never_applied_with_exposures() {
        // the same data recodes to recessive in transmission mode
        let case: Vec<Vec<i64>> = (0..60).map(|_| vec![2]).collect();
        let comp: Vec<Vec<i64>> = (0..60).map(|_| vec![1]).collect();
        let store = GenotypeStore::new(
            DenseGenotypeMatrix::from_rows(&case).unwrap(),
            DenseGenotypeMatrix::from_rows(&comp).unwrap(),
            SnpMetadata::independent(1),
        )
        .unwrap();
        let exposures =
            ExposureMatrix::from_rows(&(0..60).map(|i| vec![(i % 2) as u8]).collect::<Vec<_>>())
                .unwrap();

        let base = FitnessScorer::new(ScoringConfig::default()).unwrap();
        let plain = base.score(&store, &[0]).unwrap();
        assert_eq!(plain.risk_requirement, vec![RiskRequirement::ExactlyTwo]);

        let scorer = base.with_mode(exposure_mode(exposures, unit_calibration(1)));
        let result = scorer.score(&store, &[0]).unwrap();
        assert_eq!(result.risk_requirement, vec![RiskRequirement::AtLeastOne]);
        assert!(result.exposure.is_some());
    }

    #[test]
    fn test_parental_risk_detects_exposure_specific_effect() {
        let params = SimulationParams {
            n_families: 800,
            causal: vec![1, 3],
            relative_risk: 10.0,
            ..SimulationParams::default()
        };
        let (store, exposures) = simulate_exposed_triads(&params, 17);
        let scorer = FitnessScorer::new(ScoringConfig::default())
            .unwrap()
            .with_mode(exposure_mode(exposures, unit_calibration(2)));
        let result = scorer.score(&store, &[1, 3]).unwrap();
        let components = result.exposure.unwrap();
        assert_eq!(components.coefficients[0], 0.0);
        // exposed stratum (level 1) transmits the risk set more often
        assert!(components.coefficients[1] > 0.0);
        assert!(components.parental_risk > 3.84);
    }

    #[test]
    fn test_missing_calibration_is_error() {
        let (store, exposures) = simulate_exposed_triads(&SimulationParams::default(), 2);
        let scorer = FitnessScorer::new(ScoringConfig::default())
            .unwrap()
            .with_mode(exposure_mode(exposures, unit_calibration(2)));
        assert!(matches!(
            scorer.score(&store, &[0, 1, 2]),
            Err(GadgetsError::Calibration(_))
        ));
    }

    #[test]
    fn test_calibration_reproducible_and_standardizes() {
        let params = SimulationParams {
            n_families: 300,
            ..SimulationParams::default()
        };
        let (store, exposures) = simulate_exposed_triads(&params, 5);
        let scorer = FitnessScorer::new(ScoringConfig::default()).unwrap();
        let a = estimate_null_calibration(&scorer, &store, &exposures, 2, 40, 99, false).unwrap();
        let b = estimate_null_calibration(&scorer, &store, &exposures, 2, 40, 99, false).unwrap();
        assert_eq!(a.null_mean, b.null_mean);
        assert_eq!(a.null_sd, b.null_sd);
        assert!(a.null_sd.iter().all(|&sd| sd >= 0.0));

        let mut table = NullCalibrationTable::new();
        table.insert(a.clone());
        let exposure_scorer = scorer.with_mode(exposure_mode(exposures, table));
        let result = exposure_scorer.score(&store, &[0, 4]).unwrap();
        let c = result.exposure.as_ref().unwrap();
        let expected = a.standardize(0, c.transmission) + a.standardize(1, c.parental_risk);
        assert!((result.fitness_score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_calibration_table_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        let table = unit_calibration(3);
        table.save(&path).unwrap();
        assert_eq!(NullCalibrationTable::load(&path).unwrap(), table);
    }

    #[test]
    fn test_exposure_rows_must_align() {
        let (store, _) = simulate_exposed_triads(&SimulationParams::default(), 2);
        let exposures = ExposureMatrix::from_rows(&[vec![0], vec![1]]).unwrap();
        let scorer = FitnessScorer::new(ScoringConfig::default())
            .unwrap()
            .with_mode(exposure_mode(exposures, unit_calibration(2)));
        assert!(matches!(
            scorer.score(&store, &[0, 1]),
            Err(GadgetsError::InvalidInput(_))
        ));
    }
}
