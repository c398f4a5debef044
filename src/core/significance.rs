// significance.rs - Permutation tests for single SNP sets and the global test

use crate::core::fitness::{FitnessResult, FitnessScorer, ScoringMode};
use crate::core::permutation::PermutationEngine;
use crate::data::{GenotypeMatrix, GenotypeStore, SnpMetadata, SnpRole};
use crate::error::{GadgetsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermutationTestConfig {
    pub n_permutations: usize,
    pub seed: u64,
    pub show_progress: bool,
}

impl Default for PermutationTestConfig {
    fn default() -> Self {
        Self {
            n_permutations: 10_000,
            seed: 1,
            show_progress: false,
        }
    }
}

/// Observed score, permuted scores and their one-sided tail proportion.
///
/// `p_value` is a valid p-value only when `snps` was chosen independently
/// of the tested data. For a set picked by searching the same data (the top
/// chromosome of a GA run) it is an h-value and is not uniform under the null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermutationTestResult {
    pub snps: Vec<usize>,
    pub observed: f64,
    pub permuted: Vec<f64>,
    pub p_value: f64,
}

impl PermutationTestResult {
    pub fn new(snps: &[usize], observed: f64, permuted: Vec<f64>) -> Self {
        let p_value = if permuted.is_empty() {
            1.0
        } else {
            permuted.iter().filter(|&&s| s >= observed).count() as f64 / permuted.len() as f64
        };
        Self {
            snps: snps.to_vec(),
            observed,
            permuted,
            p_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MaternalFetalOutcome {
    Tested(PermutationTestResult),
    /// Preconditions unmet; no score was computed
    NotApplicable { reason: String },
}

/// Observed score with informative families; a sentinel is an error here
fn observed_score<M: GenotypeMatrix>(
    scorer: &FitnessScorer,
    store: &GenotypeStore<M>,
    snps: &[usize],
) -> Result<FitnessResult> {
    let result = scorer.reporting_informative().score(store, snps)?;
    if result.is_sentinel() || result.n_informative_families == 0 {
        return Err(GadgetsError::InsufficientData(snps.to_vec()));
    }
    Ok(result)
}

/// Positions of `snps` grouped by LD block, in order of first appearance
fn block_groups(metadata: &SnpMetadata, snps: &[usize]) -> Vec<Vec<usize>> {
    let mut by_block: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (p, &col) in snps.iter().enumerate() {
        by_block.entry(metadata.block_of(col)).or_default().push(p);
    }
    let mut groups: Vec<Vec<usize>> = by_block.into_values().collect();
    groups.sort_by_key(|g| g[0]);
    groups
}

/// Block-shuffle null over the observed informative families
fn block_shuffle_scores<M: GenotypeMatrix>(
    scorer: &FitnessScorer,
    store: &GenotypeStore<M>,
    snps: &[usize],
    groups: &[Vec<usize>],
    families: &[usize],
    config: &PermutationTestConfig,
) -> Result<Vec<f64>> {
    let engine = PermutationEngine::new(config.seed);
    let subset = store.subset_columns(snps)?;
    let all: Vec<usize> = (0..snps.len()).collect();
    let positions: Vec<usize> = (0..snps.len()).collect();
    engine.permuted_scores(config.n_permutations, config.show_progress, |i| {
        let replicate = engine.block_shuffle_replicate(&subset, &all, groups, families, i)?;
        Ok(scorer.score(&replicate, &positions)?.fitness_score)
    })
}

/// Epistasis test: is the joint signal of `snps` stronger than its parts?
///
/// The null re-pairs the informative families' genotypes independently per
/// LD block, which keeps each block's marginal transmission and breaks the
/// joint pattern. A set inside a single block has no joint structure to
/// break and falls back to label-swap replicates.
pub fn epistasis_test<M: GenotypeMatrix>(
    scorer: &FitnessScorer,
    store: &GenotypeStore<M>,
    snps: &[usize],
    config: &PermutationTestConfig,
) -> Result<PermutationTestResult> {
    let observed = observed_score(scorer, store, snps)?;
    let groups = block_groups(store.metadata(), snps);

    let permuted = if groups.len() < 2 {
        log::info!(
            "SNP set {:?} lies in one LD block; using label-swap replicates",
            snps
        );
        let engine = PermutationEngine::new(config.seed);
        let subset = store.subset_columns(snps)?;
        let positions: Vec<usize> = (0..snps.len()).collect();
        engine.permuted_scores(config.n_permutations, config.show_progress, |i| {
            let replicate = engine.label_replicate(&subset, i)?;
            Ok(scorer.score(&replicate, &positions)?.fitness_score)
        })?
    } else {
        let families = observed.informative_family_indices.clone().unwrap_or_default();
        block_shuffle_scores(scorer, store, snps, &groups, &families, config)?
    };

    log::debug!(
        "Epistasis test on {:?}: observed {:.4}, {} permutations",
        snps,
        observed.fitness_score,
        permuted.len()
    );
    Ok(PermutationTestResult::new(snps, observed.fitness_score, permuted))
}

/// Maternal and child positions of `snps`, or a policy violation
fn maternal_fetal_groups(metadata: &SnpMetadata, snps: &[usize]) -> Result<Vec<Vec<usize>>> {
    let (maternal, child): (Vec<usize>, Vec<usize>) =
        (0..snps.len()).partition(|&p| metadata.role_of(snps[p]) == SnpRole::Maternal);
    if maternal.is_empty() || child.is_empty() {
        return Err(GadgetsError::PolicyViolation(format!(
            "SNP set {:?} must contain both maternal and child SNPs",
            snps
        )));
    }
    for &m in &maternal {
        for &c in &child {
            if metadata.block_of(snps[m]) == metadata.block_of(snps[c]) {
                return Err(GadgetsError::PolicyViolation(format!(
                    "maternal SNP {} and child SNP {} share LD block {}",
                    snps[m],
                    snps[c],
                    metadata.block_of(snps[m])
                )));
            }
        }
    }
    Ok(vec![maternal, child])
}

/// Maternal-fetal interaction test.
///
/// Re-pairs maternal and child genotypes within informative families, so
/// purely maternal or purely child effects survive under the null.
pub fn maternal_fetal_test<M: GenotypeMatrix>(
    scorer: &FitnessScorer,
    store: &GenotypeStore<M>,
    snps: &[usize],
    config: &PermutationTestConfig,
) -> Result<MaternalFetalOutcome> {
    store.validate_candidate(snps)?;
    let groups = match maternal_fetal_groups(store.metadata(), snps) {
        Ok(groups) => groups,
        Err(GadgetsError::PolicyViolation(reason)) => {
            log::warn!("Maternal-fetal test not applicable: {}", reason);
            return Ok(MaternalFetalOutcome::NotApplicable { reason });
        }
        Err(e) => return Err(e),
    };

    let observed = observed_score(scorer, store, snps)?;
    let families = observed.informative_family_indices.clone().unwrap_or_default();
    let permuted = block_shuffle_scores(scorer, store, snps, &groups, &families, config)?;
    Ok(MaternalFetalOutcome::Tested(PermutationTestResult::new(
        snps,
        observed.fitness_score,
        permuted,
    )))
}

/// GxE test: exposure-aware score against exposure-shuffled replicates
pub fn gxe_test<M: GenotypeMatrix>(
    scorer: &FitnessScorer,
    store: &GenotypeStore<M>,
    snps: &[usize],
    config: &PermutationTestConfig,
) -> Result<PermutationTestResult> {
    let ScoringMode::ExposureAware { exposures, .. } = scorer.mode() else {
        return Err(GadgetsError::InvalidInput(
            "GxE test requires an exposure-aware scorer".to_string(),
        ));
    };
    let observed = observed_score(scorer, store, snps)?;

    let engine = PermutationEngine::new(config.seed);
    let subset = store.subset_columns(snps)?;
    let positions: Vec<usize> = (0..snps.len()).collect();
    let permuted = engine.permuted_scores(config.n_permutations, config.show_progress, |i| {
        let shuffled = engine.exposure_replicate(exposures, i)?;
        Ok(scorer
            .with_exposures(Arc::new(shuffled))?
            .score(&subset, &positions)?
            .fitness_score)
    })?;
    Ok(PermutationTestResult::new(snps, observed.fitness_score, permuted))
}

/// Observed and permuted top-K scores for one chromosome size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeScores {
    pub chrom_size: usize,
    pub observed: Vec<f64>,
    /// One top-K vector per permuted dataset
    pub permuted: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeSummary {
    pub chrom_size: usize,
    /// 95th percentile of the per-replicate maximum score
    pub threshold: f64,
    pub statistic: f64,
    pub null_mean: Vec<f64>,
    pub null_sd: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalTestResult {
    pub p_value: f64,
    pub statistic: f64,
    pub n_replicates: usize,
    pub per_size: Vec<SizeSummary>,
}

fn sorted_desc(scores: &[f64]) -> Vec<f64> {
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    sorted
}

/// Linear-interpolated percentile of an ascending slice
fn percentile(sorted_asc: &[f64], fraction: f64) -> f64 {
    let h = (sorted_asc.len() - 1) as f64 * fraction;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted_asc.len() - 1);
    sorted_asc[lo] + (h - lo as f64) * (sorted_asc[hi] - sorted_asc[lo])
}

fn standardized_mean(scores: &[f64], mean: &[f64], sd: &[f64]) -> f64 {
    let total: f64 = scores
        .iter()
        .zip(mean.iter().zip(sd))
        .map(|(x, (m, s))| {
            let s = if *s > 0.0 { *s } else { 1.0 };
            (x - m) / s
        })
        .sum();
    total / scores.len() as f64
}

/// Global test over several chromosome sizes.
///
/// Per size, ranks are standardized with the permutation moments of each
/// rank and averaged; the statistic is the maximum over sizes. Every
/// permuted dataset gets the same statistic, giving
/// `p = (1 + #{T_r >= T_obs}) / (R + 1)`.
pub fn global_test(sizes: &[SizeScores]) -> Result<GlobalTestResult> {
    let first = sizes
        .first()
        .ok_or_else(|| GadgetsError::InvalidInput("Global test needs at least one size".to_string()))?;
    let n_replicates = first.permuted.len();
    if n_replicates == 0 {
        return Err(GadgetsError::InvalidInput(
            "Global test needs at least one permuted dataset".to_string(),
        ));
    }

    let mut per_size = Vec::with_capacity(sizes.len());
    let mut observed_stat = f64::NEG_INFINITY;
    let mut replicate_stats = vec![f64::NEG_INFINITY; n_replicates];

    for size in sizes {
        let k = size.observed.len();
        if k == 0 {
            return Err(GadgetsError::InvalidInput(format!(
                "No observed scores for chromosome size {}",
                size.chrom_size
            )));
        }
        if size.permuted.len() != n_replicates {
            return Err(GadgetsError::InvalidInput(format!(
                "Chromosome size {} has {} permuted datasets, expected {}",
                size.chrom_size,
                size.permuted.len(),
                n_replicates
            )));
        }
        if let Some(bad) = size.permuted.iter().find(|p| p.len() != k) {
            return Err(GadgetsError::InvalidInput(format!(
                "Chromosome size {}: permuted top-K has {} scores, observed has {}",
                size.chrom_size,
                bad.len(),
                k
            )));
        }

        let permuted: Vec<Vec<f64>> = size.permuted.iter().map(|p| sorted_desc(p)).collect();
        let observed = sorted_desc(&size.observed);

        let r = n_replicates as f64;
        let null_mean: Vec<f64> = (0..k)
            .map(|rank| permuted.iter().map(|p| p[rank]).sum::<f64>() / r)
            .collect();
        let null_sd: Vec<f64> = (0..k)
            .map(|rank| {
                if n_replicates < 2 {
                    return 0.0;
                }
                let ss: f64 = permuted
                    .iter()
                    .map(|p| (p[rank] - null_mean[rank]).powi(2))
                    .sum();
                (ss / (r - 1.0)).sqrt()
            })
            .collect();

        let statistic = standardized_mean(&observed, &null_mean, &null_sd);
        observed_stat = observed_stat.max(statistic);
        for (slot, p) in replicate_stats.iter_mut().zip(&permuted) {
            *slot = slot.max(standardized_mean(p, &null_mean, &null_sd));
        }

        let mut maxima: Vec<f64> = permuted.iter().map(|p| p[0]).collect();
        maxima.sort_by(|a, b| a.total_cmp(b));
        per_size.push(SizeSummary {
            chrom_size: size.chrom_size,
            threshold: percentile(&maxima, 0.95),
            statistic,
            null_mean,
            null_sd,
        });
    }

    let exceed = replicate_stats.iter().filter(|&&t| t >= observed_stat).count();
    let p_value = (1 + exceed) as f64 / (n_replicates + 1) as f64;
    log::info!(
        "Global test: statistic {:.4}, p = {:.4} over {} permuted datasets",
        observed_stat,
        p_value,
        n_replicates
    );
    Ok(GlobalTestResult {
        p_value,
        statistic: observed_stat,
        n_replicates,
        per_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::exposure::{exposure_mode, NullCalibration, NullCalibrationTable};
    use crate::core::fitness::ScoringConfig;
    use crate::data::{DenseGenotypeMatrix, ExposureMatrix};
    use crate::testing::{simulate_exposed_triads, simulate_triads, SimulationParams};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn quick(n: usize) -> PermutationTestConfig {
        PermutationTestConfig {
            n_permutations: n,
            seed: 5,
            show_progress: false,
        }
    }

    fn scorer() -> FitnessScorer {
        FitnessScorer::new(ScoringConfig::default()).unwrap()
    }

    #[test]
    fn test_p_value_is_tail_proportion() {
        let result = PermutationTestResult::new(&[1, 2], 2.0, vec![1.0, 2.0, 3.0, 0.5]);
        assert_eq!(result.p_value, 0.5);
    }

    #[test]
    fn test_epistasis_test_reproducible() {
        let params = SimulationParams {
            n_families: 300,
            ..SimulationParams::default()
        };
        let store = simulate_triads(&params, 31);
        let a = epistasis_test(&scorer(), &store, &[2, 5, 8], &quick(40)).unwrap();
        let b = epistasis_test(&scorer(), &store, &[2, 5, 8], &quick(40)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.permuted.len(), 40);
        assert_eq!(a.observed, scorer().score(&store, &[2, 5, 8]).unwrap().fitness_score);
        assert!((0.0..=1.0).contains(&a.p_value));
    }

    #[test]
    fn test_single_block_set_uses_label_swaps() {
        let params = SimulationParams {
            n_families: 200,
            ..SimulationParams::default()
        };
        let (case, comp, _) = simulate_triads(&params, 8).into_parts();
        let store = GenotypeStore::new(
            case,
            comp,
            SnpMetadata::from_block_ends(&[9], 10).unwrap(),
        )
        .unwrap();
        let result = epistasis_test(&scorer(), &store, &[2, 5], &quick(30)).unwrap();
        assert_eq!(result.permuted.len(), 30);
        // label swaps destroy the transmission signal
        assert!(result.p_value < 0.2);
    }

    #[test]
    fn test_sentinel_observed_is_insufficient_data() {
        let store = GenotypeStore::new(
            DenseGenotypeMatrix::from_rows(&[vec![1, 1], vec![0, 2]]).unwrap(),
            DenseGenotypeMatrix::from_rows(&[vec![1, 1], vec![0, 2]]).unwrap(),
            SnpMetadata::independent(2),
        )
        .unwrap();
        assert!(matches!(
            epistasis_test(&scorer(), &store, &[0, 1], &quick(10)),
            Err(GadgetsError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_maternal_fetal_same_block_not_applicable() {
        let (case, comp, _) = simulate_triads(&SimulationParams::default(), 12).into_parts();
        // blocks: {0..=2}, {3..=5}, {6..=9}; SNP 1 maternal shares a block with child SNP 2
        let metadata = SnpMetadata::from_block_ends(&[2, 5, 9], 10)
            .unwrap()
            .with_maternal(&[1])
            .unwrap();
        let store = GenotypeStore::new(case, comp, metadata).unwrap();
        let outcome = maternal_fetal_test(&scorer(), &store, &[1, 2, 5], &quick(10)).unwrap();
        assert!(matches!(outcome, MaternalFetalOutcome::NotApplicable { .. }));
    }

    #[test]
    fn test_maternal_fetal_requires_both_roles() {
        let store = simulate_triads(&SimulationParams::default(), 13);
        let outcome = maternal_fetal_test(&scorer(), &store, &[2, 5], &quick(10)).unwrap();
        match outcome {
            MaternalFetalOutcome::NotApplicable { reason } => assert!(reason.contains("maternal")),
            other => panic!("expected not applicable, got {:?}", other),
        }
    }

    #[test]
    fn test_maternal_fetal_tested_when_blocks_disjoint() {
        let params = SimulationParams {
            n_families: 300,
            ..SimulationParams::default()
        };
        let (case, comp, _) = simulate_triads(&params, 14).into_parts();
        let metadata = SnpMetadata::independent(10).with_maternal(&[2]).unwrap();
        let store = GenotypeStore::new(case, comp, metadata).unwrap();
        match maternal_fetal_test(&scorer(), &store, &[2, 5, 8], &quick(25)).unwrap() {
            MaternalFetalOutcome::Tested(result) => {
                assert_eq!(result.permuted.len(), 25);
                assert!((0.0..=1.0).contains(&result.p_value));
            }
            other => panic!("expected a test result, got {:?}", other),
        }
    }

    #[test]
    fn test_gxe_requires_exposure_mode() {
        let store = simulate_triads(&SimulationParams::default(), 15);
        assert!(matches!(
            gxe_test(&scorer(), &store, &[2, 5], &quick(5)),
            Err(GadgetsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_gxe_test_runs_exposure_permutations() {
        let params = SimulationParams {
            n_families: 400,
            causal: vec![1, 3],
            relative_risk: 10.0,
            ..SimulationParams::default()
        };
        let (store, exposures): (GenotypeStore, ExposureMatrix) = simulate_exposed_triads(&params, 16);
        let mut calibration = NullCalibrationTable::new();
        calibration.insert(NullCalibration {
            chrom_size: 2,
            n_samples: 0,
            seed: 0,
            null_mean: vec![0.0, 0.0],
            null_sd: vec![1.0, 1.0],
            created: String::new(),
        });
        let gxe_scorer = scorer().with_mode(exposure_mode(exposures, calibration));
        let result = gxe_test(&gxe_scorer, &store, &[1, 3], &quick(60)).unwrap();
        assert_eq!(result.permuted.len(), 60);
        assert!(result.p_value < 0.1);
    }

    fn global_input(seed: u64, n_replicates: usize) -> Vec<SizeScores> {
        let mut rng = StdRng::seed_from_u64(seed);
        [2usize, 3]
            .iter()
            .map(|&chrom_size| SizeScores {
                chrom_size,
                observed: (0..5).map(|_| rng.gen_range(0.0..10.0)).collect(),
                permuted: (0..n_replicates)
                    .map(|_| (0..5).map(|_| rng.gen_range(0.0..10.0)).collect())
                    .collect(),
            })
            .collect()
    }

    #[test]
    fn test_global_test_reproducible() {
        let a = global_test(&global_input(77, 50)).unwrap();
        let b = global_test(&global_input(77, 50)).unwrap();
        assert_eq!(a.p_value.to_bits(), b.p_value.to_bits());
        for (x, y) in a.per_size.iter().zip(&b.per_size) {
            assert_eq!(x.threshold.to_bits(), y.threshold.to_bits());
        }
        assert_eq!(a.per_size.len(), 2);
    }

    #[test]
    fn test_global_threshold_and_extreme_observation() {
        let sizes = vec![SizeScores {
            chrom_size: 3,
            observed: vec![100.0, 90.0],
            permuted: (0..21).map(|r| vec![r as f64, 0.0]).collect(),
        }];
        let result = global_test(&sizes).unwrap();
        // maxima 0..=20; 95th percentile at position 19
        assert!((result.per_size[0].threshold - 19.0).abs() < 1e-12);
        assert!((result.p_value - 1.0 / 22.0).abs() < 1e-12);
    }

    #[test]
    fn test_global_rejects_unequal_replicates() {
        let mut sizes = global_input(1, 10);
        sizes[1].permuted.pop();
        assert!(global_test(&sizes).is_err());
    }

    #[test]
    fn test_causal_triplet_outranks_random_sets() {
        let scorer = scorer();
        let mut wins = 0;
        let mut comparisons = 0;
        for sim in 0..10 {
            let store = simulate_triads(&SimulationParams::default(), 1000 + sim);
            let causal = scorer.score(&store, &[2, 5, 8]).unwrap().fitness_score;
            let mut rng = StdRng::seed_from_u64(sim);
            let mut drawn = 0;
            while drawn < 100 {
                let mut set = rand::seq::index::sample(&mut rng, 10, 3).into_vec();
                set.sort_unstable();
                if set == [2, 5, 8] {
                    continue;
                }
                drawn += 1;
                comparisons += 1;
                if causal > scorer.score(&store, &set).unwrap().fitness_score {
                    wins += 1;
                }
            }
        }
        assert!(wins as f64 / comparisons as f64 >= 0.95);
    }
}
