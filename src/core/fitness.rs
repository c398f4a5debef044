// fitness.rs - Family-weighted transmission fitness score

use crate::core::aggregation::{AggregationRegistry, FitnessAggregation, DEFAULT_AGGREGATION};
use crate::core::exposure::{self, ExposureComponents, NullCalibrationTable};
use crate::core::weighting::{family_votes, WeightConfig, WeightLookup};
use crate::data::{ExposureMatrix, GenotypeMatrix, GenotypeStore};
use crate::error::{GadgetsError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Genotype a family member needs at one SNP to count as carrying the risk allele
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskRequirement {
    /// Dominant coding: one or two copies of the provisional risk allele
    AtLeastOne,
    /// Recessive coding: two copies of the provisional risk allele
    ExactlyTwo,
}

impl RiskRequirement {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskRequirement::AtLeastOne => "1+",
            RiskRequirement::ExactlyTwo => "2",
        }
    }
}

/// Output of one scorer invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessResult {
    pub fitness_score: f64,
    /// Standardized weighted mean transmission per SNP; positive means the
    /// counted (minor) allele is the provisional risk allele
    pub difference_vector: Vec<f64>,
    pub informativeness: Vec<f64>,
    pub risk_requirement: Vec<RiskRequirement>,
    /// Families where exactly one member carries the full risk set
    pub n_informative_families: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub informative_family_indices: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure: Option<ExposureComponents>,
}

impl FitnessResult {
    /// Returned when no complete family differs at any SNP of the set
    pub fn insufficient() -> Self {
        Self {
            fitness_score: 0.0,
            difference_vector: Vec::new(),
            informativeness: Vec::new(),
            risk_requirement: Vec::new(),
            n_informative_families: 0,
            informative_family_indices: None,
            exposure: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.difference_vector.is_empty()
    }
}

/// Scorer parameters shared by every call within an analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: WeightConfig,
    pub recessive_ref_prop: f64,
    pub recode_test_stat: f64,
    pub return_informative_indices: bool,
    pub aggregation: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: WeightConfig::default(),
            recessive_ref_prop: 0.75,
            recode_test_stat: 1.64,
            return_informative_indices: false,
            aggregation: DEFAULT_AGGREGATION.to_string(),
        }
    }
}

/// Which fitness the scorer computes, selected once per analysis
#[derive(Debug, Clone)]
pub enum ScoringMode {
    Transmission,
    ExposureAware {
        exposures: Arc<ExposureMatrix>,
        calibration: Arc<NullCalibrationTable>,
    },
}

/// Stateless, re-entrant fitness scorer
#[derive(Debug, Clone)]
pub struct FitnessScorer {
    config: ScoringConfig,
    lookup: WeightLookup,
    aggregation: Arc<dyn FitnessAggregation>,
    mode: ScoringMode,
}

impl FitnessScorer {
    pub fn new(config: ScoringConfig) -> Result<Self> {
        if !(config.recessive_ref_prop > 0.0 && config.recessive_ref_prop < 1.0) {
            return Err(GadgetsError::InvalidInput(format!(
                "recessive_ref_prop must be in (0, 1), got {}",
                config.recessive_ref_prop
            )));
        }
        if !config.recode_test_stat.is_finite() {
            return Err(GadgetsError::InvalidInput(
                "recode_test_stat must be finite".to_string(),
            ));
        }
        let registry = AggregationRegistry::new();
        let aggregation = registry.get(&config.aggregation).ok_or_else(|| {
            GadgetsError::InvalidInput(format!(
                "Unknown aggregation '{}'. Available: {}",
                config.aggregation,
                registry.names().join(", ")
            ))
        })?;
        let lookup = WeightLookup::new(config.weights)?;
        Ok(Self {
            config,
            lookup,
            aggregation,
            mode: ScoringMode::Transmission,
        })
    }

    pub fn with_mode(mut self, mode: ScoringMode) -> Self {
        self.mode = mode;
        self
    }

    /// Same scorer with a different exposure matrix (exposure permutation replicates)
    pub fn with_exposures(&self, exposures: Arc<ExposureMatrix>) -> Result<Self> {
        match &self.mode {
            ScoringMode::ExposureAware { calibration, .. } => Ok(Self {
                mode: ScoringMode::ExposureAware {
                    exposures,
                    calibration: Arc::clone(calibration),
                },
                ..self.clone()
            }),
            ScoringMode::Transmission => Err(GadgetsError::InvalidInput(
                "Exposures can only be swapped on an exposure-aware scorer".to_string(),
            )),
        }
    }

    /// Copy that also reports informative family rows
    pub fn reporting_informative(&self) -> Self {
        let mut scorer = self.clone();
        scorer.config.return_informative_indices = true;
        scorer
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn mode(&self) -> &ScoringMode {
        &self.mode
    }

    pub(crate) fn lookup(&self) -> &WeightLookup {
        &self.lookup
    }

    pub(crate) fn aggregation(&self) -> &dyn FitnessAggregation {
        self.aggregation.as_ref()
    }

    /// Score one candidate SNP set against the store.
    ///
    /// Data problems (missing genotypes, no informative family) are absorbed
    /// into a sentinel result; only malformed indices are errors.
    pub fn score<M: GenotypeMatrix>(
        &self,
        store: &GenotypeStore<M>,
        snps: &[usize],
    ) -> Result<FitnessResult> {
        self.validate(store, snps)?;
        match &self.mode {
            ScoringMode::Transmission => {
                let table = FamilyTable::build(store, snps, &self.lookup);
                if !table.has_signal() {
                    return Ok(FitnessResult::insufficient());
                }
                let core = transmission_core(&table, &self.config, self.aggregation(), true);
                Ok(core.into_result(&table, self.config.return_informative_indices, None))
            }
            ScoringMode::ExposureAware {
                exposures,
                calibration,
            } => exposure::score_exposure_aware(self, store, exposures, calibration, snps),
        }
    }

    pub(crate) fn validate<M: GenotypeMatrix>(
        &self,
        store: &GenotypeStore<M>,
        snps: &[usize],
    ) -> Result<()> {
        store.validate_candidate(snps)?;
        if snps.len() > self.config.weights.max_chrom_size {
            return Err(GadgetsError::InvalidCandidateSet {
                snps: snps.to_vec(),
                reason: format!(
                    "set size {} exceeds max_chrom_size {}",
                    snps.len(),
                    self.config.weights.max_chrom_size
                ),
            });
        }
        Ok(())
    }
}

/// Complete families for one candidate set, gathered once per call
pub(crate) struct FamilyTable {
    pub(crate) k: usize,
    pub(crate) rows: Vec<usize>,
    weights: Vec<f64>,
    votes: Vec<i8>,
    case: Vec<u8>,
    comp: Vec<u8>,
    n_with_signal: usize,
}

impl FamilyTable {
    pub(crate) fn build<M: GenotypeMatrix>(
        store: &GenotypeStore<M>,
        snps: &[usize],
        lookup: &WeightLookup,
    ) -> Self {
        let k = snps.len();
        let n = store.n_families();
        let mut table = Self {
            k,
            rows: Vec::with_capacity(n),
            weights: Vec::with_capacity(n),
            votes: Vec::with_capacity(n * k),
            case: Vec::with_capacity(n * k),
            comp: Vec::with_capacity(n * k),
            n_with_signal: 0,
        };
        let mut votes = vec![0i8; k];
        for row in 0..n {
            let Some(x) = family_votes(store, row, snps, lookup.config(), &mut votes) else {
                continue;
            };
            if x > 0 {
                table.n_with_signal += 1;
            }
            table.rows.push(row);
            table.weights.push(lookup.weight(x));
            table.votes.extend_from_slice(&votes);
            for &col in snps {
                table.case.push(store.case().get(row, col));
                table.comp.push(store.complement().get(row, col));
            }
        }
        table
    }

    pub(crate) fn has_signal(&self) -> bool {
        self.n_with_signal > 0
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    fn genotypes(&self, family: usize, j: usize) -> (u8, u8) {
        let idx = family * self.k + j;
        (self.case[idx], self.comp[idx])
    }

    /// Weighted mean of `vote(family)` divided by its pseudo standard error
    fn standardize(&self, vote: impl Fn(usize) -> f64) -> f64 {
        let mut sum_w = 0.0;
        let mut sum_w2 = 0.0;
        let mut sum_wv = 0.0;
        for (f, &w) in self.weights.iter().enumerate() {
            sum_w += w;
            sum_w2 += w * w;
            sum_wv += w * vote(f);
        }
        if sum_w <= 0.0 {
            return 0.0;
        }
        let mean = sum_wv / sum_w;
        let ss: f64 = self
            .weights
            .iter()
            .enumerate()
            .map(|(f, &w)| {
                let dev = vote(f) - mean;
                w * w * dev * dev
            })
            .sum();
        let mut se = ss.sqrt() / sum_w;
        if se <= 0.0 {
            // every family voted identically
            se = sum_w2.sqrt() / sum_w;
        }
        mean / se
    }
}

#[inline]
pub(crate) fn is_carrier(genotype: u8, positive: bool, requirement: RiskRequirement) -> bool {
    match (positive, requirement) {
        (true, RiskRequirement::AtLeastOne) => genotype >= 1,
        (true, RiskRequirement::ExactlyTwo) => genotype == 2,
        (false, RiskRequirement::AtLeastOne) => genotype <= 1,
        (false, RiskRequirement::ExactlyTwo) => genotype == 0,
    }
}

/// Per-SNP conditional informativeness: among families where both members
/// carry the risk genotype at every other SNP and exactly one carries it at
/// SNP j, the share where that member is the case. Returns (q_j, n_j).
fn conditional_informativeness(
    table: &FamilyTable,
    positive: &[bool],
    requirements: &[RiskRequirement],
) -> Vec<(f64, usize)> {
    let k = table.k;
    let mut case_hits = vec![0usize; k];
    let mut totals = vec![0usize; k];
    let mut case_flags = vec![false; k];
    let mut comp_flags = vec![false; k];

    for f in 0..table.len() {
        let mut n_both = 0;
        for j in 0..k {
            let (c, p) = table.genotypes(f, j);
            case_flags[j] = is_carrier(c, positive[j], requirements[j]);
            comp_flags[j] = is_carrier(p, positive[j], requirements[j]);
            if case_flags[j] && comp_flags[j] {
                n_both += 1;
            }
        }
        for j in 0..k {
            let both_j = (case_flags[j] && comp_flags[j]) as usize;
            if n_both - both_j == k - 1 && case_flags[j] != comp_flags[j] {
                totals[j] += 1;
                if case_flags[j] {
                    case_hits[j] += 1;
                }
            }
        }
    }

    totals
        .iter()
        .zip(&case_hits)
        .map(|(&n, &hits)| {
            let q = if n > 0 { hits as f64 / n as f64 } else { 0.0 };
            (q, n)
        })
        .collect()
}

/// Families where exactly one member carries the full risk set, as
/// (table index, case is the carrier)
pub(crate) fn joint_carriers(
    table: &FamilyTable,
    positive: &[bool],
    requirements: &[RiskRequirement],
) -> Vec<(usize, bool)> {
    (0..table.len())
        .filter_map(|f| {
            let mut case_full = true;
            let mut comp_full = true;
            for j in 0..table.k {
                let (c, p) = table.genotypes(f, j);
                case_full &= is_carrier(c, positive[j], requirements[j]);
                comp_full &= is_carrier(p, positive[j], requirements[j]);
            }
            (case_full != comp_full).then_some((f, case_full))
        })
        .collect()
}

/// Everything the transmission score derives from a family table
pub(crate) struct TransmissionCore {
    pub(crate) difference_vector: Vec<f64>,
    pub(crate) informativeness: Vec<f64>,
    pub(crate) requirements: Vec<RiskRequirement>,
    pub(crate) joint: Vec<(usize, bool)>,
    pub(crate) fitness: f64,
}

impl TransmissionCore {
    pub(crate) fn into_result(
        self,
        table: &FamilyTable,
        return_indices: bool,
        exposure: Option<ExposureComponents>,
    ) -> FitnessResult {
        let informative_family_indices = return_indices
            .then(|| self.joint.iter().map(|&(f, _)| table.rows[f]).collect());
        FitnessResult {
            fitness_score: self.fitness,
            difference_vector: self.difference_vector,
            informativeness: self.informativeness,
            risk_requirement: self.requirements,
            n_informative_families: self.joint.len(),
            informative_family_indices,
            exposure,
        }
    }
}

pub(crate) fn transmission_core(
    table: &FamilyTable,
    config: &ScoringConfig,
    aggregation: &dyn FitnessAggregation,
    allow_recode: bool,
) -> TransmissionCore {
    let k = table.k;
    let mut difference_vector: Vec<f64> = (0..k)
        .map(|j| table.standardize(|f| table.votes[f * k + j] as f64))
        .collect();
    let positive: Vec<bool> = difference_vector.iter().map(|&d| d > 0.0).collect();
    let mut requirements = vec![RiskRequirement::AtLeastOne; k];

    if allow_recode {
        let p0 = config.recessive_ref_prop;
        // decided from the dominant coding so SNP order cannot matter
        let recode: Vec<bool> = (0..k)
            .map(|j| {
                let mut trial = vec![RiskRequirement::AtLeastOne; k];
                trial[j] = RiskRequirement::ExactlyTwo;
                let (q2, n2) = conditional_informativeness(table, &positive, &trial)[j];
                if n2 == 0 {
                    return false;
                }
                let z = (q2 - p0) / (p0 * (1.0 - p0) / n2 as f64).sqrt();
                z > config.recode_test_stat
            })
            .collect();

        for j in (0..k).filter(|&j| recode[j]) {
            requirements[j] = RiskRequirement::ExactlyTwo;
            let orientation = if positive[j] { 1.0 } else { -1.0 };
            difference_vector[j] = orientation
                * table.standardize(|f| {
                    let (c, p) = table.genotypes(f, j);
                    let case_two = is_carrier(c, positive[j], RiskRequirement::ExactlyTwo) as i8;
                    let comp_two = is_carrier(p, positive[j], RiskRequirement::ExactlyTwo) as i8;
                    (case_two - comp_two) as f64
                });
        }
    }

    let informativeness = conditional_informativeness(table, &positive, &requirements)
        .into_iter()
        .map(|(q, _)| q)
        .collect();

    let joint = joint_carriers(table, &positive, &requirements);
    let n_case = joint.iter().filter(|&&(_, case)| case).count();
    let q = if joint.is_empty() {
        0.0
    } else {
        n_case as f64 / joint.len() as f64
    };
    let fitness = aggregation.aggregate(q, &difference_vector);

    TransmissionCore {
        difference_vector,
        informativeness,
        requirements,
        joint,
        fitness,
    }
}
