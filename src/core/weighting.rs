// weighting.rs - Family weights and per-SNP transmission votes

use crate::data::{GenotypeMatrix, GenotypeStore, MISSING_GENOTYPE};
use crate::error::{GadgetsError, Result};
use serde::{Deserialize, Serialize};

/// Parameters of the weighted difference index and its exponential weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightConfig {
    /// Base of the family weight, `w = base^x`
    pub weight_function_int: u32,
    /// Contribution of each SNP where case and complement differ
    pub n_different_snps_weight: u32,
    /// Contribution of each SNP where case and complement are both heterozygous
    pub n_both_one_weight: u32,
    /// Largest candidate set the lookup table must cover
    pub max_chrom_size: usize,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            weight_function_int: 2,
            n_different_snps_weight: 2,
            n_both_one_weight: 1,
            max_chrom_size: 6,
        }
    }
}

/// Precomputed `weight_function_int^0 ..= weight_function_int^x_max`
#[derive(Debug, Clone)]
pub struct WeightLookup {
    config: WeightConfig,
    table: Vec<f64>,
}

impl WeightLookup {
    pub fn new(config: WeightConfig) -> Result<Self> {
        if config.weight_function_int == 0 {
            return Err(GadgetsError::InvalidInput(
                "weight_function_int must be at least 1".to_string(),
            ));
        }
        if config.max_chrom_size == 0 {
            return Err(GadgetsError::InvalidInput(
                "max_chrom_size must be at least 1".to_string(),
            ));
        }
        // Differing and both-heterozygous are exclusive per SNP
        let per_snp = config.n_different_snps_weight.max(config.n_both_one_weight) as usize;
        let x_max = config.max_chrom_size * per_snp;
        let base = config.weight_function_int as f64;
        let table = (0..=x_max).map(|x| base.powi(x as i32)).collect();
        Ok(Self { config, table })
    }

    pub fn config(&self) -> &WeightConfig {
        &self.config
    }

    pub fn x_max(&self) -> u32 {
        (self.table.len() - 1) as u32
    }

    #[inline]
    pub fn weight(&self, x: u32) -> f64 {
        self.table[x as usize]
    }
}

/// Weighted difference index for one family and fill `votes` with
/// `sign(case - complement)` per SNP. Returns `None` when any genotype in the
/// set is missing for either member; `votes` is then left zeroed.
#[inline]
pub fn family_votes<M: GenotypeMatrix>(
    store: &GenotypeStore<M>,
    row: usize,
    snps: &[usize],
    config: &WeightConfig,
    votes: &mut [i8],
) -> Option<u32> {
    let mut n_different = 0u32;
    let mut n_both_one = 0u32;
    for (j, &col) in snps.iter().enumerate() {
        let case = store.case().get(row, col);
        let comp = store.complement().get(row, col);
        if case == MISSING_GENOTYPE || comp == MISSING_GENOTYPE {
            votes.iter_mut().for_each(|v| *v = 0);
            return None;
        }
        votes[j] = (case as i8 - comp as i8).signum();
        if case != comp {
            n_different += 1;
        } else if case == 1 {
            n_both_one += 1;
        }
    }
    Some(config.n_different_snps_weight * n_different + config.n_both_one_weight * n_both_one)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DenseGenotypeMatrix, SnpMetadata};

    fn store(case: Vec<i64>, comp: Vec<i64>) -> GenotypeStore {
        let n = case.len();
        GenotypeStore::new(
            DenseGenotypeMatrix::from_rows(&[case]).unwrap(),
            DenseGenotypeMatrix::from_rows(&[comp]).unwrap(),
            SnpMetadata::independent(n),
        )
        .unwrap()
    }

    #[test]
    fn test_weighted_difference_index() {
        let s = store(vec![2, 1, 0, 1], vec![1, 1, 0, 2]);
        let cfg = WeightConfig::default();
        let mut votes = [0i8; 4];
        let x = family_votes(&s, 0, &[0, 1, 2, 3], &cfg, &mut votes).unwrap();
        // two differing SNPs (weight 2) and one both-heterozygous SNP (weight 1)
        assert_eq!(x, 2 * 2 + 1);
        assert_eq!(votes, [1, 0, 0, -1]);
    }

    #[test]
    fn test_missing_family_excluded() {
        let s = store(vec![2, -9], vec![1, 1]);
        let mut votes = [5i8; 2];
        assert!(family_votes(&s, 0, &[0, 1], &WeightConfig::default(), &mut votes).is_none());
        assert_eq!(votes, [0, 0]);
        // The missing column is not part of this set
        assert_eq!(
            family_votes(&s, 0, &[0], &WeightConfig::default(), &mut votes[..1]),
            Some(2)
        );
    }

    #[test]
    fn test_weight_monotone_in_x() {
        let lookup = WeightLookup::new(WeightConfig::default()).unwrap();
        assert_eq!(lookup.x_max(), 12);
        assert_eq!(lookup.weight(0), 1.0);
        assert_eq!(lookup.weight(3), 8.0);
        for x in 1..=lookup.x_max() {
            assert!(lookup.weight(x) >= lookup.weight(x - 1));
        }
    }

    #[test]
    fn test_zero_base_rejected() {
        let cfg = WeightConfig {
            weight_function_int: 0,
            ..WeightConfig::default()
        };
        assert!(WeightLookup::new(cfg).is_err());
    }
}
