// genotype.rs - Case/complement genotype matrices and SNP metadata

use crate::error::{GadgetsError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Sentinel stored for any genotype outside {0, 1, 2}
pub const MISSING_GENOTYPE: u8 = u8::MAX;

/// Normalize a raw genotype call to {0, 1, 2} or the missing sentinel
pub fn normalize_genotype(value: i64) -> u8 {
    match value {
        0..=2 => value as u8,
        _ => MISSING_GENOTYPE,
    }
}

/// Random-access matrix of small integer genotypes (families x SNPs).
///
/// The scorer only ever goes through this trait, so an in-memory array and a
/// file-backed store are interchangeable.
pub trait GenotypeMatrix: Send + Sync {
    fn n_rows(&self) -> usize;
    fn n_cols(&self) -> usize;

    /// Genotype at (row, col); `MISSING_GENOTYPE` when missing
    fn get(&self, row: usize, col: usize) -> u8;

    fn is_missing(&self, row: usize, col: usize) -> bool {
        self.get(row, col) == MISSING_GENOTYPE
    }
}

/// Row-major in-memory genotype matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenseGenotypeMatrix {
    n_rows: usize,
    n_cols: usize,
    data: Vec<u8>,
}

impl DenseGenotypeMatrix {
    /// Build from a row-major buffer; values outside {0,1,2} become missing
    pub fn from_raw(n_rows: usize, n_cols: usize, mut data: Vec<u8>) -> Result<Self> {
        if data.len() != n_rows * n_cols {
            return Err(GadgetsError::InvalidInput(format!(
                "Genotype buffer has {} values, expected {} x {} = {}",
                data.len(),
                n_rows,
                n_cols,
                n_rows * n_cols
            )));
        }
        for value in data.iter_mut() {
            if *value > 2 {
                *value = MISSING_GENOTYPE;
            }
        }
        Ok(Self { n_rows, n_cols, data })
    }

    /// Build from integer rows (e.g. parsed text with -9 for missing)
    pub fn from_rows(rows: &[Vec<i64>]) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(GadgetsError::InvalidInput(format!(
                    "Genotype row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    n_cols
                )));
            }
            data.extend(row.iter().map(|&v| normalize_genotype(v)));
        }
        Ok(Self { n_rows, n_cols, data })
    }

    /// Slice over one family's genotypes
    pub fn row(&self, row: usize) -> &[u8] {
        &self.data[row * self.n_cols..(row + 1) * self.n_cols]
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, value: u8) {
        self.data[row * self.n_cols + col] = value;
    }

    /// Count of missing cells
    pub fn missing_count(&self) -> usize {
        self.data.iter().filter(|&&v| v == MISSING_GENOTYPE).count()
    }
}

impl GenotypeMatrix for DenseGenotypeMatrix {
    fn n_rows(&self) -> usize {
        self.n_rows
    }

    fn n_cols(&self) -> usize {
        self.n_cols
    }

    #[inline]
    fn get(&self, row: usize, col: usize) -> u8 {
        self.data[row * self.n_cols + col]
    }
}

/// Whose genotype a SNP column describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnpRole {
    Child,
    Maternal,
}

/// Per-column LD block membership and role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnpMetadata {
    block_ids: Vec<usize>,
    roles: Vec<SnpRole>,
}

impl SnpMetadata {
    /// Every SNP in its own block, all child SNPs
    pub fn independent(n_snps: usize) -> Self {
        Self {
            block_ids: (0..n_snps).collect(),
            roles: vec![SnpRole::Child; n_snps],
        }
    }

    /// Derive block ids from inclusive 0-based block upper bounds.
    /// Bounds must be strictly increasing and end at `n_snps - 1`.
    pub fn from_block_ends(block_ends: &[usize], n_snps: usize) -> Result<Self> {
        if n_snps == 0 {
            return Err(GadgetsError::InvalidInput("No SNP columns".to_string()));
        }
        if block_ends.is_empty() {
            return Err(GadgetsError::InvalidInput(
                "At least one LD block bound is required".to_string(),
            ));
        }
        if block_ends.windows(2).any(|w| w[0] >= w[1]) {
            return Err(GadgetsError::InvalidInput(format!(
                "LD block bounds must be strictly increasing: {:?}",
                block_ends
            )));
        }
        let last = *block_ends.last().unwrap_or(&0);
        if last != n_snps - 1 {
            return Err(GadgetsError::InvalidInput(format!(
                "Last LD block bound is {} but there are {} SNP columns",
                last, n_snps
            )));
        }

        let mut block_ids = Vec::with_capacity(n_snps);
        let mut start = 0;
        for (block, &end) in block_ends.iter().enumerate() {
            block_ids.extend(std::iter::repeat(block).take(end + 1 - start));
            start = end + 1;
        }

        Ok(Self {
            block_ids,
            roles: vec![SnpRole::Child; n_snps],
        })
    }

    /// Tag the given columns as maternal
    pub fn with_maternal(mut self, maternal: &[usize]) -> Result<Self> {
        for &col in maternal {
            let role = self.roles.get_mut(col).ok_or_else(|| {
                GadgetsError::InvalidInput(format!(
                    "Maternal SNP index {} out of range ({} SNPs)",
                    col,
                    self.block_ids.len()
                ))
            })?;
            *role = SnpRole::Maternal;
        }
        Ok(self)
    }

    pub fn n_snps(&self) -> usize {
        self.block_ids.len()
    }

    pub fn n_blocks(&self) -> usize {
        self.block_ids.last().map(|b| b + 1).unwrap_or(0)
    }

    pub fn block_of(&self, col: usize) -> usize {
        self.block_ids[col]
    }

    pub fn role_of(&self, col: usize) -> SnpRole {
        self.roles[col]
    }

    fn subset(&self, cols: &[usize]) -> Self {
        Self {
            block_ids: cols.iter().map(|&c| self.block_ids[c]).collect(),
            roles: cols.iter().map(|&c| self.roles[c]).collect(),
        }
    }
}

/// Immutable view over case/complement matrices plus SNP metadata
#[derive(Debug, Clone)]
pub struct GenotypeStore<M: GenotypeMatrix = DenseGenotypeMatrix> {
    case: M,
    complement: M,
    metadata: SnpMetadata,
}

impl<M: GenotypeMatrix> GenotypeStore<M> {
    pub fn new(case: M, complement: M, metadata: SnpMetadata) -> Result<Self> {
        if case.n_rows() != complement.n_rows() || case.n_cols() != complement.n_cols() {
            return Err(GadgetsError::InvalidInput(format!(
                "Case matrix is {}x{} but complement matrix is {}x{}",
                case.n_rows(),
                case.n_cols(),
                complement.n_rows(),
                complement.n_cols()
            )));
        }
        if metadata.n_snps() != case.n_cols() {
            return Err(GadgetsError::InvalidInput(format!(
                "SNP metadata describes {} columns, matrices have {}",
                metadata.n_snps(),
                case.n_cols()
            )));
        }
        Ok(Self {
            case,
            complement,
            metadata,
        })
    }

    pub fn n_families(&self) -> usize {
        self.case.n_rows()
    }

    pub fn n_snps(&self) -> usize {
        self.case.n_cols()
    }

    pub fn case(&self) -> &M {
        &self.case
    }

    pub fn complement(&self) -> &M {
        &self.complement
    }

    pub fn metadata(&self) -> &SnpMetadata {
        &self.metadata
    }

    /// Reject empty, out-of-range or duplicated candidate indices
    pub fn validate_candidate(&self, snps: &[usize]) -> Result<()> {
        let invalid = |reason: String| GadgetsError::InvalidCandidateSet {
            snps: snps.to_vec(),
            reason,
        };
        if snps.is_empty() {
            return Err(invalid("empty SNP set".to_string()));
        }
        if let Some(&bad) = snps.iter().find(|&&s| s >= self.n_snps()) {
            return Err(invalid(format!(
                "index {} out of range ({} SNPs)",
                bad,
                self.n_snps()
            )));
        }
        let mut seen = HashSet::with_capacity(snps.len());
        if let Some(&dup) = snps.iter().find(|&&s| !seen.insert(s)) {
            return Err(invalid(format!("index {} appears twice", dup)));
        }
        Ok(())
    }

    /// Materialize the given columns (in order) as a small dense store
    pub fn subset_columns(&self, snps: &[usize]) -> Result<GenotypeStore<DenseGenotypeMatrix>> {
        self.validate_candidate(snps)?;
        let n = self.n_families();
        let k = snps.len();
        let mut case = Vec::with_capacity(n * k);
        let mut complement = Vec::with_capacity(n * k);
        for row in 0..n {
            for &col in snps {
                case.push(self.case.get(row, col));
                complement.push(self.complement.get(row, col));
            }
        }
        GenotypeStore::new(
            DenseGenotypeMatrix::from_raw(n, k, case)?,
            DenseGenotypeMatrix::from_raw(n, k, complement)?,
            self.metadata.subset(snps),
        )
    }

    /// SHA-256 over dimensions and both matrices, used to tie artifacts to their source
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.n_families() as u64).to_le_bytes());
        hasher.update((self.n_snps() as u64).to_le_bytes());
        let mut row_buf = Vec::with_capacity(self.n_snps());
        for matrix in [&self.case, &self.complement] {
            for row in 0..self.n_families() {
                row_buf.clear();
                row_buf.extend((0..self.n_snps()).map(|col| matrix.get(row, col)));
                hasher.update(&row_buf);
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

impl GenotypeStore<DenseGenotypeMatrix> {
    /// Split into owned parts (used when building replicates)
    pub fn into_parts(self) -> (DenseGenotypeMatrix, DenseGenotypeMatrix, SnpMetadata) {
        (self.case, self.complement, self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_store() -> GenotypeStore {
        let case = DenseGenotypeMatrix::from_rows(&[vec![0, 1, 2], vec![1, -9, 2]]).unwrap();
        let comp = DenseGenotypeMatrix::from_rows(&[vec![1, 1, 0], vec![2, 0, 3]]).unwrap();
        GenotypeStore::new(case, comp, SnpMetadata::independent(3)).unwrap()
    }

    #[test]
    fn test_missing_values_normalized() {
        let store = small_store();
        assert!(store.case().is_missing(1, 1));
        assert!(store.complement().is_missing(1, 2));
        assert!(!store.complement().is_missing(1, 1));
        assert_eq!(store.case().missing_count(), 1);
    }

    #[test]
    fn test_block_ends_partition_columns() {
        let meta = SnpMetadata::from_block_ends(&[1, 4, 5], 6).unwrap();
        let blocks: Vec<usize> = (0..6).map(|c| meta.block_of(c)).collect();
        assert_eq!(blocks, vec![0, 0, 1, 1, 1, 2]);
        assert_eq!(meta.n_blocks(), 3);

        assert!(SnpMetadata::from_block_ends(&[3, 2, 5], 6).is_err());
        assert!(SnpMetadata::from_block_ends(&[1, 4], 6).is_err());
    }

    #[test]
    fn test_validate_candidate() {
        let store = small_store();
        assert!(store.validate_candidate(&[0, 2]).is_ok());
        assert!(matches!(
            store.validate_candidate(&[0, 3]),
            Err(GadgetsError::InvalidCandidateSet { .. })
        ));
        assert!(matches!(
            store.validate_candidate(&[1, 1]),
            Err(GadgetsError::InvalidCandidateSet { .. })
        ));
    }

    #[test]
    fn test_subset_keeps_order_and_metadata() {
        let case = DenseGenotypeMatrix::from_rows(&[vec![0, 1, 2]]).unwrap();
        let comp = DenseGenotypeMatrix::from_rows(&[vec![2, 1, 0]]).unwrap();
        let meta = SnpMetadata::from_block_ends(&[0, 2], 3)
            .unwrap()
            .with_maternal(&[2])
            .unwrap();
        let store = GenotypeStore::new(case, comp, meta).unwrap();
        let sub = store.subset_columns(&[2, 0]).unwrap();
        assert_eq!(sub.case().row(0), &[2, 0]);
        assert_eq!(sub.complement().row(0), &[0, 2]);
        assert_eq!(sub.metadata().role_of(0), SnpRole::Maternal);
        assert_eq!(sub.metadata().block_of(0), 1);
        assert_eq!(sub.metadata().block_of(1), 0);
    }

    #[test]
    fn test_fingerprint_changes_with_data() {
        let store = small_store();
        let case = DenseGenotypeMatrix::from_rows(&[vec![0, 1, 2], vec![1, 0, 2]]).unwrap();
        let comp = DenseGenotypeMatrix::from_rows(&[vec![1, 1, 0], vec![2, 0, 3]]).unwrap();
        let other = GenotypeStore::new(case, comp, SnpMetadata::independent(3)).unwrap();
        assert_eq!(store.fingerprint(), small_store().fingerprint());
        assert_ne!(store.fingerprint(), other.fingerprint());
    }
}
