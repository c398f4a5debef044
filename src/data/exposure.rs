// exposure.rs - Family-level categorical exposures

use crate::error::{GadgetsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Families x exposure variables, each cell a small categorical level.
///
/// Every distinct exposure row is a stratum. Strata are numbered in
/// lexicographic order of their levels; stratum 0 is the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureMatrix {
    n_rows: usize,
    n_cols: usize,
    levels: Vec<u8>,
    stratum_of: Vec<usize>,
    stratum_labels: Vec<Vec<u8>>,
}

impl ExposureMatrix {
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if n_rows == 0 || n_cols == 0 {
            return Err(GadgetsError::InvalidInput(
                "Exposure matrix must have at least one family and one variable".to_string(),
            ));
        }
        let mut levels = Vec::with_capacity(n_rows * n_cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(GadgetsError::InvalidInput(format!(
                    "Exposure row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    n_cols
                )));
            }
            levels.extend_from_slice(row);
        }
        Ok(Self::with_levels(n_rows, n_cols, levels))
    }

    fn with_levels(n_rows: usize, n_cols: usize, levels: Vec<u8>) -> Self {
        let mut keys: BTreeMap<&[u8], usize> = BTreeMap::new();
        for row in levels.chunks(n_cols) {
            keys.entry(row).or_insert(0);
        }
        let stratum_labels: Vec<Vec<u8>> = keys.keys().map(|k| k.to_vec()).collect();
        for (idx, value) in keys.values_mut().enumerate() {
            *value = idx;
        }
        let stratum_of = levels.chunks(n_cols).map(|row| keys[row]).collect();

        Self {
            n_rows,
            n_cols,
            levels,
            stratum_of,
            stratum_labels,
        }
    }

    pub fn n_families(&self) -> usize {
        self.n_rows
    }

    pub fn n_variables(&self) -> usize {
        self.n_cols
    }

    pub fn n_strata(&self) -> usize {
        self.stratum_labels.len()
    }

    pub fn stratum_of(&self, row: usize) -> usize {
        self.stratum_of[row]
    }

    pub fn stratum_label(&self, stratum: usize) -> &[u8] {
        &self.stratum_labels[stratum]
    }

    pub fn row(&self, row: usize) -> &[u8] {
        &self.levels[row * self.n_cols..(row + 1) * self.n_cols]
    }

    /// New matrix whose row `i` is this matrix's row `order[i]`
    pub fn reordered(&self, order: &[usize]) -> Result<Self> {
        if order.len() != self.n_rows {
            return Err(GadgetsError::InvalidInput(format!(
                "Row order has {} entries for {} families",
                order.len(),
                self.n_rows
            )));
        }
        let mut levels = Vec::with_capacity(self.levels.len());
        for &src in order {
            if src >= self.n_rows {
                return Err(GadgetsError::InvalidInput(format!(
                    "Row order entry {} out of range",
                    src
                )));
            }
            levels.extend_from_slice(self.row(src));
        }
        Ok(Self::with_levels(self.n_rows, self.n_cols, levels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strata_are_lexicographic() {
        let exposures =
            ExposureMatrix::from_rows(&[vec![1, 0], vec![0, 0], vec![1, 1], vec![0, 0]]).unwrap();
        assert_eq!(exposures.n_strata(), 3);
        assert_eq!(exposures.stratum_label(0), &[0, 0]);
        assert_eq!(exposures.stratum_of(1), 0);
        assert_eq!(exposures.stratum_of(3), 0);
        assert_eq!(exposures.stratum_of(0), 1);
        assert_eq!(exposures.stratum_of(2), 2);
    }

    #[test]
    fn test_reordered_moves_rows() {
        let exposures = ExposureMatrix::from_rows(&[vec![0], vec![1], vec![2]]).unwrap();
        let shuffled = exposures.reordered(&[2, 0, 1]).unwrap();
        assert_eq!(shuffled.row(0), &[2]);
        assert_eq!(shuffled.row(1), &[0]);
        assert_eq!(shuffled.stratum_of(0), 2);
        assert!(exposures.reordered(&[0, 1]).is_err());
    }

    #[test]
    fn test_rejects_ragged_rows() {
        assert!(ExposureMatrix::from_rows(&[vec![0, 1], vec![0]]).is_err());
    }
}
