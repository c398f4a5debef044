// tsv.rs - TSV loaders for genotype and exposure matrices

use crate::data::exposure::ExposureMatrix;
use crate::data::genotype::{normalize_genotype, DenseGenotypeMatrix, MISSING_GENOTYPE};
use crate::error::{GadgetsError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Genotype matrix plus the labels read alongside it
#[derive(Debug)]
pub struct LoadedGenotypes {
    pub family_ids: Vec<String>,
    pub snp_names: Vec<String>,
    pub matrix: DenseGenotypeMatrix,
}

/// Parse one genotype cell. Empty, NA and the missing marker map to the sentinel.
fn parse_genotype(s: &str, missing_char: &str) -> std::result::Result<u8, String> {
    let cleaned = s.trim();

    if cleaned.is_empty() || cleaned == "NA" || cleaned == missing_char {
        return Ok(MISSING_GENOTYPE);
    }

    let value = cleaned
        .parse::<i64>()
        .map_err(|_| format!("Failed to parse '{}' as a genotype", cleaned))?;
    Ok(normalize_genotype(value))
}

/// Read a header line and split it; the first column labels the family ids
fn read_table(file_path: &Path) -> Result<(Vec<String>, Vec<(String, Vec<String>)>)> {
    let file = File::open(file_path).map_err(|e| GadgetsError::io(file_path, e))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let header_line = lines
        .next()
        .ok_or_else(|| GadgetsError::format(file_path, "Empty TSV file"))?
        .map_err(|e| GadgetsError::io(file_path, e))?;

    let header_parts: Vec<&str> = header_line.split('\t').collect();
    if header_parts.len() < 2 {
        return Err(GadgetsError::format(
            file_path,
            "TSV header must have at least 2 columns",
        ));
    }
    let columns: Vec<String> = header_parts[1..].iter().map(|s| s.trim().to_string()).collect();

    let mut rows = Vec::new();
    for (line_num, line) in lines.enumerate() {
        let line = line.map_err(|e| GadgetsError::io(file_path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() != header_parts.len() {
            return Err(GadgetsError::format(
                file_path,
                format!(
                    "Line {} has {} columns, expected {}",
                    line_num + 2,
                    parts.len(),
                    header_parts.len()
                ),
            ));
        }
        rows.push((
            parts[0].to_string(),
            parts[1..].iter().map(|s| s.to_string()).collect(),
        ));
    }

    Ok((columns, rows))
}

/// Load a families x SNPs genotype matrix
pub fn load_genotypes(file_path: &Path, missing_char: &str) -> Result<LoadedGenotypes> {
    let (snp_names, rows) = read_table(file_path)?;
    let n_rows = rows.len();
    let n_cols = snp_names.len();
    let mut data = Vec::with_capacity(n_rows * n_cols);
    let mut family_ids = Vec::with_capacity(n_rows);

    for (line_num, (family_id, cells)) in rows.into_iter().enumerate() {
        for (i, cell) in cells.iter().enumerate() {
            let genotype = parse_genotype(cell, missing_char).map_err(|e| {
                GadgetsError::format(
                    file_path,
                    format!(
                        "Invalid genotype '{}' at line {} SNP {}: {}",
                        cell,
                        line_num + 2,
                        snp_names[i],
                        e
                    ),
                )
            })?;
            data.push(genotype);
        }
        family_ids.push(family_id);
    }

    let matrix = DenseGenotypeMatrix::from_raw(n_rows, n_cols, data)?;
    log::info!(
        "Genotypes loaded from {}: {} families, {} SNPs",
        file_path.display(),
        n_rows,
        n_cols
    );
    Ok(LoadedGenotypes {
        family_ids,
        snp_names,
        matrix,
    })
}

/// Load a families x variables exposure matrix of small non-negative levels
pub fn load_exposures(file_path: &Path) -> Result<ExposureMatrix> {
    let (names, rows) = read_table(file_path)?;
    let mut parsed = Vec::with_capacity(rows.len());
    for (line_num, (_, cells)) in rows.into_iter().enumerate() {
        let row = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                cell.trim().parse::<u8>().map_err(|_| {
                    GadgetsError::format(
                        file_path,
                        format!(
                            "Invalid exposure level '{}' at line {} variable {}",
                            cell,
                            line_num + 2,
                            names[i]
                        ),
                    )
                })
            })
            .collect::<Result<Vec<u8>>>()?;
        parsed.push(row);
    }
    ExposureMatrix::from_rows(&parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_genotypes_with_missing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "family\trs1\trs2\trs3").unwrap();
        writeln!(file, "f1\t0\t1\t2").unwrap();
        writeln!(file, "f2\tNA\t-\t-9").unwrap();

        let loaded = load_genotypes(file.path(), "-").unwrap();
        assert_eq!(loaded.family_ids, vec!["f1", "f2"]);
        assert_eq!(loaded.snp_names, vec!["rs1", "rs2", "rs3"]);
        assert_eq!(loaded.matrix.row(0), &[0, 1, 2]);
        assert_eq!(loaded.matrix.missing_count(), 3);
    }

    #[test]
    fn test_ragged_line_is_format_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "family\trs1\trs2").unwrap();
        writeln!(file, "f1\t0").unwrap();
        assert!(matches!(
            load_genotypes(file.path(), "-"),
            Err(GadgetsError::Format { .. })
        ));
    }

    #[test]
    fn test_load_exposures() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "family\tsmoking").unwrap();
        writeln!(file, "f1\t1").unwrap();
        writeln!(file, "f2\t0").unwrap();
        let exposures = load_exposures(file.path()).unwrap();
        assert_eq!(exposures.n_families(), 2);
        assert_eq!(exposures.n_strata(), 2);
    }
}
