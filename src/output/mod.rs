// mod.rs - Output writers for result tables and JSON reports

use crate::core::aggregate::{AnnotationTable, RankedRow};
use crate::error::{GadgetsError, Result};
use serde::Serialize;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Ensure parent directory exists before creating file
pub fn ensure_parent_dir(file_path: &Path) -> Result<()> {
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent).map_err(|e| GadgetsError::io(parent, e))?;
        }
    }
    Ok(())
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

fn create_with_header(file_path: &Path, command_line: &str) -> Result<BufWriter<File>> {
    ensure_parent_dir(file_path)?;
    let file = File::create(file_path).map_err(|e| GadgetsError::io(file_path, e))?;
    let mut writer = BufWriter::new(file);
    let write_err = |e: std::io::Error| GadgetsError::io(file_path, e);
    writeln!(writer, "# Command: {}", command_line).map_err(write_err)?;
    writeln!(
        writer,
        "# Generated: {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
    .map_err(write_err)?;
    writeln!(writer, "# gadgets v{}", env!("CARGO_PKG_VERSION")).map_err(write_err)?;
    Ok(writer)
}

const BASE_COLUMNS: [&str; 8] = [
    "island_id",
    "chrom_size",
    "snps",
    "fitness_score",
    "n_informative_families",
    "difference_vector",
    "informativeness",
    "risk_requirement",
];

fn base_record(ranked: &RankedRow) -> Vec<String> {
    let row = &ranked.row;
    vec![
        ranked.island_id.to_string(),
        ranked.chrom_size.to_string(),
        join(&row.snps),
        row.fitness_score.to_string(),
        row.n_informative_families.to_string(),
        join(&row.difference_vector),
        join(&row.informativeness),
        row.risk_requirement
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(";"),
    ]
}

fn write_table(
    file_path: &Path,
    rows: &[RankedRow],
    annotation: Option<(&AnnotationTable, usize)>,
    command_line: &str,
) -> Result<()> {
    let max_size = rows.iter().map(|r| r.row.snps.len()).max().unwrap_or(0);
    let annotation_cells = match annotation {
        Some((table, n_snp_columns)) => Some((table.header(max_size), table.join(rows, n_snp_columns, max_size)?)),
        None => None,
    };

    let writer = create_with_header(file_path, command_line)?;
    let mut csv_writer = csv::Writer::from_writer(writer);
    let csv_err = |e: csv::Error| GadgetsError::format(file_path, e.to_string());

    let mut header: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
    if let Some((extra, _)) = &annotation_cells {
        header.extend(extra.iter().cloned());
    }
    csv_writer.write_record(&header).map_err(csv_err)?;

    for (i, ranked) in rows.iter().enumerate() {
        let mut record = base_record(ranked);
        if let Some((_, cells)) = &annotation_cells {
            record.extend(cells[i].iter().cloned());
        }
        csv_writer.write_record(&record).map_err(csv_err)?;
    }
    csv_writer
        .flush()
        .map_err(|e| GadgetsError::io(file_path, e))?;
    Ok(())
}

/// Concatenation of every island row, for traceability
pub fn write_raw_table(file_path: &Path, rows: &[RankedRow], command_line: &str) -> Result<()> {
    write_table(file_path, rows, None, command_line)?;
    log::info!("Raw table ({} rows) written to {}", rows.len(), file_path.display());
    Ok(())
}

/// Ranked, deduplicated table with optional `snp<i>_<column>` annotation cells
pub fn write_combined_table(
    file_path: &Path,
    rows: &[RankedRow],
    annotation: Option<(&AnnotationTable, usize)>,
    command_line: &str,
) -> Result<()> {
    write_table(file_path, rows, annotation, command_line)?;
    log::info!(
        "Combined table ({} rows) written to {}",
        rows.len(),
        file_path.display()
    );
    Ok(())
}

/// Pretty JSON report (test results, global test, scores)
pub fn write_json<T: Serialize>(file_path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(file_path)?;
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| GadgetsError::format(file_path, format!("Failed to serialize: {}", e)))?;
    std::fs::write(file_path, content).map_err(|e| GadgetsError::io(file_path, e))?;
    log::info!("Report written to {}", file_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregate::IslandRow;
    use crate::core::fitness::RiskRequirement;

    fn ranked(island_id: usize, snps: &[usize], fitness: f64) -> RankedRow {
        RankedRow {
            island_id,
            chrom_size: snps.len(),
            row: IslandRow {
                snps: snps.to_vec(),
                fitness_score: fitness,
                difference_vector: vec![2.0; snps.len()],
                informativeness: vec![0.75; snps.len()],
                risk_requirement: vec![RiskRequirement::ExactlyTwo; snps.len()],
                n_informative_families: 4,
            },
        }
    }

    #[test]
    fn test_combined_table_with_annotation() {
        let dir = tempfile::tempdir().unwrap();
        let annotation = AnnotationTable {
            columns: vec!["rsid".to_string()],
            rows: vec![
                vec!["rs1".to_string()],
                vec!["rs2".to_string()],
                vec!["rs3".to_string()],
            ],
        };
        let path = dir.path().join("out").join("combined.csv");
        let rows = vec![ranked(1, &[2, 0], 3.5)];
        write_combined_table(&path, &rows, Some((&annotation, 3)), "gadgets test").unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .from_path(&path)
            .unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.get(1), Some("chrom_size"));
        assert_eq!(headers.get(8), Some("snp1_rsid"));
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.get(0), Some("1"));
        assert_eq!(record.get(1), Some("2"));
        assert_eq!(record.get(2), Some("2;0"));
        assert_eq!(record.get(7), Some("2;2"));
        assert_eq!(record.get(8), Some("rs3"));
        assert_eq!(record.get(9), Some("rs1"));
    }

    #[test]
    fn test_annotation_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let annotation = AnnotationTable {
            columns: vec!["rsid".to_string()],
            rows: vec![vec!["rs1".to_string()]],
        };
        let path = dir.path().join("combined.csv");
        let result = write_combined_table(&path, &[ranked(0, &[0], 1.0)], Some((&annotation, 5)), "");
        assert!(matches!(result, Err(GadgetsError::AnnotationMismatch { .. })));
        assert!(!path.exists());
    }
}
