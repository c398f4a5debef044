// aggregate.rs - Island result files, deduplication and annotation join

use crate::core::fitness::{FitnessResult, RiskRequirement};
use crate::error::{GadgetsError, Result};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// One chromosome reported by an island, with its fitness fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IslandRow {
    pub snps: Vec<usize>,
    pub fitness_score: f64,
    pub difference_vector: Vec<f64>,
    pub informativeness: Vec<f64>,
    pub risk_requirement: Vec<RiskRequirement>,
    pub n_informative_families: usize,
}

impl IslandRow {
    pub fn from_result(snps: &[usize], result: &FitnessResult) -> Self {
        Self {
            snps: snps.to_vec(),
            fitness_score: result.fitness_score,
            difference_vector: result.difference_vector.clone(),
            informativeness: result.informativeness.clone(),
            risk_requirement: result.risk_requirement.clone(),
            n_informative_families: result.n_informative_families,
        }
    }

    /// Identity for deduplication: the unordered SNP set
    fn key(&self) -> Vec<usize> {
        let mut key = self.snps.clone();
        key.sort_unstable();
        key
    }
}

/// Final top chromosomes of one island, self-describing on disk (JSON)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IslandFile {
    pub island_id: usize,
    pub chrom_size: usize,
    pub generated: String,
    pub rows: Vec<IslandRow>,
}

impl IslandFile {
    pub fn new(island_id: usize, chrom_size: usize, rows: Vec<IslandRow>) -> Self {
        Self {
            island_id,
            chrom_size,
            generated: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            rows,
        }
    }

    pub fn file_name(&self) -> String {
        format!("island_{}_size_{}.json", self.island_id, self.chrom_size)
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).map_err(|e| GadgetsError::io(dir, e))?;
        let path = dir.join(self.file_name());
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| GadgetsError::format(&path, format!("Failed to serialize: {}", e)))?;
        fs::write(&path, content).map_err(|e| GadgetsError::io(&path, e))?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| GadgetsError::io(path, e))?;
        let file: IslandFile =
            serde_json::from_str(&content).map_err(|e| GadgetsError::format(path, e.to_string()))?;
        if let Some(row) = file.rows.iter().find(|r| r.snps.len() != file.chrom_size) {
            return Err(GadgetsError::format(
                path,
                format!(
                    "Row {:?} does not match chromosome size {}",
                    row.snps, file.chrom_size
                ),
            ));
        }
        Ok(file)
    }
}

/// Island files in `dir`, optionally restricted to one chromosome size,
/// ordered by (size, island id)
pub fn discover_island_files(dir: &Path, chrom_size: Option<usize>) -> Result<Vec<PathBuf>> {
    let pattern = Regex::new(r"^island_(\d+)_size_(\d+)\.json$")
        .map_err(|e| GadgetsError::InvalidInput(format!("Invalid island file pattern: {}", e)))?;
    let entries = fs::read_dir(dir).map_err(|e| GadgetsError::io(dir, e))?;

    let mut found: Vec<(usize, usize, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| GadgetsError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(caps) = pattern.captures(&name) else {
            continue;
        };
        let (Ok(id), Ok(size)) = (caps[1].parse::<usize>(), caps[2].parse::<usize>()) else {
            continue;
        };
        if chrom_size.map_or(true, |s| s == size) {
            found.push((size, id, entry.path()));
        }
    }
    found.sort();
    Ok(found.into_iter().map(|(_, _, path)| path).collect())
}

/// Read all island files in parallel; any failure aborts with the file named
pub fn read_island_files(paths: &[PathBuf]) -> Result<Vec<IslandFile>> {
    paths.par_iter().map(|p| IslandFile::read(p)).collect()
}

/// Island row tagged with its originating island
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRow {
    pub island_id: usize,
    pub chrom_size: usize,
    pub row: IslandRow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResults {
    /// Every row of every island, in file order
    pub raw: Vec<RankedRow>,
    /// Deduplicated, truncated per (chromosome size, island), sorted by fitness descending
    pub combined: Vec<RankedRow>,
}

/// Merge island outputs into raw and combined tables.
///
/// Duplicates share the same unordered SNP set; the higher fitness wins and
/// the first seen wins ties. The kept row keeps its SNP order.
pub fn aggregate(islands: &[IslandFile], n_top_chroms_per_island: usize) -> AggregatedResults {
    let raw: Vec<RankedRow> = islands
        .iter()
        .flat_map(|island| {
            island.rows.iter().map(move |row| RankedRow {
                island_id: island.island_id,
                chrom_size: island.chrom_size,
                row: row.clone(),
            })
        })
        .collect();

    let mut kept: Vec<RankedRow> = Vec::new();
    let mut index: HashMap<Vec<usize>, usize> = HashMap::new();
    for candidate in &raw {
        match index.get(&candidate.row.key()) {
            Some(&slot) => {
                if candidate.row.fitness_score > kept[slot].row.fitness_score {
                    kept[slot] = candidate.clone();
                }
            }
            None => {
                index.insert(candidate.row.key(), kept.len());
                kept.push(candidate.clone());
            }
        }
    }

    // island ids restart for every chromosome size
    let mut by_island: BTreeMap<(usize, usize), Vec<RankedRow>> = BTreeMap::new();
    for row in kept {
        by_island
            .entry((row.chrom_size, row.island_id))
            .or_default()
            .push(row);
    }
    let mut combined: Vec<RankedRow> = by_island
        .into_values()
        .flat_map(|mut rows| {
            rows.sort_by(|a, b| b.row.fitness_score.total_cmp(&a.row.fitness_score));
            rows.truncate(n_top_chroms_per_island);
            rows
        })
        .collect();
    combined.sort_by(|a, b| b.row.fitness_score.total_cmp(&a.row.fitness_score));

    log::info!(
        "Aggregated {} islands: {} raw rows, {} combined rows",
        islands.len(),
        raw.len(),
        combined.len()
    );
    AggregatedResults { raw, combined }
}

/// Display identifiers per SNP column, one CSV row per column in preprocessing order
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl AnnotationTable {
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .comment(Some(b'#'))
            .from_path(path)
            .map_err(|e| GadgetsError::format(path, e.to_string()))?;
        let columns = reader
            .headers()
            .map_err(|e| GadgetsError::format(path, e.to_string()))?
            .iter()
            .map(|s| s.trim().to_string())
            .collect();
        let rows = reader
            .records()
            .map(|record| {
                record
                    .map(|r| r.iter().map(|s| s.trim().to_string()).collect())
                    .map_err(|e| GadgetsError::format(path, e.to_string()))
            })
            .collect::<Result<Vec<Vec<String>>>>()?;
        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `snp<i>_<column>` header cells for sets of up to `max_size` SNPs
    pub fn header(&self, max_size: usize) -> Vec<String> {
        (1..=max_size)
            .flat_map(|i| self.columns.iter().map(move |c| format!("snp{}_{}", i, c)))
            .collect()
    }

    /// Annotation cells for each row, keyed on SNP column position.
    /// Shorter sets are padded with empty cells up to `max_size`.
    pub fn join(
        &self,
        rows: &[RankedRow],
        n_snp_columns: usize,
        max_size: usize,
    ) -> Result<Vec<Vec<String>>> {
        if self.rows.len() != n_snp_columns {
            return Err(GadgetsError::AnnotationMismatch {
                expected: n_snp_columns,
                found: self.rows.len(),
            });
        }
        let width = self.columns.len();
        rows.iter()
            .map(|ranked| {
                let mut cells = Vec::with_capacity(max_size * width);
                for &snp in &ranked.row.snps {
                    let fields = self.rows.get(snp).ok_or_else(|| GadgetsError::InvalidInput(format!(
                        "SNP index {} has no annotation row",
                        snp
                    )))?;
                    cells.extend((0..width).map(|c| fields.get(c).cloned().unwrap_or_default()));
                }
                cells.resize(max_size * width, String::new());
                Ok(cells)
            })
            .collect()
    }
}
