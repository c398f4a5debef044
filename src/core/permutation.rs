// permutation.rs - Seeded permutation replicates and replicate artifacts

use crate::core::fitness::FitnessScorer;
use crate::core::progress_bar;
use crate::data::{DenseGenotypeMatrix, ExposureMatrix, GenotypeMatrix, GenotypeStore, SnpMetadata};
use crate::error::{GadgetsError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const ARTIFACT_MAGIC: &[u8; 8] = b"GADGREP\0";
const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Independent seed for replicate `index` (splitmix64 over the base seed)
pub fn replicate_seed(base: u64, index: u64) -> u64 {
    let mut z = base.wrapping_add(index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermutationMode {
    /// Case/complement swapped per family with probability 0.5
    LabelSwap,
    /// Exposure rows fully permuted across families
    ExposureShuffle,
    /// Informative families re-paired independently per column group
    BlockShuffle,
}

impl PermutationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermutationMode::LabelSwap => "label",
            PermutationMode::ExposureShuffle => "exposure",
            PermutationMode::BlockShuffle => "block",
        }
    }
}

/// Generates replicates deterministically from one base seed
#[derive(Debug, Clone, Copy)]
pub struct PermutationEngine {
    seed: u64,
}

impl PermutationEngine {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn rng(&self, index: u64) -> StdRng {
        StdRng::seed_from_u64(replicate_seed(self.seed, index))
    }

    /// Label-permuted copy of the whole store
    pub fn label_replicate<M: GenotypeMatrix>(
        &self,
        store: &GenotypeStore<M>,
        index: u64,
    ) -> Result<GenotypeStore> {
        let mut rng = self.rng(index);
        let n = store.n_families();
        let k = store.n_snps();
        let mut case = Vec::with_capacity(n * k);
        let mut complement = Vec::with_capacity(n * k);
        for row in 0..n {
            let (from_case, from_comp) = if rng.gen_bool(0.5) {
                (store.complement(), store.case())
            } else {
                (store.case(), store.complement())
            };
            for col in 0..k {
                case.push(from_case.get(row, col));
                complement.push(from_comp.get(row, col));
            }
        }
        GenotypeStore::new(
            DenseGenotypeMatrix::from_raw(n, k, case)?,
            DenseGenotypeMatrix::from_raw(n, k, complement)?,
            store.metadata().clone(),
        )
    }

    pub fn label_replicates<M: GenotypeMatrix>(
        &self,
        store: &GenotypeStore<M>,
        n_replicates: usize,
    ) -> Result<Vec<GenotypeStore>> {
        (0..n_replicates as u64)
            .into_par_iter()
            .map(|i| self.label_replicate(store, i))
            .collect()
    }

    /// Exposure matrix with its rows permuted across families
    pub fn exposure_replicate(&self, exposures: &ExposureMatrix, index: u64) -> Result<ExposureMatrix> {
        let mut rng = self.rng(index);
        let mut order: Vec<usize> = (0..exposures.n_families()).collect();
        order.shuffle(&mut rng);
        exposures.reordered(&order)
    }

    pub fn exposure_replicates(
        &self,
        exposures: &ExposureMatrix,
        n_replicates: usize,
    ) -> Result<Vec<ExposureMatrix>> {
        (0..n_replicates as u64)
            .into_par_iter()
            .map(|i| self.exposure_replicate(exposures, i))
            .collect()
    }

    /// Copy of columns `snps` where, for every group of positions into
    /// `snps`, the (case, complement) rows of `families` are re-paired by an
    /// independent permutation. Other families keep their rows.
    pub fn block_shuffle_replicate<M: GenotypeMatrix>(
        &self,
        store: &GenotypeStore<M>,
        snps: &[usize],
        groups: &[Vec<usize>],
        families: &[usize],
        index: u64,
    ) -> Result<GenotypeStore> {
        let source = store.subset_columns(snps)?;
        if let Some(&bad) = families.iter().find(|&&f| f >= store.n_families()) {
            return Err(GadgetsError::InvalidInput(format!(
                "Family index {} out of range ({} families)",
                bad,
                store.n_families()
            )));
        }
        if let Some(&bad) = groups.iter().flatten().find(|&&p| p >= snps.len()) {
            return Err(GadgetsError::InvalidInput(format!(
                "Group position {} out of range for a set of {} SNPs",
                bad,
                snps.len()
            )));
        }

        let mut rng = self.rng(index);
        let (mut case, mut complement, metadata) = source.clone().into_parts();
        for group in groups {
            let mut order = families.to_vec();
            order.shuffle(&mut rng);
            for (&dst, &src) in families.iter().zip(&order) {
                for &p in group {
                    case.set(dst, p, source.case().get(src, p));
                    complement.set(dst, p, source.complement().get(src, p));
                }
            }
        }
        GenotypeStore::new(case, complement, metadata)
    }

    /// Run `score_one(i)` for every replicate index in parallel. Results are
    /// collected in index order.
    pub fn permuted_scores<F>(&self, n_replicates: usize, show_progress: bool, score_one: F) -> Result<Vec<f64>>
    where
        F: Fn(u64) -> Result<f64> + Send + Sync,
    {
        let pb = progress_bar(n_replicates as u64, show_progress);
        let scores = (0..n_replicates as u64)
            .into_par_iter()
            .map(|i| {
                let score = score_one(i);
                pb.inc(1);
                score
            })
            .collect::<Result<Vec<f64>>>();
        pb.finish_and_clear();
        scores
    }

    /// Write `n_replicates` label-permuted stores as artifacts under `dir`
    pub fn write_label_replicates<M: GenotypeMatrix>(
        &self,
        store: &GenotypeStore<M>,
        n_replicates: usize,
        dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).map_err(|e| GadgetsError::io(dir, e))?;
        let fingerprint = store.fingerprint();
        (0..n_replicates as u64)
            .into_par_iter()
            .map(|i| {
                let (case, complement, _) = self.label_replicate(store, i)?.into_parts();
                let artifact = ReplicateArtifact::new(
                    PermutationMode::LabelSwap,
                    i,
                    self.seed,
                    &fingerprint,
                    ReplicatePayload::Genotypes { case, complement },
                );
                let path = dir.join(artifact_file_name(PermutationMode::LabelSwap, i));
                artifact.write(&path)?;
                Ok(path)
            })
            .collect()
    }

    /// Write `n_replicates` exposure-permuted matrices as artifacts under `dir`
    pub fn write_exposure_replicates<M: GenotypeMatrix>(
        &self,
        store: &GenotypeStore<M>,
        exposures: &ExposureMatrix,
        n_replicates: usize,
        dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).map_err(|e| GadgetsError::io(dir, e))?;
        let fingerprint = store.fingerprint();
        (0..n_replicates as u64)
            .into_par_iter()
            .map(|i| {
                let artifact = ReplicateArtifact::new(
                    PermutationMode::ExposureShuffle,
                    i,
                    self.seed,
                    &fingerprint,
                    ReplicatePayload::Exposures(self.exposure_replicate(exposures, i)?),
                );
                let path = dir.join(artifact_file_name(PermutationMode::ExposureShuffle, i));
                artifact.write(&path)?;
                Ok(path)
            })
            .collect()
    }
}

pub fn artifact_file_name(mode: PermutationMode, index: u64) -> String {
    format!("replicate_{}_{:06}.gadr", mode.as_str(), index)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateMetadata {
    pub format_version: u32,
    pub crate_version: String,
    pub mode: PermutationMode,
    pub index: u64,
    pub seed: u64,
    /// SHA-256 of the genotype store the replicate was derived from
    pub source_fingerprint: String,
    pub created: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicatePayload {
    Genotypes {
        case: DenseGenotypeMatrix,
        complement: DenseGenotypeMatrix,
    },
    Exposures(ExposureMatrix),
}

/// One persisted permutation replicate.
///
/// On disk: magic, CRC32 of the body, then the LZ4-compressed bincode body.
/// Files are written under a temporary name and renamed into place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateArtifact {
    pub metadata: ReplicateMetadata,
    pub payload: ReplicatePayload,
}

impl ReplicateArtifact {
    pub fn new(
        mode: PermutationMode,
        index: u64,
        seed: u64,
        source_fingerprint: &str,
        payload: ReplicatePayload,
    ) -> Self {
        Self {
            metadata: ReplicateMetadata {
                format_version: ARTIFACT_FORMAT_VERSION,
                crate_version: env!("CARGO_PKG_VERSION").to_string(),
                mode,
                index,
                seed,
                source_fingerprint: source_fingerprint.to_string(),
                created: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            },
            payload,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let serialized = bincode::serialize(self)
            .map_err(|e| GadgetsError::format(path, format!("Failed to serialize replicate: {}", e)))?;
        let body = lz4_flex::compress_prepend_size(&serialized);

        let mut bytes = Vec::with_capacity(ARTIFACT_MAGIC.len() + 4 + body.len());
        bytes.extend_from_slice(ARTIFACT_MAGIC);
        bytes.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        bytes.extend_from_slice(&body);

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".partial");
        let tmp = PathBuf::from(tmp_name);
        fs::write(&tmp, &bytes).map_err(|e| GadgetsError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| GadgetsError::io(path, e))?;
        log::debug!("Replicate {} written to {}", self.metadata.index, path.display());
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| GadgetsError::io(path, e))?;
        let header = ARTIFACT_MAGIC.len() + 4;
        if bytes.len() < header || &bytes[..ARTIFACT_MAGIC.len()] != ARTIFACT_MAGIC {
            return Err(GadgetsError::format(path, "Not a replicate artifact"));
        }
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&bytes[ARTIFACT_MAGIC.len()..header]);
        let body = &bytes[header..];
        if crc32fast::hash(body) != u32::from_le_bytes(crc) {
            return Err(GadgetsError::format(path, "Checksum mismatch"));
        }
        let decompressed = lz4_flex::decompress_size_prepended(body)
            .map_err(|e| GadgetsError::format(path, format!("Failed to decompress: {}", e)))?;
        let artifact: ReplicateArtifact = bincode::deserialize(&decompressed)
            .map_err(|e| GadgetsError::format(path, format!("Failed to deserialize: {}", e)))?;
        if artifact.metadata.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(GadgetsError::format(
                path,
                format!(
                    "Unsupported format version {}",
                    artifact.metadata.format_version
                ),
            ));
        }
        Ok(artifact)
    }

    pub fn into_store(self, metadata: SnpMetadata) -> Result<GenotypeStore> {
        match self.payload {
            ReplicatePayload::Genotypes { case, complement } => {
                GenotypeStore::new(case, complement, metadata)
            }
            ReplicatePayload::Exposures(_) => Err(GadgetsError::InvalidInput(
                "Replicate holds exposures, not genotypes".to_string(),
            )),
        }
    }
}

/// Score `snps` on every persisted replicate. Artifacts must come from `store`.
pub fn rescore_artifacts<M: GenotypeMatrix>(
    scorer: &FitnessScorer,
    store: &GenotypeStore<M>,
    paths: &[PathBuf],
    snps: &[usize],
    show_progress: bool,
) -> Result<Vec<f64>> {
    let fingerprint = store.fingerprint();
    let pb = progress_bar(paths.len() as u64, show_progress);
    let scores = paths
        .par_iter()
        .map(|path| {
            let artifact = ReplicateArtifact::read(path)?;
            if artifact.metadata.source_fingerprint != fingerprint {
                return Err(GadgetsError::format(
                    path,
                    "Replicate was generated from a different genotype store",
                ));
            }
            let result = match artifact.payload {
                ReplicatePayload::Exposures(exposures) => scorer
                    .with_exposures(Arc::new(exposures))?
                    .score(store, snps)?,
                ReplicatePayload::Genotypes { case, complement } => {
                    let replicate = GenotypeStore::new(case, complement, store.metadata().clone())?;
                    scorer.score(&replicate, snps)?
                }
            };
            pb.inc(1);
            Ok(result.fitness_score)
        })
        .collect::<Result<Vec<f64>>>();
    pb.finish_and_clear();
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::exposure::{exposure_mode, NullCalibration, NullCalibrationTable};
    use crate::core::fitness::ScoringConfig;
    use crate::data::MISSING_GENOTYPE;
    use crate::testing::{simulate_exposed_triads, simulate_triads, SimulationParams};

    fn small_params() -> SimulationParams {
        SimulationParams {
            n_families: 120,
            ..SimulationParams::default()
        }
    }

    #[test]
    fn test_label_replicates_count_shape_and_family_sums() {
        let store = simulate_triads(&small_params(), 1);
        let replicates = PermutationEngine::new(7).label_replicates(&store, 12).unwrap();
        assert_eq!(replicates.len(), 12);
        for rep in &replicates {
            assert_eq!(rep.n_families(), store.n_families());
            assert_eq!(rep.n_snps(), store.n_snps());
            for row in 0..store.n_families() {
                for col in 0..store.n_snps() {
                    let before = store.case().get(row, col) as u16 + store.complement().get(row, col) as u16;
                    let after = rep.case().get(row, col) as u16 + rep.complement().get(row, col) as u16;
                    assert_eq!(before, after);
                }
            }
        }
        // some family must have been swapped
        assert!(replicates.iter().any(|r| r.case() != store.case()));
    }

    #[test]
    fn test_label_replicate_keeps_missing_sentinel() {
        let store = GenotypeStore::new(
            DenseGenotypeMatrix::from_rows(&[vec![-9, 1]]).unwrap(),
            DenseGenotypeMatrix::from_rows(&[vec![2, 7]]).unwrap(),
            SnpMetadata::independent(2),
        )
        .unwrap();
        for i in 0..8 {
            let rep = PermutationEngine::new(3).label_replicate(&store, i).unwrap();
            let cells = [rep.case().get(0, 0), rep.complement().get(0, 0)];
            assert!(cells.contains(&MISSING_GENOTYPE));
            assert!(cells.contains(&2));
        }
    }

    #[test]
    fn test_replicates_reproducible_from_seed() {
        let store = simulate_triads(&small_params(), 2);
        let a = PermutationEngine::new(99).label_replicate(&store, 4).unwrap();
        let b = PermutationEngine::new(99).label_replicate(&store, 4).unwrap();
        let c = PermutationEngine::new(99).label_replicate(&store, 5).unwrap();
        assert_eq!(a.case(), b.case());
        assert_ne!(a.case(), c.case());
    }

    #[test]
    fn test_exposure_replicate_is_a_row_permutation() {
        let (_, exposures) = simulate_exposed_triads(&small_params(), 3);
        let rep = PermutationEngine::new(5).exposure_replicate(&exposures, 0).unwrap();
        let mut before: Vec<Vec<u8>> = (0..exposures.n_families()).map(|r| exposures.row(r).to_vec()).collect();
        let mut after: Vec<Vec<u8>> = (0..rep.n_families()).map(|r| rep.row(r).to_vec()).collect();
        assert_ne!(before, after);
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn test_block_shuffle_preserves_group_marginals() {
        let store = simulate_triads(&small_params(), 4);
        let snps = [2, 5, 8];
        let families: Vec<usize> = (0..60).collect();
        let groups = vec![vec![0, 1], vec![2]];
        let rep = PermutationEngine::new(8)
            .block_shuffle_replicate(&store, &snps, &groups, &families, 0)
            .unwrap();
        assert_eq!(rep.n_snps(), 3);

        // families outside the shuffled set are untouched
        for row in 60..store.n_families() {
            for (p, &col) in snps.iter().enumerate() {
                assert_eq!(rep.case().get(row, p), store.case().get(row, col));
            }
        }
        // SNPs in one group move together, so each family's pair of rows at
        // positions 0 and 1 is one of the original pairs
        let original: Vec<[u8; 4]> = families
            .iter()
            .map(|&f| {
                [
                    store.case().get(f, 2),
                    store.case().get(f, 5),
                    store.complement().get(f, 2),
                    store.complement().get(f, 5),
                ]
            })
            .collect();
        let mut shuffled: Vec<[u8; 4]> = families
            .iter()
            .map(|&f| {
                [
                    rep.case().get(f, 0),
                    rep.case().get(f, 1),
                    rep.complement().get(f, 0),
                    rep.complement().get(f, 1),
                ]
            })
            .collect();
        let mut original_sorted = original.clone();
        original_sorted.sort();
        shuffled.sort();
        assert_eq!(original_sorted, shuffled);
    }

    #[test]
    fn test_artifact_round_trip_and_no_partial_left() {
        let dir = tempfile::tempdir().unwrap();
        let store = simulate_triads(&small_params(), 5);
        let engine = PermutationEngine::new(11);
        let paths = engine.write_label_replicates(&store, 3, dir.path()).unwrap();
        assert_eq!(paths.len(), 3);

        let artifact = ReplicateArtifact::read(&paths[1]).unwrap();
        assert_eq!(artifact.metadata.index, 1);
        assert_eq!(artifact.metadata.mode, PermutationMode::LabelSwap);
        assert_eq!(artifact.metadata.source_fingerprint, store.fingerprint());
        let rebuilt = artifact.into_store(store.metadata().clone()).unwrap();
        assert_eq!(rebuilt.case(), engine.label_replicate(&store, 1).unwrap().case());

        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .map(|e| e.path().to_string_lossy().ends_with(".partial"))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_corrupt_and_missing_artifacts_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = simulate_triads(&small_params(), 6);
        let paths = PermutationEngine::new(1)
            .write_label_replicates(&store, 1, dir.path())
            .unwrap();

        let mut bytes = fs::read(&paths[0]).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&paths[0], &bytes).unwrap();
        match ReplicateArtifact::read(&paths[0]) {
            Err(GadgetsError::Format { path, .. }) => assert!(path.ends_with(".gadr")),
            other => panic!("expected format error, got {:?}", other),
        }

        let missing = dir.path().join("replicate_label_999999.gadr");
        assert!(matches!(
            ReplicateArtifact::read(&missing),
            Err(GadgetsError::Io { .. })
        ));
    }

    #[test]
    fn test_rescore_matches_in_memory_replicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = simulate_triads(&small_params(), 7);
        let engine = PermutationEngine::new(21);
        let scorer = FitnessScorer::new(ScoringConfig::default()).unwrap();
        let paths = engine.write_label_replicates(&store, 4, dir.path()).unwrap();

        let rescored = rescore_artifacts(&scorer, &store, &paths, &[2, 5], false).unwrap();
        let direct = engine
            .permuted_scores(4, false, |i| {
                Ok(scorer
                    .score(&engine.label_replicate(&store, i)?, &[2, 5])?
                    .fitness_score)
            })
            .unwrap();
        assert_eq!(rescored, direct);

        let other = simulate_triads(&small_params(), 8);
        assert!(matches!(
            rescore_artifacts(&scorer, &other, &paths, &[2, 5], false),
            Err(GadgetsError::Format { .. })
        ));
    }

    #[test]
    fn test_rescore_exposure_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (store, exposures) = simulate_exposed_triads(&small_params(), 9);
        let engine = PermutationEngine::new(2);
        let paths = engine
            .write_exposure_replicates(&store, &exposures, 2, dir.path())
            .unwrap();

        let mut calibration = NullCalibrationTable::new();
        calibration.insert(NullCalibration {
            chrom_size: 2,
            n_samples: 0,
            seed: 0,
            null_mean: vec![0.0, 0.0],
            null_sd: vec![1.0, 1.0],
            created: String::new(),
        });
        let scorer = FitnessScorer::new(ScoringConfig::default())
            .unwrap()
            .with_mode(exposure_mode(exposures.clone(), calibration));
        let scores = rescore_artifacts(&scorer, &store, &paths, &[1, 3], false).unwrap();
        let expected = scorer
            .with_exposures(Arc::new(engine.exposure_replicate(&exposures, 1).unwrap()))
            .unwrap()
            .score(&store, &[1, 3])
            .unwrap()
            .fitness_score;
        assert_eq!(scores[1], expected);
    }
}
