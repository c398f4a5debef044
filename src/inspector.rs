// inspector.rs - Inspector for replicate artifacts and null calibration files
// Features: artifact metadata, integrity checks, payload summaries, calibration tables

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use argh::FromArgs;
use gadgets::core::permutation::{ReplicateArtifact, ReplicatePayload};
use gadgets::core::NullCalibrationTable;
use gadgets::data::{DenseGenotypeMatrix, GenotypeMatrix};
use gadgets::{GadgetsError, Result};

// ============================================================================
// CLI ARGUMENTS
// ============================================================================

#[derive(FromArgs)]
/// Inspect gadgets replicate artifacts and null calibration files
struct Args {
    /// path to a replicate artifact (.gadr) or a directory of artifacts
    #[argh(option)]
    artifact: Option<String>,

    /// path to a null calibration file (.json)
    #[argh(option)]
    calibration: Option<String>,

    /// show per-SNP genotype counts for genotype replicates
    #[argh(switch)]
    detailed: bool,

    /// check that every artifact in a directory shares seed and source fingerprint
    #[argh(switch)]
    validate: bool,

    /// export artifact summary to TSV file
    #[argh(option)]
    export_summary: Option<String>,

    /// quiet mode - minimal output
    #[argh(switch)]
    quiet: bool,
}

// ============================================================================
// ARTIFACT LOADING
// ============================================================================

fn artifact_paths(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(path)
        .map_err(|e| GadgetsError::io(path, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map_or(false, |ext| ext == "gadr"))
        .collect();
    paths.sort();
    Ok(paths)
}

struct ArtifactSummary {
    path: PathBuf,
    artifact: ReplicateArtifact,
}

fn load_artifacts(paths: &[PathBuf], quiet: bool) -> Result<Vec<ArtifactSummary>> {
    if !quiet {
        println!("Loading {} artifact(s)...", paths.len());
    }
    paths
        .iter()
        .map(|path| {
            Ok(ArtifactSummary {
                path: path.clone(),
                artifact: ReplicateArtifact::read(path)?,
            })
        })
        .collect()
}

// ============================================================================
// ANALYSIS FUNCTIONS
// ============================================================================

fn payload_description(payload: &ReplicatePayload) -> String {
    match payload {
        ReplicatePayload::Genotypes { case, .. } => {
            format!("genotypes {} families × {} SNPs", case.n_rows(), case.n_cols())
        }
        ReplicatePayload::Exposures(exposures) => format!(
            "exposures {} families × {} variables ({} strata)",
            exposures.n_families(),
            exposures.n_variables(),
            exposures.n_strata()
        ),
    }
}

fn show_artifact(summary: &ArtifactSummary, detailed: bool) {
    let meta = &summary.artifact.metadata;
    println!("\n=== REPLICATE: {} ===", summary.path.display());
    println!("Mode: {}", meta.mode.as_str());
    println!("Index: {}", meta.index);
    println!("Seed: {}", meta.seed);
    println!("Format version: {} (gadgets v{})", meta.format_version, meta.crate_version);
    println!("Created: {}", meta.created);
    println!("Source fingerprint: {}", meta.source_fingerprint);
    println!("Payload: {}", payload_description(&summary.artifact.payload));

    if detailed {
        if let ReplicatePayload::Genotypes { case, complement } = &summary.artifact.payload {
            show_genotype_counts(case, complement);
        }
    }
}

fn show_genotype_counts(case: &DenseGenotypeMatrix, complement: &DenseGenotypeMatrix) {
    println!("\n{:<8} {:>24} {:>24}", "SNP", "case 0/1/2/NA", "complement 0/1/2/NA");
    println!("{}", "-".repeat(58));
    let counts = |m: &DenseGenotypeMatrix, col: usize| {
        let mut c = [0usize; 4];
        for row in 0..m.n_rows() {
            match m.get(row, col) {
                g @ 0..=2 => c[g as usize] += 1,
                _ => c[3] += 1,
            }
        }
        format!("{}/{}/{}/{}", c[0], c[1], c[2], c[3])
    };
    for col in 0..case.n_cols() {
        println!(
            "{:<8} {:>24} {:>24}",
            col,
            counts(case, col),
            counts(complement, col)
        );
    }
}

fn validate_artifacts(summaries: &[ArtifactSummary]) -> bool {
    println!("\n=== ARTIFACT VALIDATION ===");
    let mut by_source: BTreeMap<(&str, u64, &str), usize> = BTreeMap::new();
    for s in summaries {
        let meta = &s.artifact.metadata;
        *by_source
            .entry((meta.source_fingerprint.as_str(), meta.seed, meta.mode.as_str()))
            .or_insert(0) += 1;
    }

    let mut indices: Vec<u64> = summaries.iter().map(|s| s.artifact.metadata.index).collect();
    indices.sort_unstable();
    let duplicates = indices.windows(2).filter(|w| w[0] == w[1]).count();

    for ((fingerprint, seed, mode), count) in &by_source {
        let short = &fingerprint[..fingerprint.len().min(16)];
        println!("{} replicate(s): mode {}, seed {}, source {}...", count, mode, seed, short);
    }
    if by_source.len() > 1 {
        println!("❌ Artifacts come from {} different sources/seeds/modes", by_source.len());
    }
    if duplicates > 0 {
        println!("❌ {} duplicated replicate indices", duplicates);
    }
    let ok = by_source.len() <= 1 && duplicates == 0;
    if ok {
        println!("✅ All {} artifacts are consistent (checksums verified)", summaries.len());
    }
    ok
}

fn export_summary(summaries: &[ArtifactSummary], output_path: &str) -> Result<()> {
    let path = Path::new(output_path);
    let mut file = File::create(path).map_err(|e| GadgetsError::io(path, e))?;
    let write_err = |e: std::io::Error| GadgetsError::io(path, e);

    writeln!(file, "file\tmode\tindex\tseed\tcreated\tsource_fingerprint\tpayload").map_err(write_err)?;
    for s in summaries {
        let meta = &s.artifact.metadata;
        writeln!(
            file,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            s.path.display(),
            meta.mode.as_str(),
            meta.index,
            meta.seed,
            meta.created,
            meta.source_fingerprint,
            payload_description(&s.artifact.payload)
        )
        .map_err(write_err)?;
    }

    println!("✅ Summary exported to: {}", output_path);
    Ok(())
}

fn show_calibration(path: &Path) -> Result<()> {
    let table = NullCalibrationTable::load(path)?;
    println!("\n=== NULL CALIBRATION: {} ===", path.display());
    println!(
        "{:<6} {:>8} {:>12} {:>14} {:>12} {:>14} {:>12}",
        "size", "samples", "seed", "mean T", "sd T", "mean G", "sd G"
    );
    println!("{}", "-".repeat(84));
    for record in table.records.values() {
        println!(
            "{:<6} {:>8} {:>12} {:>14.4} {:>12.4} {:>14.4} {:>12.4}",
            record.chrom_size,
            record.n_samples,
            record.seed,
            record.null_mean[0],
            record.null_sd[0],
            record.null_mean[1],
            record.null_sd[1]
        );
        if record.null_sd.iter().any(|&sd| sd <= 0.0) {
            println!("⚠️  size {}: zero null sd, standardization will use 1", record.chrom_size);
        }
    }
    Ok(())
}

// ============================================================================
// MAIN FUNCTION
// ============================================================================

fn run(args: &Args) -> Result<()> {
    if args.artifact.is_none() && args.calibration.is_none() {
        return Err(GadgetsError::InvalidInput(
            "Nothing to inspect: use --artifact and/or --calibration".to_string(),
        ));
    }

    if let Some(artifact) = &args.artifact {
        let paths = artifact_paths(Path::new(artifact))?;
        if paths.is_empty() {
            return Err(GadgetsError::InvalidInput(format!(
                "No replicate artifacts found in {}",
                artifact
            )));
        }
        let summaries = load_artifacts(&paths, args.quiet)?;
        if !args.quiet {
            println!("✅ {} artifact(s) loaded and checksums verified", summaries.len());
            for summary in &summaries {
                show_artifact(summary, args.detailed);
            }
        }
        if args.validate && !validate_artifacts(&summaries) {
            return Err(GadgetsError::InvalidInput(
                "Artifact validation failed".to_string(),
            ));
        }
        if let Some(output) = &args.export_summary {
            export_summary(&summaries, output)?;
        }
    }

    if let Some(calibration) = &args.calibration {
        show_calibration(Path::new(calibration))?;
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args: Args = argh::from_env();

    if let Err(e) = run(&args) {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}
