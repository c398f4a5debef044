// main.rs - CLI entry point

use gadgets::cli::{Analysis, Config};
use gadgets::core::permutation::rescore_artifacts;
use gadgets::core::{NullCalibrationTable, PermutationMode, PermutationTestResult, SizeScores};
use gadgets::output::write_json;
use gadgets::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Serialize)]
struct ScoreReport<'a> {
    snps: &'a [usize],
    result: &'a FitnessResult,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(e) = run_main() {
        eprintln!("❌ ERROR: {}", e);
        std::process::exit(1);
    }
}

fn run_main() -> Result<()> {
    let mut args: Args = argh::from_env();
    let command_line = std::env::args().collect::<Vec<String>>().join(" ");
    log::debug!("Command: {}", command_line);

    // Handle generate config first
    if args.generate_config {
        let sample_config = Config::generate_sample();
        println!("{}", sample_config);
        println!("\n💡 Save this content to a .toml file and use --config /path/to/config.toml");
        return Ok(());
    }

    // Load configuration file if specified
    if let Some(config_path) = args.config.clone() {
        args = args.with_config_file(&config_path)?;
    }

    let validation = validate_args(&args)?;

    println!("🚀 {}", gadgets::get_info());
    println!("🎯 Analysis: {}", validation.analysis.description());

    // Configure thread pool
    if let Some(n) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .map_err(|e| {
                GadgetsError::InvalidInput(format!("Failed to configure thread pool: {}", e))
            })?;
        println!("🧵 Threads: {}", n);
    } else {
        let num_threads = rayon::current_num_threads();
        println!("🧵 Threads: {} (auto-detected)", num_threads);
    }

    let total_start = Instant::now();

    if validation.analysis == Analysis::GlobalTest {
        run_global_test(&args)?;
        println!("⏱️  Total time: {:.2}s", total_start.elapsed().as_secs_f64());
        return Ok(());
    }

    let store = load_store(&args, &validation)?;
    let exposures = match &args.exposures {
        Some(path) => {
            let exposures = load_exposures(Path::new(path))?;
            println!(
                "🌍 Exposures: {} families × {} variables ({} strata)",
                exposures.n_families(),
                exposures.n_variables(),
                exposures.n_strata()
            );
            Some(exposures)
        }
        None => None,
    };

    if args.dry_run {
        println!("✅ Dry run completed successfully");
        return Ok(());
    }

    let base_scorer = FitnessScorer::new(validation.scoring.clone())?;
    println!(
        "⚖️  Weights: base {} (differing {}, both-heterozygous {}), aggregation {}",
        validation.scoring.weights.weight_function_int,
        validation.scoring.weights.n_different_snps_weight,
        validation.scoring.weights.n_both_one_weight,
        validation.scoring.aggregation
    );
    let test_config = PermutationTestConfig {
        n_permutations: args.n_permutations,
        seed: args.seed,
        show_progress: !args.no_progress,
    };

    match validation.analysis {
        Analysis::Calibrate => {
            let exposures = exposures.ok_or_else(|| {
                GadgetsError::InvalidInput("--exposures is required for calibrate".to_string())
            })?;
            run_calibrate(&args, &validation, &base_scorer, &store, &exposures)?;
        }
        Analysis::Permute => {
            run_permute(&args, &validation, &store, exposures.as_ref())?;
        }
        analysis => {
            let scorer = build_scorer(base_scorer, exposures, args.calibration.as_deref())?;
            let snps = validation.snps.as_deref().ok_or_else(|| {
                GadgetsError::InvalidInput("--snps is required".to_string())
            })?;
            match analysis {
                Analysis::Score => run_score(&args, &scorer, &store, snps)?,
                Analysis::EpistasisTest => {
                    println!("🔄 Epistasis test with {} permutations...", test_config.n_permutations);
                    let result = epistasis_test(&scorer, &store, snps, &test_config)?;
                    report_test(&args, "Epistasis test", &result)?;
                }
                Analysis::MaternalFetalTest => {
                    println!(
                        "🔄 Maternal-fetal test with {} permutations...",
                        test_config.n_permutations
                    );
                    let outcome = maternal_fetal_test(&scorer, &store, snps, &test_config)?;
                    match &outcome {
                        MaternalFetalOutcome::Tested(result) => {
                            report_test(&args, "Maternal-fetal test", result)?
                        }
                        MaternalFetalOutcome::NotApplicable { reason } => {
                            println!("⚠️  Maternal-fetal test not applicable: {}", reason);
                            if let Some(output) = &args.output {
                                write_json(Path::new(output), &outcome)?;
                            }
                        }
                    }
                }
                Analysis::GxeTest => {
                    println!("🔄 GxE test with {} exposure permutations...", test_config.n_permutations);
                    let result = gxe_test(&scorer, &store, snps, &test_config)?;
                    report_test(&args, "GxE test", &result)?;
                }
                Analysis::Rescore => run_rescore(&args, &scorer, &store, snps)?,
                Analysis::Calibrate | Analysis::Permute | Analysis::GlobalTest => {}
            }
        }
    }

    println!("⏱️  Total time: {:.2}s", total_start.elapsed().as_secs_f64());
    Ok(())
}

fn load_store(args: &Args, validation: &ValidationResult) -> Result<GenotypeStore> {
    let case_path = args.case_genotypes.as_deref().ok_or_else(|| {
        GadgetsError::InvalidInput("--case-genotypes is required".to_string())
    })?;
    let complement_path = args.complement_genotypes.as_deref().ok_or_else(|| {
        GadgetsError::InvalidInput("--complement-genotypes is required".to_string())
    })?;

    let start = Instant::now();
    let case = load_genotypes(Path::new(case_path), &args.missing_char)?;
    let complement = load_genotypes(Path::new(complement_path), &args.missing_char)?;
    if case.family_ids != complement.family_ids {
        return Err(GadgetsError::InvalidInput(
            "Case and complement files list different families".to_string(),
        ));
    }
    if case.snp_names != complement.snp_names {
        return Err(GadgetsError::InvalidInput(
            "Case and complement files list different SNPs".to_string(),
        ));
    }

    let n_snps = case.snp_names.len();
    let mut metadata = match &validation.block_ends {
        Some(ends) => SnpMetadata::from_block_ends(ends, n_snps)?,
        None => SnpMetadata::independent(n_snps),
    };
    if !validation.maternal_snps.is_empty() {
        metadata = metadata.with_maternal(&validation.maternal_snps)?;
    }

    let missing = case.matrix.missing_count() + complement.matrix.missing_count();
    println!(
        "📊 Genotypes: {} families × {} SNPs, {} LD blocks, {} missing calls ({:.2}s)",
        case.family_ids.len(),
        n_snps,
        metadata.n_blocks(),
        missing,
        start.elapsed().as_secs_f64()
    );
    GenotypeStore::new(case.matrix, complement.matrix, metadata)
}

/// Exposure-aware when both exposures and a calibration file are given
fn build_scorer(
    base: FitnessScorer,
    exposures: Option<ExposureMatrix>,
    calibration: Option<&str>,
) -> Result<FitnessScorer> {
    match (exposures, calibration) {
        (Some(exposures), Some(path)) => {
            let table = NullCalibrationTable::load(Path::new(path))?;
            println!(
                "📐 Exposure-aware scoring, calibration for sizes {:?}",
                table.records.keys().collect::<Vec<_>>()
            );
            Ok(base.with_mode(exposure_mode(exposures, table)))
        }
        (Some(_), None) => {
            println!("⚠️  Exposures given without --calibration: using transmission scoring");
            Ok(base)
        }
        (None, _) => Ok(base),
    }
}

fn run_score(args: &Args, scorer: &FitnessScorer, store: &GenotypeStore, snps: &[usize]) -> Result<()> {
    let result = scorer.score(store, snps)?;
    if result.is_sentinel() {
        println!("⚠️  No informative families for {:?}: fitness 0", snps);
    } else {
        println!("🧬 SNP set {:?}", snps);
        println!("  • Fitness score: {:.6}", result.fitness_score);
        println!("  • Informative families: {}", result.n_informative_families);
        for (j, &snp) in snps.iter().enumerate() {
            println!(
                "  • SNP {}: difference {:.4}, informativeness {:.3}, risk {}",
                snp,
                result.difference_vector[j],
                result.informativeness[j],
                result.risk_requirement[j].as_str()
            );
        }
    }
    if let Some(output) = &args.output {
        write_json(Path::new(output), &ScoreReport { snps, result: &result })?;
        println!("✅ Score written to: {}", output);
    }
    Ok(())
}

fn report_test(args: &Args, name: &str, result: &PermutationTestResult) -> Result<()> {
    println!("📈 {} on {:?}", name, result.snps);
    println!("  • Observed fitness: {:.6}", result.observed);
    println!("  • Permutations: {}", result.permuted.len());
    println!("  • h-value: {:.6}", result.p_value);
    if let Some(output) = &args.output {
        write_json(Path::new(output), result)?;
        println!("✅ Results written to: {}", output);
    }
    Ok(())
}

fn run_calibrate(
    args: &Args,
    validation: &ValidationResult,
    scorer: &FitnessScorer,
    store: &GenotypeStore,
    exposures: &ExposureMatrix,
) -> Result<()> {
    let output = args.output.as_deref().ok_or_else(|| {
        GadgetsError::InvalidInput("--output is required for calibrate".to_string())
    })?;
    let mut table = NullCalibrationTable::new();
    for &size in &validation.chrom_sizes {
        println!(
            "🔄 Calibrating size {} from {} random SNP sets...",
            size, args.calibration_samples
        );
        let record = estimate_null_calibration(
            scorer,
            store,
            exposures,
            size,
            args.calibration_samples,
            args.seed.wrapping_add(size as u64),
            !args.no_progress,
        )?;
        println!(
            "  • transmission {:.4} ± {:.4}, parental risk {:.4} ± {:.4}",
            record.null_mean[0], record.null_sd[0], record.null_mean[1], record.null_sd[1]
        );
        table.insert(record);
    }
    table.save(Path::new(output))?;
    println!("✅ Calibration written to: {}", output);
    Ok(())
}

fn run_permute(
    args: &Args,
    validation: &ValidationResult,
    store: &GenotypeStore,
    exposures: Option<&ExposureMatrix>,
) -> Result<()> {
    let dir = args.replicate_dir.as_deref().ok_or_else(|| {
        GadgetsError::InvalidInput("--replicate-dir is required for permute".to_string())
    })?;
    let engine = PermutationEngine::new(args.seed);
    let start = Instant::now();
    let paths = match (validation.permutation_mode, exposures) {
        (PermutationMode::ExposureShuffle, Some(exposures)) => {
            engine.write_exposure_replicates(store, exposures, args.n_permutations, Path::new(dir))?
        }
        (PermutationMode::ExposureShuffle, None) => {
            return Err(GadgetsError::InvalidInput(
                "--exposures is required for exposure replicates".to_string(),
            ))
        }
        _ => engine.write_label_replicates(store, args.n_permutations, Path::new(dir))?,
    };
    println!(
        "✅ {} {} replicates written to {} ({:.2}s)",
        paths.len(),
        validation.permutation_mode.as_str(),
        dir,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn run_rescore(args: &Args, scorer: &FitnessScorer, store: &GenotypeStore, snps: &[usize]) -> Result<()> {
    let dir = args.replicate_dir.as_deref().ok_or_else(|| {
        GadgetsError::InvalidInput("--replicate-dir is required for rescore".to_string())
    })?;
    let dir = Path::new(dir);
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| GadgetsError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map_or(false, |ext| ext == "gadr"))
        .collect();
    paths.sort();
    if paths.is_empty() {
        return Err(GadgetsError::InvalidInput(format!(
            "No replicate artifacts found in {}",
            dir.display()
        )));
    }
    println!("🔄 Rescoring {:?} on {} stored replicates...", snps, paths.len());

    let observed = scorer.score(store, snps)?;
    if observed.is_sentinel() {
        return Err(GadgetsError::InsufficientData(snps.to_vec()));
    }
    let permuted = rescore_artifacts(scorer, store, &paths, snps, !args.no_progress)?;
    let result = PermutationTestResult::new(snps, observed.fitness_score, permuted);
    report_test(args, "Stored-replicate test", &result)
}

fn run_global_test(args: &Args) -> Result<()> {
    let input = args.global_input.as_deref().ok_or_else(|| {
        GadgetsError::InvalidInput("--global-input is required for global-test".to_string())
    })?;
    let input = Path::new(input);
    let content = std::fs::read_to_string(input).map_err(|e| GadgetsError::io(input, e))?;
    let sizes: Vec<SizeScores> =
        serde_json::from_str(&content).map_err(|e| GadgetsError::format(input, e.to_string()))?;

    let result = global_test(&sizes)?;
    println!("📈 Global test over {} permuted datasets", result.n_replicates);
    for size in &result.per_size {
        println!(
            "  • size {}: 95% threshold {:.4}, statistic {:.4}",
            size.chrom_size, size.threshold, size.statistic
        );
    }
    println!("  • Global p-value: {:.6}", result.p_value);

    if let Some(output) = &args.output {
        write_json(Path::new(output), &result)?;
        println!("✅ Results written to: {}", output);
    }
    Ok(())
}
