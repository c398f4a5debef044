// aggregate_islands.rs - Merge GA island outputs into raw and combined result tables

use std::path::Path;

use clap::{value_parser, Arg, ArgMatches, Command};

use gadgets::core::aggregate::{aggregate, discover_island_files, read_island_files, AnnotationTable};
use gadgets::output::{write_combined_table, write_raw_table};
use gadgets::{GadgetsError, Result};

fn command() -> Command {
    Command::new("Island Aggregator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Combines per-island GA results into ranked, deduplicated tables")
        .arg(Arg::new("results-dir")
            .long("results-dir")
            .value_name("DIR")
            .help("Directory containing island_<id>_size_<k>.json files")
            .required(true))
        .arg(Arg::new("chrom-size")
            .long("chrom-size")
            .value_name("K")
            .help("Only aggregate islands run with this chromosome size")
            .value_parser(value_parser!(usize)))
        .arg(Arg::new("n-top-chroms")
            .long("n-top-chroms")
            .value_name("N")
            .help("Rows kept per island after deduplication (default: 10)")
            .value_parser(value_parser!(usize))
            .default_value("10"))
        .arg(Arg::new("raw-output")
            .long("raw-output")
            .value_name("FILE")
            .help("Path to output raw table (.csv)")
            .required(true))
        .arg(Arg::new("combined-output")
            .long("combined-output")
            .value_name("FILE")
            .help("Path to output combined table (.csv)")
            .required(true))
        .arg(Arg::new("annotation")
            .long("annotation")
            .value_name("FILE")
            .help("CSV with one row of SNP identifiers per genotype column"))
        .arg(Arg::new("n-snp-columns")
            .long("n-snp-columns")
            .value_name("N")
            .help("Number of SNP columns in the preprocessed genotype data")
            .value_parser(value_parser!(usize))
            .requires("annotation"))
}

fn string_arg<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(|s| s.as_str())
        .ok_or_else(|| GadgetsError::InvalidInput(format!("--{} is required", name)))
}

fn run(matches: &ArgMatches) -> Result<()> {
    let results_dir = string_arg(matches, "results-dir")?;
    let raw_output = string_arg(matches, "raw-output")?;
    let combined_output = string_arg(matches, "combined-output")?;
    let chrom_size = matches.get_one::<usize>("chrom-size").copied();
    let n_top = matches.get_one::<usize>("n-top-chroms").copied().unwrap_or(10);

    let annotation = match matches.get_one::<String>("annotation") {
        Some(path) => {
            let n_snp_columns = matches.get_one::<usize>("n-snp-columns").copied().ok_or_else(|| {
                GadgetsError::InvalidInput("--n-snp-columns is required with --annotation".to_string())
            })?;
            Some((AnnotationTable::from_csv(Path::new(path))?, n_snp_columns))
        }
        None => None,
    };

    println!("🧬 gadgets Island Aggregator");
    println!("============================");
    println!("📂 Results directory: {}", results_dir);
    if let Some(size) = chrom_size {
        println!("📏 Chromosome size: {}", size);
    }
    println!("🎯 Top chromosomes per island: {}", n_top);
    println!();

    let paths = discover_island_files(Path::new(results_dir), chrom_size)?;
    if paths.is_empty() {
        return Err(GadgetsError::InvalidInput(format!(
            "No island result files found in {}",
            results_dir
        )));
    }
    println!("📂 Reading {} island files...", paths.len());
    let islands = read_island_files(&paths)?;

    let results = aggregate(&islands, n_top);
    println!(
        "✅ {} raw rows, {} combined rows",
        results.raw.len(),
        results.combined.len()
    );

    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    write_raw_table(Path::new(raw_output), &results.raw, &command_line)?;
    write_combined_table(
        Path::new(combined_output),
        &results.combined,
        annotation.as_ref().map(|(table, n)| (table, *n)),
        &command_line,
    )?;

    println!();
    println!("🎉 Aggregation complete!");
    println!("📄 Raw table: {}", raw_output);
    println!("📄 Combined table: {}", combined_output);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let matches = command().get_matches();

    if let Err(e) = run(&matches) {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_well_formed() {
        command().debug_assert();
    }

    #[test]
    fn test_n_snp_columns_requires_annotation() {
        let result = command().try_get_matches_from([
            "aggregate_islands",
            "--results-dir", "r",
            "--raw-output", "raw.csv",
            "--combined-output", "combined.csv",
            "--n-snp-columns", "10",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults() {
        let matches = command()
            .try_get_matches_from([
                "aggregate_islands",
                "--results-dir", "r",
                "--raw-output", "raw.csv",
                "--combined-output", "combined.csv",
            ])
            .unwrap();
        assert_eq!(matches.get_one::<usize>("n-top-chroms"), Some(&10));
        assert_eq!(matches.get_one::<usize>("chrom-size"), None);
    }
}
