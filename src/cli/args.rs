// args.rs - Command line arguments definition

use argh::FromArgs;

#[derive(FromArgs)]
/// gadgets - Epistasis and gene-environment scoring for case-parent triads
pub struct Args {
    /// analysis: score, epistasis-test, maternal-fetal-test, gxe-test, calibrate, permute, rescore, global-test (default: score)
    #[argh(option, default = "String::from(\"score\")")]
    pub analysis: String,

    /// case (affected child) genotype matrix, families x SNPs (.tsv)
    #[argh(option)]
    pub case_genotypes: Option<String>,

    /// complement genotype matrix (pseudo-sibling or unaffected sibling), families x SNPs (.tsv)
    #[argh(option)]
    pub complement_genotypes: Option<String>,

    /// exposure matrix, families x variables of categorical levels (.tsv)
    #[argh(option)]
    pub exposures: Option<String>,

    /// missing genotype character (default: -)
    #[argh(option, default = "String::from(\"-\")")]
    pub missing_char: String,

    /// comma-separated inclusive 0-based upper bounds of LD blocks (default: every SNP its own block)
    #[argh(option)]
    pub block_ends: Option<String>,

    /// comma-separated 0-based indices of maternal SNPs
    #[argh(option)]
    pub maternal_snps: Option<String>,

    /// comma-separated 0-based SNP indices of the candidate set
    #[argh(option)]
    pub snps: Option<String>,

    /// comma-separated chromosome sizes to calibrate (default: size of --snps)
    #[argh(option)]
    pub chrom_sizes: Option<String>,

    /// random SNP sets drawn per size for null calibration (default: 10000)
    #[argh(option, default = "10000")]
    pub calibration_samples: usize,

    /// null calibration JSON (written by calibrate, read by exposure-aware analyses)
    #[argh(option)]
    pub calibration: Option<String>,

    /// replicate mode for permute: label, exposure (default: label)
    #[argh(option, default = "String::from(\"label\")")]
    pub permutation_mode: String,

    /// number of permutation replicates (default: 10000)
    #[argh(option, default = "10000")]
    pub n_permutations: usize,

    /// base random seed (default: 1)
    #[argh(option, default = "1")]
    pub seed: u64,

    /// directory of replicate artifacts (written by permute, read by rescore)
    #[argh(option)]
    pub replicate_dir: Option<String>,

    /// JSON list of per-size observed and permuted top scores for global-test
    #[argh(option)]
    pub global_input: Option<String>,

    /// output report file (.json)
    #[argh(option)]
    pub output: Option<String>,

    /// number of threads (default: auto-detect)
    #[argh(option)]
    pub threads: Option<usize>,

    /// base of the family weight function (default: 2)
    #[argh(option, default = "2")]
    pub weight_function_int: u32,

    /// weighted-difference contribution of each differing SNP (default: 2)
    #[argh(option, default = "2")]
    pub n_different_snps_weight: u32,

    /// weighted-difference contribution of each both-heterozygous SNP (default: 1)
    #[argh(option, default = "1")]
    pub n_both_one_weight: u32,

    /// largest candidate set size (default: 6)
    #[argh(option, default = "6")]
    pub max_chrom_size: usize,

    /// reference informativeness for the recessive recoding test (default: 0.75)
    #[argh(option, default = "0.75")]
    pub recessive_ref_prop: f64,

    /// z threshold above which a SNP is recoded as recessive (default: 1.64)
    #[argh(option, default = "1.64")]
    pub recode_test_stat: f64,

    /// fitness aggregation: squared-sum, min-consistency (default: squared-sum)
    #[argh(option, default = "String::from(\"squared-sum\")")]
    pub aggregation: String,

    /// report the row indices of informative families
    #[argh(switch)]
    pub return_informative_indices: bool,

    /// hide progress bars
    #[argh(switch)]
    pub no_progress: bool,

    /// validate inputs without computation (dry run)
    #[argh(switch)]
    pub dry_run: bool,

    /// path to TOML configuration file
    #[argh(option)]
    pub config: Option<String>,

    /// generate sample configuration file and exit
    #[argh(switch)]
    pub generate_config: bool,
}
