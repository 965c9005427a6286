use crate::{constants::DEFAULT_MIN_MAF, core::codec::OutputFormat, utils::util::Result};
use anyhow::anyhow;
use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use env_logger::fmt::Color;
use log::{Level, LevelFilter};
use once_cell::sync::Lazy;
use std::{
    io::Write,
    path::{Path, PathBuf},
};

/// Full version string including the crate version and git description.
///
/// # Examples
/// * `0.3.0-1ba958a-dirty` - while on a dirty branch
/// * `0.3.0-1ba958a` - with a fresh commit
pub static FULL_VERSION: Lazy<String> = Lazy::new(|| {
    let git_describe = env!("VERGEN_GIT_DESCRIBE");
    if git_describe.is_empty() {
        env!("CARGO_PKG_VERSION").to_string()
    } else {
        format!("{}-{}", env!("CARGO_PKG_VERSION"), git_describe)
    }
});

#[derive(Parser, Debug)]
#[command(name="xcf",
          version=&**FULL_VERSION,
          about="Toolbox for the XCF genotype container format",
          long_about = None,
          help_template = "{name} {version}\n{about-section}\n{usage-heading}\n    {usage}\n\n{all-args}")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Specify multiple times to increase verbosity level (e.g., -vv for more verbosity)
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true
    )]
    pub verbosity: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert between BCF and the XCF encodings
    View(ViewArgs),
    /// Concatenate or ligate multiple XCF files
    Concat(ConcatArgs),
    /// Compute INFO tags (AN, AC, AF, HWE, ...) per sub-population
    FillTags(FillTagsArgs),
    /// Compare two XCF files site by site
    Gtcheck(GtcheckArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::View(_) => "view",
            Command::Concat(_) => "concat",
            Command::FillTags(_) => "fill-tags",
            Command::Gtcheck(_) => "gtcheck",
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(arg_required_else_help(true))]
pub struct ViewArgs {
    /// Input file in BCF or XCF format (- for stdin)
    #[arg(short = 'i', long = "input", value_name = "FILE", value_parser = check_input_exists)]
    pub input: String,

    /// Output file (- for uncompressed BCF on stdout)
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        default_value = "-",
        value_parser = check_prefix_path
    )]
    pub output: String,

    /// Output format: bcf, or XCF as bg|bh|sg|sh|pp
    /// (binary/sparse genotypes/haplotypes, phase probabilities)
    #[arg(
        short = 'O',
        long = "format",
        value_name = "FORMAT",
        default_value = "bcf"
    )]
    pub format: OutputFormat,

    /// Region to be considered, e.g. chr20 or chr20:1000000-2000000
    #[arg(short = 'r', long = "region", value_name = "REGION")]
    pub region: Option<String>,

    /// MAF threshold below which variants take the sparse encodings
    #[arg(
        short = 'm',
        long = "maf",
        value_name = "MAF",
        default_value_t = DEFAULT_MIN_MAF,
        value_parser = maf_in_range
    )]
    pub maf: f32,

    /// Keep the input INFO definitions instead of writing a minimal header
    #[arg(long = "keep-info")]
    pub keep_info: bool,

    /// Comma separated list of samples to include (or exclude with "^" prefix)
    #[arg(short = 's', long = "samples", value_name = "LIST", group = "subset")]
    pub samples: Option<String>,

    /// File of samples to include (or exclude with "^" prefix)
    #[arg(
        short = 'S',
        long = "samples-file",
        value_name = "FILE",
        group = "subset",
        value_parser = check_file_exists
    )]
    pub samples_file: Option<PathBuf>,

    /// Only warn about unknown subset samples
    #[arg(long = "force-samples")]
    pub force_samples: bool,

    /// Number of threads used for BCF (de-)compression
    #[arg(
        short = 'T',
        long = "threads",
        value_name = "THREADS",
        default_value = "1",
        value_parser = threads_in_range
    )]
    pub threads: usize,
}

#[derive(Parser, Debug, Clone)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["naive", "ligate"]),
))]
#[command(group(
    ArgGroup::new("inputs")
        .required(true)
        .args(["input", "input_list"]),
))]
#[command(arg_required_else_help(true))]
pub struct ConcatArgs {
    /// Concatenate non-overlapping XCF files without any checks on records
    #[arg(long = "naive")]
    pub naive: bool,

    /// Ligate overlapping phased chunks, resolving phase across boundaries
    #[arg(long = "ligate")]
    pub ligate: bool,

    /// XCF files to concatenate, in genomic order
    #[arg(
        long = "input",
        value_name = "FILE",
        num_args = 1..,
        value_parser = check_file_exists
    )]
    pub input: Option<Vec<PathBuf>>,

    /// File containing paths of XCF files to concatenate (one per line)
    #[arg(long = "input-list", value_name = "FILE", value_parser = check_file_exists)]
    pub input_list: Option<PathBuf>,

    /// Output XCF prefix or companion file name
    #[arg(short = 'o', long = "output", value_name = "FILE", value_parser = check_prefix_path)]
    pub output: String,

    /// Produce only the updated BCF, no copy of the .bin/.fam side-cars
    #[arg(long = "out-only-bcf")]
    pub out_only_bcf: bool,

    /// Number of threads used for BCF (de-)compression
    #[arg(
        short = 'T',
        long = "threads",
        value_name = "THREADS",
        default_value = "1",
        value_parser = threads_in_range
    )]
    pub threads: usize,
}

impl ConcatArgs {
    pub fn process_input_paths(&self) -> Result<Vec<PathBuf>> {
        match (&self.input, &self.input_list) {
            (Some(paths), None) => Ok(paths.clone()),
            (None, Some(list)) => read_paths_from_file(list),
            _ => unreachable!("Either --input or --input-list is provided, never both"),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(arg_required_else_help(true))]
pub struct FillTagsArgs {
    /// Input genotype data in XCF format
    #[arg(short = 'i', long = "input", value_name = "FILE", value_parser = check_input_exists)]
    pub input: String,

    /// Output file in XCF format
    #[arg(short = 'o', long = "output", value_name = "FILE", value_parser = check_prefix_path)]
    pub output: String,

    /// Comma separated list of output tags, "all" for all tags
    /// (AN,AC,AC_Hom,AC_Het,AF,MAF,NS,HWE,ExcHet,IC,TYPE,END,MENDEL)
    #[arg(short = 't', long = "tags", value_name = "TAGS")]
    pub tags: String,

    /// Produce only the updated BCF, no copy of the .bin/.fam side-cars
    #[arg(long = "out-only-bcf")]
    pub out_only_bcf: bool,

    /// Number of threads used for BCF (de-)compression
    #[arg(
        short = 'T',
        long = "threads",
        value_name = "THREADS",
        default_value = "1",
        value_parser = threads_in_range
    )]
    pub threads: usize,
}

#[derive(Parser, Debug, Clone)]
#[command(arg_required_else_help(true))]
pub struct GtcheckArgs {
    /// The two XCF files to compare
    #[arg(
        short = 'i',
        long = "input",
        value_name = "FILE",
        num_args = 2,
        value_parser = check_input_exists
    )]
    pub inputs: Vec<String>,

    /// Output BCF with the differing sites
    #[arg(short = 'o', long = "output", value_name = "FILE", value_parser = check_prefix_path)]
    pub output: String,

    /// Additionally compare per-sample dosages and report the first mismatch
    #[arg(long = "deep-check")]
    pub deep_check: bool,

    /// Number of threads used for BCF (de-)compression
    #[arg(
        short = 'T',
        long = "threads",
        value_name = "THREADS",
        default_value = "1",
        value_parser = threads_in_range
    )]
    pub threads: usize,
}

/// Initializes the verbosity level for logging based on the command-line
/// arguments: info by default, debug with `-v`, trace with `-vv`.
pub fn init_verbose(args: &Cli) {
    let filter_level: LevelFilter = match args.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            let level = record.level();
            let mut style = buf.style();
            match record.level() {
                Level::Error => style.set_color(Color::Red),
                Level::Warn => style.set_color(Color::Yellow),
                Level::Info => style.set_color(Color::Green),
                Level::Debug => style.set_color(Color::Blue),
                Level::Trace => style.set_color(Color::Cyan),
            };

            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                style.value(level),
                record.module_path().unwrap_or("unknown_module"),
                record.args()
            )
        })
        .filter_level(filter_level)
        .init();
}

fn threads_in_range(s: &str) -> anyhow::Result<usize> {
    let threads: usize = s
        .parse::<usize>()
        .map_err(|_| anyhow!("`{}` is not a valid thread number", s))?;
    if threads == 0 {
        return Err(anyhow!("Number of threads must be >= 1"));
    }
    Ok(threads)
}

fn maf_in_range(s: &str) -> anyhow::Result<f32> {
    let maf: f32 = s
        .parse::<f32>()
        .map_err(|_| anyhow!("`{}` is not a valid MAF threshold", s))?;
    if !(0.0..=0.5).contains(&maf) {
        return Err(anyhow!("MAF threshold must be within [0, 0.5]"));
    }
    Ok(maf)
}

fn check_file_exists(s: &str) -> anyhow::Result<PathBuf> {
    let path = Path::new(s);
    if !path.exists() {
        return Err(anyhow!("File does not exist: {}", path.display()));
    }
    Ok(path.to_path_buf())
}

/// Like [`check_file_exists`], but admits `-` for stdin.
fn check_input_exists(s: &str) -> anyhow::Result<String> {
    if s == "-" {
        return Ok(s.to_string());
    }
    check_file_exists(s).map(|_| s.to_string())
}

fn check_prefix_path(s: &str) -> anyhow::Result<String> {
    if s == "-" {
        return Ok(s.to_string());
    }
    let path = Path::new(s);
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            return Err(anyhow!("Path does not exist: {}", parent_dir.display()));
        }
    }
    Ok(s.to_string())
}

fn read_paths_from_file(path: &Path) -> Result<Vec<PathBuf>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| crate::xcf_error!("Failed to open input list {}: {e}", path.display()))?;

    let mut paths = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        // Skip empty or comment lines
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let path = PathBuf::from(trimmed);
        if !path.exists() {
            return Err(crate::xcf_error!(
                "XCF file does not exist: {}",
                path.display()
            ));
        }
        paths.push(path);
    }
    if paths.is_empty() {
        return Err(crate::xcf_error!("No paths found in the input file"));
    }
    Ok(paths)
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
